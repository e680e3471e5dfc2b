//! Command line definition and the harvest commands

use clap::{Parser, Subcommand};
use std::io::IsTerminal;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::verify::{ExportCommand, VerifyCommand};
use super::CliError;
use crate::api::{
    ApiConfig, ChainedCredentialSource, Credential, CredentialSource, FileCredentialSource,
    PromptCredentialSource, RiotHttpClient, StaticCredential,
};
use crate::harvest::config::{
    DEFAULT_LONG_LIMIT, DEFAULT_MATCH_COUNT, DEFAULT_SHARD_CAPACITY, DEFAULT_SHORT_LIMIT,
    MAX_CONCURRENCY, RANKED_SOLO_QUEUE,
};
use crate::harvest::{
    HaltReason, HarvestConfig, IdentityDedup, PipelineDriver, RateConfig, RateGovernor,
    RunReport, StageKind, WindowLimit,
};
use crate::metrics;
use crate::shutdown::SharedShutdown;

/// Seed file name looked up in the data directory when `--seeds` is not given
pub const DEFAULT_SEED_FILE: &str = "summoner_ids.json";

/// Parse and validate concurrency value
fn parse_concurrency(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;

    if value == 0 {
        return Err("concurrency must be at least 1".to_string());
    }
    if value > MAX_CONCURRENCY {
        return Err(format!(
            "concurrency {value} exceeds maximum of {MAX_CONCURRENCY}"
        ));
    }
    Ok(value)
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// Human-readable output
    Human,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "human" => Ok(OutputFormat::Human),
            _ => Err(format!("Invalid output format: {s}")),
        }
    }
}

/// Match Harvester CLI
#[derive(Parser, Debug)]
#[command(name = "match-harvester")]
#[command(about = "Harvest ranked match records from the match API", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (json or human)
    #[arg(long, global = true, default_value = "human")]
    pub output_format: OutputFormat,

    /// Directory holding every persisted output
    #[arg(long, global = true, env = "MATCH_HARVESTER_DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,

    /// Seed file (default: <data-dir>/summoner_ids.json)
    #[arg(long, global = true)]
    pub seeds: Option<PathBuf>,

    /// API key
    #[arg(long, global = true, env = "RIOT_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// JSON file `{"riot_api_key": "..."}`, re-read when the key expires
    #[arg(long, global = true)]
    pub credentials_file: Option<PathBuf>,

    /// Never ask for a replacement key on the terminal
    #[arg(long, global = true, default_value_t = false)]
    pub no_prompt: bool,

    /// Platform routing value for summoner lookups
    #[arg(long, global = true, env = "RIOT_PLATFORM", default_value = "na1")]
    pub platform: String,

    /// Regional routing value for match endpoints
    #[arg(long, global = true, env = "RIOT_REGION", default_value = "americas")]
    pub region: String,

    /// Send every request to this base URL instead of the routed hosts
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Requests allowed per short window
    #[arg(long, global = true, default_value_t = DEFAULT_SHORT_LIMIT)]
    pub short_limit: usize,

    /// Short window length in seconds
    #[arg(long, global = true, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..))]
    pub short_window_secs: u64,

    /// Requests allowed per long window
    #[arg(long, global = true, default_value_t = DEFAULT_LONG_LIMIT)]
    pub long_limit: usize,

    /// Long window length in seconds
    #[arg(long, global = true, default_value_t = 120, value_parser = clap::value_parser!(u64).range(1..))]
    pub long_window_secs: u64,

    /// Match ids requested per identifier
    #[arg(long, global = true, default_value_t = DEFAULT_MATCH_COUNT, value_parser = clap::value_parser!(u32).range(1..=100))]
    pub match_count: u32,

    /// Queue id filter for match listing
    #[arg(long, global = true, default_value_t = RANKED_SOLO_QUEUE)]
    pub queue: u32,

    /// Records per shard file
    #[arg(long, global = true, default_value_t = DEFAULT_SHARD_CAPACITY)]
    pub shard_capacity: usize,

    /// Units in flight at once (1 = sequential, max 32)
    ///
    /// All in-flight units share one rate governor, so higher values overlap network latency
    /// without exceeding the configured windows.
    #[arg(long, global = true, default_value = "1", value_parser = parse_concurrency)]
    pub concurrency: usize,

    /// Identifier dedup for the match-id stage: per-seed or global
    #[arg(long, global = true, default_value = "per-seed")]
    pub identity_dedup: IdentityDedup,

    /// Per-request timeout in seconds
    #[arg(long, global = true, default_value_t = 10)]
    pub request_timeout_secs: u64,

    /// Serve Prometheus metrics on this address
    #[arg(long, global = true)]
    pub metrics_addr: Option<SocketAddr>,
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run every stage: identities, match ids, match details
    Run {
        /// Re-list match ids for identifiers that were already indexed
        #[arg(long, default_value_t = false)]
        reindex: bool,
    },

    /// Resolve seed identifiers
    Identities,

    /// List match ids for resolved identifiers
    MatchIds {
        /// Re-list match ids for identifiers that were already indexed
        #[arg(long, default_value_t = false)]
        reindex: bool,
    },

    /// Fetch and store match records
    MatchDetails,

    /// Check the record shards for duplicates and corruption
    Verify(VerifyCommand),

    /// Export every stored record
    Export(ExportCommand),
}

impl Cli {
    /// Seed file path
    pub fn seed_file(&self) -> PathBuf {
        self.seeds
            .clone()
            .unwrap_or_else(|| self.data_dir.join(DEFAULT_SEED_FILE))
    }

    /// Rate windows from the flags
    pub fn rate_config(&self) -> RateConfig {
        RateConfig {
            short: WindowLimit::new(self.short_limit, Duration::from_secs(self.short_window_secs)),
            long: WindowLimit::new(self.long_limit, Duration::from_secs(self.long_window_secs)),
        }
    }

    /// Pipeline configuration from the flags
    pub fn harvest_config(&self, reindex: bool) -> HarvestConfig {
        let mut config = HarvestConfig::new(&self.data_dir, self.seed_file())
            .with_concurrency(self.concurrency)
            .with_shard_capacity(self.shard_capacity)
            .with_identity_dedup(self.identity_dedup);
        config.rate = self.rate_config();
        config.match_count = self.match_count;
        config.queue = self.queue;
        config.reindex = reindex;
        config.show_progress =
            self.output_format == OutputFormat::Human && std::io::stderr().is_terminal();
        config
    }

    /// Endpoint configuration from the flags
    pub fn api_config(&self) -> ApiConfig {
        let mut config = match &self.base_url {
            Some(base_url) => ApiConfig::with_base_url(base_url.trim_end_matches('/')),
            None => ApiConfig::for_routing(&self.platform, &self.region),
        };
        config.request_timeout = Duration::from_secs(self.request_timeout_secs.max(1));
        config
    }

    /// Initial key: `--api-key`/`RIOT_API_KEY`, else the credentials file
    pub fn initial_key(&self) -> Result<String, CliError> {
        if let Some(key) = self.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
            return Ok(key.to_string());
        }
        self.credentials_file
            .as_ref()
            .and_then(|path| FileCredentialSource::new(path).read_key())
            .ok_or(CliError::MissingCredential)
    }

    /// Where replacement keys come from: the credentials file, then the terminal
    pub fn credential_source(&self) -> Arc<dyn CredentialSource> {
        let mut sources: Vec<Box<dyn CredentialSource>> = Vec::new();
        if let Some(path) = &self.credentials_file {
            sources.push(Box::new(FileCredentialSource::new(path)));
        }
        if !self.no_prompt && std::io::stdin().is_terminal() {
            sources.push(Box::new(PromptCredentialSource));
        }

        if sources.is_empty() {
            Arc::new(StaticCredential)
        } else {
            Arc::new(ChainedCredentialSource::new(sources))
        }
    }
}

/// Run `stages` against the live API and print the report
pub async fn execute_harvest(
    cli: &Cli,
    stages: &[StageKind],
    reindex: bool,
    shutdown: SharedShutdown,
) -> Result<(), CliError> {
    if let Some(addr) = cli.metrics_addr {
        if let Err(e) = metrics::init_metrics(addr).await {
            warn!(error = %e, "Metrics exporter unavailable, continuing without it");
        }
    }

    let config = cli.harvest_config(reindex);
    let credential = Credential::new(cli.initial_key()?);
    let governor = Arc::new(RateGovernor::from_config(&config.rate));
    let api = Arc::new(RiotHttpClient::new(
        cli.api_config(),
        credential.clone(),
        governor.clone(),
    )?);

    info!(
        data_dir = %config.data_dir.display(),
        concurrency = config.concurrency,
        short_window = ?governor.short_limit(),
        long_window = ?governor.long_limit(),
        stages = ?stages,
        "Starting harvest"
    );

    let driver = PipelineDriver::new(api, credential, cli.credential_source(), config)
        .with_shutdown(shutdown);
    let report = driver.run(stages).await?;

    print_report(cli.output_format, &report, governor.admitted().await);

    match report.halted() {
        Some(HaltReason::CredentialUnavailable) => Err(CliError::CredentialUnavailable),
        _ => Ok(()),
    }
}

fn print_report(format: OutputFormat, report: &RunReport, requests: u64) {
    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "status": if report.halted().is_some() { "halted" } else { "completed" },
                "requests": requests,
                "records_appended": report.records_appended(),
                "report": report,
            });
            println!("{}", serde_json::to_string_pretty(&json).unwrap_or_default());
        }
        OutputFormat::Human => {
            let elapsed = report.finished_at - report.started_at;
            println!("Harvest finished in {}s ({requests} requests)", elapsed.num_seconds());
            for stage in &report.stages {
                println!(
                    "  {:<14} pending {:>6}  completed {:>6}  skipped {:>5}  added {:>7}  remaining {:>6}",
                    stage.stage.name(),
                    stage.pending,
                    stage.completed,
                    stage.skipped,
                    stage.added,
                    stage.remaining,
                );
                if stage.credential_replacements > 0 {
                    println!("    credential replaced {} time(s)", stage.credential_replacements);
                }
            }
            match report.halted() {
                Some(HaltReason::Shutdown) => {
                    println!("Stopped on request; run again to continue where it left off")
                }
                Some(HaltReason::CredentialUnavailable) => {
                    println!("Stopped: API key expired; run again with a new key to continue")
                }
                None => {}
            }
        }
    }
}
