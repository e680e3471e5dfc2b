//! Offline commands: verify and export

use clap::Parser;
use std::path::PathBuf;

use super::harvest::{Cli, OutputFormat};
use super::CliError;
use crate::harvest::config::{IDENTITY_FILE, MATCH_DETAILS_DIR, MATCH_IDS_FILE, SHARD_PREFIX};
use crate::output::{export_shards, CsvRecordWriter, OutputWriter};
use crate::store::shard::scan_shards;
use crate::store::{IdSet, IdentityMap};
use crate::MatchRecord;

/// Scan the data directory without contacting the API
#[derive(Parser, Debug)]
pub struct VerifyCommand {
    /// Print every duplicate key instead of a count
    #[arg(long, default_value_t = false)]
    pub list_duplicates: bool,
}

impl VerifyCommand {
    /// Execute the verification
    pub fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let shard_dir = cli.data_dir.join(MATCH_DETAILS_DIR);
        let scan = scan_shards::<MatchRecord>(&shard_dir, SHARD_PREFIX)?;
        let identities = IdentityMap::load(cli.data_dir.join(IDENTITY_FILE))?.len();
        let match_ids = IdSet::load(cli.data_dir.join(MATCH_IDS_FILE))?.len();

        match cli.output_format {
            OutputFormat::Json => {
                let json = serde_json::json!({
                    "status": if scan.is_clean() { "ok" } else { "failed" },
                    "identities": identities,
                    "match_ids": match_ids,
                    "shards": scan,
                });
                println!("{}", serde_json::to_string_pretty(&json).unwrap_or_default());
            }
            OutputFormat::Human => {
                println!("Data directory: {}", cli.data_dir.display());
                println!("  Resolved identities: {identities}");
                println!("  Known match ids: {match_ids}");
                println!("  Shards: {}", scan.shards);
                println!("  Records: {}", scan.records);
                println!("  Stored matches: {}", scan.groups);
                println!("  Duplicate keys: {}", scan.duplicate_keys.len());
                if self.list_duplicates {
                    for key in &scan.duplicate_keys {
                        println!("    - {key}");
                    }
                }
                for shard in &scan.corrupt_shards {
                    println!("  Unreadable shard: {shard}");
                }
            }
        }

        if scan.is_clean() {
            Ok(())
        } else {
            Err(CliError::VerificationFailed(format!(
                "{} duplicate key(s), {} unreadable shard(s)",
                scan.duplicate_keys.len(),
                scan.corrupt_shards.len()
            )))
        }
    }
}

/// Flatten every stored record into one CSV file
#[derive(Parser, Debug)]
pub struct ExportCommand {
    /// Output CSV path
    #[arg(long, short)]
    pub output: PathBuf,
}

impl ExportCommand {
    /// Execute the export
    pub fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let shard_dir = cli.data_dir.join(MATCH_DETAILS_DIR);
        let mut writer = CsvRecordWriter::new(&self.output)?;
        let written = export_shards(&shard_dir, SHARD_PREFIX, &mut writer)?;
        writer.close()?;

        match cli.output_format {
            OutputFormat::Json => println!(
                "{}",
                serde_json::json!({
                    "status": "completed",
                    "records": written,
                    "output": self.output.display().to_string(),
                })
            ),
            OutputFormat::Human => {
                println!("Exported {written} records to {}", self.output.display())
            }
        }
        Ok(())
    }
}
