//! Mail-merge style rendering of Grist query results.
//!
//! Reads a YAML merge configuration, runs its query against a Grist document,
//! renders the template for the result rows, and optionally writes derived
//! values back to a table. Exit codes are listed in [`grist_merge::exit_codes`].

use std::io;
use std::path::PathBuf;

use clap::Parser;
use grist_merge::MergeError;
use grist_merge::io::config::{config_dir, load_config};
use grist_merge::io::output::open_output;
use grist_merge::io::store::{GristClient, resolve_api_key};
use grist_merge::logging;
use grist_merge::merge::{MergeRequest, WriteOutcome, run_merge};
use tracing::info;

#[derive(Parser)]
#[command(
    name = "grist-merge",
    version,
    about = "Render Grist query results through a template and write values back"
)]
struct Cli {
    /// YAML merge configuration.
    #[arg(value_name = "FILENAME.YML")]
    config: PathBuf,

    /// Values for the query parameters declared in the configuration, in order.
    #[arg(value_name = "PAR")]
    parameters: Vec<String>,

    /// Plan write-back and print the plan to stderr instead of applying it.
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Debug-level logging on stderr.
    #[arg(short, long)]
    verbose: bool,

    /// File holding the Grist API key (`GRIST_API_KEY` takes precedence).
    #[arg(long, value_name = "FILENAME", default_value = "~/.grist-api-key")]
    api_key: PathBuf,
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    if let Err(err) = run(cli) {
        eprintln!("{err}");
        std::process::exit(err.exit_code());
    }
}

fn run(cli: Cli) -> Result<(), MergeError> {
    let config = load_config(&cli.config).map_err(MergeError::config)?;
    let api_key = resolve_api_key(&cli.api_key).map_err(MergeError::config)?;
    let store = GristClient::new(&config.grist_root_url, &config.grist_doc_id, api_key)
        .map_err(MergeError::config)?;

    let request = MergeRequest {
        config_dir: config_dir(&cli.config),
        config,
        parameters: cli.parameters,
        dry_run: cli.dry_run,
    };
    let outcome = run_merge(
        &store,
        &request,
        || open_output(&request.config.output),
        &mut io::stderr(),
    )?;

    match &outcome.write {
        Some(WriteOutcome::Applied(summary)) => info!(
            rows = outcome.rows,
            rendered = outcome.rendered,
            inserted = summary.inserted,
            updated = summary.updated,
            "merge complete"
        ),
        Some(WriteOutcome::Planned(plan)) => info!(
            rows = outcome.rows,
            rendered = outcome.rendered,
            planned = plan.len(),
            "merge complete (dry run)"
        ),
        None => info!(
            rows = outcome.rows,
            rendered = outcome.rendered,
            "merge complete"
        ),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_config_only() {
        let cli = Cli::parse_from(["grist-merge", "merge.yml"]);
        assert_eq!(cli.config, PathBuf::from("merge.yml"));
        assert!(cli.parameters.is_empty());
        assert!(!cli.dry_run);
        assert!(!cli.verbose);
        assert_eq!(cli.api_key, PathBuf::from("~/.grist-api-key"));
    }

    #[test]
    fn parse_parameters_and_flags() {
        let cli = Cli::parse_from([
            "grist-merge",
            "-n",
            "--verbose",
            "--api-key",
            "/run/secrets/grist",
            "merge.yml",
            "2024-01-01",
            "ops",
        ]);
        assert!(cli.dry_run);
        assert!(cli.verbose);
        assert_eq!(cli.api_key, PathBuf::from("/run/secrets/grist"));
        assert_eq!(cli.parameters, vec!["2024-01-01", "ops"]);
    }

    #[test]
    fn config_path_is_required() {
        assert!(Cli::try_parse_from(["grist-merge"]).is_err());
    }
}
