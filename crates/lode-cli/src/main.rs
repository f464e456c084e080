use clap::Parser;
use colored::Colorize;
use lode_sdk::SdkError;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod import;
mod output;

fn main() {
    let cli = cli::Cli::parse();
    init_logging(cli.verbose);
    let code = match commands::run_command(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {e:#}", "Error:".red().bold());
            e.downcast_ref::<SdkError>().map_or(11, SdkError::exit_code)
        }
    };
    std::process::exit(code);
}

/// Log to stderr so diffs on stdout stay clean. `RUST_LOG` wins over
/// `--verbose`.
fn init_logging(verbose: bool) {
    let default = if verbose { "lode=debug" } else { "lode=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
