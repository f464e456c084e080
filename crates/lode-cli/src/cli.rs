use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(
    name = "lode",
    about = "Lode: version control for geospatial datasets",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Repository directory
    #[arg(short = 'C', long = "repo", global = true, default_value = ".")]
    pub repo: PathBuf,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create an empty repository
    Init(InitArgs),
    /// Commit datasets described in a JSON file
    Import(ImportArgs),
    /// Show changes between revisions, or between a revision and the working copy
    Diff(DiffArgs),
    /// Show a commit and the changes it made
    Show(ShowArgs),
    /// Work with datasets
    Data(DataArgs),
}

#[derive(Args)]
pub struct InitArgs {
    pub path: Option<PathBuf>,
}

#[derive(Args)]
pub struct ImportArgs {
    /// JSON dataset description
    pub file: PathBuf,
    #[arg(short, long)]
    pub message: Option<String>,
    /// Apply the datasets to the working copy instead of committing them
    #[arg(long)]
    pub working_copy: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum FeatureCount {
    Exact,
}

#[derive(Args)]
pub struct DiffArgs {
    /// [REVISION | A..B | A...B | A B] [FILTER...]
    pub args: Vec<String>,

    #[arg(short = 'o', long = "output-format", default_value = "text")]
    pub output_format: String,

    /// Exit with 1 when there are changes, 0 otherwise
    #[arg(long)]
    pub exit_code: bool,

    /// Reproject geometries into this CRS
    #[arg(long)]
    pub crs: Option<String>,

    /// Only count changed features
    #[arg(long = "only-feature-count", value_enum)]
    pub only_feature_count: Option<FeatureCount>,

    /// Write to a file instead of stdout
    #[arg(long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct ShowArgs {
    /// [REVISION] [FILTER...]
    pub args: Vec<String>,

    #[arg(short = 'o', long = "output-format", default_value = "text")]
    pub output_format: String,

    #[arg(long)]
    pub crs: Option<String>,

    #[arg(long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct DataArgs {
    #[command(subcommand)]
    pub action: DataAction,
}

#[derive(Subcommand)]
pub enum DataAction {
    /// List datasets at a revision
    Ls { revision: Option<String> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init() {
        let cli = Cli::try_parse_from(["lode", "init"]).unwrap();
        assert!(matches!(cli.command, Command::Init(_)));
        assert_eq!(cli.repo, PathBuf::from("."));
    }

    #[test]
    fn parse_diff_defaults() {
        let cli = Cli::try_parse_from(["lode", "diff"]).unwrap();
        if let Command::Diff(args) = cli.command {
            assert!(args.args.is_empty());
            assert_eq!(args.output_format, "text");
            assert!(!args.exit_code);
            assert!(args.only_feature_count.is_none());
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_diff_range_and_filters() {
        let cli = Cli::try_parse_from([
            "lode", "diff", "main..side", "parcels:feature:42", "-o", "json", "--exit-code",
        ]).unwrap();
        if let Command::Diff(args) = cli.command {
            assert_eq!(args.args, vec!["main..side", "parcels:feature:42"]);
            assert_eq!(args.output_format, "json");
            assert!(args.exit_code);
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_feature_count() {
        let cli = Cli::try_parse_from(["lode", "diff", "--only-feature-count", "exact"]).unwrap();
        if let Command::Diff(args) = cli.command {
            assert_eq!(args.only_feature_count, Some(FeatureCount::Exact));
        } else { panic!("wrong command"); }
        assert!(Cli::try_parse_from(["lode", "diff", "--only-feature-count", "fast"]).is_err());
    }

    #[test]
    fn parse_show_crs() {
        let cli = Cli::try_parse_from(["lode", "show", "HEAD~1", "--crs", "EPSG:3857"]).unwrap();
        if let Command::Show(args) = cli.command {
            assert_eq!(args.args, vec!["HEAD~1"]);
            assert_eq!(args.crs.as_deref(), Some("EPSG:3857"));
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_data_ls() {
        let cli = Cli::try_parse_from(["lode", "-C", "/tmp/repo", "data", "ls", "main"]).unwrap();
        assert_eq!(cli.repo, PathBuf::from("/tmp/repo"));
        if let Command::Data(DataArgs { action: DataAction::Ls { revision } }) = cli.command {
            assert_eq!(revision.as_deref(), Some("main"));
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_import_to_working_copy() {
        let cli = Cli::try_parse_from(["lode", "import", "data.json", "--working-copy"]).unwrap();
        if let Command::Import(args) = cli.command {
            assert!(args.working_copy);
            assert_eq!(args.file, PathBuf::from("data.json"));
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_verbose() {
        let cli = Cli::try_parse_from(["lode", "--verbose", "diff"]).unwrap();
        assert!(cli.verbose);
    }
}
