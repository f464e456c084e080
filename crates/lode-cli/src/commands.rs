use std::fs::File;
use std::io::{BufWriter, IsTerminal, Write};
use std::path::Path;

use anyhow::Context;
use colored::Colorize;
use lode_sdk::{DiffWriter, Repository, RepoTreeBuilder, SdkError, SdkResult};
use lode_spatial::make_crs;

use crate::cli::*;
use crate::import;
use crate::output::{diff_output, feature_count_output};

/// Run a parsed command. Returns the process exit status.
pub fn run_command(cli: Cli) -> anyhow::Result<i32> {
    let Cli { command, repo, .. } = cli;
    match command {
        Command::Init(args) => cmd_init(&repo, args),
        Command::Import(args) => cmd_import(&repo, args),
        Command::Diff(args) => cmd_diff(&repo, args),
        Command::Show(args) => cmd_show(&repo, args),
        Command::Data(DataArgs { action: DataAction::Ls { revision } }) => cmd_data_ls(&repo, revision),
    }
}

fn cmd_init(repo_dir: &Path, args: InitArgs) -> anyhow::Result<i32> {
    let path = args.path.unwrap_or_else(|| repo_dir.to_path_buf());
    Repository::init(&path)?;
    println!(
        "{} Initialized empty Lode repository in {}",
        "✓".green().bold(),
        path.display().to_string().bold()
    );
    Ok(0)
}

fn cmd_import(repo_dir: &Path, args: ImportArgs) -> anyhow::Result<i32> {
    let mut repo = Repository::open(repo_dir)?;
    let file = import::load(&args.file)?;
    if args.working_copy {
        let touched = import::apply_to_working_copy(&mut repo, &file)?;
        println!("{} Updated {} items in the working copy", "✓".green().bold(), touched);
    } else {
        let id = import::commit(&mut repo, &file, args.message)?;
        println!("{} Committed {}", "✓".green().bold(), id.short_hex().yellow());
    }
    Ok(0)
}

fn cmd_diff(repo_dir: &Path, args: DiffArgs) -> anyhow::Result<i32> {
    let repo = Repository::open(repo_dir)?;
    let (commit_spec, filters) = split_commits_and_filters(&repo, &args.args)?;
    let exit_code = args.exit_code || args.output_format == "quiet";

    let out = open_output(args.output.as_deref())?;
    let mut output = match args.only_feature_count {
        Some(FeatureCount::Exact) => feature_count_output(&args.output_format, out)?,
        None => diff_output(&args.output_format, out)?,
    };
    let mut writer = DiffWriter::new(&repo, &commit_spec, &filters)?;
    if let Some(crs) = &args.crs {
        writer = writer.with_target_crs(make_crs(crs, "--crs").map_err(SdkError::from)?);
    }
    writer.write_diff(output.as_mut())?;
    if exit_code {
        Ok(writer.exit_code()?)
    } else {
        Ok(0)
    }
}

fn cmd_show(repo_dir: &Path, args: ShowArgs) -> anyhow::Result<i32> {
    let repo = Repository::open(repo_dir)?;
    let (revision, filters) = match args.args.split_first() {
        Some((first, rest)) if repo.structure(first).is_ok() => (first.clone(), rest.to_vec()),
        _ => ("HEAD".to_string(), args.args.clone()),
    };
    let commit = repo
        .structure(&revision)?
        .read_commit()?
        .ok_or_else(|| SdkError::Usage(format!("{revision} is not a commit")))?;
    let commit_spec = if commit.parents.is_empty() {
        let empty = RepoTreeBuilder::new().write(repo.store().as_ref())?;
        format!("{empty}...{revision}")
    } else {
        format!("{revision}^...{revision}")
    };

    let out = open_output(args.output.as_deref())?;
    let mut output = diff_output(&args.output_format, out)?;
    let mut writer = DiffWriter::new(&repo, &commit_spec, &filters)?.include_target_commit_as_header();
    if let Some(crs) = &args.crs {
        writer = writer.with_target_crs(make_crs(crs, "--crs").map_err(SdkError::from)?);
    }
    writer.write_diff(output.as_mut())?;
    Ok(0)
}

fn cmd_data_ls(repo_dir: &Path, revision: Option<String>) -> anyhow::Result<i32> {
    let repo = Repository::open(repo_dir)?;
    let revision = revision.unwrap_or_else(|| "HEAD".to_string());
    if revision == "HEAD" && repo.head_commit()?.is_none() {
        println!("Empty repository.");
        return Ok(0);
    }
    let datasets = repo.structure(&revision)?.datasets()?;
    if datasets.is_empty() {
        println!("The commit at {revision} has no datasets.");
    }
    for ds in datasets.iter() {
        println!("{}  {}", ds.path().bold(), ds.dataset_type().to_string().dimmed());
    }
    Ok(0)
}

/// Leading arguments that name revisions (at most two) form the commit
/// spec; everything after is a key filter.
fn split_commits_and_filters(repo: &Repository, args: &[String]) -> SdkResult<(String, Vec<String>)> {
    let mut commits: Vec<&str> = Vec::new();
    let mut rest = args;
    while commits.len() < 2 {
        let Some((first, tail)) = rest.split_first() else { break };
        if !(first.contains("..") || repo.structure(first).is_ok()) {
            break;
        }
        commits.push(first);
        rest = tail;
    }
    let commit_spec = match (commits.first(), commits.get(1)) {
        (None, _) => "HEAD".to_string(),
        (Some(one), None) => one.to_string(),
        (Some(a), Some(b)) if a.contains("..") || b.contains("..") => {
            return Err(SdkError::Usage(format!(
                "Can only show a single range - can't show {a}, {b}"
            )))
        }
        (Some(a), Some(b)) => format!("{a}...{b}"),
    };
    Ok((commit_spec, rest.to_vec()))
}

fn open_output(path: Option<&Path>) -> anyhow::Result<Box<dyn Write>> {
    match path {
        Some(path) if path != Path::new("-") => {
            colored::control::set_override(false);
            let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
            Ok(Box::new(BufWriter::new(file)))
        }
        _ => {
            if !std::io::stdout().is_terminal() {
                colored::control::set_override(false);
            }
            Ok(Box::new(BufWriter::new(std::io::stdout())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use serde_json::json;
    use tempfile::TempDir;

    fn run(dir: &TempDir, args: &[&str]) -> anyhow::Result<i32> {
        let repo = dir.path().to_str().unwrap();
        let mut argv = vec!["lode", "-C", repo];
        argv.extend_from_slice(args);
        run_command(Cli::try_parse_from(argv)?)
    }

    fn write_json(dir: &TempDir, name: &str, value: serde_json::Value) -> String {
        let path = dir.path().join(name);
        std::fs::write(&path, value.to_string()).unwrap();
        path.to_str().unwrap().to_string()
    }

    fn parcels(items: serde_json::Value) -> serde_json::Value {
        json!({"datasets": [{
            "path": "parcels",
            "meta": {
                "schema.json": [
                    {"id": "c1", "name": "fid", "dataType": "integer", "primaryKeyIndex": 0},
                    {"id": "c2", "name": "geom", "dataType": "geometry", "geometryCrs": "EPSG:4326"}
                ],
                "crs/EPSG:4326.wkt": "GEOGCS[\"WGS 84\",DATUM[\"WGS_1984\"],AUTHORITY[\"EPSG\",\"4326\"]]"
            },
            "items": items
        }]})
    }

    /// A repository with two commits: fids 1 and 2, then 2 moved and 3 added.
    fn history() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(run(&dir, &["init"]).unwrap(), 0);
        let first = write_json(&dir, "first.json", parcels(json!([
            {"fid": 1, "geom": "POINT(1 1)"},
            {"fid": 2, "geom": "POINT(2 2)"}
        ])));
        run(&dir, &["import", &first, "-m", "First"]).unwrap();
        let second = write_json(&dir, "second.json", parcels(json!([
            {"fid": 1, "geom": "POINT(1 1)"},
            {"fid": 2, "geom": "POINT(2 5)"},
            {"fid": 3, "geom": "POINT(3 3)"}
        ])));
        run(&dir, &["import", &second, "-m", "Second"]).unwrap();
        dir
    }

    fn read(dir: &TempDir, name: &str) -> String {
        std::fs::read_to_string(dir.path().join(name)).unwrap()
    }

    #[test]
    fn text_diff_between_commits() {
        let dir = history();
        let out = dir.path().join("out.txt");
        let code = run(&dir, &["diff", "HEAD^...HEAD", "--output", out.to_str().unwrap()]).unwrap();
        assert_eq!(code, 0);
        let text = read(&dir, "out.txt");
        assert!(text.contains("--- parcels:feature:2\n+++ parcels:feature:2\n"), "{text}");
        assert!(text.contains("- geom = POINT(2 2)"), "{text}");
        assert!(text.contains("+ geom = POINT(2 5)"), "{text}");
        assert!(text.contains("+++ parcels:feature:3\n"), "{text}");
        assert!(!text.contains("parcels:feature:1"), "{text}");
    }

    #[test]
    fn exit_code_reports_changes() {
        let dir = history();
        assert_eq!(run(&dir, &["diff", "HEAD^", "HEAD", "--exit-code", "-o", "json"]).unwrap(), 1);
        assert_eq!(run(&dir, &["diff", "HEAD...HEAD", "-o", "quiet"]).unwrap(), 0);
        assert_eq!(run(&dir, &["diff", "HEAD^...HEAD", "-o", "quiet"]).unwrap(), 1);
    }

    #[test]
    fn key_filters_follow_the_commits() {
        let dir = history();
        let out = dir.path().join("out.json");
        run(&dir, &["diff", "HEAD^...HEAD", "parcels:feature:3", "-o", "json", "--output", out.to_str().unwrap()])
            .unwrap();
        let doc: serde_json::Value = serde_json::from_str(&read(&dir, "out.json")).unwrap();
        let features = doc["lode.diff/v1"]["parcels"]["feature"].as_array().unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0]["+"]["fid"], json!(3));
        assert!(features[0].get("-").is_none());
    }

    #[test]
    fn feature_count_ignores_the_output_stream() {
        let dir = history();
        let out = dir.path().join("count.txt");
        run(&dir, &["diff", "HEAD^...HEAD", "--only-feature-count", "exact", "--output", out.to_str().unwrap()])
            .unwrap();
        assert_eq!(read(&dir, "count.txt"), "parcels:\n\t2 features changed\n");
    }

    #[test]
    fn working_copy_edits_are_diffed_against_head() {
        let dir = history();
        let edits = write_json(&dir, "edits.json", json!({"datasets": [{
            "path": "parcels",
            "items": [{"fid": 4, "geom": "POINT(4 4)"}],
            "delete": [1]
        }]}));
        run(&dir, &["import", &edits, "--working-copy"]).unwrap();
        let out = dir.path().join("wc.jsonl");
        run(&dir, &["diff", "-o", "json-lines", "--output", out.to_str().unwrap()]).unwrap();
        let lines: Vec<serde_json::Value> = read(&dir, "wc.jsonl")
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines[0]["type"], "version");
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1]["key"], json!(1));
        assert!(lines[1]["change"].get("+").is_none());
        assert_eq!(lines[2]["key"], json!(4));
    }

    #[test]
    fn show_root_commit_diffs_against_nothing() {
        let dir = history();
        let out = dir.path().join("show.txt");
        run(&dir, &["show", "HEAD^", "--output", out.to_str().unwrap()]).unwrap();
        let text = read(&dir, "show.txt");
        assert!(text.starts_with("commit "), "{text}");
        assert!(text.contains("    First\n"), "{text}");
        assert!(text.contains("+++ parcels:meta:schema.json"), "{text}");
        assert!(text.contains("+++ parcels:feature:1"), "{text}");
        assert!(text.contains("+++ parcels:feature:2"), "{text}");
    }

    #[test]
    fn reprojected_show() {
        let dir = history();
        let out = dir.path().join("show.json");
        run(&dir, &["show", "parcels:feature:3", "--crs", "EPSG:3857", "-o", "json", "--output", out.to_str().unwrap()])
            .unwrap();
        let doc: serde_json::Value = serde_json::from_str(&read(&dir, "show.json")).unwrap();
        assert_eq!(doc["lode.show/v1"]["message"], "Second");
        let geom = doc["lode.diff/v1"]["parcels"]["feature"][0]["+"]["geom"].as_str().unwrap();
        assert_ne!(geom, "POINT(3 3)");
        assert!(geom.starts_with("POINT"));
    }

    #[test]
    fn two_ranges_are_rejected() {
        let dir = history();
        let repo = Repository::open(dir.path()).unwrap();
        let args = vec!["HEAD^..HEAD".to_string(), "HEAD".to_string()];
        let err = split_commits_and_filters(&repo, &args).unwrap_err();
        assert_eq!(err.to_string(), "Can only show a single range - can't show HEAD^..HEAD, HEAD");
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn filters_after_commits() {
        let dir = history();
        let repo = Repository::open(dir.path()).unwrap();
        let args: Vec<String> = ["HEAD^", "HEAD", "parcels"].iter().map(|s| s.to_string()).collect();
        let (spec, filters) = split_commits_and_filters(&repo, &args).unwrap();
        assert_eq!(spec, "HEAD^...HEAD");
        assert_eq!(filters, vec!["parcels"]);

        let (spec, filters) = split_commits_and_filters(&repo, &[]).unwrap();
        assert_eq!(spec, "HEAD");
        assert!(filters.is_empty());
    }

    #[test]
    fn unknown_output_format_is_a_usage_error() {
        let dir = history();
        let err = run(&dir, &["diff", "-o", "html"]).unwrap_err();
        let sdk = err.downcast_ref::<SdkError>().unwrap();
        assert_eq!(sdk.exit_code(), 2);
    }

    #[test]
    fn data_ls_on_empty_and_populated_repos() {
        let dir = tempfile::tempdir().unwrap();
        run(&dir, &["init"]).unwrap();
        assert_eq!(run(&dir, &["data", "ls"]).unwrap(), 0);
        let dir = history();
        assert_eq!(run(&dir, &["data", "ls", "HEAD^"]).unwrap(), 0);
    }
}
