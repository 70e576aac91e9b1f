//! Command implementations for the Retina CLI.

use std::path::PathBuf;

use tracing::debug;

use crate::cli::args::*;
use crate::cli::output::*;
use crate::config::RetinaConfig;
use crate::engine::RetrievalEngine;
use crate::error::Result;

/// Store directory used when neither the flag nor the config names one.
pub const DEFAULT_STORE_DIR: &str = ".retina";

/// Execute a CLI command.
pub fn execute_command(args: RetinaArgs) -> Result<()> {
    let config = load_config(&args)?;

    match &args.command {
        Command::Ingest(ingest_args) => ingest(ingest_args, config, &args),
        Command::Search(search_args) => search(search_args, config, &args),
        Command::Feedback(feedback_args) => feedback(feedback_args, config, &args),
        Command::Annotate(annotate_args) => annotate(annotate_args, config, &args),
        Command::Stats(stats_args) => show_stats(stats_args, config, &args),
    }
}

/// Resolve the configuration from the config file and global flags.
pub fn load_config(args: &RetinaArgs) -> Result<RetinaConfig> {
    let mut config = match &args.config {
        Some(path) => RetinaConfig::from_file(path)?,
        None => RetinaConfig::default(),
    };

    if let Some(store) = &args.store {
        config.store.path = Some(store.clone());
    } else if config.store.path.is_none() {
        config.store.path = Some(PathBuf::from(DEFAULT_STORE_DIR));
    }

    debug!(store = ?config.store.path, "resolved configuration");
    Ok(config)
}

fn ingest(args: &IngestArgs, mut config: RetinaConfig, cli_args: &RetinaArgs) -> Result<()> {
    if let Some(upload_dir) = &args.upload_dir {
        config.aggregator.upload_dir = upload_dir.clone();
    }
    if args.threads.is_some() {
        config.aggregator.thread_pool_size = args.threads;
    }
    if args.enrich {
        config.aggregator.enrich_labels = true;
    }

    let engine = RetrievalEngine::open(config)?;
    let report = engine.ingest_batch(&args.filenames)?;
    output_result("Ingest finished", &report, cli_args)
}

fn search(args: &SearchArgs, config: RetinaConfig, cli_args: &RetinaArgs) -> Result<()> {
    let engine = RetrievalEngine::open(config)?;
    let limit = if args.all { None } else { Some(args.limit) };
    let results = engine.search(&args.query, limit)?;
    output_result("Search results", &results, cli_args)
}

fn feedback(args: &FeedbackArgs, config: RetinaConfig, cli_args: &RetinaArgs) -> Result<()> {
    let engine = RetrievalEngine::open(config)?;
    let outcome = engine.apply_feedback(&args.filename, &args.query, args.feedback)?;
    output_result("Feedback applied", &outcome, cli_args)
}

fn annotate(args: &AnnotateArgs, config: RetinaConfig, cli_args: &RetinaArgs) -> Result<()> {
    let engine = RetrievalEngine::open(config)?;
    let outcome = engine.annotate(&args.filename, &args.sentence)?;
    output_result("Sentence recorded", &outcome, cli_args)
}

fn show_stats(args: &StatsArgs, config: RetinaConfig, cli_args: &RetinaArgs) -> Result<()> {
    let engine = RetrievalEngine::open(config)?;
    if args.compact {
        engine.flush()?;
    }
    output_result("Feature store statistics", &engine.stats(), cli_args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::TempDir;

    #[test]
    fn test_load_config_store_precedence() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("retina.json");
        std::fs::write(&config_path, r#"{ "store": { "path": "/from/config" } }"#).unwrap();

        let args = RetinaArgs::try_parse_from(["retina", "stats"]).unwrap();
        let config = load_config(&args).unwrap();
        assert_eq!(config.store.path, Some(PathBuf::from(DEFAULT_STORE_DIR)));

        let args = RetinaArgs::try_parse_from([
            "retina",
            "--config",
            config_path.to_str().unwrap(),
            "stats",
        ])
        .unwrap();
        assert_eq!(
            load_config(&args).unwrap().store.path,
            Some(PathBuf::from("/from/config"))
        );

        let args = RetinaArgs::try_parse_from([
            "retina",
            "--config",
            config_path.to_str().unwrap(),
            "--store",
            "/from/flag",
            "stats",
        ])
        .unwrap();
        assert_eq!(
            load_config(&args).unwrap().store.path,
            Some(PathBuf::from("/from/flag"))
        );
    }

    #[test]
    fn test_commands_share_a_store() {
        let dir = TempDir::new().unwrap();
        let uploads = dir.path().join("uploads");
        std::fs::create_dir_all(&uploads).unwrap();
        std::fs::write(uploads.join("beach.png"), b"png").unwrap();
        let store = dir.path().join("store");

        let run = |extra: &[&str]| {
            let mut argv = vec!["retina", "-q", "-f", "json", "--store", store.to_str().unwrap()];
            argv.extend_from_slice(extra);
            execute_command(RetinaArgs::try_parse_from(argv).unwrap())
        };

        run(&["ingest", "beach.png", "--upload-dir", uploads.to_str().unwrap()]).unwrap();
        run(&["feedback", "beach.png", "png", "positive"]).unwrap();
        run(&["annotate", "beach.png", "sandy beach"]).unwrap();
        run(&["stats", "--compact"]).unwrap();

        let config = RetinaConfig {
            store: crate::config::StoreConfig {
                path: Some(store.clone()),
                ..Default::default()
            },
            ..Default::default()
        };
        let engine = RetrievalEngine::open(config).unwrap();
        assert_eq!(engine.stats().images, 1);
        assert_eq!(engine.stats().annotations, 1);
        assert_eq!(engine.search("png", None).unwrap().hits[0].filename, "beach.png");
    }
}
