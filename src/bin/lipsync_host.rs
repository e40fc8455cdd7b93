//! Headless lip-sync host.
//!
//! Reads a message batch as JSON from a file or stdin, runs it through the
//! pipeline, and writes `{"messages": [...]}` to stdout.
//!
//! All tracing output goes to stderr so that stdout carries only the result.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use lipsync::{ElevenLabsTts, LipSyncConfig, LipSyncPipeline, MessageBatch};
use tokio::io::AsyncReadExt;

const USAGE: &str = "usage: lipsync-host [--config <path>] [--skip-preflight] [<input.json>]";

#[derive(Debug, Default, PartialEq)]
struct Args {
    config: Option<PathBuf>,
    skip_preflight: bool,
    input: Option<PathBuf>,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> anyhow::Result<Args> {
    let mut parsed = Args::default();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let path = args
                    .next()
                    .with_context(|| format!("--config needs a path\n{USAGE}"))?;
                parsed.config = Some(PathBuf::from(path));
            }
            "--skip-preflight" => parsed.skip_preflight = true,
            "-h" | "--help" => anyhow::bail!(USAGE),
            flag if flag.starts_with('-') && flag != "-" => {
                anyhow::bail!("unknown option {flag}\n{USAGE}")
            }
            path => {
                if parsed.input.is_some() {
                    anyhow::bail!("more than one input file\n{USAGE}");
                }
                if path != "-" {
                    parsed.input = Some(PathBuf::from(path));
                }
            }
        }
    }
    Ok(parsed)
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<LipSyncConfig> {
    let mut config = match path {
        Some(path) => LipSyncConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => {
            let default_path = LipSyncConfig::default_config_path();
            if default_path.is_file() {
                LipSyncConfig::from_file(&default_path)
                    .with_context(|| format!("failed to load config {}", default_path.display()))?
            } else {
                LipSyncConfig::default()
            }
        }
    };
    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}

async fn read_input(path: Option<&PathBuf>) -> anyhow::Result<String> {
    match path {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display())),
        None => {
            let mut buf = String::new();
            tokio::io::stdin()
                .read_to_string(&mut buf)
                .await
                .context("failed to read stdin")?;
            Ok(buf)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("lipsync=info")),
        )
        .init();

    let args = parse_args(std::env::args().skip(1))?;
    let config = load_config(args.config.as_ref())?;

    let tts = ElevenLabsTts::from_config(config.tts.clone())?;
    let pipeline = LipSyncPipeline::with_system_tools(&config, Arc::new(tts));

    if !args.skip_preflight {
        pipeline.preflight().await?;
    }

    let raw = read_input(args.input.as_ref()).await?;
    let value: serde_json::Value =
        serde_json::from_str(&raw).context("input is not valid JSON")?;
    let batch = MessageBatch::from_json(value);

    let cancel = pipeline.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received; cancelling batch");
            cancel.cancel();
        }
    });

    let outcome = pipeline.process_with_report(batch).await;
    if !outcome.is_complete() {
        tracing::warn!(
            failed = outcome.failures.len(),
            total = outcome.messages.len(),
            "some messages were not enriched"
        );
    }

    let body = serde_json::json!({ "messages": outcome.messages });
    println!("{}", serde_json::to_string(&body)?);
    Ok(())
}
