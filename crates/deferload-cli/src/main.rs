//! `deferload` command-line interface.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use deferload_runtime::{
    create_loader_from_producer, FallbackStrategy, LoadError, LoaderOptions, RetryPolicy,
    RuntimeConfig,
};

mod file_producer;

use file_producer::FileProducer;

#[derive(Parser, Debug)]
#[command(name = "deferload", version, about = "Load resources with bounded retry and backoff")]
struct Cli {
    /// Log every attempt (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load a file through the retrying loader and print it
    Load {
        /// File to load
        path: PathBuf,

        #[command(flatten)]
        retry: RetryArgs,

        /// Print this instead of failing when retries run out
        #[arg(long)]
        fallback: Option<String>,

        /// Print a JSON summary instead of the file contents
        #[arg(long)]
        json: bool,
    },

    /// Print the backoff schedule for a policy
    Schedule {
        #[command(flatten)]
        retry: RetryArgs,

        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
struct RetryArgs {
    /// YAML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Retries after the first failure
    #[arg(long)]
    max_retries: Option<u32>,

    /// Base backoff delay, e.g. "1s" or "250ms"
    #[arg(long, value_parser = humantime::parse_duration)]
    retry_delay: Option<Duration>,
}

impl RetryArgs {
    /// Config file, then environment, then flags.
    fn policy(&self) -> Result<RetryPolicy> {
        self.policy_with(|key| std::env::var(key).ok())
    }

    /// Like [`RetryArgs::policy`], with overrides taken from `lookup`.
    fn policy_with(&self, lookup: impl Fn(&str) -> Option<String>) -> Result<RetryPolicy> {
        let config = match &self.config {
            Some(path) => RuntimeConfig::from_yaml_file(path)
                .with_context(|| format!("loading config from {}", path.display()))?,
            None => RuntimeConfig::default(),
        }
        .with_overrides(lookup)
        .context("applying environment overrides")?;

        let mut retry = config.retry;
        if let Some(n) = self.max_retries {
            retry.max_retries = n;
        }
        if let Some(delay) = self.retry_delay {
            retry.retry_delay = delay;
        }
        Ok(retry.policy())
    }
}

#[derive(Serialize)]
struct LoadSummary {
    path: String,
    outcome: &'static str,
    attempts: u32,
    bytes: Option<usize>,
    error: Option<String>,
}

#[derive(Serialize)]
struct ScheduleEntry {
    retry: u32,
    delay_ms: u128,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Load {
            path,
            retry,
            fallback,
            json,
        } => load(path, &retry, fallback, json).await,
        Command::Schedule { retry, json } => schedule(&retry, json),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "deferload=debug,info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn load(
    path: PathBuf,
    retry: &RetryArgs,
    fallback: Option<String>,
    json: bool,
) -> Result<()> {
    let policy = retry.policy()?;
    tracing::debug!(
        path = %path.display(),
        max_retries = policy.max_retries(),
        retry_delay = ?policy.retry_delay(),
        "Loading resource"
    );
    let producer = Arc::new(FileProducer::new(&path));
    let handle = create_loader_from_producer(producer, LoaderOptions::new().policy(policy));

    let strategy = match fallback {
        Some(text) => FallbackStrategy::Value(text),
        None => FallbackStrategy::Fail,
    };

    let outcome = handle.force().await;
    let substituted = outcome.is_err() && !matches!(strategy, FallbackStrategy::Fail);
    let error = outcome.as_ref().err().map(LoadError::to_string);
    let resolved = strategy.resolve(outcome);

    if json {
        let summary = LoadSummary {
            path: path.display().to_string(),
            outcome: match (&resolved, substituted) {
                (Ok(_), false) => "succeeded",
                (Ok(_), true) => "fallback",
                (Err(_), _) => "failed",
            },
            attempts: handle.attempts_made(),
            bytes: resolved.as_ref().ok().map(String::len),
            error,
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return resolved.map(|_| ()).map_err(Into::into);
    }

    let contents = resolved?;
    print!("{contents}");
    Ok(())
}

fn schedule(retry: &RetryArgs, json: bool) -> Result<()> {
    let policy = retry.policy()?;
    let entries: Vec<ScheduleEntry> = policy
        .schedule()
        .zip(1..)
        .map(|(delay, retry)| ScheduleEntry {
            retry,
            delay_ms: delay.as_millis(),
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    println!(
        "{} attempts, base delay {}",
        policy.total_attempts(),
        humantime::format_duration(policy.retry_delay())
    );
    for entry in &entries {
        println!("  retry {:>2}: wait {} ms", entry.retry, entry.delay_ms);
    }
    println!(
        "worst case total backoff: {}",
        humantime::format_duration(policy.worst_case_delay())
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_load() {
        let cli = Cli::try_parse_from([
            "deferload",
            "load",
            "chunk.js",
            "--max-retries",
            "5",
            "--retry-delay",
            "250ms",
            "--json",
        ])
        .unwrap();

        match cli.command {
            Command::Load {
                path,
                retry,
                json,
                fallback,
            } => {
                assert_eq!(path, PathBuf::from("chunk.js"));
                assert!(json);
                assert!(fallback.is_none());
                assert_eq!(retry.max_retries, Some(5));
                assert_eq!(retry.retry_delay, Some(Duration::from_millis(250)));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_flags_override_defaults() {
        let args = RetryArgs {
            config: None,
            max_retries: Some(1),
            retry_delay: Some(Duration::from_millis(10)),
        };
        let policy = args.policy_with(|_| None).unwrap();
        assert_eq!(policy.max_retries(), 1);
        assert_eq!(policy.retry_delay(), Duration::from_millis(10));
    }

    #[test]
    fn test_flags_beat_env_overrides() {
        let args = RetryArgs {
            config: None,
            max_retries: Some(2),
            retry_delay: None,
        };
        let policy = args
            .policy_with(|key| match key {
                "DEFERLOAD_MAX_RETRIES" => Some("9".to_string()),
                "DEFERLOAD_RETRY_DELAY" => Some("300ms".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(policy.max_retries(), 2);
        assert_eq!(policy.retry_delay(), Duration::from_millis(300));
    }

    #[test]
    fn test_rejects_bad_delay() {
        let result = Cli::try_parse_from(["deferload", "schedule", "--retry-delay", "soon"]);
        assert!(result.is_err());
    }
}
