use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use futures::future::join_all;
use tracing::{info, warn};

use release_probe::config::{ProbeConfig, QUERY_STAGGER_DELAY_MS, log_path};
use release_probe::logging::{self, LogFormat};
use release_probe::version::cache::EmptyListEtag;
use release_probe::version::lookup::{GitHubLookup, LookupContext};
use release_probe::version::status::{LookupStatus, MemoryStatus};

#[derive(Parser)]
#[command(name = "release-probe")]
#[command(version, about = "Find the latest release of GitHub repositories")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Default log level (RUST_LOG takes precedence)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Write logs to a file (defaults to the data directory)
    #[arg(long, global = true, num_args = 0..=1)]
    log_file: Option<Option<PathBuf>>,
}

#[derive(Subcommand)]
enum Command {
    /// Query the latest version of every configured service
    Query {
        #[arg(long)]
        config: PathBuf,

        /// Only query these services
        #[arg(long = "service")]
        services: Vec<String>,

        /// Don't learn the empty-list ETag before querying
        #[arg(long)]
        skip_probe: bool,
    },
    /// Check a configuration file without querying anything
    Validate {
        #[arg(long)]
        config: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_file = cli.log_file.map(|path| path.unwrap_or_else(log_path));
    let _guard = logging::init(&cli.log_level, cli.log_format, log_file.as_deref())?;

    match cli.command {
        Command::Validate { config } => {
            load_config(&config)?;
            println!("{}: OK", config.display());
            Ok(())
        }
        Command::Query {
            config,
            services,
            skip_probe,
        } => tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?
            .block_on(run_query(config, services, skip_probe)),
    }
}

fn load_config(path: &Path) -> anyhow::Result<ProbeConfig> {
    let config = ProbeConfig::from_file(path)?;
    config
        .validate()
        .with_context(|| format!("{} is invalid", path.display()))?;
    Ok(config)
}

async fn run_query(path: PathBuf, only: Vec<String>, skip_probe: bool) -> anyhow::Result<()> {
    let config = load_config(&path)?;

    for id in &only {
        if !config.services.contains_key(id) {
            bail!("unknown service {:?}", id);
        }
    }

    let empty_list_etag = Arc::new(EmptyListEtag::default());
    let context = Arc::new(LookupContext::from_config(&config, Arc::clone(&empty_list_etag)));
    if !skip_probe {
        let access_token = context.default_access_token();
        if let Err(e) = empty_list_etag
            .probe(&context.github, access_token.as_deref())
            .await
        {
            warn!("Using the built-in empty list ETag: {}", e);
        }
    }

    let lookups: Vec<(GitHubLookup, Arc<MemoryStatus>)> = config
        .services
        .iter()
        .filter(|(id, _)| only.is_empty() || only.contains(*id))
        .map(|(id, service)| {
            let status = Arc::new(MemoryStatus::default());
            let lookup = GitHubLookup::new(
                id,
                service.clone(),
                Arc::clone(&context),
                Arc::clone(&status) as Arc<dyn LookupStatus>,
            );
            (lookup, status)
        })
        .collect();
    info!("Querying {} service(s)", lookups.len());

    let results = join_all(lookups.iter().enumerate().map(|(i, (lookup, _))| async move {
        tokio::time::sleep(Duration::from_millis(QUERY_STAGGER_DELAY_MS * i as u64)).await;
        lookup.query().await
    }))
    .await;

    let mut failed = 0;
    for ((lookup, status), result) in lookups.iter().zip(results) {
        match result {
            Ok(_) if status.latest_version().is_empty() => {
                println!("{}: no version found", lookup.id());
            }
            Ok(_) => match status.latest_release_date() {
                Some(date) => println!(
                    "{}: {} (released {})",
                    lookup.id(),
                    status.latest_version(),
                    date
                ),
                None => println!("{}: {}", lookup.id(), status.latest_version()),
            },
            Err(e) => {
                failed += 1;
                println!("{}: error: {}", lookup.id(), e);
            }
        }
    }

    if failed > 0 {
        bail!("{} of {} queries failed", failed, lookups.len());
    }
    Ok(())
}
