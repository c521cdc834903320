use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use compact_str::CompactString;
use sscr::{
    checkpoint::Checkpoint,
    config::{Config, Cutoffs},
    dispatch,
    scrape::{self, DEFAULT_BASE_URL, SURVIVAL_PAGE, Session, SessionSource, SessionStore},
    util::{default_workers, read_lines, sample},
};

#[derive(clap::Parser)]
#[command(version, about = "Scrapes survival statistics for every gene/cohort pair, resuming from earlier output")]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct Lists {
    /// One gene symbol per line
    #[arg(long, env = "SURVIVAL_GENES", default_value = "genes.txt")]
    genes: PathBuf,
    /// One dataset code per line
    #[arg(long, env = "SURVIVAL_DATASETS", default_value = "datasets.txt")]
    datasets: PathBuf,
    #[arg(short, long, env = "SURVIVAL_OUTPUT_DIR", default_value = "output")]
    output_dir: PathBuf,
}

#[derive(clap::Args)]
struct Remote {
    /// JSON object of headers sent with every request
    #[arg(long, env = "SURVIVAL_HEADERS", default_value = "request_headers.json")]
    headers: PathBuf,
    #[arg(long, env = "SURVIVAL_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,
    /// Per-request timeout in seconds
    #[arg(long, env = "SURVIVAL_TIMEOUT", default_value_t = 60)]
    timeout: u64,
    /// Use this cookie string instead of launching a browser
    #[arg(long, env = "SURVIVAL_COOKIE")]
    cookie: Option<String>,
    /// Show the browser window while acquiring the session
    #[arg(long)]
    headful: bool,
}

impl Remote {
    fn source(&self) -> SessionSource {
        match &self.cookie {
            Some(cookie) => SessionSource::Static(Session {
                cookie: cookie.clone(),
                user_agent: None,
            }),
            None => SessionSource::Browser {
                url: format!("{}{SURVIVAL_PAGE}", self.base_url.trim_end_matches('/')),
                headless: !self.headful,
            },
        }
    }
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Query every remaining (dataset, gene) pair
    Run {
        #[command(flatten)]
        lists: Lists,
        #[command(flatten)]
        remote: Remote,
        #[arg(short = 'j', long, env = "SURVIVAL_WORKERS", default_value_t = default_workers())]
        workers: usize,
        /// Process at most this many datasets and genes, picked at random
        #[arg(long, env = "SURVIVAL_SAMPLE")]
        sample: Option<usize>,
        #[arg(long, env = "SURVIVAL_SEED")]
        seed: Option<u64>,
        #[arg(long, default_value_t = Cutoffs::default().high)]
        cutoff_high: u8,
        #[arg(long, default_value_t = Cutoffs::default().low)]
        cutoff_low: u8,
        #[arg(long)]
        progress: bool,
    },
    /// Show processed and remaining genes per dataset
    Status {
        #[command(flatten)]
        lists: Lists,
    },
    /// Acquire session material and print it as JSON
    Session {
        #[command(flatten)]
        remote: Remote,
    },
}

fn load(lists: &Lists) -> anyhow::Result<(Vec<CompactString>, Vec<CompactString>)> {
    let genes = read_lines(&lists.genes).with_context(|| format!("cannot read {}", lists.genes.display()))?;
    let datasets =
        read_lines(&lists.datasets).with_context(|| format!("cannot read {}", lists.datasets.display()))?;
    tracing::info!(target: "main", "{} genes, {} datasets", genes.len(), datasets.len());
    Ok((datasets, genes))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use clap::Parser;

    pretty_env_logger::init_timed();

    let args = Args::parse();

    match args.command {
        Commands::Run {
            lists,
            remote,
            workers,
            sample: sample_size,
            seed,
            cutoff_high,
            cutoff_low,
            progress,
        } => {
            let config = Config {
                output_dir: lists.output_dir.clone(),
                worker_count: workers.max(1),
                sample_size,
                seed,
                base_url: remote.base_url.clone(),
                timeout: core::time::Duration::from_secs(remote.timeout),
                cutoffs: Cutoffs {
                    high: cutoff_high,
                    low: cutoff_low,
                },
                progress,
            };

            let (mut datasets, mut genes) = load(&lists)?;
            if let Some(cap) = config.sample_size {
                use rand::SeedableRng;
                let mut rng = match config.seed {
                    Some(seed) => rand::rngs::StdRng::seed_from_u64(seed),
                    None => rand::rngs::StdRng::from_os_rng(),
                };
                datasets = sample(&datasets, cap, &mut rng);
                genes = sample(&genes, cap, &mut rng);
                tracing::info!(target: "main", "sampled {} datasets × {} genes", datasets.len(), genes.len());
            }

            let headers = scrape::load_headers(&remote.headers)?;
            let sessions = Arc::new(SessionStore::connect(remote.source(), headers, config.timeout).await?);

            tokio::select! {
                summary = dispatch::run(&config, &datasets, &genes, sessions) => {
                    summary?;
                }
                signal = tokio::signal::ctrl_c() => {
                    signal?;
                    tracing::warn!(target: "main", "\x1b[31minterrupted\x1b[0m, in-flight items are dropped");
                    std::process::exit(130);
                }
            }
        }
        Commands::Status { lists } => {
            let (datasets, genes) = load(&lists)?;
            let checkpoint = Checkpoint::open(&lists.output_dir, &datasets)?;

            let (mut processed, mut remaining) = (0, 0);
            for status in checkpoint.status(&datasets, &genes) {
                println!("{:<12} {:>8} done {:>8} left", status.dataset, status.processed, status.remaining);
                processed += status.processed;
                remaining += status.remaining;
            }
            println!("{:<12} {processed:>8} done {remaining:>8} left", "total");
        }
        Commands::Session { remote } => {
            let session = remote.source().acquire().await?;
            println!("{}", serde_json::to_string_pretty(&session)?);
        }
    }

    Ok(())
}
