use std::sync::Arc;

use compact_str::{CompactString, format_compact};
use futures_util::{StreamExt, stream};
use indicatif::{ProgressBar, ProgressStyle};

use crate::{
    checkpoint::Checkpoint,
    config::Config,
    output::ResultWriter,
    query::QueryClient,
    scrape::SessionStore,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkItem {
    pub dataset: CompactString,
    pub gene: CompactString,
}

/// Every (dataset, gene) pair without a recorded row: datasets in list
/// order, and within each dataset its remaining genes in list order.
pub fn work_items<'a>(
    checkpoint: &'a Checkpoint,
    datasets: &'a [CompactString],
    genes: &'a [CompactString],
) -> impl Iterator<Item = WorkItem> + 'a {
    datasets.iter().flat_map(move |dataset| {
        checkpoint.remaining(dataset, genes).map(move |gene| WorkItem {
            dataset: dataset.clone(),
            gene: gene.clone(),
        })
    })
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Written,
    NotFound,
    Failed,
}

impl Outcome {
    pub const fn is_success(self) -> bool {
        !matches!(self, Self::Failed)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub written: usize,
    pub not_found: usize,
    pub failed: usize,
}

impl Summary {
    pub const fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Written => self.written += 1,
            Outcome::NotFound => self.not_found += 1,
            Outcome::Failed => self.failed += 1,
        }
    }

    pub const fn total(&self) -> usize {
        self.written + self.not_found + self.failed
    }
}

/// Queries one work item and appends its row. Every error stops here.
pub async fn process(client: &QueryClient, writer: &ResultWriter, item: &WorkItem) -> Outcome {
    let target = format_compact!("worker-{}", item.dataset);
    log::debug!(target: &*target, "\x1b[33mquerying\x1b[0m {} ...", item.gene);

    let result = match client.query(&item.dataset, &item.gene).await {
        Ok(result) => result,
        Err(e) => {
            let e = anyhow::Error::from(e);
            log::error!(target: &*target, "\x1b[31mfailed\x1b[0m ({}, {}): {e:?}", item.dataset, item.gene);
            return Outcome::Failed;
        }
    };

    if let Err(e) = writer.append(&item.dataset, &result) {
        log::error!(target: &*target, "\x1b[31mcannot write\x1b[0m ({}, {}): {e:?}", item.dataset, item.gene);
        return Outcome::Failed;
    }

    if result.not_found {
        log::info!(target: &*target, "\x1b[35mno data\x1b[0m for {}", item.gene);
        Outcome::NotFound
    } else {
        log::info!(target: &*target, "\x1b[36mfinished\x1b[0m {} ({})", item.gene, result.statistics.prognosis);
        Outcome::Written
    }
}

pub fn progress_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta}) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb
}

/// Runs `items` through at most `workers` concurrent queries.
pub async fn dispatch<I>(
    client: &QueryClient,
    writer: &ResultWriter,
    items: I,
    workers: usize,
    progress: Option<&ProgressBar>,
) -> Summary
where
    I: IntoIterator<Item = WorkItem>,
{
    let mut summary = Summary::default();
    let mut outcomes = stream::iter(items)
        .map(move |item| async move {
            let outcome = process(client, writer, &item).await;
            (item, outcome)
        })
        .buffer_unordered(workers.max(1));

    while let Some((item, outcome)) = outcomes.next().await {
        summary.record(outcome);
        if let Some(pb) = progress {
            pb.inc(1);
            let mark = if outcome.is_success() { "" } else { " \x1b[31mfailed\x1b[0m" };
            pb.set_message(format!("{} {}{mark}", item.dataset, item.gene));
        }
    }
    summary
}

/// Resumes the scrape of `datasets` × `genes` into `config.output_dir`.
pub async fn run(
    config: &Config,
    datasets: &[CompactString],
    genes: &[CompactString],
    sessions: Arc<SessionStore>,
) -> anyhow::Result<Summary> {
    let checkpoint = Checkpoint::open(&config.output_dir, datasets)?;
    let writer = ResultWriter::new(checkpoint.output_dir(), datasets);
    let client = QueryClient::new(&config.base_url, config.cutoffs, sessions);

    let total = work_items(&checkpoint, datasets, genes).count();
    tracing::info!(
        target: "main",
        "{total} of {} work items remaining, {} workers",
        datasets.len() * genes.len(),
        config.worker_count
    );

    let progress = config.progress.then(|| progress_bar(total as u64));
    let summary = dispatch(
        &client,
        &writer,
        work_items(&checkpoint, datasets, genes),
        config.worker_count,
        progress.as_ref(),
    )
    .await;
    if let Some(pb) = progress {
        pb.finish_and_clear();
    }

    tracing::info!(
        target: "main",
        "\x1b[1;36mdone\x1b[0m: {} items, {} written, {} without data, {} failed",
        summary.total(),
        summary.written,
        summary.not_found,
        summary.failed
    );
    Ok(summary)
}
