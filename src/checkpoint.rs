//! Per-dataset output files double as the resume state: a gene that already
//! has a row in `<dataset>.csv` is never queried again for that dataset.

use std::{
    fs::{self, OpenOptions},
    io,
    path::{Path, PathBuf},
};

use anyhow::Context;
use compact_str::CompactString;
use hashbrown::{HashMap, HashSet};

pub const HEADER: [&str; 4] = ["Gene", "PValue", "HR", "Worse prognosis"];
pub const SEPARATOR: char = ',';

pub fn header_line() -> String {
    let mut line = HEADER.join(",");
    line.push('\n');
    line
}

pub fn output_path(output_dir: &Path, dataset: &str) -> PathBuf {
    output_dir.join(format!("{dataset}.csv"))
}

#[derive(Debug, Default)]
pub struct Scan {
    pub genes: HashSet<CompactString>,
    /// 1-based line numbers of rows that could not be read.
    pub skipped: Vec<usize>,
}

/// Collects the gene column of an output file. The first line is the header;
/// blank lines are ignored and short rows are skipped.
pub fn scan(text: &str) -> Scan {
    let mut result = Scan::default();
    for (idx, line) in text.lines().enumerate().skip(1) {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut fields = line.split(SEPARATOR).map(str::trim);
        let gene = fields.next().unwrap_or_default().trim_matches('"').trim();
        if gene.is_empty() || fields.count() + 1 < HEADER.len() {
            result.skipped.push(idx + 1);
            continue;
        }
        result.genes.insert(CompactString::new(gene));
    }
    result
}

/// Makes sure `path` exists with a header and ends on a line boundary, then
/// returns the genes it already records. A last line without its newline
/// was cut short by an interrupted write: it is dropped from the file and
/// never counts, whatever it holds.
fn prepare(path: &Path) -> io::Result<Scan> {
    let content = match fs::read(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
        Err(e) => return Err(e),
    };

    let complete = content.iter().rposition(|&b| b == b'\n').map_or(0, |end| end + 1);
    let partial = complete < content.len();
    if partial {
        OpenOptions::new().write(true).open(path)?.set_len(complete as u64)?;
    }

    let text = String::from_utf8_lossy(&content[..complete]);
    if text.trim().is_empty() {
        fs::write(path, header_line())?;
        return Ok(Scan::default());
    }

    let mut result = scan(&text);
    if partial {
        result.skipped.push(text.lines().count() + 1);
    }
    Ok(result)
}

#[derive(Debug)]
pub struct Checkpoint {
    output_dir: PathBuf,
    processed: HashMap<CompactString, HashSet<CompactString>>,
}

#[derive(Debug, PartialEq, Eq)]
pub struct DatasetStatus {
    pub dataset: CompactString,
    pub processed: usize,
    pub remaining: usize,
}

impl Checkpoint {
    pub fn open(output_dir: &Path, datasets: &[CompactString]) -> anyhow::Result<Self> {
        fs::create_dir_all(output_dir)
            .with_context(|| format!("cannot create output directory {}", output_dir.display()))?;

        let mut processed = HashMap::with_capacity(datasets.len());
        for dataset in datasets {
            let path = output_path(output_dir, dataset);
            let scan = prepare(&path).with_context(|| format!("cannot prepare {}", path.display()))?;
            for line in &scan.skipped {
                tracing::warn!(target: "checkpoint", "{}:{line}: malformed row skipped", path.display());
            }
            if !scan.genes.is_empty() {
                tracing::info!(target: "checkpoint", "{dataset}: {} genes already recorded", scan.genes.len());
            }
            processed.insert(dataset.clone(), scan.genes);
        }

        Ok(Self {
            output_dir: output_dir.to_owned(),
            processed,
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn is_processed(&self, dataset: &str, gene: &str) -> bool {
        self.processed.get(dataset).is_some_and(|done| done.contains(gene))
    }

    /// Genes of `genes` not yet recorded for `dataset`, in list order.
    pub fn remaining<'a>(
        &'a self,
        dataset: &'a str,
        genes: &'a [CompactString],
    ) -> impl Iterator<Item = &'a CompactString> + 'a {
        genes.iter().filter(move |gene| !self.is_processed(dataset, gene))
    }

    pub fn status(&self, datasets: &[CompactString], genes: &[CompactString]) -> Vec<DatasetStatus> {
        datasets
            .iter()
            .map(|dataset| {
                let remaining = self.remaining(dataset, genes).count();
                DatasetStatus {
                    dataset: dataset.clone(),
                    processed: genes.len() - remaining,
                    remaining,
                }
            })
            .collect()
    }
}
