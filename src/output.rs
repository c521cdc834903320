use core::fmt::Write as _;
use std::{
    fs::OpenOptions,
    io::{self, Write},
    path::{Path, PathBuf},
};

use compact_str::CompactString;
use hashbrown::HashMap;
use parking_lot::Mutex;

use crate::{
    checkpoint::{SEPARATOR, output_path},
    query::QueryResult,
    report::NA,
};

fn push_value(line: &mut String, value: Option<f64>) {
    line.push(SEPARATOR);
    match value {
        Some(v) => {
            let _ = write!(line, "{v}");
        }
        None => line.push_str(NA),
    }
}

/// `Gene,PValue,HR,Worse prognosis` order, newline-terminated.
pub fn format_row(result: &QueryResult) -> String {
    let stats = &result.statistics;
    let mut line = String::with_capacity(48);
    line.push_str(&result.gene);
    push_value(&mut line, stats.p_value);
    push_value(&mut line, stats.hazard_ratio);
    line.push(SEPARATOR);
    let _ = write!(line, "{}", stats.prognosis);
    line.push('\n');
    line
}

/// Appends result rows to per-dataset files. Rows for one dataset are
/// written one at a time so lines never interleave.
pub struct ResultWriter {
    files: HashMap<CompactString, Mutex<PathBuf>>,
}

impl ResultWriter {
    pub fn new(output_dir: &Path, datasets: &[CompactString]) -> Self {
        let files = datasets
            .iter()
            .map(|dataset| (dataset.clone(), Mutex::new(output_path(output_dir, dataset))))
            .collect();
        Self { files }
    }

    pub fn append(&self, dataset: &str, result: &QueryResult) -> io::Result<()> {
        let Some(file) = self.files.get(dataset) else {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no output file registered for {dataset}"),
            ));
        };
        let line = format_row(result);

        let path = file.lock();
        let mut fp = OpenOptions::new().create(true).append(true).open(&*path)?;
        fp.write_all(line.as_bytes())?;
        fp.flush()
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::{checkpoint::Checkpoint, report::Statistics};

    fn result(gene: &str, statistics: Statistics) -> QueryResult {
        QueryResult {
            gene: gene.into(),
            statistics,
            not_found: false,
        }
    }

    #[test]
    fn rows() {
        assert_eq!(format_row(&result("TP53", Statistics::new(0.001, 2.3))), "TP53,0.001,2.3,High\n");
        assert_eq!(format_row(&result("EGFR", Statistics::new(0.03, 0.6))), "EGFR,0.03,0.6,Low\n");
        assert_eq!(format_row(&result("MYC", Statistics::new(0.2, 2.0))), "MYC,0.2,2,NA\n");
        assert_eq!(format_row(&result("KRAS", Statistics::NOT_AVAILABLE)), "KRAS,NA,NA,NA\n");
    }

    #[test]
    fn written_row_is_read_back_as_processed() {
        let dir = tempfile::tempdir().unwrap();
        let datasets = vec![CompactString::new("BRCA")];
        Checkpoint::open(dir.path(), &datasets).unwrap();

        let writer = ResultWriter::new(dir.path(), &datasets);
        writer.append("BRCA", &result("TP53", Statistics::new(0.001, 2.3))).unwrap();

        let text = fs::read_to_string(output_path(dir.path(), "BRCA")).unwrap();
        assert_eq!(text, "Gene,PValue,HR,Worse prognosis\nTP53,0.001,2.3,High\n");

        let checkpoint = Checkpoint::open(dir.path(), &datasets).unwrap();
        assert!(checkpoint.is_processed("BRCA", "TP53"));
    }

    #[test]
    fn unknown_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ResultWriter::new(dir.path(), &[]);
        let err = writer.append("ACC", &result("TP53", Statistics::NOT_AVAILABLE)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn concurrent_appends_stay_whole() {
        let dir = tempfile::tempdir().unwrap();
        let datasets = vec![CompactString::new("LUAD")];
        Checkpoint::open(dir.path(), &datasets).unwrap();
        let writer = ResultWriter::new(dir.path(), &datasets);

        std::thread::scope(|s| {
            for t in 0..8 {
                let writer = &writer;
                s.spawn(move || {
                    for i in 0..50 {
                        let gene = format!("G{t}_{i}");
                        writer.append("LUAD", &result(&gene, Statistics::new(0.01, 1.5))).unwrap();
                    }
                });
            }
        });

        let text = fs::read_to_string(output_path(dir.path(), "LUAD")).unwrap();
        let rows: Vec<_> = text.lines().skip(1).collect();
        assert_eq!(rows.len(), 400);
        assert!(rows.iter().all(|row| row.split(',').count() == 4 && row.ends_with(",0.01,1.5,High")));
    }
}
