use std::{fs, io, path::Path};

use compact_str::CompactString;
use rand::Rng;

/// Splits newline-delimited text into trimmed, non-blank entries, keeping
/// their order and any duplicates.
pub fn parse_lines(text: &str) -> Vec<CompactString> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(CompactString::new)
        .collect()
}

pub fn read_lines(path: &Path) -> io::Result<Vec<CompactString>> {
    fs::read_to_string(path).map(|text| parse_lines(&text))
}

/// Picks at most `cap` entries at random. The survivors keep their original
/// relative order.
pub fn sample<T: Clone, R: Rng + ?Sized>(items: &[T], cap: usize, rng: &mut R) -> Vec<T> {
    if cap >= items.len() {
        return items.to_vec();
    }
    let mut picked = rand::seq::index::sample(rng, items.len(), cap).into_vec();
    picked.sort_unstable();
    picked.into_iter().map(|i| items[i].clone()).collect()
}

pub fn default_workers() -> usize {
    std::thread::available_parallelism().map_or(4, |n| n.get()) * 4
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    #[test]
    fn blank_lines_are_dropped() {
        let lines = parse_lines("TP53\n\n  BRCA1 \r\n\n\nEGFR\n   \nTP53\n");
        assert_eq!(lines, ["TP53", "BRCA1", "EGFR", "TP53"]);
    }

    #[test]
    fn empty_input() {
        assert!(parse_lines("").is_empty());
        assert!(parse_lines("\n \n\t\n").is_empty());
    }

    #[test]
    fn read_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("datasets.txt");
        fs::write(&path, "ACC\nBRCA\n\nLUAD\n").unwrap();
        assert_eq!(read_lines(&path).unwrap(), ["ACC", "BRCA", "LUAD"]);
        assert!(read_lines(&dir.path().join("missing.txt")).is_err());
    }

    #[test]
    fn sample_keeps_order() {
        let items: Vec<u32> = (0..50).collect();
        let mut rng = StdRng::seed_from_u64(7);
        let picked = sample(&items, 10, &mut rng);
        assert_eq!(picked.len(), 10);
        assert!(picked.windows(2).all(|w| w[0] < w[1]));

        let all = sample(&items, 100, &mut rng);
        assert_eq!(all, items);
    }
}
