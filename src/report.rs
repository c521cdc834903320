//! Turns the text of a generated survival report into statistics.
//!
//! The report prints its log-rank result as a short block such as
//!
//! ```text
//! Logrank p=0.0031
//! HR(high)=1.8
//! p(HR)=0.0035
//! ```
//!
//! where the numbers may use a typographic minus sign and a
//! `1.2e−05` or `1.2×10^-5` spelling of scientific notation.

use core::fmt;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};

/// The line carrying the p-value starts at this token.
pub const MARKER: &str = "Logrank";

pub const SIGNIFICANCE: f64 = 0.05;

pub const NA: &str = "NA";

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("marker {:?} not found in document text", MARKER)]
    MissingMarker,
    #[error("expected a {0} line after the marker")]
    MissingLine(&'static str),
    #[error("no value in {0:?}")]
    MissingValue(String),
    #[error("{0:?} is not a number")]
    InvalidNumber(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Prognosis {
    High,
    Low,
    NA,
}

impl fmt::Display for Prognosis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::High => "High",
            Self::Low => "Low",
            Self::NA => NA,
        })
    }
}

pub fn classify(p_value: f64, hazard_ratio: f64) -> Prognosis {
    if p_value < SIGNIFICANCE {
        if hazard_ratio >= 1.0 { Prognosis::High } else { Prognosis::Low }
    } else {
        Prognosis::NA
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Statistics {
    pub p_value: Option<f64>,
    pub hazard_ratio: Option<f64>,
    pub prognosis: Prognosis,
}

impl Statistics {
    pub const NOT_AVAILABLE: Self = Self {
        p_value: None,
        hazard_ratio: None,
        prognosis: Prognosis::NA,
    };

    pub fn new(p_value: f64, hazard_ratio: f64) -> Self {
        Self {
            p_value: Some(p_value),
            hazard_ratio: Some(hazard_ratio),
            prognosis: classify(p_value, hazard_ratio),
        }
    }
}

static TIMES_TEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([+-]?(?:\d+\.?\d*|\.\d+))[x×*·]10(?:\^|e|E)?([+-]?\d+)$").unwrap()
});

/// Reads one numeric literal as printed in a report.
///
/// `NaN` and `NA` yield `Ok(None)`.
pub fn parse_number(raw: &str) -> Result<Option<f64>, ParseError> {
    let normalized: String = raw
        .replace("âˆ’", "-")
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| match c {
            '\u{2212}' | '\u{2013}' | '\u{2012}' => '-',
            c => c,
        })
        .collect();

    if normalized.eq_ignore_ascii_case("nan") || normalized.eq_ignore_ascii_case(NA) {
        return Ok(None);
    }
    if let Ok(value) = normalized.parse::<f64>() {
        return Ok(Some(value));
    }
    if let Some(caps) = TIMES_TEN.captures(&normalized) {
        if let Ok(value) = format!("{}e{}", &caps[1], &caps[2]).parse::<f64>() {
            return Ok(Some(value));
        }
    }
    Err(ParseError::InvalidNumber(raw.to_owned()))
}

/// Value part of a `<label>=<value>` expression. A bare `<` stands in for
/// `=` on lines such as `p<1e-16`.
fn value_of(line: &str) -> Result<&str, ParseError> {
    line.rsplit_once('=')
        .or_else(|| line.rsplit_once('<'))
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ParseError::MissingValue(line.to_owned()))
}

pub fn statistics_from_text(text: &str) -> Result<Statistics, ParseError> {
    let start = text.find(MARKER).ok_or(ParseError::MissingMarker)?;
    let mut lines = text[start..].lines().map(str::trim).filter(|l| !l.is_empty());

    let p_line = lines.next().ok_or(ParseError::MissingLine("p-value"))?;
    let hr_line = lines.next().ok_or(ParseError::MissingLine("hazard ratio"))?;

    let p_value = parse_number(value_of(p_line)?)?;
    let hazard_ratio = parse_number(value_of(hr_line)?)?;

    Ok(match (p_value, hazard_ratio) {
        (Some(p), Some(hr)) => Statistics::new(p, hr),
        _ => Statistics::NOT_AVAILABLE,
    })
}

/// The service answers with an HTML page instead of a PDF when it has no
/// data for a gene/cohort pair.
pub fn is_html(content: &[u8]) -> bool {
    let content = content.strip_prefix(b"\xef\xbb\xbf").unwrap_or(content);
    let start = content.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(content.len());
    let head = &content[start..content.len().min(start + 64)];
    const PREFIXES: [&[u8]; 2] = [b"<!doctype html", b"<html"];
    PREFIXES
        .iter()
        .any(|prefix| head.len() >= prefix.len() && head[..prefix.len()].eq_ignore_ascii_case(prefix))
}

pub fn html_title(content: &[u8]) -> Option<String> {
    static TITLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("title").unwrap());

    let html = Html::parse_document(&String::from_utf8_lossy(content));
    let title = html.select(&TITLE).next()?.text().map(str::trim).collect::<String>();
    (!title.is_empty()).then_some(title)
}

/// Text of the first page of a PDF document. A document without a readable
/// first page yields an empty string.
pub fn first_page_text(document: &[u8]) -> Result<String, pdf_extract::OutputError> {
    let pages = pdf_extract::extract_text_from_mem_by_pages(document)?;
    Ok(pages.into_iter().next().unwrap_or_default())
}
