use std::sync::Arc;

use bytes::Bytes;
use compact_str::CompactString;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};

use crate::{
    config::Cutoffs,
    report::{ParseError, Statistics, first_page_text, html_title, is_html, statistics_from_text},
    scrape::SessionStore,
};

pub const GENERATE_PATH: &str = "/assets/PHP4/survival_zf.php";
pub const DOCUMENT_PATH: &str = "/tmp/";

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("transport: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("session rejected ({0})")]
    Unauthorized(StatusCode),
    #[error("cannot refresh session: {0:#}")]
    Session(anyhow::Error),
    #[error("unexpected report envelope: {0:?}")]
    Envelope(String),
    #[error("parse: {0}")]
    Parse(#[from] ParseError),
    #[error("document: {0}")]
    Document(String),
}

/// Form fields of an overall-survival plot request.
#[derive(Debug, Serialize)]
pub struct Payload<'a> {
    methodoption: &'static str,
    dataset: &'a str,
    signature: &'a str,
    highcol: &'static str,
    lowcol: &'static str,
    groupcutoff1: u8,
    groupcutoff2: u8,
    axisunit: &'static str,
    ifhr: &'static str,
    ifconf: &'static str,
    signature_norm: &'static str,
    is_sub: &'static str,
    subtype: &'static str,
}

impl<'a> Payload<'a> {
    pub const fn new(dataset: &'a str, gene: &'a str, cutoffs: Cutoffs) -> Self {
        Self {
            methodoption: "os",
            dataset,
            signature: gene,
            highcol: "#ff0000",
            lowcol: "#0000ff",
            groupcutoff1: cutoffs.high,
            groupcutoff2: cutoffs.low,
            axisunit: "month",
            ifhr: "hr",
            ifconf: "conf",
            signature_norm: "",
            is_sub: "false",
            subtype: "",
        }
    }
}

#[derive(Deserialize)]
struct Envelope {
    outdir: String,
}

/// Name of the generated document. The service answers with a JSON object,
/// sometimes written with single quotes.
pub fn decode_envelope(body: &str) -> Result<String, QueryError> {
    let body = body.trim();
    let envelope = serde_json::from_str::<Envelope>(body)
        .or_else(|_| serde_json::from_str::<Envelope>(&body.replace('\'', "\"")))
        .map_err(|_| QueryError::Envelope(body.chars().take(200).collect()))?;

    let name = envelope.outdir.trim();
    if name.is_empty() || name.starts_with('/') || name.contains("..") {
        return Err(QueryError::Envelope(body.chars().take(200).collect()));
    }
    Ok(name.to_owned())
}

#[derive(Debug, PartialEq)]
pub enum Document {
    /// HTML came back where a PDF was expected.
    NotFound { title: Option<String> },
    Report(Statistics),
}

pub async fn read_document(content: Bytes) -> Result<Document, QueryError> {
    if is_html(&content) {
        return Ok(Document::NotFound {
            title: html_title(&content),
        });
    }

    let text = tokio::task::spawn_blocking(move || first_page_text(&content))
        .await
        .map_err(|e| QueryError::Document(format!("extractor panicked: {e}")))?
        .map_err(|e| QueryError::Document(e.to_string()))?;

    Ok(Document::Report(statistics_from_text(&text)?))
}

#[derive(Clone, Debug, PartialEq)]
pub struct QueryResult {
    pub gene: CompactString,
    pub statistics: Statistics,
    pub not_found: bool,
}

fn reject_unauthorized(response: &Response) -> Result<(), QueryError> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        Err(QueryError::Unauthorized(status))
    } else {
        Ok(())
    }
}

pub struct QueryClient {
    base_url: String,
    cutoffs: Cutoffs,
    sessions: Arc<SessionStore>,
}

impl QueryClient {
    pub fn new(base_url: &str, cutoffs: Cutoffs, sessions: Arc<SessionStore>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            cutoffs,
            sessions,
        }
    }

    pub fn generate_url(&self) -> String {
        format!("{}{GENERATE_PATH}", self.base_url)
    }

    pub fn document_url(&self, name: &str) -> String {
        format!("{}{DOCUMENT_PATH}{name}", self.base_url)
    }

    /// Runs one (dataset, gene) query. A rejected session is replaced and
    /// the query retried once.
    pub async fn query(&self, dataset: &str, gene: &str) -> Result<QueryResult, QueryError> {
        let handle = self.sessions.current();
        match self.attempt(&handle.client, dataset, gene).await {
            Err(QueryError::Unauthorized(status)) => {
                tracing::warn!(target: "query", "({dataset}, {gene}): {status}, retrying with a new session");
                let fresh = self
                    .sessions
                    .refresh(handle.generation)
                    .await
                    .map_err(QueryError::Session)?;
                self.attempt(&fresh.client, dataset, gene).await
            }
            result => result,
        }
    }

    async fn attempt(&self, client: &Client, dataset: &str, gene: &str) -> Result<QueryResult, QueryError> {
        let payload = Payload::new(dataset, gene, self.cutoffs.for_dataset(dataset));
        tracing::debug!(target: "query", "({dataset}, {gene}): {payload:?}");

        let response = client.post(self.generate_url()).form(&payload).send().await?;
        reject_unauthorized(&response)?;
        let body = response.error_for_status()?.text().await?;
        let name = decode_envelope(&body)?;

        let response = client.get(self.document_url(&name)).send().await?;
        reject_unauthorized(&response)?;
        let failure = response.error_for_status_ref().err();
        let content = response.bytes().await?;

        // a missing document comes back as an HTML page, whatever the status
        if !is_html(&content)
            && let Some(e) = failure
        {
            return Err(e.into());
        }
        let document = read_document(content).await?;

        Ok(match document {
            Document::NotFound { title } => {
                tracing::info!(target: "query", "({dataset}, {gene}): no data ({})", title.as_deref().unwrap_or("html"));
                QueryResult {
                    gene: CompactString::new(gene),
                    statistics: Statistics::NOT_AVAILABLE,
                    not_found: true,
                }
            }
            Document::Report(statistics) => QueryResult {
                gene: CompactString::new(gene),
                statistics,
                not_found: false,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_forms() {
        assert_eq!(decode_envelope(r#"{"outdir":"abc123.pdf"}"#).unwrap(), "abc123.pdf");
        assert_eq!(decode_envelope("  {'outdir': 'x.pdf'}\n").unwrap(), "x.pdf");
        assert!(matches!(decode_envelope("<html>oops</html>"), Err(QueryError::Envelope(_))));
        assert!(matches!(decode_envelope(r#"{"outdir":"../etc/passwd"}"#), Err(QueryError::Envelope(_))));
        assert!(matches!(decode_envelope(r#"{"outdir":""}"#), Err(QueryError::Envelope(_))));
    }

    #[test]
    fn payload_fields() {
        let payload = Payload::new("LUAD", "TP53", Cutoffs::default());
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["dataset"], "LUAD");
        assert_eq!(json["signature"], "TP53");
        assert_eq!(json["groupcutoff1"], 67);
        assert_eq!(json["groupcutoff2"], 33);
        assert_eq!(json["methodoption"], "os");
        assert_eq!(json["is_sub"], "false");
    }

    #[tokio::test]
    async fn html_document_is_not_found() {
        let page = Bytes::from_static(b"<!DOCTYPE HTML><html><head><title>404 Not Found</title></head></html>");
        assert_eq!(
            read_document(page).await.unwrap(),
            Document::NotFound {
                title: Some("404 Not Found".to_owned())
            }
        );
    }

    #[tokio::test]
    async fn garbage_document_fails() {
        let content = Bytes::from_static(b"%PDF-1.4\nthis is not a pdf\n%%EOF\n");
        assert!(matches!(
            read_document(content).await,
            Err(QueryError::Document(_) | QueryError::Parse(_))
        ));
    }
}
