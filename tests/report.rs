mod helpers;

use bytes::Bytes;
use helpers::{BLANK_PAGE, REPORT_PAGE, pdf};
use sscr::{
    query::{Document, QueryError, read_document},
    report::{ParseError, Prognosis, first_page_text},
};

#[tokio::test]
async fn statistics_from_generated_report() {
    let document = read_document(Bytes::from(pdf(&[REPORT_PAGE]))).await.unwrap();
    let Document::Report(stats) = document else {
        panic!("expected a report, got {document:?}");
    };
    assert_eq!(stats.p_value, Some(0.0031));
    assert_eq!(stats.hazard_ratio, Some(1.8));
    assert_eq!(stats.prognosis, Prognosis::High);
}

#[test]
fn only_the_first_page_is_read() {
    let document = pdf(&[BLANK_PAGE, REPORT_PAGE]);
    let text = first_page_text(&document).unwrap();
    assert!(text.contains("Overall Survival"), "{text:?}");
    assert!(!text.contains("Logrank"), "{text:?}");
}

#[tokio::test]
async fn marker_on_a_later_page_is_missing() {
    let document = Bytes::from(pdf(&[BLANK_PAGE, REPORT_PAGE]));
    let err = read_document(document).await.unwrap_err();
    assert!(matches!(err, QueryError::Parse(ParseError::MissingMarker)), "{err:?}");
}
