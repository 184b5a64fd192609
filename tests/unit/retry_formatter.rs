//! Retry message rendering as it appears in logs

use report_downloader::fetcher::retry_formatter::{RetryContext, RetryErrorType};
use report_downloader::fetcher::FetchError;
use std::time::Duration;

#[test]
fn test_retry_line_mentions_task_attempt_and_wait() {
    let error = FetchError::from_status(503, "Service Unavailable").unwrap();
    let ctx = RetryContext::new(2, 3, &error, Duration::from_millis(1500), "CCM 2024_A");
    let line = ctx.format_retry();
    assert!(line.contains("CCM 2024_A"));
    assert!(line.contains("2/3"));
    assert!(line.contains("1.5 seconds"));
}

#[test]
fn test_failure_block_carries_suggestion() {
    let error = FetchError::Auth {
        status: 401,
        message: "Unauthorized".to_string(),
    };
    let ctx = RetryContext::new(1, 3, &error, Duration::ZERO, "PRR 2019");
    assert_eq!(ctx.error_type, RetryErrorType::AuthFailed(401));

    let block = ctx.format_failure();
    let lines: Vec<&str> = block.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("[FAILED] PRR 2019"));
    assert!(lines[1].contains("Unauthorized"));
    assert!(lines[2].starts_with("  Suggestion:"));
}

#[test]
fn test_classification_of_body_errors() {
    assert_eq!(
        RetryErrorType::from_error(&FetchError::EmptyBody),
        RetryErrorType::IncompleteBody
    );
    assert_eq!(
        RetryErrorType::from_error(&FetchError::SizeMismatch {
            expected: 10,
            actual: 3
        }),
        RetryErrorType::IncompleteBody
    );
    assert_eq!(
        RetryErrorType::from_error(&FetchError::from_status(429, "").unwrap()),
        RetryErrorType::RateLimit
    );
}
