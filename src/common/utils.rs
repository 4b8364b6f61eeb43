//! Utility functions for weatherhub

use std::future::Future;
use std::time::Duration;

/// Parse duration string (e.g., "500ms", "30s", "5m", "1h")
pub fn parse_duration(s: &str) -> crate::Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(crate::Error::InvalidConfig("empty duration".into()));
    }

    let (num_str, unit) = if let Some(num) = s.strip_suffix("ms") {
        (num, "ms")
    } else {
        s.split_at(s.len() - s.chars().last().map_or(0, char::len_utf8))
    };

    let num: u64 = num_str
        .parse()
        .map_err(|_| crate::Error::InvalidConfig(format!("invalid duration: {}", s)))?;

    let invalid = || crate::Error::InvalidConfig(format!("duration out of range: {}", s));
    let duration = match unit {
        "ms" => Duration::from_millis(num),
        "s" => Duration::from_secs(num),
        "m" => Duration::from_secs(num.checked_mul(60).ok_or_else(invalid)?),
        "h" => Duration::from_secs(num.checked_mul(3600).ok_or_else(invalid)?),
        _ => {
            return Err(crate::Error::InvalidConfig(format!(
                "unknown duration unit: {}",
                unit
            )))
        }
    };

    Ok(duration)
}

/// Retry with a fixed delay between attempts.
///
/// Only errors flagged by [`crate::Error::is_retryable`] are retried; the
/// last error is returned once `attempts` tries are used up.
pub async fn retry_fixed<F, Fut, T>(
    mut f: F,
    attempts: usize,
    delay: Duration,
) -> crate::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = crate::Result<T>>,
{
    let attempts = attempts.max(1);

    for attempt in 1..=attempts {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_retryable() && attempt < attempts => {
                tracing::warn!(
                    attempt,
                    error = %e,
                    "request failed, retrying in {:?}",
                    delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }

    Err(crate::Error::Other("retries exhausted".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
    }

    #[test]
    fn test_parse_duration_invalid() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("10x").is_err());
        assert!(parse_duration("s").is_err());
    }

    #[test]
    fn test_parse_duration_overflow() {
        let huge = format!("{}h", u64::MAX / 60);
        assert!(matches!(parse_duration(&huge), Err(Error::InvalidConfig(_))));
        assert!(matches!(
            parse_duration(&format!("{}m", u64::MAX)),
            Err(Error::InvalidConfig(_))
        ));
        assert!(parse_duration(&format!("{}s", u64::MAX)).is_ok());
    }

    #[tokio::test]
    async fn test_retry_fixed_recovers() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let result = retry_fixed(
            move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(Error::Connection("refused".into()))
                } else {
                    Ok(7)
                }
            },
            3,
            Duration::from_millis(1),
        )
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_fixed_is_bounded() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let result: crate::Result<()> = retry_fixed(
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::Connection("refused".into()))
            },
            3,
            Duration::from_millis(1),
        )
        .await;

        assert!(matches!(result, Err(Error::Connection(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_fixed_skips_permanent_errors() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let result: crate::Result<()> = retry_fixed(
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::Ingest("no id".into()))
            },
            3,
            Duration::from_millis(1),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
