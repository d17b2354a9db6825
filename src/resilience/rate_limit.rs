//! Rate-limit header parsing.
//!
//! Reads the server-mandated wait from a 429 response, in priority order:
//! - `Retry-After`: delta seconds or an HTTP-date
//! - `RateLimit-Reset`: delta seconds
//! - `X-RateLimit-Reset`: Unix epoch seconds

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::transport::HttpResponse;

/// Wait indicated by the response headers, relative to `now`.
pub fn retry_after(response: &HttpResponse, now: DateTime<Utc>) -> Option<Duration> {
    if let Some(value) = response.header("retry-after") {
        if let Some(delay) = parse_retry_after(value, now) {
            return Some(delay);
        }
    }

    if let Some(secs) = response
        .header("ratelimit-reset")
        .and_then(|v| v.trim().parse::<f64>().ok())
    {
        return seconds(secs);
    }

    response
        .header("x-ratelimit-reset")
        .and_then(|v| v.trim().parse::<i64>().ok())
        .map(|epoch| {
            let wait = epoch - now.timestamp();
            Duration::from_secs(wait.max(0) as u64)
        })
}

fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<f64>() {
        return seconds(secs);
    }

    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}

/// Non-negative seconds as a wait; values beyond `Duration` saturate.
fn seconds(secs: f64) -> Option<Duration> {
    if secs.is_finite() && secs >= 0.0 {
        Some(Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_retry_after_seconds() {
        let resp = HttpResponse::new(429, "").with_header("Retry-After", "2");
        assert_eq!(retry_after(&resp, now()), Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_retry_after_http_date() {
        let resp = HttpResponse::new(429, "").with_header("Retry-After", "Fri, 01 Mar 2024 12:00:30 GMT");
        assert_eq!(retry_after(&resp, now()), Some(Duration::from_secs(30)));

        let past = HttpResponse::new(429, "").with_header("Retry-After", "Fri, 01 Mar 2024 11:00:00 GMT");
        assert_eq!(retry_after(&past, now()), Some(Duration::ZERO));
    }

    #[test]
    fn test_rate_limit_reset_headers() {
        let delta = HttpResponse::new(429, "").with_header("RateLimit-Reset", "7");
        assert_eq!(retry_after(&delta, now()), Some(Duration::from_secs(7)));

        let epoch = now().timestamp() + 12;
        let resp = HttpResponse::new(429, "").with_header("X-RateLimit-Reset", epoch.to_string());
        assert_eq!(retry_after(&resp, now()), Some(Duration::from_secs(12)));
    }

    #[test]
    fn test_huge_waits_saturate() {
        let resp = HttpResponse::new(429, "").with_header("Retry-After", "1e300");
        assert_eq!(retry_after(&resp, now()), Some(Duration::MAX));

        let reset = HttpResponse::new(429, "").with_header("RateLimit-Reset", "1e300");
        assert_eq!(retry_after(&reset, now()), Some(Duration::MAX));
    }

    #[test]
    fn test_garbage_headers_ignored() {
        let resp = HttpResponse::new(429, "").with_header("Retry-After", "soon");
        assert_eq!(retry_after(&resp, now()), None);
        let negative = HttpResponse::new(429, "").with_header("Retry-After", "-3");
        assert_eq!(retry_after(&negative, now()), None);
        assert_eq!(retry_after(&HttpResponse::new(429, ""), now()), None);
    }
}
