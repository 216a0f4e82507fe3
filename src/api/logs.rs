//! Log query endpoint
//!
//! Serves the in-memory log ring buffer. The `since` parameter accepts
//! ISO-8601 with fractional seconds, Unix seconds as a decimal, or a
//! relative duration like `15m`.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::ApiState;
use crate::logging::LogRecord;

/// Default cap on returned records
const DEFAULT_MAX_COUNT: usize = 500;

/// Query parameters for `/api/logs`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogsQuery {
    pub since: Option<String>,
    pub max_count: Option<usize>,
    pub level: Option<String>,
    pub category: Option<String>,
}

/// Log query response
#[derive(Debug, Serialize)]
pub struct LogsResponse {
    pub logs: Vec<LogRecord>,
    pub count: usize,
    /// Resolved lower bound, echoed for cursor-style polling
    pub since: Option<DateTime<Utc>>,
}

/// Parse the `since` grammar relative to `now`
///
/// Accepted forms: RFC 3339 / ISO-8601 with fractional seconds, Unix
/// seconds as a decimal number, or `(\d+)([smhd])` meaning that long ago.
fn parse_since(value: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }

    if let Ok(secs) = value.parse::<f64>() {
        if secs.is_finite() && secs >= 0.0 {
            #[allow(clippy::cast_possible_truncation)]
            return Utc
                .timestamp_opt(secs.trunc() as i64, (secs.fract() * 1e9) as u32)
                .single();
        }
        return None;
    }

    let re = regex::Regex::new(r"^(\d+)([smhd])$").ok()?;
    let caps = re.captures(value)?;
    let amount: i64 = caps[1].parse().ok()?;
    let seconds = match &caps[2] {
        "s" => amount,
        "m" => amount * 60,
        "h" => amount * 3600,
        "d" => amount * 86400,
        _ => return None,
    };
    Some(now - chrono::Duration::seconds(seconds))
}

/// Query captured logs
async fn get_logs(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<LogsResponse>, (StatusCode, String)> {
    let since = match &query.since {
        Some(value) => Some(parse_since(value, Utc::now()).ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                format!("unparseable since value: {value}"),
            )
        })?),
        None => None,
    };

    let logs = state.logs.query(
        since,
        query.level.as_deref(),
        query.category.as_deref(),
        query.max_count.unwrap_or(DEFAULT_MAX_COUNT),
    );

    Ok(Json(LogsResponse {
        count: logs.len(),
        logs,
        since,
    }))
}

/// Build logs router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/api/logs", get(get_logs))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn since_accepts_iso8601() {
        let now = Utc::now();
        let parsed = parse_since("2026-08-01T10:30:00.250Z", now).unwrap();
        assert_eq!(parsed.timestamp_subsec_millis(), 250);
    }

    #[test]
    fn since_accepts_unix_seconds() {
        let now = Utc::now();
        let parsed = parse_since("1754000000", now).unwrap();
        assert_eq!(parsed.timestamp(), 1_754_000_000);

        let fractional = parse_since("1754000000.5", now).unwrap();
        assert_eq!(fractional.timestamp_subsec_millis(), 500);
    }

    #[test]
    fn since_accepts_relative() {
        let now = Utc::now();
        let parsed = parse_since("15m", now).unwrap();
        assert_eq!((now - parsed).num_seconds(), 900);

        let days = parse_since("2d", now).unwrap();
        assert_eq!((now - days).num_seconds(), 2 * 86400);
    }

    #[test]
    fn since_rejects_garbage() {
        let now = Utc::now();
        assert!(parse_since("yesterday", now).is_none());
        assert!(parse_since("15x", now).is_none());
        assert!(parse_since("-5m", now).is_none());
    }
}
