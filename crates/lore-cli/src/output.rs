use chrono::{DateTime, NaiveDate, Utc};

use crate::error::CliResult;

#[derive(Clone, Copy, Debug, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{cut}...")
    }
}

pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M").to_string()
}

pub fn format_optional(dt: Option<&DateTime<Utc>>) -> String {
    dt.map(format_timestamp).unwrap_or_else(|| "-".to_string())
}

/// RFC 3339, or a bare `YYYY-MM-DD` meaning midnight UTC
pub fn parse_timestamp(s: &str) -> CliResult<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| format!("Invalid timestamp '{s}'. Use RFC 3339 or YYYY-MM-DD.").into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_string() {
        assert_eq!(truncate_string("short", 10), "short");
        assert_eq!(truncate_string("a longer sentence", 10), "a longe...");
        assert_eq!(truncate_string("héllo wörld", 8), "héllo...");
    }

    #[test]
    fn test_parse_timestamp() {
        let dt = parse_timestamp("2024-03-01T12:30:00Z").unwrap();
        assert_eq!(format_timestamp(&dt), "2024-03-01 12:30");

        let day = parse_timestamp("2024-03-01").unwrap();
        assert_eq!(format_timestamp(&day), "2024-03-01 00:00");

        assert!(parse_timestamp("yesterday").is_err());
    }
}
