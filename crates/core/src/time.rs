use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

use crate::error::{Result, SpanlightError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn start_unix_nano(&self) -> i64 {
        self.start.timestamp_nanos_opt().unwrap_or(0)
    }

    pub fn end_unix_nano(&self) -> i64 {
        self.end.timestamp_nanos_opt().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// Fixed bucket width for a range, as a ClickHouse INTERVAL fragment.
/// The same table drives every concurrent chart query so all series
/// over one range come back aligned.
pub fn interval_for(range: &DateRange) -> &'static str {
    let total = range.end - range.start;
    if total < Duration::minutes(1) {
        "1 second"
    } else if total <= Duration::hours(4) {
        "1 minute"
    } else if total <= Duration::hours(24) {
        "1 hour"
    } else {
        "1 day"
    }
}

/// Parse an `"<n> <unit>"` interval fragment back into a duration.
pub fn parse_interval(interval: &str) -> Result<Duration> {
    let parts: Vec<&str> = interval.split_whitespace().collect();
    let [count, unit] = parts.as_slice() else {
        return Err(SpanlightError::Parse(format!(
            "invalid interval format: {interval:?}"
        )));
    };

    let n: i64 = count
        .parse()
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| SpanlightError::Parse(format!("invalid interval count: {count:?}")))?;

    match unit.to_ascii_lowercase().as_str() {
        "second" | "seconds" => Ok(Duration::seconds(n)),
        "minute" | "minutes" => Ok(Duration::minutes(n)),
        "hour" | "hours" => Ok(Duration::hours(n)),
        "day" | "days" => Ok(Duration::days(n)),
        other => Err(SpanlightError::Parse(format!(
            "unsupported interval unit: {other:?}"
        ))),
    }
}

/// Floor a timestamp to a multiple of `step` in seconds since epoch,
/// matching how the store's `toStartOfInterval` buckets rows.
pub fn align_to_interval(t: DateTime<Utc>, step: Duration) -> DateTime<Utc> {
    let secs = step.num_seconds().max(1);
    let unix = t.timestamp();
    from_unix_seconds(unix - unix.rem_euclid(secs))
}

pub fn from_unix_seconds(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

/// Emit one point per bucket boundary from the aligned range start
/// while `ts <= end`, zero-filling buckets the store returned no row
/// for. Series length is deterministic for a given range and interval.
pub fn pad_series<V: Copy + Default>(
    values: &HashMap<DateTime<Utc>, V>,
    interval: &str,
    range: &DateRange,
) -> Result<Vec<(DateTime<Utc>, V)>> {
    let step = parse_interval(interval)?;
    let mut ts = align_to_interval(range.start, step);
    let mut series = Vec::new();
    while ts <= range.end {
        series.push((ts, values.get(&ts).copied().unwrap_or_default()));
        ts += step;
    }
    Ok(series)
}

/// Resolve a query-string date range: absolute RFC3339 `start`/`end`
/// win when both are present, otherwise the relative `timeRange` form.
pub fn resolve_date_range(
    start: Option<&str>,
    end: Option<&str>,
    time_range: Option<&str>,
) -> Result<DateRange> {
    if let (Some(start), Some(end)) = (start, end) {
        let parsed_start = DateTime::parse_from_rfc3339(start);
        let parsed_end = DateTime::parse_from_rfc3339(end);
        return match (parsed_start, parsed_end) {
            (Ok(start), Ok(end)) => Ok(DateRange {
                start: start.with_timezone(&Utc),
                end: end.with_timezone(&Utc),
            }),
            _ => Err(SpanlightError::MalformedRequest(
                "invalid start or end time format".to_string(),
            )),
        };
    }

    Ok(relative_date_range(time_range.unwrap_or_default()))
}

/// `"<int><unit>"` with unit in s|m|h|d, ending now. Malformed input
/// yields a zero-width range rather than an error.
pub fn relative_date_range(time_range: &str) -> DateRange {
    let end = Utc::now();
    let empty = DateRange { start: end, end };

    if time_range.len() < 2 || !time_range.is_ascii() {
        return empty;
    }

    let (value, unit) = time_range.split_at(time_range.len() - 1);
    let Ok(value) = value.parse::<i64>() else {
        return empty;
    };

    let duration = match unit {
        "s" => Duration::seconds(value),
        "m" => Duration::minutes(value),
        "h" => Duration::hours(value),
        "d" => Duration::days(value),
        _ => return empty,
    };

    DateRange {
        start: end - duration,
        end,
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn range(start: (u32, u32, u32), end: (u32, u32, u32)) -> DateRange {
        DateRange {
            start: Utc
                .with_ymd_and_hms(2024, 1, 1, start.0, start.1, start.2)
                .unwrap(),
            end: Utc
                .with_ymd_and_hms(2024, 1, 1, end.0, end.1, end.2)
                .unwrap(),
        }
    }

    #[test]
    fn interval_table_boundaries() {
        assert_eq!(interval_for(&range((0, 0, 0), (0, 0, 59))), "1 second");
        assert_eq!(interval_for(&range((0, 0, 0), (0, 1, 0))), "1 minute");
        assert_eq!(interval_for(&range((0, 0, 0), (4, 0, 0))), "1 minute");
        assert_eq!(interval_for(&range((0, 0, 0), (4, 0, 1))), "1 hour");
        assert_eq!(interval_for(&range((0, 0, 0), (23, 59, 59))), "1 hour");
        let wide = DateRange {
            start: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap(),
        };
        assert_eq!(interval_for(&wide), "1 day");
    }

    #[test]
    fn parses_interval_fragments() {
        assert_eq!(parse_interval("1 second").unwrap(), Duration::seconds(1));
        assert_eq!(parse_interval("5 minutes").unwrap(), Duration::minutes(5));
        assert_eq!(parse_interval("2 Days").unwrap(), Duration::days(2));
        assert!(parse_interval("1second").is_err());
        assert!(parse_interval("0 second").is_err());
        assert!(parse_interval("1 fortnight").is_err());
    }

    #[test]
    fn aligns_down_to_interval() {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 10, 37, 42).unwrap();
        assert_eq!(
            align_to_interval(t, Duration::minutes(1)),
            Utc.with_ymd_and_hms(2024, 1, 1, 10, 37, 0).unwrap()
        );
        assert_eq!(
            align_to_interval(t, Duration::hours(1)),
            Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap()
        );
    }

    #[test]
    fn padded_series_is_dense_and_aligned() {
        let r = range((0, 0, 0), (0, 0, 30));
        let mut values = HashMap::new();
        values.insert(r.start, 1u64);
        values.insert(r.start + Duration::seconds(10), 1u64);
        values.insert(r.start + Duration::seconds(20), 1u64);

        let series = pad_series(&values, "1 second", &r).unwrap();
        assert_eq!(series.len(), 31);
        assert_eq!(series[0].1, 1);
        assert_eq!(series[10].1, 1);
        assert_eq!(series[20].1, 1);
        assert_eq!(series.iter().map(|(_, v)| *v).sum::<u64>(), 3);
        for window in series.windows(2) {
            assert_eq!(window[1].0 - window[0].0, Duration::seconds(1));
        }
    }

    #[test]
    fn padding_starts_at_or_before_range_start() {
        let r = DateRange {
            start: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 42).unwrap(),
            end: Utc.with_ymd_and_hms(2024, 1, 1, 0, 5, 0).unwrap(),
        };
        let series = pad_series::<f64>(&HashMap::new(), "1 minute", &r).unwrap();
        assert!(series[0].0 <= r.start);
        assert!(series.last().unwrap().0 <= r.end);
        assert!(series.iter().all(|(_, v)| *v == 0.0));
    }

    #[test]
    fn absolute_range_wins_over_relative() {
        let r = resolve_date_range(
            Some("2024-01-01T00:00:00Z"),
            Some("2024-01-02T00:00:00Z"),
            Some("5m"),
        )
        .unwrap();
        assert_eq!(r.start, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(r.end, Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap());
    }

    #[test]
    fn bad_absolute_range_is_an_error() {
        assert!(resolve_date_range(Some("yesterday"), Some("2024-01-02T00:00:00Z"), None).is_err());
    }

    #[test]
    fn relative_range_spans_requested_window() {
        let r = relative_date_range("15m");
        assert_eq!(r.end - r.start, Duration::minutes(15));
        let r = relative_date_range("2d");
        assert_eq!(r.end - r.start, Duration::days(2));
    }

    #[test]
    fn malformed_relative_range_is_zero_width() {
        for bad in ["", "m", "xm", "5w", "5"] {
            let r = relative_date_range(bad);
            assert!(r.is_empty(), "expected zero-width for {bad:?}");
        }
    }
}
