use chrono::{DateTime, NaiveDateTime, Utc};

const PLACEHOLDER: &str = "—";

/// Accepts RFC 3339 and the naive ISO timestamps the backend emits (UTC).
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

pub fn format_duration(minutes: Option<f64>) -> String {
    let minutes = match minutes {
        Some(m) if m > 0.0 => m.round() as u64,
        _ => return PLACEHOLDER.to_string(),
    };
    if minutes < 60 {
        return format!("{}m", minutes);
    }
    let (hours, remainder) = (minutes / 60, minutes % 60);
    if remainder == 0 {
        format!("{}h", hours)
    } else {
        format!("{}h {}m", hours, remainder)
    }
}

pub fn format_date(value: Option<&str>) -> String {
    value
        .and_then(parse_timestamp)
        .map(|dt| dt.format("%b %-d, %Y, %-I:%M %p").to_string())
        .unwrap_or_else(|| PLACEHOLDER.to_string())
}

pub fn format_relative_time(value: Option<&str>, now: DateTime<Utc>) -> String {
    let Some(then) = value.and_then(parse_timestamp) else {
        return PLACEHOLDER.to_string();
    };
    let diff_minutes = ((now - then).num_seconds() as f64 / 60.0).round() as i64;
    if diff_minutes < 1 {
        return "just now".to_string();
    }
    if diff_minutes < 60 {
        return format!("{}m ago", diff_minutes);
    }
    let hours = (diff_minutes as f64 / 60.0).round() as i64;
    if hours < 24 {
        return format!("{}h ago", hours);
    }
    format!("{}d ago", (hours as f64 / 24.0).round() as i64)
}
