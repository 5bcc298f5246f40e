use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// Formats carrying their own UTC offset.
const OFFSET_FORMATS: &[&str] = &[
    "%a, %d %b %Y %H:%M %z",
    "%d %b %Y %H:%M:%S %z",
    "%d %b %Y %H:%M %z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f %z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%a %b %e %H:%M:%S %z %Y",
];

/// Formats without an offset; interpreted as UTC.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%d %b %Y %H:%M:%S",
    "%d %b %Y %H:%M",
    "%a %b %e %H:%M:%S %Y",
    "%m/%d/%Y %H:%M:%S",
    "%B %d, %Y %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d %b %Y",
    "%d %B %Y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%m/%d/%Y",
];

/// Resolves an item's `pubDate`, falling back to the current time so a bad
/// date never blocks ingestion.
pub fn resolve_published_at(raw: &str) -> DateTime<Utc> {
    parse_timestamp(raw).unwrap_or_else(Utc::now)
}

/// Lenient parsing across the date formats seen in the wild in RSS feeds.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Some(parsed) = try_formats(raw) {
        return Some(parsed);
    }

    // Feeds regularly get the weekday wrong, which strict RFC 2822 rejects.
    let without_weekday = strip_weekday(raw);
    if without_weekday != raw {
        if let Some(parsed) = try_formats(without_weekday) {
            return Some(parsed);
        }
    }

    // Zone abbreviations outside RFC 2822 (CEST, IST, ...) are read as UTC.
    let without_zone = strip_zone_name(without_weekday);
    if without_zone != without_weekday {
        return try_formats(without_zone);
    }

    None
}

fn try_formats(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc2822(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }

    for format in OFFSET_FORMATS {
        if let Ok(parsed) = DateTime::parse_from_str(text, format) {
            return Some(parsed.with_timezone(&Utc));
        }
    }

    for format in NAIVE_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(text, format) {
            return Some(Utc.from_utc_datetime(&parsed));
        }
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return date.and_hms_opt(0, 0, 0).map(|naive| Utc.from_utc_datetime(&naive));
        }
    }

    if text.len() >= 9 && text.chars().all(|c| c.is_ascii_digit()) {
        return text.parse::<i64>().ok().and_then(|secs| Utc.timestamp_opt(secs, 0).single());
    }

    None
}

fn strip_weekday(text: &str) -> &str {
    match text.split_once(',') {
        Some((day, rest)) if !day.is_empty() && day.chars().all(|c| c.is_ascii_alphabetic()) => {
            rest.trim_start()
        }
        _ => text,
    }
}

fn strip_zone_name(text: &str) -> &str {
    match text.rsplit_once(' ') {
        Some((rest, zone))
            if (2..=5).contains(&zone.len()) && zone.chars().all(|c| c.is_ascii_uppercase()) =>
        {
            rest.trim_end()
        }
        _ => text,
    }
}
