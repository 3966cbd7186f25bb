use chrono::{DateTime, TimeZone, Utc};

/// e.g. "lecture-slides-2026-02-18T09-30-00.html"
pub fn export_file_name(prefix: &str, at: DateTime<Utc>) -> String {
    format!("{prefix}-{}.html", at.format("%Y-%m-%dT%H-%M-%S"))
}

/// Human-readable UTC time for a slide caption.
pub fn caption_time(ms: i64) -> String {
    Utc.timestamp_millis_opt(ms)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| format!("{ms} ms"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_has_no_colons_or_fractions() {
        // 2026-02-18T09:30:00.123Z
        let at = Utc.timestamp_millis_opt(1_771_407_000_123).unwrap();
        let name = export_file_name("lecture-slides", at);
        assert_eq!(name, "lecture-slides-2026-02-18T09-30-00.html");
        assert!(!name.contains(':'));
    }

    #[test]
    fn caption_time_is_utc_seconds() {
        assert_eq!(caption_time(1_771_407_000_123), "2026-02-18 09:30:00 UTC");
    }
}
