use chrono::{NaiveDate, NaiveTime, Timelike};

/// Longest description shown in list and timeline cards.
pub const DESCRIPTION_PREVIEW_CHARS: usize = 100;

/// `9:05 AM`, `12:00 PM`, `12:30 AM`.
pub fn format_time(time: NaiveTime) -> String {
    let (pm, hour) = time.hour12();
    format!(
        "{}:{:02} {}",
        hour,
        time.minute(),
        if pm { "PM" } else { "AM" }
    )
}

/// Timeline label: the 12-hour time or "All day".
pub fn format_time_or_all_day(time: Option<NaiveTime>) -> String {
    time.map(format_time).unwrap_or_else(|| "All day".to_string())
}

pub fn format_date(date: Option<NaiveDate>) -> String {
    match date {
        Some(date) => date.format("%b %-d, %Y").to_string(),
        None => "N/A".to_string(),
    }
}

/// `Friday, March 1, 2024`
pub fn format_long_date(date: NaiveDate) -> String {
    date.format("%A, %B %-d, %Y").to_string()
}

pub fn priority_label(priority: bool) -> &'static str {
    if priority {
        "HIGH"
    } else {
        "LOW"
    }
}

pub fn preview(description: &str) -> String {
    if description.chars().count() > DESCRIPTION_PREVIEW_CHARS {
        let cut: String = description.chars().take(DESCRIPTION_PREVIEW_CHARS).collect();
        format!("{cut}...")
    } else {
        description.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_time_twelve_hour() {
        let t = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap();
        assert_eq!(format_time(t(9, 5)), "9:05 AM");
        assert_eq!(format_time(t(0, 30)), "12:30 AM");
        assert_eq!(format_time(t(12, 0)), "12:00 PM");
        assert_eq!(format_time(t(17, 45)), "5:45 PM");
        assert_eq!(format_time_or_all_day(None), "All day");
    }

    #[test]
    fn test_format_dates() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(format_date(Some(d)), "Mar 1, 2024");
        assert_eq!(format_date(None), "N/A");
        assert_eq!(format_long_date(d), "Friday, March 1, 2024");
    }

    #[test]
    fn test_preview_truncates_long_text() {
        let long = "x".repeat(150);
        let short = preview(&long);
        assert_eq!(short.chars().count(), DESCRIPTION_PREVIEW_CHARS + 3);
        assert!(short.ends_with("..."));
        assert_eq!(preview("short"), "short");
    }
}
