use chrono::{DateTime, NaiveDate, NaiveTime, TimeDelta, TimeZone, Utc};
use std::fmt::Display;
use std::time::Duration;

/// Layout used for dates shown in notification mails, e.g. "02 Jan 06 15:04 CET"
pub const MAIL_DATE_FORMAT: &str = "%d %b %y %H:%M %Z";

/// Renders a stored UTC timestamp in the given zone with [`MAIL_DATE_FORMAT`]
pub fn format_mail_date<Tz>(date: &DateTime<Utc>, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    date.with_timezone(tz).format(MAIL_DATE_FORMAT).to_string()
}

/// Local midnight `offset_days` after `today`, as UTC. Days whose midnight
/// falls in a DST gap start at the first valid local time.
pub fn day_start<Tz: TimeZone>(
    tz: &Tz,
    today: NaiveDate,
    offset_days: i64,
) -> Option<DateTime<Utc>> {
    let day = today.checked_add_signed(TimeDelta::try_days(offset_days)?)?;
    let midnight = day.and_time(NaiveTime::MIN);
    (0..=3)
        .find_map(|hours| {
            tz.from_local_datetime(&(midnight + TimeDelta::hours(hours)))
                .earliest()
        })
        .map(|start| start.with_timezone(&Utc))
}

/// Renders a duration with its two most significant units,
/// e.g. "1 h, 30 m", "5 m, 20 s", "1 s, 133 ms", "10 ms"
pub fn format_duration(duration: Duration) -> String {
    const UNITS: [(&str, u128); 5] = [
        ("d", 86_400_000),
        ("h", 3_600_000),
        ("m", 60_000),
        ("s", 1_000),
        ("ms", 1),
    ];

    let mut rest = duration.as_millis();
    if rest == 0 {
        return "0 ms".to_string();
    }

    let mut parts = Vec::with_capacity(2);
    for (name, size) in UNITS {
        let amount = rest / size;
        rest %= size;
        if amount > 0 && parts.len() < 2 {
            parts.push(format!("{} {}", amount, name));
        }
    }
    parts.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(0)), "0 ms");
        assert_eq!(format_duration(Duration::from_millis(10)), "10 ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1 s, 500 ms");
        assert_eq!(format_duration(Duration::from_secs(65)), "1 m, 5 s");
        assert_eq!(format_duration(Duration::from_secs(3600 + 120)), "1 h, 2 m");
        assert_eq!(format_duration(Duration::from_secs(86400 + 3600)), "1 d, 1 h");
        assert_eq!(format_duration(Duration::from_secs(90061)), "1 d, 1 h");
        assert_eq!(format_duration(Duration::from_millis(59_999)), "59 s, 999 ms");
    }

    #[test]
    fn test_format_mail_date() {
        let date = Utc.with_ymd_and_hms(2024, 1, 2, 15, 4, 0).unwrap();
        assert_eq!(format_mail_date(&date, &Utc), "02 Jan 24 15:04 UTC");
        assert_eq!(
            format_mail_date(&date, &chrono_tz::Europe::Madrid),
            "02 Jan 24 16:04 CET"
        );
    }

    #[test]
    fn test_day_start() {
        // Santiago skipped from 00:00 to 01:00 on 2024-09-08.
        let tz: chrono_tz::Tz = "America/Santiago".parse().unwrap();
        let day = NaiveDate::from_ymd_opt(2024, 9, 7).unwrap();
        let start = day_start(&tz, day, 1).unwrap();
        assert_eq!(start.to_rfc3339(), "2024-09-08T04:00:00+00:00");

        let start = day_start(&Utc, day, -7).unwrap();
        assert_eq!(start.to_rfc3339(), "2024-08-31T00:00:00+00:00");
        assert!(day_start(&Utc, day, i64::MAX).is_none());
    }
}
