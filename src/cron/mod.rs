pub mod names;
pub mod parser;
pub mod timeunit;

use anyhow::{bail, Context, Result};
use chrono::{
    DateTime, Datelike, LocalResult, NaiveDate, NaiveDateTime, TimeDelta, TimeZone, Timelike,
};
use std::str::FromStr;
use std::time::Duration;

/// How far ahead `next_after` searches before giving up on a schedule.
const SEARCH_LIMIT_DAYS: i64 = 366 * 5;

/// A parsed schedule specification: either a cron pattern or a fixed interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schedule {
    Every { interval: Duration },
    When { pattern: CronPattern },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronPattern {
    pub minute: CronField,
    pub hour: CronField,
    pub day: CronField,
    pub month: CronField,
    pub day_of_week: CronField,
}

/// Set of accepted values for one cron field, stored as a bit mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CronField {
    bits: u64,
    restricted: bool,
}

impl CronField {
    pub fn matches(&self, value: u32) -> bool {
        value < 64 && self.bits & (1 << value) != 0
    }

    /// False when the field was written as `*` (or `?`), with or without a step.
    pub fn is_restricted(&self) -> bool {
        self.restricted
    }

    fn fold_sunday(&mut self) {
        if self.bits & (1 << 7) != 0 {
            self.bits = (self.bits & !(1 << 7)) | 1;
        }
    }
}

impl Schedule {
    pub fn parse(spec: &str) -> Result<Self> {
        let spec = spec.trim();
        if spec.is_empty() {
            bail!("Empty schedule");
        }

        if let Some(descriptor) = spec.strip_prefix('@') {
            if let Some(interval) = descriptor.strip_prefix("every") {
                let interval = parser::parse_every(interval)
                    .with_context(|| format!("Malformed schedule '{}'", spec))?;
                return Ok(Schedule::Every { interval });
            }

            let expanded = match descriptor.to_ascii_lowercase().as_str() {
                "yearly" | "annually" => "0 0 1 1 *",
                "monthly" => "0 0 1 * *",
                "weekly" => "0 0 * * 0",
                "daily" | "midnight" => "0 0 * * *",
                "hourly" => "0 * * * *",
                _ => bail!("Unknown schedule descriptor '{}'", spec),
            };
            return Ok(Schedule::When {
                pattern: parser::parse_cron(expanded)?,
            });
        }

        let pattern =
            parser::parse_cron(spec).with_context(|| format!("Malformed schedule '{}'", spec))?;
        Ok(Schedule::When { pattern })
    }

    /// First fire time strictly after `after`, evaluated in `after`'s time zone.
    pub fn next_after<Tz: TimeZone>(&self, after: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        match self {
            Schedule::Every { interval } => {
                let step = TimeDelta::from_std(*interval).ok()?;
                after.clone().checked_add_signed(step)
            }
            Schedule::When { pattern } => pattern.next_after(after),
        }
    }
}

impl FromStr for Schedule {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Schedule::parse(s)
    }
}

impl CronPattern {
    pub fn next_after<Tz: TimeZone>(&self, after: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        let tz = after.timezone();
        let start = after.naive_local().with_second(0)?.with_nanosecond(0)? + TimeDelta::minutes(1);
        let limit = start + TimeDelta::days(SEARCH_LIMIT_DAYS);
        let mut t = start;

        while t <= limit {
            if !self.month.matches(t.month()) {
                t = first_of_next_month(t)?;
                continue;
            }
            if !self.day_matches(t.date()) {
                t = t.date().succ_opt()?.and_hms_opt(0, 0, 0)?;
                continue;
            }
            if !self.hour.matches(t.hour()) {
                t = t.date().and_hms_opt(t.hour(), 0, 0)? + TimeDelta::hours(1);
                continue;
            }
            if !self.minute.matches(t.minute()) {
                t += TimeDelta::minutes(1);
                continue;
            }

            // Local times skipped by a DST change do not exist, try the next minute
            let candidate = match tz.from_local_datetime(&t) {
                LocalResult::Single(dt) => Some(dt),
                LocalResult::Ambiguous(first, second) => {
                    if first > *after {
                        Some(first)
                    } else {
                        Some(second)
                    }
                }
                LocalResult::None => None,
            };
            match candidate {
                Some(dt) if dt > *after => return Some(dt),
                _ => t += TimeDelta::minutes(1),
            }
        }

        None
    }

    fn day_matches(&self, date: NaiveDate) -> bool {
        let dom = self.day.matches(date.day());
        let dow = self.day_of_week.matches(date.weekday().num_days_from_sunday());

        if self.day.is_restricted() && self.day_of_week.is_restricted() {
            dom || dow
        } else {
            dom && dow
        }
    }
}

fn first_of_next_month(t: NaiveDateTime) -> Option<NaiveDateTime> {
    let (year, month) = if t.month() == 12 {
        (t.year() + 1, 1)
    } else {
        (t.year(), t.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)?.and_hms_opt(0, 0, 0)
}
