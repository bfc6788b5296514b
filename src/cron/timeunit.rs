use nom::{branch::alt, bytes::complete::tag, combinator::value};
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub enum TimeUnit {
    Second,
    Minute,
    Hour,
    Day,
    Week,
}

impl TimeUnit {
    pub fn parse(input: &str) -> nom::IResult<&str, Self> {
        alt((
            value(Self::Second, tag("second")),
            value(Self::Second, tag("s")),
            value(Self::Minute, tag("minute")),
            value(Self::Minute, tag("m")),
            value(Self::Hour, tag("hour")),
            value(Self::Hour, tag("h")),
            value(Self::Day, tag("day")),
            value(Self::Day, tag("d")),
            value(Self::Week, tag("week")),
            value(Self::Week, tag("w")),
        ))(input)
    }

    pub fn to_duration(&self, amount: u32) -> Duration {
        match self {
            Self::Second => Duration::from_secs(amount as u64),
            Self::Minute => Duration::from_secs(amount as u64 * 60),
            Self::Hour => Duration::from_secs(amount as u64 * 60 * 60),
            Self::Day => Duration::from_secs(amount as u64 * 60 * 60 * 24),
            Self::Week => Duration::from_secs(amount as u64 * 60 * 60 * 24 * 7),
        }
    }
}
