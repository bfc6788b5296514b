use anyhow::{anyhow, bail, Result};
use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{digit1, space0, space1},
    combinator::{all_consuming, cut, map, map_res, opt},
    multi::separated_list1,
    sequence::{delimited, preceded, separated_pair, tuple},
    IResult,
};

use super::names::{DayOfWeek, Month};
use super::timeunit::TimeUnit;
use super::{CronField, CronPattern};

// "*/15 8-18 * JAN-JUN mon-fri"

/// One comma separated item of a cron field, before bounds are checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldPart {
    Any { step: Option<u32> },
    Value { value: u32, step: Option<u32> },
    Range { from: u32, to: u32, step: Option<u32> },
}

#[derive(Debug, Clone, Copy)]
enum FieldKind {
    Minute,
    Hour,
    Day,
    Month,
    DayOfWeek,
}

impl FieldKind {
    fn name(self) -> &'static str {
        match self {
            Self::Minute => "minute",
            Self::Hour => "hour",
            Self::Day => "day of month",
            Self::Month => "month",
            Self::DayOfWeek => "day of week",
        }
    }

    fn bounds(self) -> (u32, u32) {
        match self {
            Self::Minute => (0, 59),
            Self::Hour => (0, 23),
            Self::Day => (1, 31),
            Self::Month => (1, 12),
            // 7 is accepted as an alias of Sunday
            Self::DayOfWeek => (0, 7),
        }
    }
}

pub fn parse_cron(i: &str) -> Result<CronPattern> {
    let (_, parts) = all_consuming(delimited(
        space0,
        tuple((
            field(FieldKind::Minute),
            preceded(space1, cut(field(FieldKind::Hour))),
            preceded(space1, cut(field(FieldKind::Day))),
            preceded(space1, cut(field(FieldKind::Month))),
            preceded(space1, cut(field(FieldKind::DayOfWeek))),
        )),
        space0,
    ))(i)
    .map_err(|e| match e {
        nom::Err::Incomplete(_) => anyhow!("Unexpected end of cron expression"),
        nom::Err::Error(f) | nom::Err::Failure(f) => {
            let err_pos = i.len() - f.input.len();
            anyhow!(
                "Invalid cron expression at position {}, expected 5 fields (minute hour day month weekday)\n{}\n{}^",
                err_pos,
                i,
                " ".repeat(err_pos)
            )
        }
    })?;

    let (minute, hour, day, month, day_of_week) = parts;

    let mut day_of_week = build_field(&day_of_week, FieldKind::DayOfWeek)?;
    day_of_week.fold_sunday();

    Ok(CronPattern {
        minute: build_field(&minute, FieldKind::Minute)?,
        hour: build_field(&hour, FieldKind::Hour)?,
        day: build_field(&day, FieldKind::Day)?,
        month: build_field(&month, FieldKind::Month)?,
        day_of_week,
    })
}

/// Parses the amount of an `@every` descriptor, e.g. `90s` or `2 hour`.
pub fn parse_every(i: &str) -> Result<std::time::Duration> {
    let amount_unit = separated_pair(number, space0, TimeUnit::parse);
    let line = delimited(space0, amount_unit, space0);

    let (amount, unit) = all_consuming(line)(i)
        .map_err(|e| anyhow!("Failed to parse interval '{}': {}", i, e))?
        .1;

    if amount == 0 {
        bail!("Interval must be greater than zero");
    }
    Ok(unit.to_duration(amount))
}

fn build_field(parts: &[FieldPart], kind: FieldKind) -> Result<CronField> {
    let (min, max) = kind.bounds();
    let check = |v: u32| -> Result<u32> {
        if v < min || v > max {
            bail!("Value {} out of range {}-{} in {} field", v, min, max, kind.name());
        }
        Ok(v)
    };
    let check_step = |step: Option<u32>| -> Result<u32> {
        match step {
            Some(0) => bail!("Step must be greater than zero in {} field", kind.name()),
            Some(s) if s > max => bail!(
                "Step {} exceeds the {} field maximum of {}",
                s,
                kind.name(),
                max
            ),
            Some(s) => Ok(s),
            None => Ok(1),
        }
    };

    let mut bits = 0u64;
    let mut restricted = true;

    for (index, part) in parts.iter().enumerate() {
        let (from, to, step) = match part {
            FieldPart::Any { step } => {
                if index == 0 {
                    restricted = false;
                }
                (min, max, check_step(*step)?)
            }
            FieldPart::Value { value, step: None } => (check(*value)?, *value, 1),
            // "5/10" means starting at 5 until the end of the field
            FieldPart::Value { value, step } => (check(*value)?, max, check_step(*step)?),
            FieldPart::Range { from, to, step } => {
                let (from, to) = (check(*from)?, check(*to)?);
                if from > to {
                    bail!("Range {}-{} is reversed in {} field", from, to, kind.name());
                }
                (from, to, check_step(*step)?)
            }
        };

        for v in (from..=to).step_by(step as usize) {
            bits |= 1 << v;
        }
    }

    Ok(CronField { bits, restricted })
}

fn field<'a>(kind: FieldKind) -> impl FnMut(&'a str) -> IResult<&'a str, Vec<FieldPart>> {
    separated_list1(tag(","), part(kind))
}

fn part<'a>(kind: FieldKind) -> impl FnMut(&'a str) -> IResult<&'a str, FieldPart> {
    map(
        tuple((base(kind), opt(preceded(tag("/"), cut(number))))),
        |(base, step)| match base {
            Base::Any => FieldPart::Any { step },
            Base::Value(value) => FieldPart::Value { value, step },
            Base::Range(from, to) => FieldPart::Range { from, to, step },
        },
    )
}

#[derive(Debug, Clone)]
enum Base {
    Any,
    Value(u32),
    Range(u32, u32),
}

fn base<'a>(kind: FieldKind) -> impl FnMut(&'a str) -> IResult<&'a str, Base> {
    move |i: &'a str| {
        let wildcard: IResult<&str, &str> = match kind {
            FieldKind::Day | FieldKind::DayOfWeek => alt((tag("*"), tag("?")))(i),
            _ => tag("*")(i),
        };
        if let Ok((rest, _)) = wildcard {
            return Ok((rest, Base::Any));
        }

        alt((
            map(
                separated_pair(atom(kind), tag("-"), cut(atom(kind))),
                |(a, b)| Base::Range(a, b),
            ),
            map(atom(kind), Base::Value),
        ))(i)
    }
}

fn atom<'a>(kind: FieldKind) -> impl FnMut(&'a str) -> IResult<&'a str, u32> {
    move |i: &'a str| match kind {
        FieldKind::Month => alt((map(Month::parse, Month::to_u32), number))(i),
        FieldKind::DayOfWeek => alt((map(DayOfWeek::parse, DayOfWeek::to_u32), number))(i),
        _ => number(i),
    }
}

fn number(input: &str) -> IResult<&str, u32> {
    map_res(digit1, |s| str::parse::<u32>(s))(input)
}
