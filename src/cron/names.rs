use nom::{branch::alt, bytes::complete::tag_no_case, combinator::value};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DayOfWeek {
    Sun,
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
}

impl DayOfWeek {
    pub fn parse(input: &str) -> nom::IResult<&str, Self> {
        alt((
            value(Self::Sun, tag_no_case("sun")),
            value(Self::Mon, tag_no_case("mon")),
            value(Self::Tue, tag_no_case("tue")),
            value(Self::Wed, tag_no_case("wed")),
            value(Self::Thu, tag_no_case("thu")),
            value(Self::Fri, tag_no_case("fri")),
            value(Self::Sat, tag_no_case("sat")),
        ))(input)
    }

    pub fn to_u32(self) -> u32 {
        match self {
            Self::Sun => 0,
            Self::Mon => 1,
            Self::Tue => 2,
            Self::Wed => 3,
            Self::Thu => 4,
            Self::Fri => 5,
            Self::Sat => 6,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Month {
    Jan,
    Feb,
    Mar,
    Apr,
    May,
    Jun,
    Jul,
    Aug,
    Sep,
    Oct,
    Nov,
    Dec,
}

impl Month {
    pub fn parse(input: &str) -> nom::IResult<&str, Self> {
        alt((
            value(Self::Jan, tag_no_case("jan")),
            value(Self::Feb, tag_no_case("feb")),
            value(Self::Mar, tag_no_case("mar")),
            value(Self::Apr, tag_no_case("apr")),
            value(Self::May, tag_no_case("may")),
            value(Self::Jun, tag_no_case("jun")),
            value(Self::Jul, tag_no_case("jul")),
            value(Self::Aug, tag_no_case("aug")),
            value(Self::Sep, tag_no_case("sep")),
            value(Self::Oct, tag_no_case("oct")),
            value(Self::Nov, tag_no_case("nov")),
            value(Self::Dec, tag_no_case("dec")),
        ))(input)
    }

    /// 1-based, like the cron month field.
    pub fn to_u32(self) -> u32 {
        match self {
            Self::Jan => 1,
            Self::Feb => 2,
            Self::Mar => 3,
            Self::Apr => 4,
            Self::May => 5,
            Self::Jun => 6,
            Self::Jul => 7,
            Self::Aug => 8,
            Self::Sep => 9,
            Self::Oct => 10,
            Self::Nov => 11,
            Self::Dec => 12,
        }
    }
}
