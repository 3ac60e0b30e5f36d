//! Parser for the plain-text timetable grammar.
//!
//! A timetable file is a list of sections. Each section starts with a
//! `#` header line and is followed by departure lines of the form
//! `<hours> <minute> <minute> ...`, where `<hours>` is either a single
//! hour (`7`) or an inclusive range (`6.9`). A range whose end is not
//! after its start wraps past midnight (`23.1` covers 23, 24 and 25).

use std::collections::BTreeMap;
use std::fmt;
use std::ops::RangeInclusive;

/// Hours added to the end of a range that wraps past midnight.
const WRAP_HOURS: u16 = 24;

/// One scheduled departure. `hour` may exceed 23 for departures after
/// midnight that still belong to the previous operating day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepartureTime {
    pub hour: u16,
    pub minute: u16,
}

impl DepartureTime {
    pub fn new(hour: u16, minute: u16) -> Self {
        Self { hour, minute }
    }

    /// Minutes since midnight of the operating day.
    pub fn minute_of_day(&self) -> u32 {
        u32::from(self.hour) * 60 + u32::from(self.minute)
    }
}

impl fmt::Display for DepartureTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// Section name to departures, in file order.
pub type SectionSet = BTreeMap<String, Vec<DepartureTime>>;

/// A grammar violation, tagged with the 1-based line it occurred on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("line {line}: {kind}")]
pub struct ParseError {
    pub line: usize,
    pub kind: ParseErrorKind,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseErrorKind {
    #[error("departure line before any `#` section header")]
    MissingSection,

    #[error("section header has no alphanumeric characters")]
    EmptySectionName,

    #[error("section {0:?} is defined more than once")]
    DuplicateSection(String),

    #[error("hour spec {spec:?} must have one or two components, found {count}")]
    HourComponentCount { spec: String, count: usize },

    #[error("invalid hour {token:?} in hour spec {spec:?}")]
    InvalidHour { spec: String, token: String },

    #[error("hour range {spec:?} wraps past the largest representable hour")]
    HourOverflow { spec: String },

    #[error("invalid minute {0:?}")]
    InvalidMinute(String),
}

/// Parses the text of one timetable file into its sections.
///
/// # Errors
///
/// Returns a [`ParseError`] for the first line that violates the grammar.
pub fn parse_timetable(content: &str) -> Result<SectionSet, ParseError> {
    let mut sections: Vec<(String, Vec<DepartureTime>)> = Vec::new();

    for (index, line) in content.lines().enumerate() {
        let at = |kind| ParseError {
            line: index + 1,
            kind,
        };

        if line.starts_with('#') {
            let name: String = line.chars().filter(|c| c.is_alphanumeric()).collect();
            if name.is_empty() {
                return Err(at(ParseErrorKind::EmptySectionName));
            }
            if sections.iter().any(|(existing, _)| *existing == name) {
                return Err(at(ParseErrorKind::DuplicateSection(name)));
            }
            sections.push((name, Vec::new()));
            continue;
        }

        let mut tokens = line.split_whitespace();
        let Some(hour_spec) = tokens.next() else {
            continue;
        };
        let Some((_, departures)) = sections.last_mut() else {
            return Err(at(ParseErrorKind::MissingSection));
        };

        let hours = parse_hour_spec(hour_spec).map_err(at)?;
        let minutes = tokens
            .map(parse_minute)
            .collect::<Result<Vec<_>, _>>()
            .map_err(at)?;

        for hour in hours {
            departures.extend(minutes.iter().map(|&minute| DepartureTime::new(hour, minute)));
        }
    }

    Ok(sections.into_iter().collect())
}

/// Expands an hour spec (`7`, `6.9`, `23.1`, `7.`) into its ascending hours.
pub fn parse_hour_spec(spec: &str) -> Result<RangeInclusive<u16>, ParseErrorKind> {
    let hours = spec
        .split('.')
        .filter(|component| !component.is_empty())
        .map(|component| {
            component
                .parse::<u16>()
                .map_err(|_| ParseErrorKind::InvalidHour {
                    spec: spec.to_string(),
                    token: component.to_string(),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    match hours.as_slice() {
        [hour] => Ok(*hour..=*hour),
        [first, last] if first < last => Ok(*first..=*last),
        [first, last] => last
            .checked_add(WRAP_HOURS)
            .map(|end| *first..=end)
            .ok_or_else(|| ParseErrorKind::HourOverflow {
                spec: spec.to_string(),
            }),
        _ => Err(ParseErrorKind::HourComponentCount {
            spec: spec.to_string(),
            count: hours.len(),
        }),
    }
}

fn parse_minute(token: &str) -> Result<u16, ParseErrorKind> {
    token
        .parse()
        .map_err(|_| ParseErrorKind::InvalidMinute(token.to_string()))
}
