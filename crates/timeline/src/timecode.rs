//! Millisecond timecode used for scrub positions (HH:MM:SS.mmm)

use crate::{Millis, TimelineError};
use std::fmt;

/// Timecode representation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timecode {
    pub hours: u32,
    pub minutes: u32,
    pub seconds: u32,
    pub millis: u32,
}

impl Timecode {
    /// Create timecode from a timeline position, clamping negatives to zero
    pub fn from_millis(position: Millis) -> Self {
        let total = position.max(0) as u64;
        let millis = (total % 1000) as u32;
        let total_seconds = total / 1000;
        Self {
            hours: (total_seconds / 3600) as u32,
            minutes: ((total_seconds / 60) % 60) as u32,
            seconds: (total_seconds % 60) as u32,
            millis,
        }
    }

    pub fn to_millis(&self) -> Millis {
        let total_seconds =
            self.hours as Millis * 3600 + self.minutes as Millis * 60 + self.seconds as Millis;
        total_seconds * 1000 + self.millis as Millis
    }

    /// Parse `HH:MM:SS.mmm`, `MM:SS.mmm`, `SS.mmm` or a bare millisecond count
    pub fn parse(s: &str) -> Result<Self, TimelineError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(TimelineError::Parse("empty timecode".to_string()));
        }

        if !s.contains(':') && !s.contains('.') {
            let millis = s
                .parse::<Millis>()
                .ok()
                .filter(|m| *m >= 0)
                .ok_or_else(|| TimelineError::Parse(format!("invalid milliseconds: {s}")))?;
            return Ok(Self::from_millis(millis));
        }

        let (clock, fraction) = match s.split_once('.') {
            Some((clock, fraction)) => (clock, Some(fraction)),
            None => (s, None),
        };

        let millis = match fraction {
            Some(f) => parse_fraction(f)?,
            None => 0,
        };

        let parts: Vec<&str> = clock.split(':').collect();
        let (hours, minutes, seconds) = match parts.as_slice() {
            [s] => (0, 0, parse_field(s, "seconds")?),
            [m, s] => (0, parse_field(m, "minutes")?, parse_field(s, "seconds")?),
            [h, m, s] => (
                parse_field(h, "hours")?,
                parse_field(m, "minutes")?,
                parse_field(s, "seconds")?,
            ),
            _ => {
                return Err(TimelineError::Parse(
                    "Invalid timecode format. Expected HH:MM:SS.mmm".to_string(),
                ))
            }
        };

        if parts.len() > 1 && seconds >= 60 {
            return Err(TimelineError::Parse("Seconds must be < 60".to_string()));
        }
        if parts.len() > 2 && minutes >= 60 {
            return Err(TimelineError::Parse("Minutes must be < 60".to_string()));
        }

        // A lone seconds field may exceed 59; normalize through millis.
        let total = Self {
            hours,
            minutes,
            seconds,
            millis,
        }
        .to_millis();
        Ok(Self::from_millis(total))
    }
}

fn parse_field(value: &str, name: &str) -> Result<u32, TimelineError> {
    value
        .parse::<u32>()
        .map_err(|_| TimelineError::Parse(format!("Invalid {name}")))
}

fn parse_fraction(value: &str) -> Result<u32, TimelineError> {
    if value.is_empty() || value.len() > 3 || !value.chars().all(|c| c.is_ascii_digit()) {
        return Err(TimelineError::Parse(format!(
            "Invalid fraction: {value}"
        )));
    }
    let padded = format!("{:0<3}", value);
    parse_field(&padded, "fraction")
}

impl fmt::Display for Timecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}.{:03}",
            self.hours, self.minutes, self.seconds, self.millis
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format() {
        assert_eq!(Timecode::from_millis(0).to_string(), "00:00:00.000");
        assert_eq!(Timecode::from_millis(10_000).to_string(), "00:00:10.000");
        assert_eq!(Timecode::from_millis(3_723_045).to_string(), "01:02:03.045");
        assert_eq!(Timecode::from_millis(-20).to_string(), "00:00:00.000");
    }

    #[test]
    fn test_parse_variants() {
        assert_eq!(Timecode::parse("1500").unwrap().to_millis(), 1_500);
        assert_eq!(Timecode::parse("12.5").unwrap().to_millis(), 12_500);
        assert_eq!(Timecode::parse("01:02.25").unwrap().to_millis(), 62_250);
        assert_eq!(Timecode::parse("01:02:03.045").unwrap().to_millis(), 3_723_045);
        assert_eq!(Timecode::parse("00:10").unwrap().to_millis(), 10_000);
        assert_eq!(Timecode::parse("75.0").unwrap().to_string(), "00:01:15.000");
    }

    #[test]
    fn test_parse_rejects_invalid() {
        assert!(Timecode::parse("").is_err());
        assert!(Timecode::parse("aa:bb").is_err());
        assert!(Timecode::parse("00:61").is_err());
        assert!(Timecode::parse("01:60:00").is_err());
        assert!(Timecode::parse("1.2345").is_err());
        assert!(Timecode::parse("1:2:3:4").is_err());
        assert!(Timecode::parse("18446744073709551615").is_err());
        assert!(Timecode::parse("-5").is_err());
    }
}
