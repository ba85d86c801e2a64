// level.rs — Trace verbosity selection.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Verbosity of a [`WriteTracer`](crate::WriteTracer): a bit set of event
/// classes. The shipped levels are [`TraceLevel::NOTHING`],
/// [`TraceLevel::LEAST`], [`TraceLevel::MEDIUM`] and [`TraceLevel::MOST`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TraceLevel(u8);

impl TraceLevel {
    pub const NOTHING: TraceLevel = TraceLevel(0);
    pub const IMPORTANT: TraceLevel = TraceLevel(1);
    pub const NORMAL: TraceLevel = TraceLevel(2);
    pub const DETAILS: TraceLevel = TraceLevel(4);

    pub const LEAST: TraceLevel = TraceLevel(1);
    pub const MEDIUM: TraceLevel = TraceLevel(1 | 2);
    pub const MOST: TraceLevel = TraceLevel(1 | 2 | 4);

    /// Whether events of class `class` are traced at this level.
    pub fn traces(self, class: TraceLevel) -> bool {
        self.0 & class.0 == class.0
    }

    pub fn is_nothing(self) -> bool {
        self.0 == 0
    }
}

impl Default for TraceLevel {
    fn default() -> Self {
        TraceLevel::LEAST
    }
}

/// An unknown trace level flag value.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("illegal trace level '{0}'")]
pub struct ParseLevelError(String);

impl FromStr for TraceLevel {
    type Err = ParseLevelError;

    fn from_str(flag: &str) -> Result<Self, Self::Err> {
        match flag {
            "off" => Ok(TraceLevel::NOTHING),
            "least" | "l" => Ok(TraceLevel::LEAST),
            "medium" | "m" => Ok(TraceLevel::MEDIUM),
            "most" | "M" => Ok(TraceLevel::MOST),
            other => Err(ParseLevelError(other.to_string())),
        }
    }
}

impl fmt::Display for TraceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match *self {
            TraceLevel::NOTHING => "off",
            TraceLevel::LEAST => "least",
            TraceLevel::MEDIUM => "medium",
            TraceLevel::MOST => "most",
            _ => return write!(f, "level({:#b})", self.0),
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_are_cumulative() {
        assert!(TraceLevel::MOST.traces(TraceLevel::IMPORTANT));
        assert!(TraceLevel::MOST.traces(TraceLevel::DETAILS));
        assert!(TraceLevel::MEDIUM.traces(TraceLevel::NORMAL));
        assert!(!TraceLevel::MEDIUM.traces(TraceLevel::DETAILS));
        assert!(!TraceLevel::LEAST.traces(TraceLevel::NORMAL));
        assert!(!TraceLevel::NOTHING.traces(TraceLevel::IMPORTANT));
    }

    #[test]
    fn parses_the_flag_spellings() {
        assert_eq!("least".parse::<TraceLevel>().unwrap(), TraceLevel::LEAST);
        assert_eq!("m".parse::<TraceLevel>().unwrap(), TraceLevel::MEDIUM);
        assert_eq!("M".parse::<TraceLevel>().unwrap(), TraceLevel::MOST);
        assert_eq!("off".parse::<TraceLevel>().unwrap(), TraceLevel::NOTHING);
        assert!("loud".parse::<TraceLevel>().is_err());
    }
}
