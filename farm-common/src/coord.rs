//! Map coordinates
//!
//! Coordinates travel as `"x|y"` text in every listing the game renders.
//! Parsing and numeric coercion live here as free functions so callers never
//! need to reach into raw strings themselves.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// A position on the world map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Coord {
    pub x: i32,
    pub y: i32,
}

impl Coord {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Euclidean field distance between two coordinates
    pub fn distance(&self, other: &Coord) -> f64 {
        let dx = f64::from(self.x - other.x);
        let dy = f64::from(self.y - other.y);
        (dx * dx + dy * dy).sqrt()
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.x, self.y)
    }
}

/// Error returned when text does not hold an `x|y` pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordParseError(pub String);

impl fmt::Display for CoordParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid coordinate: {:?}", self.0)
    }
}

impl std::error::Error for CoordParseError {}

impl FromStr for Coord {
    type Err = CoordParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (x, y) = s
            .trim()
            .split_once('|')
            .ok_or_else(|| CoordParseError(s.to_string()))?;
        let x = x.trim().parse().map_err(|_| CoordParseError(s.to_string()))?;
        let y = y.trim().parse().map_err(|_| CoordParseError(s.to_string()))?;
        Ok(Coord { x, y })
    }
}

impl TryFrom<String> for Coord {
    type Error = CoordParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Coord> for String {
    fn from(coord: Coord) -> Self {
        coord.to_string()
    }
}

fn coord_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(\d{1,3})\|(\d{1,3})").expect("static coordinate pattern"))
}

/// Find the coordinate embedded in free text such as `"Village (500|505) K55"`.
///
/// Village names may themselves contain `x|y` fragments, so the last match wins.
pub fn parse_coord(text: &str) -> Option<Coord> {
    let caps = coord_pattern().captures_iter(text).last()?;
    let x = caps.get(1)?.as_str().parse().ok()?;
    let y = caps.get(2)?.as_str().parse().ok()?;
    Some(Coord { x, y })
}

/// Coerce listing text into a count, ignoring thousands separators and padding.
///
/// Anything without digits is zero.
pub fn parse_count(text: &str) -> u32 {
    let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().unwrap_or(0)
}
