//! Direction and fractal tags shared by every structural layer.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of a merged bar, stroke or segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    /// The opposite direction.
    #[inline]
    pub fn reverse(self) -> Self {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
        }
    }

    #[inline]
    pub fn is_up(self) -> bool {
        self == Direction::Up
    }

    #[inline]
    pub fn is_down(self) -> bool {
        self == Direction::Down
    }

    /// The fractal a move in this direction ends on.
    #[inline]
    pub fn end_fractal(self) -> Fractal {
        match self {
            Direction::Up => Fractal::Top,
            Direction::Down => Fractal::Bottom,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => write!(f, "up"),
            Direction::Down => write!(f, "down"),
        }
    }
}

/// Local extremum tag of the middle unit of a three-unit window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Fractal {
    Top,
    Bottom,
    #[default]
    None,
}

impl Fractal {
    /// Direction of a move that starts on this fractal.
    pub fn start_direction(self) -> Option<Direction> {
        match self {
            Fractal::Bottom => Some(Direction::Up),
            Fractal::Top => Some(Direction::Down),
            Fractal::None => None,
        }
    }

    #[inline]
    pub fn is_some(self) -> bool {
        self != Fractal::None
    }
}

impl fmt::Display for Fractal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fractal::Top => write!(f, "top"),
            Fractal::Bottom => write!(f, "bottom"),
            Fractal::None => write!(f, "none"),
        }
    }
}

/// Outcome of comparing a new range against the current tail unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeDir {
    /// Strictly higher on both bounds
    Up,
    /// Strictly lower on both bounds
    Down,
    /// One range contains the other; merge
    Combine,
    /// The tail lies inside the new range and inclusion is excluded
    Included,
}

impl MergeDir {
    /// The direction a new unit starts in, if the comparison opened one.
    pub fn direction(self) -> Option<Direction> {
        match self {
            MergeDir::Up => Some(Direction::Up),
            MergeDir::Down => Some(Direction::Down),
            MergeDir::Combine | MergeDir::Included => None,
        }
    }
}
