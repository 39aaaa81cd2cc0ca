use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Response direction cued by the go stimulus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Direction::Left, Direction::Right];

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Left => "left",
            Direction::Right => "right",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "left" => Ok(Direction::Left),
            "right" => Ok(Direction::Right),
            other => Err(format!("unknown direction `{other}`")),
        }
    }
}

/// Stimuli the trial engine asks the presentation service to draw.
///
/// The engine never knows what a stimulus looks like; it only names it.
/// Presentation backends map [`StimulusId::key`] onto their own assets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StimulusId {
    Fixation,
    Go(Direction),
    StopSignal,
    NoResponseFeedback,
}

impl StimulusId {
    /// Asset key, e.g. `go_left` or `stop_signal`.
    pub fn key(&self) -> &'static str {
        match self {
            StimulusId::Fixation => "fixation",
            StimulusId::Go(Direction::Left) => "go_left",
            StimulusId::Go(Direction::Right) => "go_right",
            StimulusId::StopSignal => "stop_signal",
            StimulusId::NoResponseFeedback => "no_response_feedback",
        }
    }
}

impl fmt::Display for StimulusId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}
