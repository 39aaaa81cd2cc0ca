use std::fmt;

use serde::{Deserialize, Serialize};

/// Timed phases a trial can pass through.
///
/// Each phase knows its record label (the prefix used when flattening a
/// trial into a row) and the trigger names it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseName {
    Fixation,
    GoResponseWindow,
    NoResponseFeedback,
    PreStopWindow,
    StopSignalWindow,
}

impl PhaseName {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseName::Fixation => "fixation",
            PhaseName::GoResponseWindow => "go_response_window",
            PhaseName::NoResponseFeedback => "no_response_feedback",
            PhaseName::PreStopWindow => "pre_stop_go_window",
            PhaseName::StopSignalWindow => "stop_signal_window",
        }
    }

    /// Prefix for this phase's fields in a flattened trial row.
    pub fn unit_label(&self) -> &'static str {
        match self {
            PhaseName::Fixation => "fixation",
            PhaseName::GoResponseWindow => "go",
            PhaseName::NoResponseFeedback => "no_response_feedback",
            PhaseName::PreStopWindow => "go_ssd",
            PhaseName::StopSignalWindow => "stop",
        }
    }

    /// Whether a valid keypress closes the window early.
    ///
    /// The pre-stop window always runs to the scheduled stop-signal onset.
    pub fn terminates_on_response(&self) -> bool {
        matches!(
            self,
            PhaseName::GoResponseWindow | PhaseName::StopSignalWindow
        )
    }

    pub fn onset_trigger(&self) -> &'static str {
        match self {
            PhaseName::Fixation => "fixation_onset",
            PhaseName::GoResponseWindow => "go_onset",
            PhaseName::NoResponseFeedback => "no_response_feedback_onset",
            PhaseName::PreStopWindow => "pre_stop_onset",
            PhaseName::StopSignalWindow => "on_stop_onset",
        }
    }

    pub fn response_trigger(&self) -> Option<&'static str> {
        match self {
            PhaseName::GoResponseWindow => Some("go_response"),
            PhaseName::PreStopWindow => Some("pre_stop_response"),
            PhaseName::StopSignalWindow => Some("on_stop_response"),
            PhaseName::Fixation | PhaseName::NoResponseFeedback => None,
        }
    }

    pub fn timeout_trigger(&self) -> Option<&'static str> {
        match self {
            PhaseName::GoResponseWindow => Some("go_miss"),
            _ => None,
        }
    }
}

impl fmt::Display for PhaseName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
