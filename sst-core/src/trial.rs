use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::phase::PhaseName;
use crate::stimulus::{Direction, StimulusId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrialKind {
    Go,
    Stop,
}

impl TrialKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrialKind::Go => "go",
            TrialKind::Stop => "stop",
        }
    }
}

/// One entry of a block's condition list, e.g. `stop_right`.
///
/// Serialized as its condition string so it round-trips through tabular
/// exports and YAML trial lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TrialLabel {
    pub kind: TrialKind,
    pub direction: Direction,
}

impl TrialLabel {
    pub const fn new(kind: TrialKind, direction: Direction) -> Self {
        Self { kind, direction }
    }

    pub const fn go(direction: Direction) -> Self {
        Self::new(TrialKind::Go, direction)
    }

    pub const fn stop(direction: Direction) -> Self {
        Self::new(TrialKind::Stop, direction)
    }

    pub fn is_stop(&self) -> bool {
        self.kind == TrialKind::Stop
    }

    /// The go stimulus shown on this trial; stop trials reuse the go arrow.
    pub fn go_stimulus(&self) -> StimulusId {
        StimulusId::Go(self.direction)
    }
}

impl fmt::Display for TrialLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.kind.as_str(), self.direction)
    }
}

impl FromStr for TrialLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, direction) = s
            .split_once('_')
            .ok_or_else(|| format!("condition `{s}` is not of the form <kind>_<direction>"))?;
        let kind = match kind {
            "go" => TrialKind::Go,
            "stop" => TrialKind::Stop,
            other => return Err(format!("unknown trial kind `{other}` in `{s}`")),
        };
        Ok(Self::new(kind, direction.parse()?))
    }
}

impl TryFrom<String> for TrialLabel {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TrialLabel> for String {
    fn from(label: TrialLabel) -> Self {
        label.to_string()
    }
}

/// Trial state machine.
///
/// Go: `Start -> Fixation -> GoWindow -> [NoResponseFeedback] -> Done`.
/// Stop: `Start -> Fixation -> PreStopWindow -> StopSignalWindow -> Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialState {
    Start,
    Fixation,
    GoWindow,
    NoResponseFeedback,
    PreStopWindow,
    StopSignalWindow,
    Done,
}

impl TrialState {
    /// Next state. `go_responded` is only read when leaving `GoWindow`.
    pub fn next(self, kind: TrialKind, go_responded: bool) -> Option<Self> {
        use TrialState::*;
        Some(match (self, kind) {
            (Start, _) => Fixation,
            (Fixation, TrialKind::Go) => GoWindow,
            (Fixation, TrialKind::Stop) => PreStopWindow,
            (GoWindow, _) if go_responded => Done,
            (GoWindow, _) => NoResponseFeedback,
            (NoResponseFeedback, _) => Done,
            (PreStopWindow, _) => StopSignalWindow,
            (StopSignalWindow, _) => Done,
            (Done, _) => return None,
        })
    }

    pub fn phase(&self) -> Option<PhaseName> {
        match self {
            TrialState::Fixation => Some(PhaseName::Fixation),
            TrialState::GoWindow => Some(PhaseName::GoResponseWindow),
            TrialState::NoResponseFeedback => Some(PhaseName::NoResponseFeedback),
            TrialState::PreStopWindow => Some(PhaseName::PreStopWindow),
            TrialState::StopSignalWindow => Some(PhaseName::StopSignalWindow),
            TrialState::Start | TrialState::Done => None,
        }
    }
}

/// What happened during one timed phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub phase: PhaseName,
    /// Onset relative to the session clock.
    pub onset: Duration,
    /// Scheduled duration.
    pub duration: Duration,
    /// Time the phase actually stayed on screen.
    pub elapsed: Duration,
    /// `false` for display-only phases.
    pub captured: bool,
    pub key: Option<String>,
    pub rt: Option<Duration>,
    /// Set only when the phase judges correctness.
    pub hit: Option<bool>,
    pub timed_out: bool,
}

impl PhaseRecord {
    pub fn key_press(&self) -> bool {
        self.key.is_some()
    }

    fn write_row(&self, row: &mut BTreeMap<String, Value>) {
        let label = self.phase.unit_label();
        row.insert(format!("{label}_onset"), secs(self.onset));
        row.insert(format!("{label}_duration"), secs(self.duration));
        row.insert(format!("{label}_elapsed"), secs(self.elapsed));
        if self.captured {
            row.insert(format!("{label}_key_press"), Value::Bool(self.key_press()));
            row.insert(
                format!("{label}_response"),
                self.key.clone().map_or(Value::Null, Value::String),
            );
            row.insert(format!("{label}_rt"), self.rt.map_or(Value::Null, secs));
            row.insert(format!("{label}_timed_out"), Value::Bool(self.timed_out));
        }
        if let Some(hit) = self.hit {
            row.insert(format!("{label}_hit"), Value::Bool(hit));
        }
    }
}

/// Everything one trial produced. Built fresh per trial and handed back
/// to the caller, which owns persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub trial_id: u64,
    pub block_id: String,
    pub block_idx: usize,
    pub condition: TrialLabel,
    /// Stop-signal delay used, stop trials only.
    pub ssd: Option<Duration>,
    pub phases: Vec<PhaseRecord>,
    pub go_hit: Option<bool>,
    pub go_ssd_key_press: Option<bool>,
    pub stop_key_press: Option<bool>,
    pub failed_stop: Option<bool>,
}

impl TrialRecord {
    pub fn phase(&self, name: PhaseName) -> Option<&PhaseRecord> {
        self.phases.iter().find(|p| p.phase == name)
    }

    pub fn is_stop(&self) -> bool {
        self.condition.is_stop()
    }

    /// `Some(true)` when a stop trial was withheld.
    pub fn stop_success(&self) -> Option<bool> {
        self.failed_stop.map(|failed| !failed)
    }

    /// Reaction time on the go window, when the participant answered.
    pub fn go_rt(&self) -> Option<Duration> {
        self.phase(PhaseName::GoResponseWindow).and_then(|p| p.rt)
    }

    /// Flat `field -> value` view for tabular export.
    pub fn to_row(&self) -> BTreeMap<String, Value> {
        let mut row = BTreeMap::new();
        row.insert("trial_id".into(), Value::from(self.trial_id));
        row.insert("block_id".into(), Value::String(self.block_id.clone()));
        row.insert("block_idx".into(), Value::from(self.block_idx));
        row.insert("condition".into(), Value::String(self.condition.to_string()));
        row.insert("ssd".into(), self.ssd.map_or(Value::Null, secs));
        for phase in &self.phases {
            phase.write_row(&mut row);
        }
        // Derived outcomes win over the per-phase copies written above.
        if let Some(hit) = self.go_hit {
            row.insert("go_hit".into(), Value::Bool(hit));
        }
        if let Some(pressed) = self.go_ssd_key_press {
            row.insert("go_ssd_key_press".into(), Value::Bool(pressed));
        }
        if let Some(pressed) = self.stop_key_press {
            row.insert("stop_key_press".into(), Value::Bool(pressed));
        }
        if let Some(failed) = self.failed_stop {
            row.insert("failed_stop".into(), Value::Bool(failed));
        }
        row
    }
}

fn secs(d: Duration) -> Value {
    Value::from(d.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_condition_strings() {
        let label: TrialLabel = "stop_right".parse().unwrap();
        assert_eq!(label, TrialLabel::stop(Direction::Right));
        assert_eq!(label.to_string(), "stop_right");
        assert_eq!(label.go_stimulus(), StimulusId::Go(Direction::Right));
    }

    #[test]
    fn rejects_malformed_conditions() {
        assert!("go".parse::<TrialLabel>().is_err());
        assert!("wait_left".parse::<TrialLabel>().is_err());
        assert!("go_up".parse::<TrialLabel>().is_err());
    }

    #[test]
    fn label_serializes_as_condition_string() {
        let json = serde_json::to_string(&TrialLabel::go(Direction::Left)).unwrap();
        assert_eq!(json, "\"go_left\"");
        let back: TrialLabel = serde_json::from_str("\"stop_left\"").unwrap();
        assert_eq!(back, TrialLabel::stop(Direction::Left));
    }

    fn walk(kind: TrialKind, go_responded: bool) -> Vec<TrialState> {
        let mut states = vec![TrialState::Start];
        let mut state = TrialState::Start;
        while let Some(next) = state.next(kind, go_responded) {
            states.push(next);
            state = next;
        }
        states
    }

    #[test]
    fn stop_trials_visit_both_windows() {
        use TrialState::*;
        assert_eq!(
            walk(TrialKind::Stop, false),
            vec![Start, Fixation, PreStopWindow, StopSignalWindow, Done]
        );
    }

    #[test]
    fn go_trials_show_feedback_only_after_a_miss() {
        use TrialState::*;
        assert_eq!(walk(TrialKind::Go, true), vec![Start, Fixation, GoWindow, Done]);
        assert_eq!(
            walk(TrialKind::Go, false),
            vec![Start, Fixation, GoWindow, NoResponseFeedback, Done]
        );
    }

    #[test]
    fn row_uses_unit_prefixes() {
        let record = TrialRecord {
            trial_id: 3,
            block_id: "block_0".into(),
            block_idx: 0,
            condition: TrialLabel::stop(Direction::Left),
            ssd: Some(Duration::from_millis(250)),
            phases: vec![PhaseRecord {
                phase: PhaseName::PreStopWindow,
                onset: Duration::from_millis(500),
                duration: Duration::from_millis(250),
                elapsed: Duration::from_millis(250),
                captured: true,
                key: Some("f".into()),
                rt: Some(Duration::from_millis(120)),
                hit: None,
                timed_out: false,
            }],
            go_hit: None,
            go_ssd_key_press: Some(true),
            stop_key_press: Some(false),
            failed_stop: Some(true),
        };
        let row = record.to_row();
        assert_eq!(row["condition"], Value::String("stop_left".into()));
        assert_eq!(row["go_ssd_key_press"], Value::Bool(true));
        assert_eq!(row["go_ssd_response"], Value::String("f".into()));
        assert_eq!(row["ssd"], Value::from(0.25));
        assert_eq!(row["failed_stop"], Value::Bool(true));
        assert!(!row.contains_key("go_hit"));
        assert_eq!(record.stop_success(), Some(false));
    }
}
