//! Boundary to the collaborators that draw stimuli, read the keyboard and
//! drive the trigger line.
//!
//! The trial engine only talks to these traits. Display backends, input
//! polling and hardware ports live outside the workspace; the experiment
//! crate ships a scripted implementation for simulation and tests.

use std::time::Duration;

use thiserror::Error;

use crate::phase::PhaseName;
use crate::stimulus::StimulusId;
use crate::trial::TrialLabel;

/// Code written to the trigger line (parallel port / serial byte).
pub type TriggerCode = u8;

#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("trigger port unavailable: {0}")]
    Unavailable(String),

    #[error("failed to send trigger {code}: {message}")]
    Send { code: TriggerCode, message: String },
}

/// Raw transmit capability. Failures are reported, never retried.
pub trait TriggerPort {
    fn send(&mut self, code: TriggerCode) -> Result<(), TriggerError>;
}

/// Best-effort emission handed to presentation services.
///
/// `None` means the event has no configured code and must be a no-op.
/// Implementations never fail; transmission errors are absorbed.
pub trait TriggerSink {
    fn fire(&mut self, code: Option<TriggerCode>);
}

/// Trigger codes resolved for one phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhaseTriggers {
    pub onset: Option<TriggerCode>,
    pub response: Option<TriggerCode>,
    pub timeout: Option<TriggerCode>,
}

/// Where in the session a response window sits. Simulated participants
/// and QA tracing read this; real input devices can ignore it.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseContext {
    pub trial_id: u64,
    pub block_id: String,
    pub block_idx: usize,
    pub condition: TrialLabel,
    pub phase: PhaseName,
    pub deadline: Duration,
    pub ssd: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct CaptureRequest<'a> {
    pub stimuli: &'a [StimulusId],
    pub valid_keys: &'a [String],
    /// Key judged correct, when the phase scores correctness.
    pub correct_key: Option<&'a str>,
    pub duration: Duration,
    pub triggers: PhaseTriggers,
    /// Close the window on the first valid key instead of running it out.
    pub terminate_on_response: bool,
    pub context: &'a PhaseContext,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresentTiming {
    /// Stimulus onset on the session clock.
    pub onset: Duration,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureOutcome {
    pub onset: Duration,
    pub elapsed: Duration,
    /// First valid key registered inside the window.
    pub key: Option<String>,
    /// Reaction time measured from window onset.
    pub rt: Option<Duration>,
    pub timed_out: bool,
}

impl CaptureOutcome {
    pub fn no_response(onset: Duration, elapsed: Duration) -> Self {
        Self {
            onset,
            elapsed,
            key: None,
            rt: None,
            timed_out: true,
        }
    }
}

/// Shows stimuli for a fixed duration without reading input.
///
/// Implementations fire `onset_trigger` through `triggers` when the
/// stimuli become visible and must return no later than `duration`.
pub trait Presenter {
    type Error: std::error::Error + Send + Sync + 'static;

    fn present(
        &mut self,
        stimuli: &[StimulusId],
        duration: Duration,
        onset_trigger: Option<TriggerCode>,
        triggers: &mut dyn TriggerSink,
    ) -> Result<PresentTiming, Self::Error>;
}

/// Shows stimuli while listening for keys.
///
/// Fires `request.triggers.onset` at onset, `response` when a valid key is
/// registered (also when the window keeps running), and `timeout` when the
/// window closes with no key. Never blocks past `request.duration`.
///
/// Keys outside `valid_keys` or at/after the deadline should be dropped
/// before any trigger fires. If one is reported anyway, the trial engine
/// scores the window as a timeout and fires `timeout` itself, so the
/// trigger stream ends with the scored outcome.
pub trait ResponseCapture: Presenter {
    fn capture_response(
        &mut self,
        request: &CaptureRequest<'_>,
        triggers: &mut dyn TriggerSink,
    ) -> Result<CaptureOutcome, Self::Error>;
}
