pub mod phase;
pub mod service;
pub mod stimulus;
pub mod trial;

pub use phase::PhaseName;
pub use service::{
    CaptureOutcome, CaptureRequest, PhaseContext, PhaseTriggers, PresentTiming, Presenter,
    ResponseCapture, TriggerCode, TriggerError, TriggerPort, TriggerSink,
};
pub use stimulus::{Direction, StimulusId};
pub use trial::{PhaseRecord, TrialKind, TrialLabel, TrialRecord, TrialState};
