//! Stop-signal task: adaptive SSD staircase, per-trial phase engine and
//! block sequencing, driven through the service traits of `sst-core`.

pub mod config;
pub mod error;
pub mod sequencer;
pub mod session;
pub mod sim;
pub mod staircase;
pub mod state;
pub mod trial;
pub mod trigger;

pub use config::{ControllerSettings, TaskConfig, TaskSettings, TriggerMap};
pub use error::{ConfigError, SessionError, ValidationIssue};
pub use sequencer::{ConditionSequencer, longest_stop_run};
pub use session::{
    BlockHooks, BlockInfo, BlockResult, BlockSummary, NoHooks, Session, SessionResult,
    TriggerHooks, run_session,
};
pub use sim::{FrameLog, ParticipantPolicy, ScriptedParticipant, SimulationConfig};
pub use staircase::{Staircase, StaircaseController, StaircaseParams};
pub use state::TrialEngine;
pub use trial::{ResponseKeys, TrialDurations, TrialMeta};
pub use trigger::{MockTriggerPort, TriggerEmitter, TriggerLine};
