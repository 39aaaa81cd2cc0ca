use sst_core::{PhaseName, PhaseTriggers, TriggerCode, TriggerError, TriggerPort, TriggerSink};
use tracing::{trace, warn};

use crate::config::TriggerMap;

/// Named trigger emission, as handed to block and trial hooks.
pub trait TriggerEmitter: TriggerSink {
    fn code(&self, name: &str) -> Option<TriggerCode>;

    /// Fires the code configured for `name`; unknown names are a no-op.
    fn emit(&mut self, name: &str) {
        let code = self.code(name);
        self.fire(code);
    }

    /// Codes for a phase's onset, response and timeout events.
    fn phase_triggers(&self, phase: PhaseName) -> PhaseTriggers {
        PhaseTriggers {
            onset: self.code(phase.onset_trigger()),
            response: phase.response_trigger().and_then(|name| self.code(name)),
            timeout: phase.timeout_trigger().and_then(|name| self.code(name)),
        }
    }
}

/// Best-effort wrapper around a trigger port.
///
/// Looks codes up by event name and swallows transmission failures after
/// logging them, so a flaky port never aborts a trial.
#[derive(Debug)]
pub struct TriggerLine<P> {
    port: P,
    codes: TriggerMap,
    sent: u64,
    failed: u64,
}

impl<P: TriggerPort> TriggerLine<P> {
    pub fn new(port: P, codes: TriggerMap) -> Self {
        Self {
            port,
            codes,
            sent: 0,
            failed: 0,
        }
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub fn failed(&self) -> u64 {
        self.failed
    }

    pub fn port(&self) -> &P {
        &self.port
    }
}

impl<P: TriggerPort> TriggerSink for TriggerLine<P> {
    fn fire(&mut self, code: Option<TriggerCode>) {
        let Some(code) = code else {
            return;
        };
        match self.port.send(code) {
            Ok(()) => {
                self.sent += 1;
                trace!(code, "trigger sent");
            }
            Err(err) => {
                self.failed += 1;
                warn!(code, error = %err, "trigger transmission failed; continuing");
            }
        }
    }
}

impl<P: TriggerPort> TriggerEmitter for TriggerLine<P> {
    fn code(&self, name: &str) -> Option<TriggerCode> {
        self.codes.get(name).copied()
    }
}

/// Port that keeps every code it was asked to send. Stands in for the
/// hardware line in simulation runs and tests.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MockTriggerPort {
    pub sent: Vec<TriggerCode>,
    /// Reject every send, to exercise the error path.
    pub fail: bool,
}

impl MockTriggerPort {
    pub fn failing() -> Self {
        Self {
            sent: Vec::new(),
            fail: true,
        }
    }
}

impl TriggerPort for MockTriggerPort {
    fn send(&mut self, code: TriggerCode) -> Result<(), TriggerError> {
        if self.fail {
            return Err(TriggerError::Send {
                code,
                message: "mock port configured to fail".into(),
            });
        }
        self.sent.push(code);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codes() -> TriggerMap {
        [("go_onset", 10), ("go_response", 11), ("block_onset", 100)]
            .into_iter()
            .map(|(n, c)| (n.to_string(), c))
            .collect()
    }

    #[test]
    fn missing_names_are_no_ops() {
        let mut line = TriggerLine::new(MockTriggerPort::default(), codes());
        line.emit("block_onset");
        line.emit("block_end");
        line.fire(None);
        assert_eq!(line.port().sent, vec![100]);
        assert_eq!(line.sent(), 1);
    }

    #[test]
    fn failures_are_counted_not_raised() {
        let mut line = TriggerLine::new(MockTriggerPort::failing(), codes());
        line.emit("go_onset");
        line.emit("go_response");
        assert_eq!(line.failed(), 2);
        assert!(line.port().sent.is_empty());
    }

    #[test]
    fn resolves_phase_codes() {
        let line = TriggerLine::new(MockTriggerPort::default(), codes());
        let go = line.phase_triggers(PhaseName::GoResponseWindow);
        assert_eq!(go.onset, Some(10));
        assert_eq!(go.response, Some(11));
        assert_eq!(go.timeout, None);
        assert_eq!(line.phase_triggers(PhaseName::Fixation), PhaseTriggers::default());
    }
}
