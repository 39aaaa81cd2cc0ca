//! Adaptive stop-signal delay.
//!
//! A 1-up/1-down staircase: a withheld response makes stopping harder by
//! pushing the stop signal later, a failed stop pulls it earlier. The
//! delay settles where stopping succeeds about half the time.

use std::collections::BTreeMap;
use std::time::Duration;

use sst_core::Direction;
use tracing::{debug, info};

use crate::config::{ControllerSettings, positive, seconds};
use crate::error::{ConfigError, ValidationIssue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaircaseParams {
    pub initial_ssd: Duration,
    pub min_ssd: Duration,
    pub max_ssd: Duration,
    pub step: Duration,
}

impl StaircaseParams {
    pub fn from_settings(settings: &ControllerSettings) -> Result<Self, ConfigError> {
        let mut issues = Vec::new();
        let mut take = |r: Result<Duration, ValidationIssue>| match r {
            Ok(d) => d,
            Err(issue) => {
                issues.push(issue);
                Duration::ZERO
            }
        };
        let params = Self {
            initial_ssd: take(seconds("controller.initial_ssd", settings.initial_ssd)),
            min_ssd: take(seconds("controller.min_ssd", settings.min_ssd)),
            max_ssd: take(seconds("controller.max_ssd", settings.max_ssd)),
            step: take(positive("controller.step", settings.step)),
        };
        if !issues.is_empty() {
            return Err(ConfigError::Invalid { issues });
        }
        params.check()?;
        Ok(params)
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.step.is_zero() {
            return Err(ConfigError::invalid("controller.step", "must be greater than zero"));
        }
        if self.min_ssd > self.max_ssd {
            return Err(ConfigError::invalid(
                "controller.min_ssd",
                "must not exceed controller.max_ssd",
            ));
        }
        if self.initial_ssd < self.min_ssd || self.initial_ssd > self.max_ssd {
            return Err(ConfigError::invalid(
                "controller.initial_ssd",
                "must lie within [min_ssd, max_ssd]",
            ));
        }
        Ok(())
    }
}

/// One staircase track.
///
/// `min_ssd <= get_ssd() <= max_ssd` holds after every update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Staircase {
    params: StaircaseParams,
    current: Duration,
    history: Vec<bool>,
}

impl Staircase {
    pub fn new(params: StaircaseParams) -> Result<Self, ConfigError> {
        params.check()?;
        Ok(Self {
            params,
            current: params.initial_ssd,
            history: Vec::new(),
        })
    }

    pub fn get_ssd(&self) -> Duration {
        self.current
    }

    /// Records one stop-trial outcome (`true` = response withheld) and
    /// moves the delay by one step, clamped to the bounds.
    pub fn update(&mut self, success: bool) {
        let before = self.current;
        self.current = if success {
            (self.current + self.params.step).min(self.params.max_ssd)
        } else {
            self.current
                .saturating_sub(self.params.step)
                .max(self.params.min_ssd)
        };
        self.history.push(success);

        debug!(
            success,
            ssd_before_ms = before.as_secs_f64() * 1e3,
            ssd_ms = self.current.as_secs_f64() * 1e3,
            outcomes = self.history.len(),
            "staircase updated"
        );
        if self.current != before && (self.at_floor() || self.at_ceiling()) {
            info!(ssd_ms = self.current.as_secs_f64() * 1e3, "staircase reached a bound");
        }
    }

    pub fn history(&self) -> &[bool] {
        &self.history
    }

    pub fn at_floor(&self) -> bool {
        self.current == self.params.min_ssd
    }

    pub fn at_ceiling(&self) -> bool {
        self.current == self.params.max_ssd
    }

    /// Share of withheld responses so far, `None` before the first stop trial.
    pub fn success_rate(&self) -> Option<f64> {
        if self.history.is_empty() {
            return None;
        }
        let successes = self.history.iter().filter(|s| **s).count();
        Some(successes as f64 / self.history.len() as f64)
    }
}

/// Staircase state owned by a session: one shared track, or one track per
/// stop direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaircaseController {
    Shared(Staircase),
    PerDirection {
        params: StaircaseParams,
        tracks: BTreeMap<Direction, Staircase>,
    },
}

impl StaircaseController {
    pub fn shared(params: StaircaseParams) -> Result<Self, ConfigError> {
        Ok(Self::Shared(Staircase::new(params)?))
    }

    pub fn per_direction(
        params: StaircaseParams,
        directions: &[Direction],
    ) -> Result<Self, ConfigError> {
        params.check()?;
        let tracks = directions
            .iter()
            .map(|d| Staircase::new(params).map(|s| (*d, s)))
            .collect::<Result<BTreeMap<_, _>, _>>()?;
        Ok(Self::PerDirection { params, tracks })
    }

    pub fn from_settings(
        settings: &ControllerSettings,
        directions: &[Direction],
    ) -> Result<Self, ConfigError> {
        let params = StaircaseParams::from_settings(settings)?;
        if settings.condition_specific {
            Self::per_direction(params, directions)
        } else {
            Self::shared(params)
        }
    }

    /// Track serving stop trials cued in `direction`. A direction with no
    /// track of its own gets one lazily, starting from the initial SSD.
    fn track_mut(&mut self, direction: Direction) -> &mut Staircase {
        match self {
            Self::Shared(track) => track,
            Self::PerDirection { params, tracks } => {
                let params = *params;
                tracks.entry(direction).or_insert_with(|| Staircase {
                    params,
                    current: params.initial_ssd,
                    history: Vec::new(),
                })
            }
        }
    }

    pub fn track(&self, direction: Direction) -> Option<&Staircase> {
        match self {
            Self::Shared(track) => Some(track),
            Self::PerDirection { tracks, .. } => tracks.get(&direction),
        }
    }

    pub fn get_ssd_for(&self, direction: Direction) -> Duration {
        match self.track(direction) {
            Some(track) => track.get_ssd(),
            None => self.params().initial_ssd,
        }
    }

    pub fn update_for(&mut self, direction: Direction, success: bool) {
        self.track_mut(direction).update(success);
    }

    pub fn params(&self) -> StaircaseParams {
        match self {
            Self::Shared(track) => track.params,
            Self::PerDirection { params, .. } => *params,
        }
    }

    /// Outcomes recorded across every track.
    pub fn total_outcomes(&self) -> usize {
        match self {
            Self::Shared(track) => track.history.len(),
            Self::PerDirection { tracks, .. } => tracks.values().map(|t| t.history.len()).sum(),
        }
    }

    /// Current SSD per direction. A shared track reports under every
    /// requested direction.
    pub fn snapshot(&self, directions: &[Direction]) -> BTreeMap<Direction, Duration> {
        directions
            .iter()
            .map(|d| (*d, self.get_ssd_for(*d)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn params(initial_ms: u64, min_ms: u64, max_ms: u64, step_ms: u64) -> StaircaseParams {
        StaircaseParams {
            initial_ssd: Duration::from_millis(initial_ms),
            min_ssd: Duration::from_millis(min_ms),
            max_ssd: Duration::from_millis(max_ms),
            step: Duration::from_millis(step_ms),
        }
    }

    #[test]
    fn success_raises_failure_lowers() {
        let mut s = Staircase::new(params(200, 0, 500, 50)).unwrap();
        s.update(true);
        assert_eq!(s.get_ssd(), Duration::from_millis(250));
        s.update(false);
        assert_eq!(s.get_ssd(), Duration::from_millis(200));
        assert_eq!(s.history(), &[true, false]);
    }

    #[test]
    fn converts_seconds_from_settings() {
        let settings = ControllerSettings {
            initial_ssd: 0.2,
            min_ssd: 0.0,
            max_ssd: 0.5,
            step: 0.05,
            condition_specific: false,
        };
        let p = StaircaseParams::from_settings(&settings).unwrap();
        let mut s = Staircase::new(p).unwrap();
        s.update(true);
        assert_eq!(s.get_ssd(), Duration::from_millis(250));
        s.update(false);
        assert_eq!(s.get_ssd(), Duration::from_millis(200));
    }

    #[test]
    fn clamps_at_bounds_and_still_records() {
        let mut s = Staircase::new(params(450, 0, 500, 50)).unwrap();
        s.update(true);
        s.update(true);
        assert_eq!(s.get_ssd(), Duration::from_millis(500));
        assert!(s.at_ceiling());

        let mut s = Staircase::new(params(20, 0, 500, 50)).unwrap();
        s.update(false);
        assert_eq!(s.get_ssd(), Duration::ZERO);
        assert!(s.at_floor());
        s.update(false);
        assert_eq!(s.get_ssd(), Duration::ZERO);
        assert_eq!(s.history().len(), 2);
    }

    #[test]
    fn rejects_zero_step_and_inverted_bounds() {
        assert!(Staircase::new(params(200, 0, 500, 0)).is_err());
        assert!(Staircase::new(params(200, 300, 100, 50)).is_err());
        assert!(Staircase::new(params(600, 0, 500, 50)).is_err());
    }

    #[test]
    fn success_rate_tracks_history() {
        let mut s = Staircase::new(params(200, 0, 500, 50)).unwrap();
        assert_eq!(s.success_rate(), None);
        s.update(true);
        s.update(false);
        s.update(true);
        s.update(true);
        assert_eq!(s.success_rate(), Some(0.75));
    }

    #[test]
    fn per_direction_tracks_move_independently() {
        let mut c =
            StaircaseController::per_direction(params(250, 0, 500, 50), &Direction::ALL).unwrap();
        c.update_for(Direction::Left, true);
        c.update_for(Direction::Right, false);
        c.update_for(Direction::Right, false);
        assert_eq!(c.get_ssd_for(Direction::Left), Duration::from_millis(300));
        assert_eq!(c.get_ssd_for(Direction::Right), Duration::from_millis(150));
        assert_eq!(c.total_outcomes(), 3);
    }

    #[test]
    fn shared_track_serves_every_direction() {
        let mut c = StaircaseController::shared(params(250, 0, 500, 50)).unwrap();
        c.update_for(Direction::Left, true);
        c.update_for(Direction::Right, true);
        assert_eq!(c.get_ssd_for(Direction::Left), Duration::from_millis(350));
        assert_eq!(c.get_ssd_for(Direction::Right), Duration::from_millis(350));
        assert_eq!(c.total_outcomes(), 2);
    }

    #[test]
    fn per_direction_adds_missing_tracks_on_update() {
        let mut c =
            StaircaseController::per_direction(params(250, 0, 500, 50), &[Direction::Left])
                .unwrap();
        assert_eq!(c.get_ssd_for(Direction::Right), Duration::from_millis(250));
        c.update_for(Direction::Right, true);
        assert_eq!(c.get_ssd_for(Direction::Right), Duration::from_millis(300));
        assert_eq!(c.get_ssd_for(Direction::Left), Duration::from_millis(250));
    }

    proptest! {
        #[test]
        fn ssd_stays_within_bounds(
            outcomes in proptest::collection::vec(any::<bool>(), 0..200),
            step_ms in 1u64..200,
        ) {
            let p = params(250, 50, 500, step_ms);
            let mut s = Staircase::new(p).unwrap();
            for success in outcomes {
                let before = s.get_ssd();
                s.update(success);
                prop_assert!(s.get_ssd() >= p.min_ssd && s.get_ssd() <= p.max_ssd);
                if success {
                    prop_assert!(s.get_ssd() >= before);
                } else {
                    prop_assert!(s.get_ssd() <= before);
                }
            }
        }
    }
}
