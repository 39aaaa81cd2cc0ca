use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sst_core::{Direction, TriggerCode};

use crate::error::{ConfigError, ValidationIssue};
use crate::trial::{ResponseKeys, TrialDurations};

/// Event name -> code written to the trigger line.
pub type TriggerMap = BTreeMap<String, TriggerCode>;

/// Session settings, as found in the `task` / `controller` / `triggers`
/// sections of a task config file. Times are in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSettings {
    pub task: TaskConfig,
    pub controller: ControllerSettings,
    #[serde(default)]
    pub triggers: TriggerMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    pub total_blocks: usize,
    pub trials_per_block: usize,
    /// Fraction of go trials in a block.
    #[serde(default = "default_go_ratio")]
    pub go_ratio: f64,
    #[serde(default = "default_directions")]
    pub directions: Vec<Direction>,
    pub key_list: Vec<String>,
    pub left_key: String,
    pub right_key: String,
    pub fixation_duration: f64,
    pub go_duration: f64,
    pub no_response_feedback_duration: f64,
    /// Block `i` is shuffled with `seed + i`; unseeded blocks use OS entropy.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Longest allowed run of consecutive stop trials.
    #[serde(default = "default_max_stop_run")]
    pub max_stop_run: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerSettings {
    pub initial_ssd: f64,
    pub min_ssd: f64,
    pub max_ssd: f64,
    pub step: f64,
    /// Track a separate staircase per stop direction.
    #[serde(default)]
    pub condition_specific: bool,
}

fn default_go_ratio() -> f64 {
    0.75
}

fn default_directions() -> Vec<Direction> {
    Direction::ALL.to_vec()
}

fn default_max_stop_run() -> usize {
    3
}

impl Default for TaskSettings {
    fn default() -> Self {
        let triggers = [
            ("exp_onset", 98),
            ("exp_end", 99),
            ("block_onset", 100),
            ("block_end", 101),
            ("fixation_onset", 1),
            ("go_onset", 10),
            ("go_response", 11),
            ("go_miss", 12),
            ("no_response_feedback_onset", 13),
            ("pre_stop_onset", 20),
            ("pre_stop_response", 21),
            ("on_stop_onset", 30),
            ("on_stop_response", 31),
        ]
        .into_iter()
        .map(|(name, code)| (name.to_string(), code))
        .collect();

        Self {
            task: TaskConfig {
                total_blocks: 3,
                trials_per_block: 40,
                go_ratio: default_go_ratio(),
                directions: default_directions(),
                key_list: vec!["f".into(), "j".into()],
                left_key: "f".into(),
                right_key: "j".into(),
                fixation_duration: 0.5,
                go_duration: 1.0,
                no_response_feedback_duration: 0.8,
                seed: None,
                max_stop_run: default_max_stop_run(),
            },
            controller: ControllerSettings {
                initial_ssd: 0.25,
                min_ssd: 0.05,
                max_ssd: 0.5,
                step: 0.05,
                condition_specific: false,
            },
            triggers,
        }
    }
}

impl TaskSettings {
    /// Checks every field and reports all problems at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut issues = Vec::new();
        self.task.check(&mut issues);
        self.controller.check(&mut issues);

        if let (Ok(max_ssd), Ok(go)) = (
            seconds("controller.max_ssd", self.controller.max_ssd),
            seconds("task.go_duration", self.task.go_duration),
        ) {
            if max_ssd > go {
                issues.push(ValidationIssue::new(
                    "controller.max_ssd",
                    format!(
                        "must not exceed task.go_duration ({}s)",
                        self.task.go_duration
                    ),
                ));
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid { issues })
        }
    }

    pub fn durations(&self) -> Result<TrialDurations, ConfigError> {
        let to_config = |issue: ValidationIssue| ConfigError::Invalid {
            issues: vec![issue],
        };
        Ok(TrialDurations {
            fixation: positive("task.fixation_duration", self.task.fixation_duration)
                .map_err(to_config)?,
            go: positive("task.go_duration", self.task.go_duration).map_err(to_config)?,
            no_response_feedback: positive(
                "task.no_response_feedback_duration",
                self.task.no_response_feedback_duration,
            )
            .map_err(to_config)?,
        })
    }

    pub fn response_keys(&self) -> ResponseKeys {
        ResponseKeys {
            valid: self.task.key_list.clone(),
            left: self.task.left_key.clone(),
            right: self.task.right_key.clone(),
        }
    }
}

impl TaskConfig {
    fn check(&self, issues: &mut Vec<ValidationIssue>) {
        for (path, value) in [
            ("task.fixation_duration", self.fixation_duration),
            ("task.go_duration", self.go_duration),
            (
                "task.no_response_feedback_duration",
                self.no_response_feedback_duration,
            ),
        ] {
            if let Err(issue) = positive(path, value) {
                issues.push(issue);
            }
        }

        if self.total_blocks == 0 {
            issues.push(ValidationIssue::new("task.total_blocks", "must be at least 1"));
        }
        if self.trials_per_block == 0 {
            issues.push(ValidationIssue::new(
                "task.trials_per_block",
                "must be at least 1",
            ));
        }
        if !(0.0..=1.0).contains(&self.go_ratio) {
            issues.push(ValidationIssue::new(
                "task.go_ratio",
                format!("must be within [0, 1], got {}", self.go_ratio),
            ));
        }
        if self.max_stop_run == 0 {
            issues.push(ValidationIssue::new("task.max_stop_run", "must be at least 1"));
        }

        if self.directions.is_empty() {
            issues.push(ValidationIssue::new("task.directions", "must not be empty"));
        }
        let mut seen = Vec::new();
        for direction in &self.directions {
            if seen.contains(direction) {
                issues.push(ValidationIssue::new(
                    "task.directions",
                    format!("duplicate direction `{direction}`"),
                ));
            }
            seen.push(*direction);
        }

        if self.key_list.is_empty() {
            issues.push(ValidationIssue::new("task.key_list", "must not be empty"));
        }
        for (path, key) in [("task.left_key", &self.left_key), ("task.right_key", &self.right_key)]
        {
            if !self.key_list.contains(key) {
                issues.push(ValidationIssue::new(
                    path,
                    format!("key `{key}` is not in task.key_list"),
                ));
            }
        }
        if self.left_key == self.right_key {
            issues.push(ValidationIssue::new(
                "task.right_key",
                "must differ from task.left_key",
            ));
        }
    }
}

impl ControllerSettings {
    fn check(&self, issues: &mut Vec<ValidationIssue>) {
        if let Err(issue) = positive("controller.step", self.step) {
            issues.push(issue);
        }
        let bounds = (
            seconds("controller.min_ssd", self.min_ssd),
            seconds("controller.initial_ssd", self.initial_ssd),
            seconds("controller.max_ssd", self.max_ssd),
        );
        match bounds {
            (Ok(min), Ok(initial), Ok(max)) => {
                if min > max {
                    issues.push(ValidationIssue::new(
                        "controller.min_ssd",
                        "must not exceed controller.max_ssd",
                    ));
                } else if initial < min || initial > max {
                    issues.push(ValidationIssue::new(
                        "controller.initial_ssd",
                        format!("must lie within [{}, {}]", self.min_ssd, self.max_ssd),
                    ));
                }
            }
            (min, initial, max) => {
                issues.extend([min.err(), initial.err(), max.err()].into_iter().flatten());
            }
        }
    }
}

/// Converts a non-negative, finite number of seconds.
pub(crate) fn seconds(path: &str, value: f64) -> Result<Duration, ValidationIssue> {
    Duration::try_from_secs_f64(value).map_err(|_| {
        ValidationIssue::new(
            path,
            format!("must be a finite, non-negative number of seconds, got {value}"),
        )
    })
}

pub(crate) fn positive(path: &str, value: f64) -> Result<Duration, ValidationIssue> {
    let d = seconds(path, value)?;
    if d.is_zero() {
        return Err(ValidationIssue::new(path, "must be greater than zero"));
    }
    Ok(d)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_valid() {
        TaskSettings::default().validate().unwrap();
    }

    #[test]
    fn collects_all_issues() {
        let mut settings = TaskSettings::default();
        settings.task.go_duration = -1.0;
        settings.task.left_key = "x".into();
        settings.controller.step = 0.0;
        let err = settings.validate().unwrap_err();
        let paths: Vec<_> = err.issues().iter().map(|i| i.path.as_str()).collect();
        assert!(paths.contains(&"task.go_duration"));
        assert!(paths.contains(&"task.left_key"));
        assert!(paths.contains(&"controller.step"));
    }

    #[test]
    fn max_ssd_cannot_outlast_go_window() {
        let mut settings = TaskSettings::default();
        settings.controller.max_ssd = 1.5;
        let err = settings.validate().unwrap_err();
        assert_eq!(err.issues()[0].path, "controller.max_ssd");
    }

    #[test]
    fn initial_ssd_must_be_inside_bounds() {
        let mut settings = TaskSettings::default();
        settings.controller.initial_ssd = 0.01;
        let err = settings.validate().unwrap_err();
        assert_eq!(err.issues()[0].path, "controller.initial_ssd");
    }

    #[test]
    fn nan_durations_are_rejected() {
        assert!(seconds("x", f64::NAN).is_err());
        assert!(seconds("x", f64::INFINITY).is_err());
        assert!(positive("x", 0.0).is_err());
        assert_eq!(seconds("x", 0.25).unwrap(), Duration::from_millis(250));
    }

    #[test]
    fn deserializes_with_defaults() {
        let json = serde_json::json!({
            "task": {
                "total_blocks": 1,
                "trials_per_block": 8,
                "key_list": ["f", "j"],
                "left_key": "f",
                "right_key": "j",
                "fixation_duration": 0.5,
                "go_duration": 1.0,
                "no_response_feedback_duration": 0.8
            },
            "controller": {"initial_ssd": 0.25, "min_ssd": 0.0, "max_ssd": 0.5, "step": 0.05}
        });
        let settings: TaskSettings = serde_json::from_value(json).unwrap();
        assert_eq!(settings.task.go_ratio, 0.75);
        assert_eq!(settings.task.directions, vec![Direction::Left, Direction::Right]);
        assert!(settings.triggers.is_empty());
        assert!(!settings.controller.condition_specific);
        settings.validate().unwrap();
    }
}
