//! YAML task config loading.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use sst_experiment::{ConfigError, SimulationConfig, TaskSettings};
use tracing::debug;

/// A task config file: the `task` / `controller` / `triggers` sections
/// plus an optional `simulation` section for the scripted participant.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AppConfig {
    #[serde(flatten)]
    pub settings: TaskSettings,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

/// Reads, parses and validates `path`.
pub fn load(path: &Path) -> Result<AppConfig, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse(path, &raw)
}

/// Parses and validates config text. `path` is only used in errors.
pub fn parse(path: &Path, raw: &str) -> Result<AppConfig, ConfigError> {
    let config: AppConfig = serde_yaml::from_str(raw).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    config.settings.validate()?;
    debug!(
        config = %path.display(),
        blocks = config.settings.task.total_blocks,
        trials_per_block = config.settings.task.trials_per_block,
        triggers = config.settings.triggers.len(),
        "config loaded"
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"
task:
  total_blocks: 2
  trials_per_block: 16
  key_list: [f, j]
  left_key: f
  right_key: j
  fixation_duration: 0.5
  go_duration: 1.0
  no_response_feedback_duration: 0.8
controller:
  initial_ssd: 0.25
  min_ssd: 0.05
  max_ssd: 0.5
  step: 0.05
triggers:
  go_onset: 10
  on_stop_onset: 30
"#;

    #[test]
    fn parses_minimal_file_with_defaults() {
        let cfg = parse(Path::new("task.yaml"), MINIMAL).unwrap();
        assert_eq!(cfg.settings.task.total_blocks, 2);
        assert_eq!(cfg.settings.task.go_ratio, 0.75);
        assert_eq!(cfg.settings.triggers["on_stop_onset"], 30);
        assert_eq!(cfg.simulation, SimulationConfig::default());
    }

    #[test]
    fn reads_simulation_section() {
        let raw = format!("{MINIMAL}simulation:\n  go_rt: 0.38\n  seed: 4\n");
        let cfg = parse(Path::new("task.yaml"), &raw).unwrap();
        assert_eq!(cfg.simulation.go_rt, 0.38);
        assert_eq!(cfg.simulation.seed, Some(4));
        assert_eq!(cfg.simulation.ssrt, SimulationConfig::default().ssrt);
    }

    #[test]
    fn syntax_errors_are_parse_errors() {
        let err = parse(Path::new("bad.yaml"), "task: [unclosed").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("bad.yaml"));
    }

    #[test]
    fn out_of_range_values_are_validation_errors() {
        let raw = MINIMAL.replace("max_ssd: 0.5", "max_ssd: 1.5");
        let err = parse(Path::new("task.yaml"), &raw).unwrap_err();
        assert_eq!(err.issues()[0].path, "controller.max_ssd");
    }

    #[test]
    fn loads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();
        let cfg = load(file.path()).unwrap();
        assert_eq!(cfg.settings.task.trials_per_block, 16);
    }

    #[test]
    fn bundled_config_is_valid() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/sst.yaml");
        let cfg = load(&path).unwrap();
        assert_eq!(cfg.settings, TaskSettings::default());
        cfg.simulation.horse_race().unwrap();
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(&dir.path().join("nope.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
