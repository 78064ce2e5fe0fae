//! JSON run-configuration files.

use std::fs;
use std::path::Path;

use tracing::debug;

use cf_types::{config_error, CfResult, RawRunConfig};

/// Load operator input from a JSON file. Missing fields take their defaults.
pub fn load_run_config(path: impl AsRef<Path>) -> CfResult<RawRunConfig> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .map_err(|e| config_error!("cannot read run configuration {}: {e}", path.display()))?;
    let raw: RawRunConfig = serde_json::from_str(&text)
        .map_err(|e| config_error!("invalid run configuration {}: {e}", path.display()))?;
    debug!(path = %path.display(), algorithm = %raw.algorithm, "loaded run configuration");
    Ok(raw)
}

/// Write operator input as pretty JSON, e.g. to keep alongside results.
pub fn save_run_config(raw: &RawRunConfig, path: impl AsRef<Path>) -> CfResult<()> {
    let json = serde_json::to_string_pretty(raw)?;
    fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cf_types::{Algorithm, Direction, RawBound};

    #[test]
    fn load_and_resolve() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        fs::write(
            &path,
            r#"{
                "algorithm": "shgo_sobol",
                "executable": "python eggholder.py",
                "output": "out.csv",
                "tolerance": "0.001",
                "direction": "minimize",
                "workers": "four",
                "bounds": [
                    {"name": "x1", "lower": "-512", "upper": "512"},
                    {"name": "x2", "lower": -512, "upper": 512}
                ]
            }"#,
        )
        .unwrap();

        let raw = load_run_config(&path).unwrap();
        let config = raw.resolve().unwrap();
        assert_eq!(config.direction, Direction::Minimize);
        assert_eq!(config.bounds.len(), 2);
        assert!(matches!(config.algorithm, Algorithm::PartitionSampleSobol(ref s) if s.workers == 1));
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("saved.json");
        let raw = RawRunConfig {
            algorithm: "dual_annealing".into(),
            executable: "./objective".into(),
            bounds: vec![RawBound::new("a", "0", "1")],
            seed: Some(4),
            ..Default::default()
        };
        save_run_config(&raw, &path).unwrap();
        assert_eq!(load_run_config(&path).unwrap(), raw);
    }

    #[test]
    fn bad_files_are_config_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_run_config(dir.path().join("missing.json"))
            .unwrap_err()
            .is_config());

        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(load_run_config(&path).unwrap_err().is_config());
    }
}
