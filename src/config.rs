use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::hardware::HardwareConfig;
use crate::plan::ModelConfig;

/// Saved defaults for the CLI. Any field may be omitted from the file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub model: ModelConfig,
    pub hardware: HardwareConfig,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&text)?;
        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Config from `path` when given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EstimateError;
    use crate::hardware::MemoryTopology;
    use std::io::Write;

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"model": {{"param_count_b": 70, "context_length": 8192}},
                "hardware": {{"topology": "unified", "system_ram_gb": 128}}}}"#
        )
        .unwrap();

        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.model.param_count_b, 70.0);
        assert_eq!(config.model.context_length, 8192);
        assert_eq!(config.model.bits_per_weight, 4.0);
        assert_eq!(config.hardware.topology, MemoryTopology::Unified);
        assert_eq!(config.hardware.system_ram_gb, 128.0);
        assert!(config.hardware.allow_offload);
    }

    #[test]
    fn saved_config_loads_back() {
        let config = AppConfig::default();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(config.to_json().unwrap().as_bytes()).unwrap();
        assert_eq!(AppConfig::load(file.path()).unwrap(), config);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = AppConfig::load(Path::new("/nonexistent/llmperf.json")).unwrap_err();
        assert!(matches!(err, EstimateError::Io(_)));
    }

    #[test]
    fn malformed_file_is_json_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        let err = AppConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, EstimateError::Json(_)));
    }

    #[test]
    fn no_path_gives_defaults() {
        assert_eq!(AppConfig::load_or_default(None).unwrap(), AppConfig::default());
    }
}
