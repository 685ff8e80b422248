//! Process settings: control socket address plus the recorder config.
//!
//! Loaded from an optional JSON file (first CLI argument or
//! `FSIFT_RECORDER_CONFIG`) with `FSIFT_*` environment overrides.

use fsift_models::RecorderConfig;
use serde::{Deserialize, Serialize};

/// Everything the recorder binary needs to come up.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderSettings {
    /// Address of the request/reply control socket.
    pub control_addr: String,
    pub recorder: RecorderConfig,
}

impl Default for RecorderSettings {
    fn default() -> Self {
        Self {
            control_addr: "127.0.0.1:5540".to_string(),
            recorder: RecorderConfig::default(),
        }
    }
}

/// Load settings from the given file (if any) and the environment.
pub fn load(config_path: Option<&str>) -> anyhow::Result<RecorderSettings> {
    let mut builder = config::Config::builder();
    if let Some(path) = config_path {
        builder = builder.add_source(config::File::with_name(path));
    }
    let settings = builder
        .add_source(
            config::Environment::with_prefix("FSIFT")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize::<RecorderSettings>()?;
    Ok(settings)
}
