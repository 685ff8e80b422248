//! Process settings: control socket address plus the pipeline config.
//!
//! Loaded from an optional JSON file (first CLI argument or
//! `FSIFT_ANALYZER_CONFIG`) with `FSIFT_*` environment overrides.

use fsift_models::AnalyzerConfig;
use serde::{Deserialize, Serialize};

/// Everything the analyzer binary needs to come up.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerSettings {
    /// Address of the request/reply control socket.
    pub control_addr: String,
    pub analyzer: AnalyzerConfig,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            control_addr: "127.0.0.1:5550".to_string(),
            analyzer: AnalyzerConfig::default(),
        }
    }
}

/// Load settings from the given file (if any) and the environment.
pub fn load(config_path: Option<&str>) -> anyhow::Result<AnalyzerSettings> {
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
        .try_deserialize::<AnalyzerSettings>()?;
    Ok(settings)
}
