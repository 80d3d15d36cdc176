// ⚙️ Run Configuration
// Small JSON config loaded from the data directory. Everything has a
// default so a missing file means "no region filter, stock throttle".

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

fn default_throttle_ms() -> u64 {
    800
}

/// Run-scoped settings (`config.json` in the data directory).
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// County codes the catalog covers (e.g. ["ALA", "CCA"]). A rare-plant
    /// record is expected locally when its county list intersects this
    /// set; an empty set disables the filter.
    #[serde(default)]
    pub local_counties: Vec<String>,

    /// Delay between successive remote name-lookup calls
    #[serde(default = "default_throttle_ms")]
    pub lookup_throttle_ms: u64,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Config::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: Config =
            serde_json::from_str(&content).context("Failed to parse config JSON")?;
        Ok(config)
    }

    /// True when a record with these counties is expected in the catalog
    pub fn is_local(&self, counties: &[String]) -> bool {
        if self.local_counties.is_empty() {
            return true;
        }
        counties.iter().any(|c| self.local_counties.contains(c))
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            local_counties: Vec::new(),
            lookup_throttle_ms: default_throttle_ms(),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
