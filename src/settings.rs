use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment};
use serde::Deserialize;

use crate::location::geocoder::NOMINATIM_SEARCH_URL;

/// Runtime settings: built-in defaults overridden by `NUFORC_*` environment
/// variables (`NUFORC_DB_PATH`, `NUFORC_MIN_INTERVAL_MS`, ...).
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub db_path: PathBuf,
    pub geocoder_url: String,
    pub user_agent: String,
    pub result_limit: u32,
    pub min_interval_ms: u64,
    pub request_timeout_secs: u64,
    /// Persist the lookup cache after this many resolutions.
    pub save_every: usize,
}

impl Settings {
    pub fn load() -> Result<Self> {
        Self::build(Environment::with_prefix("NUFORC").try_parsing(true))
    }

    fn build(env: Environment) -> Result<Self> {
        Config::builder()
            .set_default("db_path", "data/nuforc.sqlite")?
            .set_default("geocoder_url", NOMINATIM_SEARCH_URL)?
            .set_default(
                "user_agent",
                concat!("nuforc_normalize/", env!("CARGO_PKG_VERSION")),
            )?
            .set_default("result_limit", 10_i64)?
            .set_default("min_interval_ms", 800_i64)?
            .set_default("request_timeout_secs", 30_i64)?
            .set_default("save_every", 1000_i64)?
            .add_source(env)
            .build()
            .and_then(|c| c.try_deserialize())
            .context("Invalid NUFORC_* settings")
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
