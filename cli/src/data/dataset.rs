//! Process-wide metadata table.
//!
//! Loaded and validated once by [`init`], then shared read-only for the rest
//! of the process. Readers hold `&'static Fleet` and need no locking.

use std::sync::OnceLock;

use sentinel_health::{Fleet, LoadError};
use tracing::debug;

use crate::config::UserConfig;

static FLEET: OnceLock<Fleet> = OnceLock::new();

pub fn init(config: &UserConfig) -> Result<&'static Fleet, LoadError> {
    if let Some(fleet) = FLEET.get() {
        debug!("Dataset already loaded");
        return Ok(fleet);
    }

    let fleet = Fleet::load(&config.metadata_path)?;
    Ok(FLEET.get_or_init(|| fleet))
}
