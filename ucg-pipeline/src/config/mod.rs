//! Configuration loader and validator.
//!
//! Responsibilities: read environment variables to populate [`model::UcgConfig`],
//! apply defaults when values are missing, validate constraints.

pub mod model;

use anyhow::Result;
use std::path::Path;

/// Load [`model::UcgConfig`] from ENV variables, falling back to defaults.
pub fn load_from_env_or_default(root: &Path) -> Result<model::UcgConfig> {
    model::UcgConfig::load_from_env_or_default(root)
}
