use anyhow::Result;
use log::debug;

use crate::config::Config;
use crate::pipeline::{Lookups, RunSummary};

// Re-exports
pub use column_names as COL;

// Modules
pub mod column_names;
pub mod config;
pub mod error;
pub mod georef;
pub mod merge;
pub mod normalize;
pub mod pipeline;
pub mod population;
pub mod record;
pub mod sources;
pub mod text;

/// Type for the mortality update pipeline and API
pub struct Samort {
    pub config: Config,
    pub lookups: Lookups,
}

impl Samort {
    /// Setup the Samort object with default configuration
    pub fn new() -> Result<Self> {
        Self::new_with_config(Config::default())
    }

    /// Setup the Samort object with custom configuration; loads the static
    /// reference tables once.
    pub fn new_with_config(config: Config) -> Result<Self> {
        debug!("config: {config:?}");
        let lookups = Lookups::load(&config)?;
        Ok(Self { config, lookups })
    }

    /// One full fetch-normalize-merge cycle across all configured sources.
    pub async fn run(&self) -> Result<RunSummary> {
        pipeline::run(&self.config, &self.lookups).await
    }
}
