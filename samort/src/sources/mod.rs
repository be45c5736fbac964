//! One module per source country. Each adapter owns its URLs, its rename and
//! typo tables, its request timeouts and its source-format parsing, and
//! returns frames already in canonical storage shape. Parsing is kept in
//! plain functions over fetched content so it can be tested offline.

pub mod bolivia;
pub mod brazil;
pub mod chile;
pub mod colombia;
pub mod ecuador;
pub mod paraguay;
pub mod peru;
pub mod powerbi;

use anyhow::Result;
use polars::prelude::DataFrame;
use strum_macros::{Display, EnumIter};

use crate::pipeline::Lookups;
use crate::record::Target;

/// Frames produced by one country's update, keyed by target table.
pub type CountryOutput = Vec<(Target, DataFrame)>;

/// The configured source countries, in run order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum Source {
    Chile,
    Brazil,
    Ecuador,
    Colombia,
    Peru,
    Paraguay,
    Bolivia,
}

impl Source {
    /// Fetch, parse and normalize this country's data. Any failure makes the
    /// whole country contribute nothing for this run; the caller is expected
    /// to log it and carry on with the remaining sources.
    pub async fn update(&self, lookups: &Lookups) -> Result<CountryOutput> {
        match self {
            Source::Chile => chile::update(lookups).await,
            Source::Brazil => brazil::update(lookups).await,
            Source::Ecuador => ecuador::update(lookups).await,
            Source::Colombia => colombia::update(lookups).await,
            Source::Peru => peru::update(lookups).await,
            Source::Paraguay => paraguay::update(lookups).await,
            Source::Bolivia => bolivia::update(lookups).await,
        }
    }
}
