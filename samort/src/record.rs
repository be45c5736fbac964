use std::path::PathBuf;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

use crate::config::Config;

/// One raw observation as produced by a source adapter: a first-level
/// division name (in whatever spelling the adapter has already cleaned up),
/// an optional second-level division name, a calendar date and a death
/// count. Counts stay fractional until the normalizer's final integer cast.
#[derive(Clone, Debug, PartialEq)]
pub struct MortalityRecord {
    pub adm1: String,
    pub adm2: Option<String>,
    pub date: NaiveDate,
    pub deaths: f64,
}

impl MortalityRecord {
    pub fn adm1(adm1: impl Into<String>, date: NaiveDate, deaths: f64) -> Self {
        Self {
            adm1: adm1.into(),
            adm2: None,
            date,
            deaths,
        }
    }

    pub fn adm2(
        adm1: impl Into<String>,
        adm2: impl Into<String>,
        date: NaiveDate,
        deaths: f64,
    ) -> Self {
        Self {
            adm1: adm1.into(),
            adm2: Some(adm2.into()),
            date,
            deaths,
        }
    }
}

/// Reporting cadence of a source, stored verbatim in the `frequency` column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
}

/// Country metadata attached to every canonical row built from a source.
#[derive(Clone, Copy, Debug)]
pub struct CountryMeta {
    pub iso: &'static str,
    pub country: &'static str,
    pub frequency: Frequency,
}

/// The two persisted target tables.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum Target {
    #[strum(serialize = "south.america.subnational.mortality")]
    Subnational,
    #[strum(serialize = "south.america.cities.mortality")]
    Cities,
}

impl Target {
    pub fn table_name(&self) -> String {
        self.to_string()
    }

    /// Path of the persisted CSV for this target.
    pub fn storage_path(&self, config: &Config) -> PathBuf {
        PathBuf::from(&config.storage_dir).join(format!("{self}.csv"))
    }
}
