//! Lookup of raw first-level division names against the geocode reference
//! table.

use std::collections::HashMap;

use anyhow::{Context, Result};
use polars::prelude::*;

use crate::error::SamortError;
use crate::text::fold;
use crate::COL;

/// A raw name resolved to its canonical form.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedDivision {
    pub geocode: String,
    pub name: String,
}

/// The geocode reference table, loaded once at startup and immutable for the
/// rest of the run. Rows are (geocode, name); a geocode may appear on several
/// rows, in which case the first row carries the canonical name and the rest
/// are aliases that resolve to it.
#[derive(Debug)]
pub struct GeoRef {
    entries: Vec<(String, String)>,
    canonical: HashMap<String, String>,
}

impl GeoRef {
    pub fn from_csv(path: &str) -> Result<Self> {
        let df = CsvReadOptions::default()
            .with_has_header(true)
            .try_into_reader_with_file_path(Some(path.into()))
            .with_context(|| format!("failed to open geocode table '{path}'"))?
            .finish()
            .with_context(|| format!("failed to read geocode table '{path}'"))?;
        Self::from_frame(&df)
    }

    pub fn from_frame(df: &DataFrame) -> Result<Self> {
        let geocodes = df.column(COL::GEOCODE)?.str()?;
        let names = df.column(COL::NAME)?.str()?;

        let mut entries = Vec::with_capacity(df.height());
        let mut canonical: HashMap<String, String> = HashMap::new();
        for (geocode, name) in geocodes.into_iter().zip(names) {
            let (Some(geocode), Some(name)) = (geocode, name) else {
                continue;
            };
            entries.push((geocode.to_string(), name.to_string()));
            canonical
                .entry(geocode.to_string())
                .or_insert_with(|| name.to_string());
        }
        Ok(Self { entries, canonical })
    }

    /// Resolve a set of raw adm1 names for one country. Keys are matched
    /// diacritic-insensitively; on duplicate normalized names within the
    /// country the first table entry wins. Any name the table does not know
    /// fails the whole call: irregular source spellings are expected to be
    /// pre-mapped by the adapters' rename tables before they get here.
    pub fn resolve<'a>(
        &self,
        raw_names: impl IntoIterator<Item = &'a str>,
        iso: &str,
    ) -> Result<HashMap<String, ResolvedDivision>> {
        let mut by_key: HashMap<String, &str> = HashMap::new();
        for (geocode, name) in &self.entries {
            if !geocode.starts_with(iso) {
                continue;
            }
            by_key.entry(fold(name)).or_insert(geocode.as_str());
        }

        let mut resolved = HashMap::new();
        for raw in raw_names {
            let geocode = by_key
                .get(&fold(raw))
                .ok_or_else(|| SamortError::UnknownDivision(raw.to_string()))?;
            let name = self
                .canonical
                .get(*geocode)
                .expect("every entry geocode has a canonical name")
                .clone();
            resolved.insert(
                raw.to_string(),
                ResolvedDivision {
                    geocode: geocode.to_string(),
                    name,
                },
            );
        }
        Ok(resolved)
    }
}
