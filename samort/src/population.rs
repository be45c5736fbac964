//! The population reference table and the tracked-city selection derived
//! from it.

use std::collections::{HashMap, HashSet};

use anyhow::{Context, Result};
use itertools::izip;
use polars::prelude::*;

use crate::text::fold;
use crate::COL;

/// The population table, loaded once at startup. Rows are
/// (country, adm1, adm2, adm3, population); adm3 granularity is only used
/// for sources that report below the city level.
#[derive(Debug)]
pub struct Population {
    rows: Vec<PopulationRow>,
}

#[derive(Clone, Debug)]
struct PopulationRow {
    country: String,
    adm1: String,
    adm2: String,
    adm3: String,
    population: i64,
}

impl Population {
    pub fn from_csv(path: &str) -> Result<Self> {
        let df = CsvReadOptions::default()
            .with_has_header(true)
            .try_into_reader_with_file_path(Some(path.into()))
            .with_context(|| format!("failed to open population table '{path}'"))?
            .finish()
            .with_context(|| format!("failed to read population table '{path}'"))?;
        Self::from_frame(&df)
    }

    pub fn from_frame(df: &DataFrame) -> Result<Self> {
        let countries = df.column(COL::NAME_0)?.str()?;
        let adm1s = df.column(COL::NAME_1)?.str()?;
        let adm2s = df.column(COL::NAME_2)?.str()?;
        let adm3s = df.column(COL::NAME_3)?.str()?;
        let populations = df.column(COL::POPULATION)?.cast(&DataType::Int64)?;
        let populations = populations.i64()?;

        let mut rows = Vec::with_capacity(df.height());
        for (country, adm1, adm2, adm3, population) in
            izip!(countries, adm1s, adm2s, adm3s, populations)
        {
            let (Some(country), Some(adm1), Some(adm2)) = (country, adm1, adm2) else {
                continue;
            };
            rows.push(PopulationRow {
                country: country.to_string(),
                adm1: adm1.to_string(),
                adm2: adm2.to_string(),
                adm3: adm3.unwrap_or_default().to_string(),
                population: population.unwrap_or(0),
            });
        }
        Ok(Self { rows })
    }

    /// The (adm1, adm2) pairs tracked for city-level reporting in one
    /// country: every adm2 with summed population over 100k, plus the most
    /// populous adm2 of each adm1 so that no adm1 goes unrepresented. Ties
    /// on the arg-max break towards the first group in table order.
    pub fn tracked_pairs(&self, country: &str) -> Vec<(String, String)> {
        let mut order: Vec<(String, String)> = Vec::new();
        let mut totals: HashMap<(String, String), i64> = HashMap::new();
        for row in self.rows.iter().filter(|r| r.country == country) {
            let key = (row.adm1.clone(), row.adm2.clone());
            if !totals.contains_key(&key) {
                order.push(key.clone());
            }
            *totals.entry(key).or_insert(0) += row.population;
        }

        // Most populous adm2 per adm1, first encountered wins ties.
        let mut largest: HashMap<&str, (&str, i64)> = HashMap::new();
        for (adm1, adm2) in &order {
            let total = totals[&(adm1.clone(), adm2.clone())];
            let entry = largest.entry(adm1).or_insert((adm2, total));
            if total > entry.1 {
                *entry = (adm2, total);
            }
        }

        order
            .iter()
            .filter(|(adm1, adm2)| {
                totals[&(adm1.clone(), adm2.clone())] > 100_000
                    || largest[adm1.as_str()].0 == adm2.as_str()
            })
            .cloned()
            .collect()
    }

    /// Tracked adm2 names for one country, in both the canonical accented
    /// form and the diacritic-stripped form, since sources vary in which one
    /// their raw data uses.
    pub fn tracked_cities(&self, country: &str) -> HashSet<String> {
        let mut cities = HashSet::new();
        for (_, adm2) in self.tracked_pairs(country) {
            cities.insert(deunicode::deunicode(&adm2));
            cities.insert(adm2);
        }
        cities
    }

    /// Mapping from folded adm3 name to its parent adm2 name for one
    /// country, for sources reporting below city granularity.
    pub fn adm3_to_adm2(&self, country: &str) -> HashMap<String, String> {
        let mut mapping = HashMap::new();
        for row in self.rows.iter().filter(|r| r.country == country) {
            if row.adm3.is_empty() {
                continue;
            }
            mapping
                .entry(fold(&row.adm3))
                .or_insert_with(|| row.adm2.clone());
        }
        mapping
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_population() -> Population {
        let df = df!(
            COL::NAME_0 => &[
                "Chile", "Chile", "Chile", "Chile", "Peru", "Peru",
            ],
            COL::NAME_1 => &[
                "Valparaíso", "Valparaíso", "Aysén", "Aysén", "Lima", "Lima",
            ],
            COL::NAME_2 => &[
                "Valparaíso", "Valparaíso", "Coyhaique", "Aysén", "Lima", "Cañete",
            ],
            COL::NAME_3 => &[
                "Valparaíso", "Viña del Mar", "Coyhaique", "Aysén", "Lima", "San Vicente",
            ],
            COL::POPULATION => &[300_000i64, 330_000, 60_000, 30_000, 8_000_000, 150_000],
        )
        .unwrap();
        Population::from_frame(&df).unwrap()
    }

    #[test]
    fn big_cities_are_tracked() {
        let population = test_population();
        let pairs = population.tracked_pairs("Chile");
        assert!(pairs.contains(&("Valparaíso".to_string(), "Valparaíso".to_string())));
    }

    #[test]
    fn every_adm1_contributes_at_least_one_city() {
        let population = test_population();
        for country in ["Chile", "Peru"] {
            let pairs = population.tracked_pairs(country);
            let mut adm1s: Vec<&str> = pairs.iter().map(|(adm1, _)| adm1.as_str()).collect();
            adm1s.sort_unstable();
            adm1s.dedup();
            match country {
                "Chile" => assert_eq!(adm1s, ["Aysén", "Valparaíso"]),
                _ => assert_eq!(adm1s, ["Lima"]),
            }
        }
    }

    #[test]
    fn small_adm1_is_represented_by_its_largest_adm2() {
        let population = test_population();
        let pairs = population.tracked_pairs("Chile");
        // Coyhaique (60k) beats Aysén (30k); neither crosses the threshold.
        assert!(pairs.contains(&("Aysén".to_string(), "Coyhaique".to_string())));
        assert!(!pairs.contains(&("Aysén".to_string(), "Aysén".to_string())));
    }

    #[test]
    fn tracked_cities_include_folded_variants() {
        let population = test_population();
        let cities = population.tracked_cities("Peru");
        assert!(cities.contains("Cañete"));
        assert!(cities.contains("Canete"));
        assert!(cities.contains("Lima"));
    }

    #[test]
    fn adm3_mapping_points_to_the_parent_adm2() {
        let population = test_population();
        let mapping = population.adm3_to_adm2("Chile");
        assert_eq!(mapping["vina del mar"], "Valparaíso");
        assert_eq!(mapping["coyhaique"], "Coyhaique");
    }
}
