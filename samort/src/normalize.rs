//! Turns adapter output into canonical rows for the persisted tables:
//! canonical adm1 names and ISO codes, country metadata columns, keyed sums
//! and the final integer cast.

use std::collections::{BTreeMap, HashSet};

use anyhow::Result;
use chrono::NaiveDate;
use polars::prelude::*;

use crate::georef::GeoRef;
use crate::record::{CountryMeta, MortalityRecord};
use crate::COL;

/// Build the subnational (adm1) frame: deaths summed by canonical division
/// and date. Several raw spellings collapsing onto one canonical division
/// accumulate; deaths are summed, never averaged. The integer cast happens
/// after all aggregation so fractional artifacts from upstream sums truncate
/// once.
pub fn subnational(
    records: &[MortalityRecord],
    meta: &CountryMeta,
    georef: &GeoRef,
) -> Result<DataFrame> {
    let raw_names: HashSet<&str> = records.iter().map(|r| r.adm1.as_str()).collect();
    let resolved = georef.resolve(raw_names, meta.iso)?;

    let mut totals: BTreeMap<(String, NaiveDate), f64> = BTreeMap::new();
    for record in records {
        let division = &resolved[record.adm1.as_str()];
        *totals
            .entry((division.name.clone(), record.date))
            .or_insert(0.0) += record.deaths;
    }

    let geocodes: BTreeMap<&str, &str> = resolved
        .values()
        .map(|d| (d.name.as_str(), d.geocode.as_str()))
        .collect();

    let mut adm1_names = Vec::with_capacity(totals.len());
    let mut adm1_isocodes = Vec::with_capacity(totals.len());
    let mut dates = Vec::with_capacity(totals.len());
    let mut deaths: Vec<i64> = Vec::with_capacity(totals.len());
    for ((name, date), total) in totals {
        adm1_isocodes.push(geocodes[name.as_str()].to_string());
        adm1_names.push(name);
        dates.push(date);
        deaths.push(total as i64);
    }

    let n = adm1_names.len();
    let df = DataFrame::new(vec![
        Series::new(COL::ISO_CODE, vec![meta.iso; n]),
        Series::new(COL::COUNTRY_NAME, vec![meta.country; n]),
        Series::new(COL::ADM1_ISOCODE, adm1_isocodes),
        Series::new(COL::ADM1_NAME, adm1_names),
        Series::new(COL::FREQUENCY, vec![meta.frequency.to_string(); n]),
        DateChunked::from_naive_date(COL::DATE, dates.into_iter()).into_series(),
        Series::new(COL::DEATHS, deaths),
    ])?;
    Ok(df)
}

/// Build the cities (adm2) frame: records are first filtered to the tracked
/// city set (which holds both accented and folded spellings), then summed by
/// (canonical adm1, adm2, date). Only adm1 is geo-resolved; adm2 keeps the
/// adapter-cleaned spelling.
pub fn cities(
    records: &[MortalityRecord],
    meta: &CountryMeta,
    georef: &GeoRef,
    tracked: &HashSet<String>,
) -> Result<DataFrame> {
    let tracked_records: Vec<&MortalityRecord> = records
        .iter()
        .filter(|r| r.adm2.as_ref().is_some_and(|adm2| tracked.contains(adm2)))
        .collect();

    let raw_names: HashSet<&str> = tracked_records.iter().map(|r| r.adm1.as_str()).collect();
    let resolved = georef.resolve(raw_names, meta.iso)?;

    let mut totals: BTreeMap<(String, String, NaiveDate), f64> = BTreeMap::new();
    for record in &tracked_records {
        let division = &resolved[record.adm1.as_str()];
        let adm2 = record.adm2.clone().expect("tracked records carry adm2");
        *totals
            .entry((division.name.clone(), adm2, record.date))
            .or_insert(0.0) += record.deaths;
    }

    let geocodes: BTreeMap<&str, &str> = resolved
        .values()
        .map(|d| (d.name.as_str(), d.geocode.as_str()))
        .collect();

    let mut adm1_names = Vec::with_capacity(totals.len());
    let mut adm1_isocodes = Vec::with_capacity(totals.len());
    let mut adm2_names = Vec::with_capacity(totals.len());
    let mut dates = Vec::with_capacity(totals.len());
    let mut deaths: Vec<i64> = Vec::with_capacity(totals.len());
    for ((adm1, adm2, date), total) in totals {
        adm1_isocodes.push(geocodes[adm1.as_str()].to_string());
        adm1_names.push(adm1);
        adm2_names.push(adm2);
        dates.push(date);
        deaths.push(total as i64);
    }

    let n = adm1_names.len();
    let df = DataFrame::new(vec![
        Series::new(COL::ISO_CODE, vec![meta.iso; n]),
        Series::new(COL::COUNTRY_NAME, vec![meta.country; n]),
        Series::new(COL::ADM1_ISOCODE, adm1_isocodes),
        Series::new(COL::ADM1_NAME, adm1_names),
        Series::new(COL::ADM2_NAME, adm2_names),
        Series::new(COL::FREQUENCY, vec![meta.frequency.to_string(); n]),
        DateChunked::from_naive_date(COL::DATE, dates.into_iter()).into_series(),
        Series::new(COL::DEATHS, deaths),
    ])?;
    Ok(df)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Frequency;

    const META: CountryMeta = CountryMeta {
        iso: "CL",
        country: "Chile",
        frequency: Frequency::Daily,
    };

    fn test_georef() -> GeoRef {
        let df = df!(
            COL::GEOCODE => &["CL-RM", "CL-RM", "CL-VS"],
            COL::NAME => &[
                "Región Metropolitana de Santiago",
                "Metropolitana de Santiago",
                "Valparaíso",
            ],
        )
        .unwrap();
        GeoRef::from_frame(&df).unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn collapsing_raw_names_sums_deaths() {
        // Two spellings of the same region on the same date must add up.
        let records = vec![
            MortalityRecord::adm1("Metropolitana de Santiago", date("2021-08-01"), 3.0),
            MortalityRecord::adm1("Región Metropolitana de Santiago", date("2021-08-01"), 4.0),
        ];
        let df = subnational(&records, &META, &test_georef()).unwrap();
        assert_eq!(df.height(), 1);
        assert_eq!(df.column(COL::DEATHS).unwrap().i64().unwrap().get(0), Some(7));
        assert_eq!(
            df.column(COL::ADM1_ISOCODE).unwrap().str().unwrap().get(0),
            Some("CL-RM")
        );
    }

    #[test]
    fn integer_cast_happens_after_aggregation() {
        let records = vec![
            MortalityRecord::adm1("Valparaíso", date("2021-08-01"), 1.5),
            MortalityRecord::adm1("Valparaíso", date("2021-08-01"), 1.5),
        ];
        let df = subnational(&records, &META, &test_georef()).unwrap();
        // 1.5 + 1.5 = 3.0 exactly; casting each part first would give 2.
        assert_eq!(df.column(COL::DEATHS).unwrap().i64().unwrap().get(0), Some(3));
    }

    #[test]
    fn subnational_columns_are_in_table_order() {
        let records = vec![MortalityRecord::adm1("Valparaíso", date("2021-08-02"), 1.0)];
        let df = subnational(&records, &META, &test_georef()).unwrap();
        assert_eq!(df.get_column_names(), crate::COL::ADM1_COLS.to_vec());
        assert_eq!(
            df.column(COL::FREQUENCY).unwrap().str().unwrap().get(0),
            Some("daily")
        );
    }

    #[test]
    fn cities_filters_to_the_tracked_set() {
        let tracked: HashSet<String> =
            ["Santiago".to_string(), "Valparaíso".to_string()].into();
        let records = vec![
            MortalityRecord::adm2("Valparaíso", "Valparaíso", date("2021-08-01"), 2.0),
            MortalityRecord::adm2("Valparaíso", "Petorca", date("2021-08-01"), 9.0),
        ];
        let df = cities(&records, &META, &test_georef(), &tracked).unwrap();
        assert_eq!(df.height(), 1);
        assert_eq!(
            df.column(COL::ADM2_NAME).unwrap().str().unwrap().get(0),
            Some("Valparaíso")
        );
        assert_eq!(df.get_column_names(), crate::COL::ADM2_COLS.to_vec());
    }

    #[test]
    fn untracked_adm1_does_not_fail_city_resolution() {
        // A record whose adm2 is filtered out must not force its adm1
        // through the resolver.
        let tracked: HashSet<String> = ["Valparaíso".to_string()].into();
        let records = vec![
            MortalityRecord::adm2("Valparaíso", "Valparaíso", date("2021-08-01"), 2.0),
            MortalityRecord::adm2("No Such Region", "Petorca", date("2021-08-01"), 1.0),
        ];
        let df = cities(&records, &META, &test_georef(), &tracked).unwrap();
        assert_eq!(df.height(), 1);
    }

    #[test]
    fn empty_input_yields_an_empty_well_formed_frame() {
        let df = subnational(&[], &META, &test_georef()).unwrap();
        assert_eq!(df.height(), 0);
        assert_eq!(df.get_column_names(), crate::COL::ADM1_COLS.to_vec());
    }
}
