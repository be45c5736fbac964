//! Peru: the SINADEF death register, one pipe-delimited row per death.

use std::io::Cursor;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use itertools::izip;
use polars::prelude::*;

use super::CountryOutput;
use crate::pipeline::Lookups;
use crate::record::{CountryMeta, Frequency, MortalityRecord, Target};
use crate::text::title_es;
use crate::normalize;

const URL: &str = "https://cloud.minsa.gob.pe/s/nqF2irNbFomCLaa/download";

const META: CountryMeta = CountryMeta {
    iso: "PE",
    country: "Peru",
    frequency: Frequency::Daily,
};

const DATE_COL: &str = "FECHA";
const COUNTRY_COL: &str = "PAIS DOMICILIO";
const ADM1_COL: &str = "DEPARTAMENTO DOMICILIO";
const ADM2_COL: &str = "PROVINCIA DOMICILIO";

/// Residence entries that are not departments.
const DROPPED_ADM1: [&str; 2] = ["EXTRANJERO", "SIN REGISTRO"];

pub async fn update(lookups: &Lookups) -> Result<CountryOutput> {
    // The full register is a large download.
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(300))
        .build()?;
    let bytes = client
        .get(URL)
        .send()
        .await?
        .error_for_status()?
        .bytes()
        .await?;
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_parse_options(CsvParseOptions::default().with_separator(b'|'))
        .into_reader_with_file_handle(Cursor::new(bytes.to_vec()))
        .finish()
        .context("failed to parse the SINADEF register")?;

    let records = parse(&df)?;
    let subnational = normalize::subnational(&records, &META, &lookups.georef)?;
    let tracked = lookups.population.tracked_cities(META.country);
    let cities = normalize::cities(&records, &META, &lookups.georef, &tracked)?;
    Ok(vec![
        (Target::Subnational, subnational),
        (Target::Cities, cities),
    ])
}

/// One record per registered death with a usable domicile; deaths are
/// counted, not read from a column.
fn parse(df: &DataFrame) -> Result<Vec<MortalityRecord>> {
    let dates = df
        .column(DATE_COL)
        .context("SINADEF register is missing the FECHA column")?
        .str()?;
    let countries = df.column(COUNTRY_COL)?.str()?;
    let adm1s = df.column(ADM1_COL)?.str()?;
    let adm2s = df.column(ADM2_COL)?.str()?;

    let mut records = Vec::new();
    for (date, country, adm1, adm2) in izip!(dates, countries, adm1s, adm2s) {
        let (Some(date), Some(country), Some(adm1), Some(adm2)) = (date, country, adm1, adm2)
        else {
            continue;
        };
        if country != "PERU" {
            continue;
        }
        let adm1 = adm1.trim();
        let adm2 = adm2.trim();
        if adm1.is_empty() || adm2.is_empty() || DROPPED_ADM1.contains(&adm1) {
            continue;
        }
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .with_context(|| format!("bad date '{date}' in the SINADEF register"))?;
        records.push(MortalityRecord::adm2(adm1, title_es(adm2), date, 1.0));
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register() -> DataFrame {
        df!(
            DATE_COL => &["2021-08-01", "2021-08-01", "2021-08-02", "2021-08-02", "2021-08-02"],
            COUNTRY_COL => &["PERU", "PERU", "PERU", "BOLIVIA", "PERU"],
            ADM1_COL => &["LIMA", "LIMA", " CUSCO ", "LA PAZ", "EXTRANJERO"],
            ADM2_COL => &["LIMA", "LIMA", "CUSCO", "MURILLO", "PARIS"],
        )
        .unwrap()
    }

    #[test]
    fn each_row_counts_one_death() {
        let records = parse(&register()).unwrap();
        assert_eq!(records.len(), 3);
        let lima: Vec<_> = records.iter().filter(|r| r.adm1 == "LIMA").collect();
        assert_eq!(lima.len(), 2);
        assert!(lima.iter().all(|r| r.deaths == 1.0));
    }

    #[test]
    fn foreign_and_unregistered_rows_are_dropped() {
        let records = parse(&register()).unwrap();
        assert!(records.iter().all(|r| r.adm1 != "EXTRANJERO"));
        assert!(records.iter().all(|r| r.adm1 != "LA PAZ"));
    }

    #[test]
    fn provinces_are_title_cased_and_departments_trimmed() {
        let records = parse(&register()).unwrap();
        let cusco = records.iter().find(|r| r.adm1 == "CUSCO").unwrap();
        assert_eq!(cusco.adm2.as_deref(), Some("Cusco"));
    }
}
