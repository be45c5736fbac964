//! Chile: the science-ministry deaths table, one row per comuna with one
//! column per calendar date.

use std::collections::HashMap;
use std::io::Cursor;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use itertools::izip;
use polars::prelude::*;

use super::CountryOutput;
use crate::normalize;
use crate::pipeline::Lookups;
use crate::record::{CountryMeta, Frequency, MortalityRecord, Target};
use crate::text::fold;

const URL: &str = "https://github.com/MinCiencia/Datos-COVID19/blob/master/output/producto32/Defunciones.csv?raw=true";

const META: CountryMeta = CountryMeta {
    iso: "CL",
    country: "Chile",
    frequency: Frequency::Daily,
};

const ID_COLS: [&str; 4] = ["Region", "Codigo region", "Comuna", "Codigo comuna"];

/// Comuna spellings that differ from the population table.
const COMUNA_RENAMES: [(&str, &str); 1] = [("Coihaique", "Coyhaique")];

pub async fn update(lookups: &Lookups) -> Result<CountryOutput> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(120))
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
        .into_reader_with_file_handle(Cursor::new(bytes.to_vec()))
        .finish()
        .context("failed to parse the Chile deaths table")?;

    let provinces = lookups.population.adm3_to_adm2(META.country);
    let records = parse(&df, &provinces)?;

    let subnational = normalize::subnational(&records, &META, &lookups.georef)?;
    let tracked = lookups.population.tracked_cities(META.country);
    let cities = normalize::cities(&records, &META, &lookups.georef, &tracked)?;
    Ok(vec![
        (Target::Subnational, subnational),
        (Target::Cities, cities),
    ])
}

/// Stack the per-date columns into records, mapping each comuna (adm3) to
/// its province (adm2) so city-level aggregation can happen downstream. A
/// comuna the population table does not know fails the whole country: the
/// rename table is stale.
fn parse(df: &DataFrame, provinces: &HashMap<String, String>) -> Result<Vec<MortalityRecord>> {
    let regions = df.column(ID_COLS[0])?.str()?;
    let comunas = df.column(ID_COLS[2])?.str()?;
    let renames: HashMap<&str, &str> = COMUNA_RENAMES.into_iter().collect();

    let mut records = Vec::new();
    for name in df.get_column_names() {
        if ID_COLS.contains(&name) {
            continue;
        }
        let date = NaiveDate::parse_from_str(name, "%Y-%m-%d")
            .with_context(|| format!("unexpected column '{name}' in the Chile deaths table"))?;
        let deaths = df.column(name)?.cast(&DataType::Float64)?;
        let deaths = deaths.f64()?;

        for (region, comuna, count) in izip!(regions, comunas, deaths) {
            let (Some(region), Some(comuna), Some(count)) = (region, comuna, count) else {
                continue;
            };
            let comuna = renames.get(comuna).copied().unwrap_or(comuna);
            let province = provinces
                .get(&fold(comuna))
                .with_context(|| format!("comuna '{comuna}' is missing from the population table"))?;
            records.push(MortalityRecord::adm2(region, province.clone(), date, count));
        }
    }
    Ok(records)
}
