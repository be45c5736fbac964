//! Brazil: civil-registry counts mirrored on GitHub, one CSV for states and
//! one for cities, plus the state-code reference table.

use std::collections::HashMap;
use std::io::Cursor;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use polars::prelude::*;

use super::CountryOutput;
use crate::normalize;
use crate::pipeline::Lookups;
use crate::record::{CountryMeta, Frequency, MortalityRecord, Target};

const STATES_URL: &str =
    "https://raw.githubusercontent.com/datasets-br/state-codes/master/data/br-state-codes.csv";
const URL: &str = "https://github.com/capyvara/brazil-civil-registry-data/blob/master/civil_registry_covid_states.csv?raw=true";
const CITIES_URL: &str = "https://github.com/capyvara/brazil-civil-registry-data/blob/master/civil_registry_covid_cities.csv?raw=true";

const META: CountryMeta = CountryMeta {
    iso: "BR",
    country: "Brazil",
    frequency: Frequency::Daily,
};

pub async fn update(lookups: &Lookups) -> Result<CountryOutput> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(120))
        .build()?;

    let state_names = fetch_state_names(&client).await?;

    let states = fetch_csv(&client, URL).await?;
    let state_records = parse(&states, &["state"], &state_names)?;
    let subnational = normalize::subnational(&state_records, &META, &lookups.georef)?;

    let cities_df = fetch_csv(&client, CITIES_URL).await?;
    let city_records = parse(&cities_df, &["state", "city"], &state_names)?;
    let tracked = lookups.population.tracked_cities(META.country);
    let cities = normalize::cities(&city_records, &META, &lookups.georef, &tracked)?;

    Ok(vec![
        (Target::Subnational, subnational),
        (Target::Cities, cities),
    ])
}

async fn fetch_csv(client: &reqwest::Client, url: &str) -> Result<DataFrame> {
    let bytes = client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .bytes()
        .await?;
    CsvReadOptions::default()
        .with_has_header(true)
        .into_reader_with_file_handle(Cursor::new(bytes.to_vec()))
        .finish()
        .with_context(|| format!("failed to parse CSV from {url}"))
}

/// The two-letter subdivision code to full state name mapping.
async fn fetch_state_names(client: &reqwest::Client) -> Result<HashMap<String, String>> {
    let df = fetch_csv(client, STATES_URL).await?;
    let codes = df.column("subdivision")?.str()?;
    let names = df.column("name")?.str()?;
    Ok(codes
        .into_iter()
        .zip(names)
        .filter_map(|(code, name)| Some((code?.to_string(), name?.to_string())))
        .collect())
}

/// Collapse the registry table to records keyed by `fields` + date, summing
/// every death column (the registry splits counts by cause grouping).
fn parse(
    df: &DataFrame,
    fields: &[&str],
    state_names: &HashMap<String, String>,
) -> Result<Vec<MortalityRecord>> {
    let dropped: Vec<String> = fields
        .iter()
        .map(|f| format!("{f}_ibge_code"))
        .chain(["place".to_string(), "date".to_string()])
        .collect();

    let value_cols: Vec<String> = df
        .get_column_names()
        .iter()
        .filter(|c| !fields.contains(c) && !dropped.iter().any(|d| d == *c))
        .map(|c| c.to_string())
        .collect();

    let field_cols = fields
        .iter()
        .map(|f| Ok(df.column(f)?.str()?.clone()))
        .collect::<Result<Vec<_>>>()?;
    let dates = df.column("date")?.str()?;
    let values = value_cols
        .iter()
        .map(|c| Ok(df.column(c)?.cast(&DataType::Float64)?.f64()?.clone()))
        .collect::<Result<Vec<_>>>()?;

    let mut totals: HashMap<(String, Option<String>, NaiveDate), f64> = HashMap::new();
    for i in 0..df.height() {
        let Some(date) = dates.get(i) else { continue };
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .with_context(|| format!("bad date '{date}' in the Brazil registry"))?;
        let Some(code) = field_cols[0].get(i) else {
            continue;
        };
        let state = state_names
            .get(code)
            .with_context(|| format!("unknown Brazil state code '{code}'"))?
            .clone();
        let city = match field_cols.get(1) {
            Some(cities) => match cities.get(i) {
                Some(city) => Some(city.to_string()),
                None => continue,
            },
            None => None,
        };
        let deaths: f64 = values.iter().filter_map(|v| v.get(i)).sum();
        *totals.entry((state, city, date)).or_insert(0.0) += deaths;
    }

    Ok(totals
        .into_iter()
        .map(|((adm1, adm2, date), deaths)| MortalityRecord {
            adm1,
            adm2,
            date,
            deaths,
        })
        .collect())
}
