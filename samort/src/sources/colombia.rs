//! Colombia: weekly death counts pulled from the national statistics
//! office's public PowerBI dashboard.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Datelike, NaiveDate};
use serde_json::Value;

use super::powerbi::{self, Connection, TableRef};
use super::CountryOutput;
use crate::normalize;
use crate::pipeline::Lookups;
use crate::record::{CountryMeta, Frequency, MortalityRecord, Target};

// TODO: the dashboard occasionally rotates report ids; fetch them from the
// arcgis experience page instead of pinning them here.
const TOKEN: &str = "eyJrIjoiNzU4ZjUwNGEtNjlhNy00NmU4LWJmYTktYTY1YTZiMGFkNjIyIiwidCI6ImJmYjdlMTNhLTdmYjctNDAxNi04MzBjLWQzNzE2ZThkZDhiOCJ9";
const API_URL: &str =
    "https://wabi-paas-1-scus-api.analysis.windows.net/public/reports/querydata?synchronous=true";

const META: CountryMeta = CountryMeta {
    iso: "CO",
    country: "Colombia",
    frequency: Frequency::Weekly,
};

const CALENDAR: TableRef = TableRef { name: "c", entity: "calendario" };
const DIVIPOLA: TableRef = TableRef { name: "d", entity: "Divipola" };
const MEASURES: TableRef = TableRef { name: "m", entity: "Medidas" };
const PLACE: TableRef = TableRef { name: "t", entity: "Tbl_Ocurrencia_defuncion" };

const CONNECTION: Connection = Connection {
    dataset_id: "1c8b60ae-edc0-47fb-94e9-28cf505f2e36",
    report_id: "7e45edd0-e762-4036-a8c9-5505a82ae12a",
    visual_id: "f868698455f8dcb10e52",
    model_id: 1699279,
};

/// Department spellings on the dashboard that differ from the reference
/// table.
const DEPARTMENT_RENAMES: [(&str, &str); 2] = [
    ("BOGOTÁ, D. C.", "BOGOTA"),
    (
        "ARCHIPIÉLAGO DE SAN ANDRÉS, PROVIDENCIA Y SANTA CATALINA",
        "SAN ANDRES Y PROVIDENCIA",
    ),
];

pub async fn update(lookups: &Lookups) -> Result<CountryOutput> {
    let resource_key = resource_key(TOKEN)?;
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(90))
        .build()?;

    let query = powerbi::build_query(
        &CONNECTION,
        &[CALENDAR, DIVIPOLA, MEASURES, PLACE],
        vec![
            powerbi::column(&CALENDAR, "Date"),
            powerbi::column(&DIVIPOLA, "Departamento"),
            powerbi::measure(&MEASURES, "Conteo_def_Año_Actual"),
        ],
        vec![
            powerbi::where_comparison(powerbi::column(&CALENDAR, "año"), "2021L", 2),
            powerbi::where_comparison(powerbi::measure(&MEASURES, "Conteo_def_Año_Actual"), "0L", 1),
            powerbi::where_in(&PLACE, "lugar_defuncion", "'Cod_mun_Ocurrencia'"),
        ],
    );

    let response: Value = client
        .post(API_URL)
        .header("X-PowerBI-ResourceKey", resource_key)
        .header("RequestId", uuid::Uuid::new_v4().to_string())
        .json(&query)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    let rows = powerbi::inflate(&response)?;
    let records = to_weekly_records(&rows)?;
    let subnational = normalize::subnational(&records, &META, &lookups.georef)?;
    Ok(vec![(Target::Subnational, subnational)])
}

/// The embed token is base64 JSON carrying the report's resource key.
fn resource_key(token: &str) -> Result<String> {
    let decoded = BASE64.decode(token).context("embed token is not base64")?;
    let token: Value = serde_json::from_slice(&decoded).context("embed token is not JSON")?;
    Ok(token
        .get("k")
        .and_then(Value::as_str)
        .context("embed token has no resource key")?
        .to_string())
}

/// Collapse daily dashboard rows into weekly buckets stored as week-start
/// dates. The leading bucket is dropped deliberately: the query's year
/// boundary starts mid-week, so the first bucket is a partial week.
fn to_weekly_records(rows: &[Vec<Value>]) -> Result<Vec<MortalityRecord>> {
    let renames: HashMap<&str, &str> = DEPARTMENT_RENAMES.into_iter().collect();

    let mut totals: HashMap<(String, NaiveDate), f64> = HashMap::new();
    let mut previous_department: Option<String> = None;
    for row in rows {
        let department = match row.get(1) {
            Some(Value::String(name)) if !name.is_empty() => name.clone(),
            // The dashboard blanks repeated group labels; carry the last one
            // forward.
            _ => previous_department
                .clone()
                .context("department missing with nothing to carry forward")?,
        };
        previous_department = Some(department.clone());

        let millis = row
            .first()
            .and_then(Value::as_i64)
            .context("dashboard row has no date")?;
        let date = DateTime::from_timestamp_millis(millis)
            .with_context(|| format!("bad dashboard timestamp {millis}"))?
            .date_naive();
        let deaths = row.get(2).and_then(Value::as_f64).unwrap_or(0.0);

        let department = renames
            .get(department.as_str())
            .map(|s| s.to_string())
            .unwrap_or(department);

        *totals.entry((department, week_start(date))).or_insert(0.0) += deaths;
    }

    let first_bucket = totals.keys().map(|(_, week)| *week).min();
    Ok(totals
        .into_iter()
        .filter(|((_, week), _)| Some(*week) != first_bucket)
        .map(|((department, week), deaths)| MortalityRecord::adm1(department, week, deaths))
        .collect())
}

/// Monday of the week containing `date` (buckets end on Sunday).
fn week_start(date: NaiveDate) -> NaiveDate {
    date - chrono::Duration::days(date.weekday().num_days_from_monday() as i64)
}
