//! Bolivia: monthly civil-registry counts from the sociedatos mirror, one
//! column per department with dates down the first column.

use std::io::Cursor;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use polars::prelude::*;

use super::CountryOutput;
use crate::pipeline::Lookups;
use crate::record::{CountryMeta, Frequency, MortalityRecord, Target};
use crate::{normalize, COL};

const URL: &str = "https://raw.githubusercontent.com/sociedatos/bo-mortalidad/main/registro.civil.csv";

const META: CountryMeta = CountryMeta {
    iso: "BO",
    country: "Bolivia",
    frequency: Frequency::Monthly,
};

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
        .context("failed to parse the Bolivia registry CSV")?;

    let records = parse(&df)?;
    let subnational = normalize::subnational(&records, &META, &lookups.georef)?;
    // The reference table knows the department as "El Beni"; the stored
    // canonical name is the short form.
    let subnational = subnational
        .lazy()
        .with_column(
            when(col(COL::ADM1_NAME).eq(lit("El Beni")))
                .then(lit("Beni"))
                .otherwise(col(COL::ADM1_NAME))
                .alias(COL::ADM1_NAME),
        )
        .collect()?;

    Ok(vec![(Target::Subnational, subnational)])
}

/// Stack the wide (date x department) table into records, dropping empty
/// cells.
fn parse(df: &DataFrame) -> Result<Vec<MortalityRecord>> {
    let names: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|c| c.to_string())
        .collect();
    let (date_col, dept_cols) = names
        .split_first()
        .context("the Bolivia registry CSV has no columns")?;
    let dates = df.column(date_col)?.str()?;

    let mut records = Vec::new();
    for dept in dept_cols {
        let deaths = df.column(dept)?.cast(&DataType::Float64)?;
        let deaths = deaths.f64()?;
        for (date, count) in dates.into_iter().zip(deaths) {
            let (Some(date), Some(count)) = (date, count) else {
                continue;
            };
            let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .with_context(|| format!("bad date '{date}' in the Bolivia registry CSV"))?;
            records.push(MortalityRecord::adm1(dept.clone(), date, count));
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wide_table_stacks_to_one_record_per_cell() {
        let df = df!(
            "" => &["2021-08-01", "2021-09-01"],
            "La Paz" => &[Some(120i64), None],
            "El Beni" => &[Some(30), Some(25)],
        )
        .unwrap();
        let records = parse(&df).unwrap();
        assert_eq!(records.len(), 3);
        assert!(records.contains(&MortalityRecord::adm1(
            "La Paz",
            "2021-08-01".parse().unwrap(),
            120.0
        )));
        assert!(records.contains(&MortalityRecord::adm1(
            "El Beni",
            "2021-09-01".parse().unwrap(),
            25.0
        )));
    }

    #[test]
    fn bad_dates_fail_the_country() {
        let df = df!(
            "" => &["08/2021"],
            "La Paz" => &[1i64],
        )
        .unwrap();
        assert!(parse(&df).is_err());
    }
}
