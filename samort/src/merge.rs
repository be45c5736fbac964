//! Last-write-wins merge of freshly normalized rows into a persisted table.

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use polars::prelude::*;

use crate::error::SamortError;
use crate::COL;

/// Merge `new_rows` into the table at `path` and rewrite the whole file.
///
/// The composite key is every column except `NON_KEY_COLS`. Existing rows
/// are kept unless the new batch carries the same key, in which case the new
/// value wins outright, including revisions downward. The rewritten table is
/// sorted ascending by key with the original column order and plain
/// `YYYY-MM-DD` dates.
///
/// A missing or unreadable table is a fatal configuration error: the target
/// tables must pre-exist with the correct header, since an absent file gives
/// no safe schema to create.
pub fn merge(new_rows: &DataFrame, path: &Path) -> Result<()> {
    let base = read_table(path)?;

    let order: Vec<String> = base
        .get_column_names()
        .iter()
        .map(|c| c.to_string())
        .collect();
    let key: Vec<String> = order
        .iter()
        .filter(|c| !COL::NON_KEY_COLS.contains(&c.as_str()))
        .cloned()
        .collect();

    // New rows go after the existing ones so they are the occurrence kept on
    // key collision.
    let new_rows = new_rows.select(order.clone())?;
    let stacked = base.vstack(&new_rows)?;
    let deduped = stacked.unique_stable(Some(&key), UniqueKeepStrategy::Last, None)?;
    let sorted = deduped.sort(key, SortMultipleOptions::default())?;
    let mut out = sorted.select(order)?;

    let file = File::create(path)
        .with_context(|| format!("failed to rewrite table '{}'", path.display()))?;
    CsvWriter::new(file).include_header(true).finish(&mut out)?;
    Ok(())
}

/// Read the persisted table, with its `date` column parsed to a calendar
/// date and `deaths` coerced to integers (a header-only table infers every
/// column as string).
fn read_table(path: &Path) -> Result<DataFrame> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .map_err(|_| SamortError::MissingTable(path.display().to_string()))?
        .finish()
        .map_err(|_| SamortError::MissingTable(path.display().to_string()))?;
    let df = df
        .lazy()
        .with_columns([
            col(COL::DATE).str().to_date(StrptimeOptions {
                format: Some("%Y-%m-%d".into()),
                ..Default::default()
            }),
            col(COL::DEATHS).cast(DataType::Int64),
        ])
        .collect()?;
    Ok(df)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn adm1_frame(rows: &[(&str, &str, &str, &str, &str, i64)]) -> DataFrame {
        let dates = rows
            .iter()
            .map(|r| date(r.4))
            .collect::<Vec<_>>();
        DataFrame::new(vec![
            Series::new(COL::ISO_CODE, rows.iter().map(|r| r.0).collect::<Vec<_>>()),
            Series::new(
                COL::COUNTRY_NAME,
                rows.iter().map(|r| r.1).collect::<Vec<_>>(),
            ),
            Series::new(
                COL::ADM1_ISOCODE,
                rows.iter().map(|r| r.2).collect::<Vec<_>>(),
            ),
            Series::new(COL::ADM1_NAME, rows.iter().map(|r| r.3).collect::<Vec<_>>()),
            Series::new(COL::FREQUENCY, vec!["daily"; rows.len()]),
            DateChunked::from_naive_date(COL::DATE, dates.into_iter()).into_series(),
            Series::new(COL::DEATHS, rows.iter().map(|r| r.5).collect::<Vec<_>>()),
        ])
        .unwrap()
    }

    fn seed_table(dir: &TempDir, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join("south.america.subnational.mortality.csv");
        let mut file = File::create(&path).unwrap();
        write!(file, "{contents}").unwrap();
        path
    }

    fn read_back(path: &Path) -> String {
        std::fs::read_to_string(path).unwrap()
    }

    const HEADER: &str = "iso_code,country_name,adm1_isocode,adm1_name,frequency,date,deaths\n";

    #[test]
    fn last_write_wins_on_key_collision() {
        let dir = TempDir::new().unwrap();
        let path = seed_table(
            &dir,
            &format!("{HEADER}CL,Chile,CL-RM,Santiago Metropolitan,daily,2021-08-01,10\n"),
        );

        // A downward revision must be reflected, not ignored.
        let new = adm1_frame(&[(
            "CL",
            "Chile",
            "CL-RM",
            "Santiago Metropolitan",
            "2021-08-01",
            7,
        )]);
        merge(&new, &path).unwrap();

        let contents = read_back(&path);
        assert_eq!(
            contents,
            format!("{HEADER}CL,Chile,CL-RM,Santiago Metropolitan,daily,2021-08-01,7\n")
        );
    }

    #[test]
    fn merge_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = seed_table(
            &dir,
            &format!("{HEADER}CL,Chile,CL-VS,Valparaiso,daily,2021-08-01,5\n"),
        );

        let new = adm1_frame(&[
            ("CL", "Chile", "CL-VS", "Valparaiso", "2021-08-02", 6),
            ("CL", "Chile", "CL-RM", "Santiago Metropolitan", "2021-08-02", 9),
        ]);
        merge(&new, &path).unwrap();
        let once = read_back(&path);
        merge(&new, &path).unwrap();
        let twice = read_back(&path);
        assert_eq!(once, twice);
    }

    #[test]
    fn merging_one_country_leaves_others_untouched() {
        let dir = TempDir::new().unwrap();
        let path = seed_table(
            &dir,
            &format!(
                "{HEADER}CL,Chile,CL-RM,Santiago Metropolitan,daily,2021-08-01,5\n\
                 PE,Peru,PE-LIM,Lima,daily,2021-08-01,20\n"
            ),
        );

        let new = adm1_frame(&[("PE", "Peru", "PE-LIM", "Lima", "2021-08-01", 25)]);
        merge(&new, &path).unwrap();

        let contents = read_back(&path);
        assert!(contents.contains("CL,Chile,CL-RM,Santiago Metropolitan,daily,2021-08-01,5"));
        assert!(contents.contains("PE,Peru,PE-LIM,Lima,daily,2021-08-01,25"));
        assert!(!contents.contains("Lima,daily,2021-08-01,20"));
    }

    #[test]
    fn output_is_sorted_by_composite_key_in_original_column_order() {
        let dir = TempDir::new().unwrap();
        let path = seed_table(
            &dir,
            &format!("{HEADER}PE,Peru,PE-LIM,Lima,daily,2021-08-03,1\n"),
        );

        let new = adm1_frame(&[
            ("PE", "Peru", "PE-LIM", "Lima", "2021-08-01", 2),
            ("CL", "Chile", "CL-RM", "Santiago Metropolitan", "2021-08-02", 3),
        ]);
        merge(&new, &path).unwrap();

        let contents = read_back(&path);
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines[0], HEADER.trim_end());
        assert!(lines[1].starts_with("CL,"));
        assert!(lines[2].starts_with("PE,Peru,PE-LIM,Lima,daily,2021-08-01"));
        assert!(lines[3].starts_with("PE,Peru,PE-LIM,Lima,daily,2021-08-03"));
    }

    #[test]
    fn revising_a_resolved_name_does_not_duplicate_the_row() {
        // Existing row for CL-RM; a fresh batch normalized from the raw name
        // "Metropolitana de Santiago" carries the same canonical key.
        let dir = TempDir::new().unwrap();
        let path = seed_table(
            &dir,
            &format!("{HEADER}CL,Chile,CL-RM,Santiago Metropolitan,daily,2021-08-01,5\n"),
        );

        let new = adm1_frame(&[(
            "CL",
            "Chile",
            "CL-RM",
            "Santiago Metropolitan",
            "2021-08-01",
            8,
        )]);
        merge(&new, &path).unwrap();

        let contents = read_back(&path);
        assert_eq!(contents.lines().count(), 2, "header plus exactly one row");
        assert!(contents.contains("2021-08-01,8"));
    }

    #[test]
    fn a_normalized_raw_name_updates_the_stored_row_in_place() {
        use crate::georef::GeoRef;
        use crate::record::{CountryMeta, Frequency, MortalityRecord};

        let dir = TempDir::new().unwrap();
        let path = seed_table(
            &dir,
            &format!("{HEADER}CL,Chile,CL-RM,Santiago Metropolitan,daily,2021-08-01,5\n"),
        );

        let georef = GeoRef::from_frame(
            &df!(
                COL::GEOCODE => &["CL-RM", "CL-RM"],
                COL::NAME => &["Santiago Metropolitan", "Metropolitana de Santiago"],
            )
            .unwrap(),
        )
        .unwrap();
        let meta = CountryMeta {
            iso: "CL",
            country: "Chile",
            frequency: Frequency::Daily,
        };
        let records = vec![MortalityRecord::adm1(
            "Metropolitana de Santiago",
            date("2021-08-01"),
            8.0,
        )];
        let new = crate::normalize::subnational(&records, &meta, &georef).unwrap();
        merge(&new, &path).unwrap();

        let contents = read_back(&path);
        assert_eq!(contents.lines().count(), 2, "header plus exactly one row");
        assert!(contents.contains("CL,Chile,CL-RM,Santiago Metropolitan,daily,2021-08-01,8"));
    }

    #[test]
    fn missing_table_is_fatal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("no.such.table.csv");
        let new = adm1_frame(&[("CL", "Chile", "CL-RM", "Santiago Metropolitan", "2021-08-01", 1)]);
        let err = merge(&new, &path).unwrap_err();
        assert!(err.to_string().contains("no.such.table.csv"));
    }

    #[test]
    fn merging_into_a_header_only_table_works() {
        let dir = TempDir::new().unwrap();
        let path = seed_table(&dir, HEADER);

        let new = adm1_frame(&[("BO", "Bolivia", "BO-L", "La Paz", "2021-08-01", 4)]);
        merge(&new, &path).unwrap();

        let contents = read_back(&path);
        assert_eq!(
            contents,
            format!("{HEADER}BO,Bolivia,BO-L,La Paz,daily,2021-08-01,4\n")
        );
    }
}
