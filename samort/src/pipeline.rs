//! Sequential run loop: every source is updated one at a time, failures are
//! isolated per country, and each target table is merged exactly once with
//! the accumulated cross-country batch.

use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use log::{error, info};
use polars::prelude::*;
use strum::IntoEnumIterator;

use crate::config::Config;
use crate::georef::GeoRef;
use crate::merge;
use crate::population::Population;
use crate::record::Target;
use crate::sources::{CountryOutput, Source};
use crate::COL;

/// The static reference tables, loaded once per run and shared by every
/// source.
#[derive(Debug)]
pub struct Lookups {
    pub georef: GeoRef,
    pub population: Population,
}

impl Lookups {
    pub fn load(config: &Config) -> Result<Self> {
        Ok(Self {
            georef: GeoRef::from_csv(&config.geocodes_path)?,
            population: Population::from_csv(&config.population_path)?,
        })
    }
}

/// What happened to each source and table this run.
#[derive(Debug)]
pub struct RunSummary {
    pub sources: Vec<SourceReport>,
    pub tables: Vec<TableReport>,
}

#[derive(Debug)]
pub struct SourceReport {
    pub source: Source,
    /// Rows contributed per target after the uniformity pass.
    pub rows: Vec<(Target, usize)>,
    pub error: Option<String>,
}

#[derive(Debug)]
pub struct TableReport {
    pub target: Target,
    /// Rows merged into the table this run.
    pub rows: usize,
}

/// Records before this date never enter the tables.
fn cutoff() -> NaiveDate {
    NaiveDate::from_ymd_opt(2021, 7, 31).expect("valid cutoff")
}

/// One full fetch-normalize-merge cycle. Source failures are logged and
/// skipped; merge failures abort the run.
pub async fn run(config: &Config, lookups: &Lookups) -> Result<RunSummary> {
    let mut batches: HashMap<Target, Vec<DataFrame>> = HashMap::new();
    let mut sources = Vec::new();
    for source in Source::iter() {
        info!("updating {source}");
        let outcome = source.update(lookups).await;
        sources.push(accumulate(&mut batches, source, outcome));
    }

    let mut tables = Vec::new();
    for target in Target::iter() {
        let Some(frames) = batches.remove(&target) else {
            continue;
        };
        let frames: Vec<LazyFrame> = frames.into_iter().map(|df| df.lazy()).collect();
        let batch = concat(frames, UnionArgs::default())?.collect()?;
        let path = target.storage_path(config);
        info!("merging {} rows into {}", batch.height(), path.display());
        merge::merge(&batch, &path)
            .with_context(|| format!("failed to merge into '{}'", path.display()))?;
        tables.push(TableReport {
            target,
            rows: batch.height(),
        });
    }

    Ok(RunSummary { sources, tables })
}

/// Fold one source's outcome into the per-target batches. A failed source
/// contributes nothing at all: frames only land in the batches once every
/// one of them has passed the uniformity pass.
fn accumulate(
    batches: &mut HashMap<Target, Vec<DataFrame>>,
    source: Source,
    outcome: Result<CountryOutput>,
) -> SourceReport {
    let conformed: Result<Vec<(Target, DataFrame)>> = outcome.and_then(|output| {
        output
            .into_iter()
            .map(|(target, df)| Ok((target, conform(df)?)))
            .collect()
    });
    match conformed {
        Ok(output) => {
            let mut rows = Vec::new();
            for (target, df) in output {
                rows.push((target, df.height()));
                batches.entry(target).or_default().push(df);
            }
            SourceReport {
                source,
                rows,
                error: None,
            }
        }
        Err(e) => {
            error!("{source} update failed: {e:#}");
            SourceReport {
                source,
                rows: Vec::new(),
                error: Some(format!("{e:#}")),
            }
        }
    }
}

/// Final uniformity pass over a normalized frame: apply the date cutoff and
/// force integer deaths.
fn conform(df: DataFrame) -> Result<DataFrame> {
    Ok(df
        .lazy()
        .filter(col(COL::DATE).gt(lit(cutoff())))
        .with_column(col(COL::DEATHS).cast(DataType::Int64))
        .collect()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use chrono::NaiveDate;

    fn adm1_frame(rows: &[(&str, &str, i64)]) -> DataFrame {
        let dates: Vec<NaiveDate> = rows.iter().map(|r| r.1.parse().unwrap()).collect();
        DataFrame::new(vec![
            Series::new(COL::ISO_CODE, vec!["CL"; rows.len()]),
            Series::new(COL::COUNTRY_NAME, vec!["Chile"; rows.len()]),
            Series::new(COL::ADM1_ISOCODE, vec!["CL-RM"; rows.len()]),
            Series::new(COL::ADM1_NAME, rows.iter().map(|r| r.0).collect::<Vec<_>>()),
            Series::new(COL::FREQUENCY, vec!["daily"; rows.len()]),
            DateChunked::from_naive_date(COL::DATE, dates.into_iter()).into_series(),
            Series::new(COL::DEATHS, rows.iter().map(|r| r.2).collect::<Vec<_>>()),
        ])
        .unwrap()
    }

    #[test]
    fn the_cutoff_drops_old_rows() {
        let df = adm1_frame(&[
            ("Santiago Metropolitan", "2021-07-31", 4),
            ("Santiago Metropolitan", "2021-08-01", 5),
        ]);
        let conformed = conform(df).unwrap();
        assert_eq!(conformed.height(), 1);
    }

    #[test]
    fn a_failing_source_contributes_nothing() {
        let mut batches = HashMap::new();
        let report = accumulate(&mut batches, Source::Ecuador, Err(anyhow!("fetch blew up")));
        assert!(batches.is_empty());
        assert!(report.error.as_deref().unwrap().contains("fetch blew up"));
        assert!(report.rows.is_empty());
    }

    #[test]
    fn a_successful_source_lands_in_every_target_batch() {
        let mut batches = HashMap::new();
        let output = vec![(
            Target::Subnational,
            adm1_frame(&[("Santiago Metropolitan", "2021-08-01", 5)]),
        )];
        let report = accumulate(&mut batches, Source::Chile, Ok(output));
        assert!(report.error.is_none());
        assert_eq!(report.rows, vec![(Target::Subnational, 1)]);
        assert_eq!(batches[&Target::Subnational].len(), 1);
    }

    #[test]
    fn a_source_whose_frame_fails_conformity_contributes_nothing() {
        // A frame without a date column cannot pass the uniformity pass;
        // nothing from that source may reach the batches.
        let broken = DataFrame::new(vec![Series::new(COL::DEATHS, vec![1i64])]).unwrap();
        let output = vec![
            (
                Target::Subnational,
                adm1_frame(&[("Santiago Metropolitan", "2021-08-01", 5)]),
            ),
            (Target::Cities, broken),
        ];
        let mut batches = HashMap::new();
        let report = accumulate(&mut batches, Source::Chile, Ok(output));
        assert!(report.error.is_some());
        assert!(batches.is_empty());
    }
}
