//! Paraguay: the health-ministry vital-statistics report, queried once per
//! department and returned as an HTML pivot of districts by month.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use log::warn;
use scraper::{Html, Selector};

use super::CountryOutput;
use crate::normalize;
use crate::pipeline::Lookups;
use crate::record::{CountryMeta, Frequency, MortalityRecord, Target};
use crate::text::title_es;

const URL: &str =
    "http://ssiev.mspbs.gov.py/20220618/defuncion_reportes/lista_multireporte_defuncion.php";

const META: CountryMeta = CountryMeta {
    iso: "PY",
    country: "Paraguay",
    frequency: Frequency::Monthly,
};

const YEARS: [i32; 1] = [2022];

/// The endpoint is rate-sensitive; wait between per-department requests.
const REQUEST_DELAY: Duration = Duration::from_millis(1500);

const DEPARTMENTS: [(&str, &str); 18] = [
    ("01", "Concepción"),
    ("02", "San Pedro"),
    ("03", "Cordillera"),
    ("04", "Guairá"),
    ("05", "Caaguazú"),
    ("06", "Caazapá"),
    ("07", "Itapúa"),
    ("08", "Misiones"),
    ("09", "Paraguarí"),
    ("10", "Alto Paraná"),
    ("11", "Central"),
    ("12", "Ñeembucú"),
    ("13", "Amambay"),
    ("14", "Canindeyú"),
    ("15", "Presidente Hayes"),
    ("16", "Boquerón"),
    ("17", "Alto Paraguay"),
    ("18", "Asunción"),
];

const MONTHS: [(&str, u32); 13] = [
    ("Enero", 1),
    ("Febrero", 2),
    ("Marzo", 3),
    ("Abril", 4),
    ("Mayo", 5),
    ("Junio", 6),
    ("Julio", 7),
    ("Agosto", 8),
    ("Septiembre", 9),
    ("Setiembre", 9),
    ("Octubre", 10),
    ("Noviembre", 11),
    ("Diciembre", 12),
];

/// District spellings that differ from the population table.
const DISTRICT_RENAMES: [(&str, &str); 1] =
    [("Mariscal Estigarribia", "Mariscal Jose Felix Estigarribia")];

pub async fn update(lookups: &Lookups) -> Result<CountryOutput> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(60))
        .build()?;

    let mut records = Vec::new();
    for year in YEARS {
        for (code, department) in DEPARTMENTS {
            match fetch_department(&client, code, year).await {
                Ok(rows) => {
                    records.extend(rows.into_iter().map(|(district, date, deaths)| {
                        MortalityRecord::adm2(department, district, date, deaths)
                    }));
                }
                // A department that fails to download contributes nothing;
                // the rest of the country still reports.
                Err(e) => warn!("paraguay: department {department} ({year}) failed: {e:#}"),
            }
            tokio::time::sleep(REQUEST_DELAY).await;
        }
    }

    let renames: HashMap<&str, &str> = DISTRICT_RENAMES.into_iter().collect();
    for record in &mut records {
        if let Some(adm2) = &record.adm2 {
            if let Some(renamed) = renames.get(adm2.as_str()) {
                record.adm2 = Some(renamed.to_string());
            }
        }
    }

    let subnational = normalize::subnational(&records, &META, &lookups.georef)?;
    let tracked = lookups.population.tracked_cities(META.country);
    let cities = normalize::cities(&records, &META, &lookups.georef, &tracked)?;
    Ok(vec![
        (Target::Subnational, subnational),
        (Target::Cities, cities),
    ])
}

async fn fetch_department(
    client: &reqwest::Client,
    code: &str,
    year: i32,
) -> Result<Vec<(String, NaiveDate, f64)>> {
    let year_field = year.to_string();
    let form = [
        ("elegido", "2"),
        ("xfila", "coddist"),
        ("xcolumna", "EXTRACT(MONTH FROM  fechadef)"),
        ("anio1", year_field.as_str()),
        ("anio2", year_field.as_str()),
        ("coddpto", code),
    ];
    let page = client
        .post(URL)
        .form(&form)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;
    parse_report(&page, year)
}

/// Parse the report pivot: a title row, then a header row of month names
/// with a trailing total, then one row per district. Months with no deaths
/// at all are dropped; zero cells of reported months are kept.
fn parse_report(page: &str, year: i32) -> Result<Vec<(String, NaiveDate, f64)>> {
    let document = Html::parse_document(page);
    let table_selector = Selector::parse("table").expect("static selector");
    let row_selector = Selector::parse("tr").expect("static selector");
    let cell_selector = Selector::parse("td, th").expect("static selector");

    let table = document
        .select(&table_selector)
        .next()
        .context("no table in the department report")?;
    let rows: Vec<Vec<String>> = table
        .select(&row_selector)
        .map(|row| {
            row.select(&cell_selector)
                .map(|cell| cell.text().collect::<String>().trim().to_string())
                .collect()
        })
        .collect();
    // First row is the report title.
    if rows.len() < 3 {
        bail!("department report has no data rows");
    }
    let header = &rows[1];

    let months: HashMap<&str, u32> = MONTHS.into_iter().collect();
    let month_columns: Vec<(usize, u32)> = header
        .iter()
        .enumerate()
        .filter_map(|(i, name)| months.get(name.as_str()).map(|&m| (i, m)))
        .collect();
    if month_columns.is_empty() {
        bail!("department report has no month columns");
    }

    let mut cells: Vec<(String, u32, f64)> = Vec::new();
    let mut month_totals: HashMap<u32, f64> = HashMap::new();
    for row in &rows[2..] {
        let Some(place) = row.first() else { continue };
        if place.is_empty()
            || place.eq_ignore_ascii_case("total")
            || place.eq_ignore_ascii_case("extranjero")
        {
            continue;
        }
        let district = title_es(place);
        for &(column, month) in &month_columns {
            let Some(raw) = row.get(column) else { continue };
            let count: f64 = raw
                .replace('.', "")
                .parse()
                .with_context(|| format!("bad count '{raw}' for {district}"))?;
            *month_totals.entry(month).or_insert(0.0) += count;
            cells.push((district.clone(), month, count));
        }
    }

    Ok(cells
        .into_iter()
        .filter(|(_, month, _)| month_totals.get(month).copied().unwrap_or(0.0) > 0.0)
        .map(|(district, month, deaths)| {
            let date = NaiveDate::from_ymd_opt(year, month, 1).expect("first of month");
            (district, date, deaths)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    const REPORT: &str = r#"
        <table>
          <tr><td colspan="4">DEFUNCIONES POR DISTRITO</td></tr>
          <tr><td>Lugar de Defunción/Distrito</td><td>Enero</td><td>Febrero</td><td>Total</td></tr>
          <tr><td>AREGUA</td><td>12</td><td>0</td><td>12</td></tr>
          <tr><td>CAPIATA</td><td>1.204</td><td>0</td><td>1.204</td></tr>
          <tr><td>EXTRANJERO</td><td>2</td><td>0</td><td>2</td></tr>
          <tr><td>Total</td><td>1.218</td><td>0</td><td>1.218</td></tr>
        </table>
    "#;

    #[test]
    fn thousands_separators_and_month_names_parse() {
        let rows = parse_report(REPORT, 2022).unwrap();
        let capiata = rows
            .iter()
            .find(|(district, _, _)| district == "Capiata")
            .unwrap();
        assert_eq!(capiata.2, 1204.0);
        assert_eq!(capiata.1, NaiveDate::from_ymd_opt(2022, 1, 1).unwrap());
    }

    #[test]
    fn empty_months_are_dropped_but_zero_cells_of_active_months_kept() {
        let rows = parse_report(REPORT, 2022).unwrap();
        // February saw no deaths anywhere, so it disappears entirely.
        assert!(rows.iter().all(|(_, date, _)| date.month() == 1));
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn total_and_foreign_rows_are_dropped() {
        let rows = parse_report(REPORT, 2022).unwrap();
        assert!(rows.iter().all(|(district, _, _)| district != "Total"));
        assert!(rows.iter().all(|(district, _, _)| district != "Extranjero"));
    }

    #[test]
    fn garbage_counts_fail_the_department() {
        let page = r#"
            <table>
              <tr><td>title</td></tr>
              <tr><td>Distrito</td><td>Enero</td></tr>
              <tr><td>AREGUA</td><td>n/a</td></tr>
            </table>
        "#;
        assert!(parse_report(page, 2022).is_err());
    }
}
