//! Ecuador: the registro-civil publishes a yearly XLSX/XLS of general
//! deaths, linked from an HTML table on the figures page. One sheet row per
//! death, with province, canton and parish of death.

use std::collections::HashMap;
use std::io::Cursor;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use calamine::{Data, Range, Reader, Xls, Xlsx};
use chrono::NaiveDate;
use scraper::{Html, Selector};

use super::CountryOutput;
use crate::normalize;
use crate::pipeline::Lookups;
use crate::record::{CountryMeta, Frequency, MortalityRecord, Target};
use crate::text::{fold, repair_cp1252, title_es};

const URL: &str = "https://www.registrocivil.gob.ec/cifras_defunciones_2022/";

const META: CountryMeta = CountryMeta {
    iso: "EC",
    country: "Ecuador",
    frequency: Frequency::Daily,
};

/// Province spellings seen in the sheet that differ from the reference
/// table.
const PROVINCIA_RENAMES: [(&str, &str); 2] = [
    ("Sto Dgo Tsachil", "Santo Domingo de los Tsachilas"),
    ("Sto Domingo Tsachilas", "Santo Domingo de los Tsachilas"),
];

/// Canton spellings that differ from the population table.
const CANTON_RENAMES: [(&str, &str); 7] = [
    ("Alfredo Baquerizo Moreno (jujan)", "Alfredo Baquerizo Moreno"),
    ("Baños de Agua Santa", "Baños"),
    ("El Empalme", "Empalme"),
    ("Francisco de Orellana", "Orellana"),
    ("General Villamil (playas)", "Playas"),
    ("Rio Verde", "Rioverde"),
    ("Yaguachi", "San Jacinto de Yaguachi"),
];

/// Excel day-number epoch.
const EXCEL_EPOCH: (i32, u32, u32) = (1899, 12, 30);

pub async fn update(lookups: &Lookups) -> Result<CountryOutput> {
    // The portal serves a certificate chain reqwest rejects by default.
    let client = reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .timeout(Duration::from_secs(120))
        .build()?;

    let page = client.get(URL).send().await?.text().await?;
    let download_url = find_download_link(&page)?;

    let response = client
        .get(&download_url)
        .timeout(Duration::from_secs(30))
        .send()
        .await?
        .error_for_status()?;
    let content_location = response
        .headers()
        .get("Content-Location")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let bytes = response.bytes().await?;

    let xlsx = download_url.ends_with("xlsx") || content_location.ends_with("xlsx");
    let range = read_sheet(&bytes, xlsx)?;
    let records = parse(&range)?;

    let subnational = normalize::subnational(&records, &META, &lookups.georef)?;
    let tracked = lookups.population.tracked_cities(META.country);
    let cities = normalize::cities(&records, &META, &lookups.georef, &tracked)?;
    Ok(vec![
        (Target::Subnational, subnational),
        (Target::Cities, cities),
    ])
}

/// The downloads table row labelled "defunciones generales" carries the link
/// to the current sheet.
fn find_download_link(page: &str) -> Result<String> {
    let document = Html::parse_document(page);
    let row_selector = Selector::parse("tr").expect("static selector");
    let link_selector = Selector::parse("a").expect("static selector");

    for row in document.select(&row_selector) {
        let text = row.text().collect::<String>().to_lowercase();
        if !text.contains("defunciones generales") {
            continue;
        }
        if let Some(href) = row
            .select(&link_selector)
            .next()
            .and_then(|a| a.value().attr("href"))
        {
            return Ok(href.to_string());
        }
    }
    bail!("no 'defunciones generales' link on the registro civil page")
}

fn read_sheet(bytes: &[u8], xlsx: bool) -> Result<Range<Data>> {
    let cursor = Cursor::new(bytes.to_vec());
    let range = if xlsx {
        let mut workbook = Xlsx::new(cursor).context("failed to open the Ecuador XLSX")?;
        workbook
            .worksheet_range_at(0)
            .context("the Ecuador XLSX has no sheets")??
    } else {
        let mut workbook = Xls::new(cursor).context("failed to open the Ecuador XLS")?;
        workbook
            .worksheet_range_at(0)
            .context("the Ecuador XLS has no sheets")??
    };
    Ok(range)
}

/// Count deaths (rows with a parish entry) per province, canton and date.
/// Headers and text cells may arrive double-decoded; both are repaired
/// before use.
fn parse(range: &Range<Data>) -> Result<Vec<MortalityRecord>> {
    let mut rows = range
        .rows()
        .filter(|row| row.iter().any(|cell| !matches!(cell, Data::Empty)));

    let header = rows.next().context("the Ecuador sheet is empty")?;
    let columns = header_index(header);
    let provincia = *columns
        .get("provincia_defuncion")
        .context("no provincia_defuncion column in the Ecuador sheet")?;
    let canton = *columns
        .get("canton_defuncion")
        .context("no canton_defuncion column in the Ecuador sheet")?;
    let parroquia = *columns
        .get("parroquia_defuncion")
        .context("no parroquia_defuncion column in the Ecuador sheet")?;
    let fecha = *columns
        .get("fecha_defuncion")
        .context("no fecha_defuncion column in the Ecuador sheet")?;

    let provincia_renames: HashMap<&str, &str> = PROVINCIA_RENAMES.into_iter().collect();
    let canton_renames: HashMap<&str, &str> = CANTON_RENAMES.into_iter().collect();

    let mut totals: HashMap<(String, String, NaiveDate), f64> = HashMap::new();
    for row in rows {
        let Some(Data::String(parish)) = row.get(parroquia) else {
            continue;
        };
        if parish.trim().is_empty() {
            continue;
        }
        let (Some(provincia), Some(canton)) = (text_cell(row, provincia), text_cell(row, canton))
        else {
            continue;
        };
        let date = date_cell(row.get(fecha))
            .with_context(|| format!("bad fecha_defuncion in the Ecuador sheet: {row:?}"))?;

        let provincia = provincia_renames
            .get(provincia.as_str())
            .map(|s| s.to_string())
            .unwrap_or(provincia);
        let canton = canton_renames
            .get(canton.as_str())
            .map(|s| s.to_string())
            .unwrap_or(canton);

        *totals.entry((provincia, canton, date)).or_insert(0.0) += 1.0;
    }

    Ok(totals
        .into_iter()
        .map(|((adm1, adm2, date), deaths)| MortalityRecord::adm2(adm1, adm2, date, deaths))
        .collect())
}

/// Normalized snake_case header names to column indices.
fn header_index(header: &[Data]) -> HashMap<String, usize> {
    header
        .iter()
        .enumerate()
        .filter_map(|(i, cell)| match cell {
            Data::String(name) => {
                let name = fold(&repair_cp1252(name)).replace(' ', "_");
                Some((name, i))
            }
            _ => None,
        })
        .collect()
}

fn text_cell(row: &[Data], index: usize) -> Option<String> {
    match row.get(index) {
        Some(Data::String(value)) => Some(title_es(&repair_cp1252(value))),
        _ => None,
    }
}

/// Dates arrive either as Excel serial numbers or as text.
fn date_cell(cell: Option<&Data>) -> Result<NaiveDate> {
    let epoch = NaiveDate::from_ymd_opt(EXCEL_EPOCH.0, EXCEL_EPOCH.1, EXCEL_EPOCH.2)
        .expect("valid epoch");
    match cell {
        Some(Data::DateTime(serial)) => Ok(epoch + chrono::Duration::days(serial.as_f64() as i64)),
        Some(Data::Float(serial)) => Ok(epoch + chrono::Duration::days(*serial as i64)),
        Some(Data::Int(serial)) => Ok(epoch + chrono::Duration::days(*serial)),
        Some(Data::String(text)) => NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d")
            .or_else(|_| NaiveDate::parse_from_str(text.trim(), "%d/%m/%Y"))
            .with_context(|| format!("unparseable date '{text}'")),
        other => bail!("unexpected date cell {other:?}"),
    }
}
