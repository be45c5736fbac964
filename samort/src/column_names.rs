//! This module stores the column names of the persisted mortality tables and
//! of the static reference tables. The persisted column order is part of the
//! on-disk contract and must not change between runs.

pub const ISO_CODE: &str = "iso_code";
pub const COUNTRY_NAME: &str = "country_name";
pub const ADM1_ISOCODE: &str = "adm1_isocode";
pub const ADM1_NAME: &str = "adm1_name";
pub const ADM2_NAME: &str = "adm2_name";
pub const FREQUENCY: &str = "frequency";
pub const DATE: &str = "date";
pub const DEATHS: &str = "deaths";

/// Column order of the subnational (adm1) table.
pub const ADM1_COLS: [&str; 7] = [
    ISO_CODE,
    COUNTRY_NAME,
    ADM1_ISOCODE,
    ADM1_NAME,
    FREQUENCY,
    DATE,
    DEATHS,
];

/// Column order of the cities (adm2) table.
pub const ADM2_COLS: [&str; 8] = [
    ISO_CODE,
    COUNTRY_NAME,
    ADM1_ISOCODE,
    ADM1_NAME,
    ADM2_NAME,
    FREQUENCY,
    DATE,
    DEATHS,
];

/// Columns that are not part of the composite merge key. Everything else in a
/// persisted table identifies a row.
pub const NON_KEY_COLS: [&str; 4] = [COUNTRY_NAME, ADM1_ISOCODE, FREQUENCY, DEATHS];

// Geocode reference table.
pub const GEOCODE: &str = "geocode";
pub const NAME: &str = "name";

// Population reference table.
pub const NAME_0: &str = "name_0";
pub const NAME_1: &str = "name_1";
pub const NAME_2: &str = "name_2";
pub const NAME_3: &str = "name_3";
pub const POPULATION: &str = "population";
