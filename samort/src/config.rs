use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// CSV of (geocode, name) rows; the first row per geocode carries the
    /// canonical division name, later rows are aliases.
    pub geocodes_path: String,
    /// CSV of (name_0, name_1, name_2, name_3, population) rows.
    pub population_path: String,
    /// Directory holding the persisted target tables.
    pub storage_dir: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            geocodes_path: "./update/geocodes.csv".into(),
            population_path: "./update/south.america.population.csv".into(),
            storage_dir: ".".into(),
        }
    }
}
