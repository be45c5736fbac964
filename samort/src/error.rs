//! Error types.

#[derive(thiserror::Error, Debug)]
pub enum SamortError {
    /// A raw division name has no entry in the geocode reference table. The
    /// adapter's rename maps are stale, so the whole country's output is
    /// suspect for this run.
    #[error("no geocode entry for division name '{0}'")]
    UnknownDivision(String),
    /// A target table is missing or unreadable. The tables must pre-exist
    /// with the correct header; there is no safe default for an unknown
    /// schema.
    #[error("target table missing or unreadable: {0}")]
    MissingTable(String),
    #[error("Wrapped anyhow error: {0}")]
    AnyhowError(#[from] anyhow::Error),
    #[error("Wrapped polars error: {0}")]
    PolarsError(#[from] polars::error::PolarsError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_division_names_the_offending_string() {
        let err = SamortError::UnknownDivision("Magallanes y Antartica".to_string());
        assert!(err.to_string().contains("Magallanes y Antartica"));
    }
}
