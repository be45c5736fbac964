//! Shared place-name cleanup helpers used by the source adapters and the
//! reference-table lookups.

use deunicode::deunicode;

/// Articles that stay lowercase inside Spanish place names.
const ARTICLES: [&str; 6] = ["de", "del", "los", "las", "el", "la"];

/// Diacritic-stripped, lowercased lookup key for a place name.
pub fn fold(name: &str) -> String {
    deunicode(name).to_lowercase()
}

/// Title-case a Spanish place name, keeping articles lowercase after the
/// first word: "ALTO PARANA" -> "Alto Parana", "BOCA DEL RIO" -> "Boca del Rio".
pub fn title_es(name: &str) -> String {
    name.split_whitespace()
        .enumerate()
        .map(|(i, word)| {
            let lower = word.to_lowercase();
            if i > 0 && ARTICLES.contains(&lower.as_str()) {
                lower
            } else {
                capitalize(&lower)
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Repair UTF-8 text that was mis-decoded as cp1252 somewhere upstream
/// ("ChimborazÃ³" -> "Chimborazó"). Returns the input unchanged when it does
/// not round-trip.
pub fn repair_cp1252(text: &str) -> String {
    let (bytes, _, had_errors) = encoding_rs::WINDOWS_1252.encode(text);
    if had_errors {
        return text.to_string();
    }
    match std::str::from_utf8(&bytes) {
        Ok(repaired) => repaired.to_string(),
        Err(_) => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fold_strips_diacritics_and_case() {
        assert_eq!(fold("Ñeembucú"), "neembucu");
        assert_eq!(fold("SÃO PAULO"), "sao paulo");
        assert_eq!(fold("Valparaíso"), "valparaiso");
    }

    #[test]
    fn title_case_keeps_articles_lowercase() {
        assert_eq!(title_es("ALTO PARAGUAY"), "Alto Paraguay");
        assert_eq!(title_es("PRESIDENTE HAYES"), "Presidente Hayes");
        assert_eq!(
            title_es("SANTO DOMINGO DE LOS TSACHILAS"),
            "Santo Domingo de los Tsachilas"
        );
        // The leading word is always capitalized, article or not.
        assert_eq!(title_es("LA LIBERTAD"), "La Libertad");
    }

    #[test]
    fn repair_fixes_double_decoded_utf8() {
        assert_eq!(repair_cp1252("ChimborazÃ³"), "Chimborazó");
        assert_eq!(repair_cp1252("CaÃ±ar"), "Cañar");
    }

    #[test]
    fn repair_leaves_clean_text_alone() {
        assert_eq!(repair_cp1252("Pichincha"), "Pichincha");
    }
}
