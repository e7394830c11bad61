//! Province name canonicalization for the geographic join.
//!
//! Spreadsheet names and boundary names differ in case, accents and, for a
//! couple of provinces, in the name itself. Both sides go through
//! [`normalize`]; the spreadsheet side additionally goes through
//! [`resolve_alias`].

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Local abbreviations -> name used by the boundary source (both normalized).
const GEO_ALIASES: &[(&str, &str)] = &[
    ("caba", "ciudad autonoma de buenos aires"),
    (
        "tierra del fuego",
        "tierra del fuego, antartida e islas del atlantico sur",
    ),
];

/// Cell texts that stand for "no value" once stringified.
const PLACEHOLDERS: &[&str] = &["", "nan", "none"];

/// Lower-case, NFKD-decompose, drop combining marks, trim.
pub fn normalize(name: &str) -> String {
    // Lowercasing can emit new marks (e.g. U+0130), so decompose again after it.
    let folded: String = name
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect();
    folded.trim().to_string()
}

/// Map a normalized key through the alias table.
pub fn resolve_alias(key: &str) -> &str {
    GEO_ALIASES
        .iter()
        .find(|(alias, _)| *alias == key)
        .map(|(_, canonical)| *canonical)
        .unwrap_or(key)
}

/// Key used to match a spreadsheet province against boundary features.
pub fn join_key(name: &str) -> String {
    let normalized = normalize(name);
    resolve_alias(&normalized).to_string()
}

/// True for blank cells and the stringified forms of missing values.
pub fn is_placeholder(text: &str) -> bool {
    let lowered = text.trim().to_lowercase();
    PLACEHOLDERS.contains(&lowered.as_str())
}
