use std::sync::OnceLock;

use regex::Regex;

const EMPTY_HEADER_PREFIX: &str = "empty";
const FALLBACK_HEADER_PREFIX: &str = "column";

fn non_identifier_runs() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[^A-Za-z0-9_]+").expect("valid identifier pattern"))
}

/// Turns raw header cells into bare SQL identifiers, one per input cell.
///
/// Blank cells become `empty1`, `empty2`, ... in the order they appear. Other
/// cells are transliterated to ASCII, spaces become underscores, the result is
/// lowercased, runs of anything outside `[a-z0-9_]` collapse to a single
/// underscore and surrounding underscores are trimmed. A non-blank cell that
/// reduces to nothing (`"!!!"`) falls back to `column<position>`.
///
/// Distinct cells may normalize to the same name; callers decide whether that
/// is an error.
pub fn normalize_headers(raw: &[String]) -> Vec<String> {
    let mut empty_count = 0usize;
    raw.iter()
        .enumerate()
        .map(|(idx, header)| {
            if header.is_empty() {
                empty_count += 1;
                return format!("{EMPTY_HEADER_PREFIX}{empty_count}");
            }
            let normalized = to_identifier(&deunicode::deunicode(header));
            if normalized.is_empty() {
                format!("{FALLBACK_HEADER_PREFIX}{}", idx + 1)
            } else {
                normalized
            }
        })
        .collect()
}

/// Lower snake-case identifier from already-transliterated text.
pub fn to_identifier(value: &str) -> String {
    let underscored = value.replace(' ', "_").to_lowercase();
    non_identifier_runs()
        .replace_all(&underscored, "_")
        .trim_matches('_')
        .to_string()
}
