//! Matching of the headers found in a tabular file against the columns an
//! import format expects.

use snafu::prelude::*;
use strsim::levenshtein;

#[derive(Debug, Snafu, PartialEq, Eq, Clone)]
pub enum HeaderError {
    #[snafu(display("Missing columns: '{}'", columns.join(", ")))]
    MissingColumns { columns: Vec<String> },
    #[snafu(display("Some column names appear twice."))]
    DuplicateColumnNames {},
    #[snafu(display(
        "Could not find the expected columns, make sure all required columns exist and that there are no extra columns."
    ))]
    AmbiguousColumns {
        /// For each ambiguous expected column, the headers it could match.
        columns: Vec<(String, Vec<String>)>,
    },
}

// Folds the accented letters found in the headers of the cantonal exports.
fn transliterate(c: char) -> Option<&'static str> {
    let s = match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => "a",
        'ç' => "c",
        'è' | 'é' | 'ê' | 'ë' => "e",
        'ì' | 'í' | 'î' | 'ï' => "i",
        'ñ' => "n",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' => "o",
        'ù' | 'ú' | 'û' | 'ü' => "u",
        'ý' | 'ÿ' => "y",
        'æ' => "ae",
        'œ' => "oe",
        'ß' => "ss",
        _ => return None,
    };
    Some(s)
}

/// Normalizes a header: trims it, lowercases it, replaces accented letters
/// by their ASCII base letter and collapses inner whitespace.
pub fn normalize_header(header: &str) -> String {
    let lowered = header.trim().to_lowercase();
    let mut folded = String::with_capacity(lowered.len());
    for c in lowered.chars() {
        match transliterate(c) {
            Some(s) => folded.push_str(s),
            None => folded.push(c),
        }
    }
    folded.split_whitespace().collect::<Vec<&str>>().join(" ")
}

/// Turns a header into the identifier used to look up the cells of a row.
///
/// `"Wahlkreis-Nr"` becomes `"wahlkreis_nr"`, `"1. Stimmen"` becomes `"stimmen"`.
pub fn as_valid_identifier(value: &str) -> String {
    let mut result: String = normalize_header(value)
        .chars()
        .map(|c| if "- .%/,;()".contains(c) { '_' } else { c })
        .collect();
    while result.starts_with(|c: char| c == '_' || c.is_ascii_digit()) {
        result.remove(0);
    }
    result
}

/// Matches normalized headers against the expected headers, tolerating
/// typos.
///
/// The tolerated edit distance is the smallest of: the distance between any
/// two headers, the distance between any two expected headers and the length
/// of the shortest expected header. Every expected header is mapped to the
/// closest header below that distance. Headers that do not match any expected
/// header are kept as they are.
///
/// ```
/// use election_results::headers::match_headers;
///
/// let headers = vec!["firstname".to_string(), "lastname".to_string()];
/// let expected = vec!["last_name".to_string(), "first_name".to_string()];
/// assert_eq!(
///     match_headers(&headers, &expected)?,
///     vec!["first_name".to_string(), "last_name".to_string()]
/// );
/// # Ok::<(), election_results::headers::HeaderError>(())
/// ```
pub fn match_headers(headers: &[String], expected: &[String]) -> Result<Vec<String>, HeaderError> {
    let mut unique: Vec<&String> = headers.iter().collect();
    unique.sort();
    unique.dedup();
    ensure!(unique.len() == headers.len(), DuplicateColumnNamesSnafu {});

    let mut sane_distance = usize::MAX;
    if headers.len() > 1 {
        sane_distance = sane_distance.min(min_pairwise_distance(headers));
    }
    if expected.len() > 1 {
        sane_distance = sane_distance.min(min_pairwise_distance(expected));
    }
    if let Some(shortest) = expected.iter().map(|c| c.chars().count()).min() {
        sane_distance = sane_distance.min(shortest);
    }

    let mut mapping: Vec<(&String, &String)> = Vec::new();
    let mut missing: Vec<String> = Vec::new();
    let mut ambiguous: Vec<(String, Vec<String>)> = Vec::new();

    for column in expected {
        let normalized = normalize_header(column);
        let distances: Vec<(&String, usize)> = headers
            .iter()
            .map(|h| (h, levenshtein(&normalized, h)))
            .collect();
        let closest = match distances.iter().map(|(_, d)| *d).min() {
            Some(d) if d < sane_distance => d,
            _ => {
                missing.push(column.clone());
                continue;
            }
        };
        let matches: Vec<&String> = distances
            .iter()
            .filter(|(_, d)| *d == closest)
            .map(|(h, _)| *h)
            .collect();
        if let [single] = matches.as_slice() {
            mapping.push((*single, column));
        } else {
            ambiguous.push((
                column.clone(),
                matches.iter().map(|h| h.to_string()).collect(),
            ));
        }
    }

    ensure!(missing.is_empty(), MissingColumnsSnafu { columns: missing });
    ensure!(
        ambiguous.is_empty(),
        AmbiguousColumnsSnafu { columns: ambiguous }
    );

    Ok(headers
        .iter()
        .map(|h| {
            mapping
                .iter()
                .rev()
                .find(|(header, _)| *header == h)
                .map(|(_, column)| column.to_string())
                .unwrap_or_else(|| h.clone())
        })
        .collect())
}

fn min_pairwise_distance(values: &[String]) -> usize {
    let mut min = usize::MAX;
    for (i, a) in values.iter().enumerate() {
        for b in values.iter().skip(i + 1) {
            min = min.min(levenshtein(a, b));
        }
    }
    min
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn normalize() {
        assert_eq!(normalize_header("  Ungültige   Wahlzettel "), "ungultige wahlzettel");
        assert_eq!(normalize_header("Entity_ID"), "entity_id");
    }

    #[test]
    fn identifiers() {
        assert_eq!(as_valid_identifier("Wahlkreis-Nr"), "wahlkreis_nr");
        assert_eq!(as_valid_identifier("1. Stimmen"), "stimmen");
        assert_eq!(as_valid_identifier("Stimmen (%)"), "stimmen____");
        assert_eq!(as_valid_identifier("01.04"), "");
    }

    #[test]
    fn match_with_typos() {
        assert_eq!(
            match_headers(
                &strings(&["firstname", "lastname"]),
                &strings(&["first_name", "last_name"])
            ),
            Ok(strings(&["first_name", "last_name"]))
        );
    }

    #[test]
    fn match_keeps_extra_headers() {
        assert_eq!(
            match_headers(
                &strings(&["entity_id", "counted", "remark"]),
                &strings(&["entity_id", "counted"])
            ),
            Ok(strings(&["entity_id", "counted", "remark"]))
        );
    }

    #[test]
    fn match_missing() {
        assert_eq!(
            match_headers(&strings(&["a", "b"]), &strings(&["a", "c"])),
            Err(HeaderError::MissingColumns {
                columns: strings(&["c"])
            })
        );
        let err = match_headers(&strings(&["a", "b"]), &strings(&["a", "c"])).unwrap_err();
        assert_eq!(err.to_string(), "Missing columns: 'c'");
    }

    #[test]
    fn match_duplicates() {
        assert_eq!(
            match_headers(&strings(&["a", "a"]), &strings(&["a"])),
            Err(HeaderError::DuplicateColumnNames {})
        );
    }

    #[test]
    fn match_ambiguous() {
        let res = match_headers(&strings(&["ab", "cd", "xyz"]), &strings(&["ad", "xyz"]));
        assert!(matches!(res, Err(HeaderError::AmbiguousColumns { .. })));
    }
}
