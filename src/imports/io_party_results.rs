// Internal party results: one line per party and year, with optional
// translations, voters counts and panachage columns.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Datelike;
use log::{debug, info};

use election_results::reconcile::*;
use election_results::*;

use crate::imports::io_common::*;
use crate::imports::{FileImportError, ImportResult};

pub const HEADERS: [&str; 6] = ["year", "total_votes", "name", "color", "mandates", "votes"];

const PANACHAGE_PREFIX: &str = "panachage_votes_from_";
const NAME_PREFIX: &str = "name_";

/// The panachage columns mapped to their source party. `999` is the blank
/// list, stored as an empty source.
fn panachage_columns(table: &Table) -> Vec<(String, String)> {
    table
        .headers
        .iter()
        .zip(table.columns.iter())
        .filter_map(|(header, column)| {
            let source = header.strip_prefix(PANACHAGE_PREFIX)?;
            let source = if source == BLANK_LIST_ID { "" } else { source };
            Some((column.clone(), source.to_string()))
        })
        .collect()
}

/// The translation columns (`name_de_ch`) mapped to their locale (`de_CH`).
fn translation_columns(table: &Table) -> Vec<(String, String)> {
    table
        .headers
        .iter()
        .zip(table.columns.iter())
        .filter_map(|(header, column)| {
            let locale = header.strip_prefix(NAME_PREFIX)?;
            let (language, country) = locale.split_once('_')?;
            Some((
                column.clone(),
                format!("{}_{}", language, country.to_uppercase()),
            ))
        })
        .collect()
}

/// What party results are imported into: the domain, segment and year of
/// an election or a compound. Compounds may also hold results for the
/// superregions of the catalogue.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct PartyTarget {
    pub domain: String,
    pub domain_segment: Option<String>,
    pub year: i32,
    pub superregions: BTreeSet<String>,
}

impl PartyTarget {
    pub fn of_election(election: &Election) -> PartyTarget {
        PartyTarget {
            domain: election.domain.as_str().to_string(),
            domain_segment: election.domain_segment.clone(),
            year: election.date.year(),
            superregions: BTreeSet::new(),
        }
    }

    pub fn of_compound(compound: &ElectionCompound, catalogue: &EntityCatalogue) -> PartyTarget {
        PartyTarget {
            domain: compound.domain.as_str().to_string(),
            domain_segment: None,
            year: compound.date.year(),
            superregions: catalogue
                .entities
                .values()
                .filter_map(|e| e.superregion.clone())
                .collect(),
        }
    }

    /// The domain and segment a line is stored under, `None` if the line
    /// belongs to another domain. An empty domain is the target's.
    fn place(&self, domain: &str, segment: &str) -> Result<Option<(String, Option<String>)>, String> {
        let domain = if domain.is_empty() { self.domain.as_str() } else { domain };
        if domain == self.domain {
            return Ok(match &self.domain_segment {
                Some(s) if !segment.is_empty() && segment != s => None,
                _ => Some((domain.to_string(), self.domain_segment.clone())),
            });
        }
        if domain == SUPERREGION && !self.superregions.is_empty() {
            if !self.superregions.contains(segment) {
                let segment = if segment.is_empty() { "None" } else { segment };
                return Err(format!("Invalid domain_segment: {}", segment));
            }
            return Ok(Some((domain.to_string(), Some(segment.to_string()))));
        }
        Ok(None)
    }
}

const SUPERREGION: &str = "superregion";

pub fn import_party_results(target: &PartyTarget, path: &str) -> ImportResult {
    let table = load_table(path, "Party results", &HEADERS).map_err(|e| vec![e])?;
    import_party_results_table(target, &table)
}

pub fn import_party_results_table(target: &PartyTarget, table: &Table) -> ImportResult {
    let panachage_columns = panachage_columns(table);
    let translation_columns = translation_columns(table);
    let has_id = table.columns.iter().any(|c| c == "id");
    let mut errors: Vec<FileImportError> = Vec::new();
    let mut party_results: Vec<PartyResult> = Vec::new();
    let mut colors: BTreeMap<String, String> = BTreeMap::new();
    let mut seen: BTreeSet<(String, Option<String>, i32, String)> = BTreeSet::new();
    // (target, source, votes, year)
    let mut transfers: Vec<(String, String, u64, i32)> = Vec::new();

    for line in table.lines.iter() {
        if line.columns().all(|c| line.get(c).is_empty()) {
            table.extend_errors(&mut errors, line, vec!["Invalid values".to_string()]);
            continue;
        }
        let mut line_errors: Vec<String> = Vec::new();
        let mut int = |col: &str| line.int(col).map_err(|e| line_errors.push(e)).unwrap_or(0);
        let year = int("year");
        let total_votes = int("total_votes");
        let votes = int("votes");
        let mandates = line.small_int("mandates").map_err(|e| line_errors.push(e)).unwrap_or(0);
        let color = line.color("color").map_err(|e| line_errors.push(e)).unwrap_or(None);
        let voters_count = line.centi("voters_count").map_err(|e| line_errors.push(e)).unwrap_or(None);
        let voters_count_percentage = line
            .centi("voters_count_percentage")
            .map_err(|e| line_errors.push(e))
            .unwrap_or(None);
        let year = i32::try_from(year).unwrap_or_else(|_| {
            line_errors.push("Invalid integer: year".to_string());
            0
        });

        let translations: BTreeMap<String, String> = translation_columns
            .iter()
            .filter(|(col, _)| !line.get(col).is_empty())
            .map(|(col, locale)| (locale.clone(), line.get(col).to_string()))
            .collect();
        let name = match line.get("name") {
            "" => translations.values().next().cloned().unwrap_or_default(),
            n => n.to_string(),
        };
        if name.is_empty() {
            line_errors.push("Empty value: name".to_string());
        }
        let party_id = if has_id {
            line.list_id("id").map_err(|e| line_errors.push(e)).unwrap_or_default()
        } else {
            name.clone()
        };
        let mut party_transfers: Vec<(String, u64)> = Vec::new();
        for (col, source) in panachage_columns.iter() {
            match line.int(col) {
                Ok(v) => party_transfers.push((source.clone(), v)),
                Err(e) => line_errors.push(e),
            }
        }

        let place = target
            .place(line.get("domain"), line.get("domain_segment"))
            .map_err(|e| line_errors.push(e))
            .unwrap_or(None);
        if line_errors.is_empty() {
            if let Some((domain, segment)) = &place {
                if !seen.insert((domain.clone(), segment.clone(), year, party_id.clone())) {
                    line_errors.push(format!(
                        "{}/{}/{}/{} was found twice",
                        domain,
                        segment.as_deref().unwrap_or(""),
                        year,
                        party_id
                    ));
                }
            }
        }
        if !line_errors.is_empty() {
            table.extend_errors(&mut errors, line, line_errors);
            continue;
        }
        let (domain, domain_segment) = match place {
            Some(p) => p,
            None => {
                debug!(
                    "import_party_results_table: line {} is for another domain",
                    line.rownumber
                );
                continue;
            }
        };

        if let Some(c) = color {
            colors.insert(name.clone(), c.clone());
            for translated in translations.values() {
                colors.insert(translated.clone(), c.clone());
            }
        }
        if domain == target.domain {
            for (source, v) in party_transfers {
                if source != party_id {
                    transfers.push((party_id.clone(), source, v, year));
                }
            }
        }
        let mut name_translations = translations;
        if name_translations.is_empty() {
            name_translations.insert(DEFAULT_LOCALE.to_string(), name.clone());
        }
        party_results.push(PartyResult {
            domain: Some(domain),
            domain_segment,
            year,
            party_id,
            name,
            name_translations,
            total_votes: VoteCount(total_votes),
            votes: VoteCount(votes),
            voters_count,
            voters_count_percentage,
            number_of_mandates: mandates,
        });
    }

    if !party_results.iter().any(|r| r.year == target.year) {
        errors.push(FileImportError::new(format!(
            "No party results for year {}",
            target.year
        )));
    }
    let known: BTreeSet<&str> = party_results.iter().map(|r| r.party_id.as_str()).collect();
    if !party_results.is_empty() {
        for (_, source) in panachage_columns.iter() {
            if !source.is_empty() && !known.contains(source.as_str()) {
                errors.push(FileImportError::new(format!(
                    "Panachage results id {} not in list_id's",
                    source
                )));
            }
        }
    }
    if !errors.is_empty() {
        return Err(errors);
    }

    // The panachage is only kept for the most recent year.
    let latest = party_results.iter().map(|r| r.year).max().unwrap_or(0);
    let panachage: Vec<PartyPanachageResult> = transfers
        .into_iter()
        .filter(|(_, _, _, year)| *year == latest)
        .map(|(target, source, votes, _)| PartyPanachageResult {
            target,
            source,
            votes: VoteCount(votes),
        })
        .collect();
    debug!("import_party_results_table: colors {:?}", colors);
    info!(
        "import_party_results_table: {} party results, {} panachage results",
        party_results.len(),
        panachage.len()
    );
    Ok(Import::PartyResults(PartyImport {
        party_results,
        panachage,
        colors,
    }))
}

/// The locale of the party names when the file has no translations.
pub const DEFAULT_LOCALE: &str = "de_CH";
