// SESAM majorz exports: one line per entity and candidate.

use std::collections::BTreeSet;

use log::info;

use election_results::headers::normalize_header;
use election_results::reconcile::*;
use election_results::*;

use crate::imports::io_common::*;
use crate::imports::{FileImportError, ImportResult};

const HEADERS: [&str; 14] = [
    "Anzahl Sitze",
    "Wahlkreis-Nr",
    "Stimmberechtigte",
    "Wahlzettel",
    "Ungültige Wahlzettel",
    "Leere Wahlzettel",
    "Leere Stimmen",
    "Ungueltige Stimmen",
    "Kandidaten-Nr",
    "Gewaehlt",
    "Name",
    "Vorname",
    "Stimmen",
    "Anzahl Gemeinden",
];

/// `Anzahl Gemeinden` reads `{counted} von {total}`; an entity is counted
/// once all its municipalities are.
fn parse_counted(line: &Line) -> Result<bool, String> {
    let value = line.get("anzahl_gemeinden");
    let invalid = || "Invalid integer: anzahl_gemeinden".to_string();
    match value.split_once(" von ") {
        Some((counted, total)) => {
            let counted: u64 = counted.trim().parse().map_err(|_| invalid())?;
            let total: u64 = total.trim().parse().map_err(|_| invalid())?;
            Ok(counted == total)
        }
        None => Ok(line.int("anzahl_gemeinden")? > 0),
    }
}

fn is_elected(line: &Line) -> bool {
    matches!(
        normalize_header(line.get("gewaehlt")).as_str(),
        "gewahlt" | "gewaehlt" | "1" | "true"
    )
}

pub fn import_majorz(election: &Election, catalogue: &EntityCatalogue, path: &str) -> ImportResult {
    let table = load_table(path, "Results", &HEADERS).map_err(|e| vec![e])?;
    import_majorz_table(election, catalogue, &table)
}

pub fn import_majorz_table(election: &Election, catalogue: &EntityCatalogue, table: &Table) -> ImportResult {
    let scope = Scope::of_election(election, catalogue);
    let mut errors = Vec::new();
    let mut absolute_majority: Option<u64> = None;
    let mut candidates: Vec<Candidate> = Vec::new();
    let mut results: Vec<ElectionResult> = Vec::new();
    let mut seen: BTreeSet<(EntityId, String)> = BTreeSet::new();

    for line in table.lines.iter() {
        let mut line_errors: Vec<String> = Vec::new();
        if let Err(e) = line.int("anzahl_sitze") {
            line_errors.push(e);
        }
        match line.signed_int("absolutes_mehr") {
            Ok(Some(m)) if m >= 0 => absolute_majority = Some(m as u64),
            Ok(_) => {}
            Err(e) => line_errors.push(e),
        }
        let entity_id = entity_id(line, "wahlkreis_nr").map_err(|e| line_errors.push(e)).ok();
        if let Some(id) = entity_id {
            scope.check(id, &mut line_errors);
        }
        let counted = parse_counted(line).map_err(|e| line_errors.push(e)).unwrap_or(false);
        let numbers = (|| -> Result<[u64; 6], String> {
            Ok([
                line.int("stimmberechtigte")?,
                line.int("wahlzettel")?,
                line.int("ungultige_wahlzettel")?,
                line.int("leere_wahlzettel")?,
                line.int("leere_stimmen")?,
                line.int("ungueltige_stimmen")?,
            ])
        })()
        .map_err(|e| line_errors.push(e))
        .unwrap_or_default();
        let candidate_id = line
            .required("kandidaten_nr")
            .map_err(|e| line_errors.push(e))
            .ok();
        let votes = line.int("stimmen").map_err(|e| line_errors.push(e)).unwrap_or(0);

        if entity_id.map(|id| scope.skips(id)).unwrap_or(false) {
            continue;
        }
        let (entity_id, candidate_id) = match (entity_id, candidate_id) {
            (Some(e), Some(c)) if line_errors.is_empty() => (e, c),
            _ => {
                table.extend_errors(&mut errors, line, line_errors);
                continue;
            }
        };
        if !seen.insert((entity_id, candidate_id.clone())) {
            table.extend_errors(
                &mut errors,
                line,
                vec![format!("{}/{} was found twice", entity_id, candidate_id)],
            );
            continue;
        }

        let idx = match results.iter().position(|r| r.entity_id == entity_id) {
            Some(i) => i,
            None => {
                let [eligible_voters, received_ballots, invalid_ballots, blank_ballots, blank_votes, invalid_votes] =
                    numbers;
                let mut result = ElectionResult::uncounted(entity_id, scope.locate(entity_id));
                if counted {
                    result.counted = true;
                    result.eligible_voters = eligible_voters;
                    result.received_ballots = received_ballots;
                    result.invalid_ballots = invalid_ballots;
                    result.blank_ballots = blank_ballots;
                    result.blank_votes = blank_votes;
                    result.invalid_votes = invalid_votes;
                }
                results.push(result);
                results.len() - 1
            }
        };
        let counted = results[idx].counted;
        results[idx].candidate_results.push(CandidateResult {
            candidate_id: candidate_id.clone(),
            votes: VoteCount(if counted { votes } else { 0 }),
        });
        if !candidates.iter().any(|c| c.candidate_id == candidate_id) {
            candidates.push(Candidate {
                candidate_id,
                family_name: line.get("name").to_string(),
                first_name: line.get("vorname").to_string(),
                elected: is_elected(line),
                party: None,
                party_color: None,
                gender: None,
                year_of_birth: None,
                list_id: None,
            });
        }
    }

    if errors.is_empty() && results.is_empty() {
        return Err(vec![FileImportError::new("No data found")]);
    }
    if !errors.is_empty() {
        return Err(errors);
    }
    add_missing_election_results(&scope, &mut results);
    info!(
        "import_majorz_table: {} candidates, {} results",
        candidates.len(),
        results.len()
    );
    Ok(Import::Election(ElectionImport {
        status: None,
        absolute_majority,
        majority_type: None,
        has_expats: None,
        candidates,
        results,
        proporz: None,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn catalogue() -> EntityCatalogue {
        EntityCatalogue::new(
            2022,
            PrincipalDomain::Canton,
            2,
            vec![
                PoliticalEntity {
                    entity_id: 351,
                    name: "Bern".to_string(),
                    district: None,
                    region: None,
                    superregion: None,
                },
                PoliticalEntity {
                    entity_id: 352,
                    name: "Bolligen".to_string(),
                    district: None,
                    region: None,
                    superregion: None,
                },
            ],
        )
    }

    const HEADER: &str = "Anzahl Sitze;Wahlkreis-Nr;Stimmberechtigte;Wahlzettel;Ungültige Wahlzettel;\
                          Leere Wahlzettel;Leere Stimmen;Ungueltige Stimmen;Kandidaten-Nr;Gewaehlt;\
                          Name;Vorname;Stimmen;Anzahl Gemeinden;Absolutes Mehr";

    #[test]
    fn majorz() {
        let text = format!(
            "{}\n\
             1;351;10000;5000;10;20;30;5;1;Gewählt;Muster;Hans;3000;1 von 1;2480\n\
             1;351;10000;5000;10;20;30;5;2;Nicht gewählt;Meier;Anna;1900;1 von 1;2480\n\
             1;352;3000;1000;0;0;0;0;1;Gewählt;Muster;Hans;500;0 von 1;2480\n",
            HEADER
        );
        let table = load_csv_text(&text, "Results", &HEADERS).unwrap();
        let e = Election::new(
            "e",
            "Regierungsrat",
            NaiveDate::from_ymd_opt(2022, 3, 27).unwrap(),
            Domain::Canton,
            ElectionKind::Majorz,
        );
        let i = match import_majorz_table(&e, &catalogue(), &table).unwrap() {
            Import::Election(i) => i,
            _ => panic!("not an election import"),
        };
        assert_eq!(i.absolute_majority, Some(2480));
        assert!(i.candidates[0].elected);
        assert!(!i.candidates[1].elected);
        assert_eq!(i.results[0].accounted_ballots(), 4970);
        assert_eq!(i.results[0].candidate_results.len(), 2);
        assert!(!i.results[1].counted);
        assert_eq!(i.results[1].candidate_results[0].votes, VoteCount(0));
    }

    #[test]
    fn duplicates() {
        let text = format!(
            "{}\n\
             1;351;10000;5000;10;20;30;5;1;Gewählt;Muster;Hans;3000;1 von 1;\n\
             1;351;10000;5000;10;20;30;5;1;Gewählt;Muster;Hans;3000;1 von 1;\n",
            HEADER
        );
        let table = load_csv_text(&text, "Results", &HEADERS).unwrap();
        let e = Election::new(
            "e",
            "Regierungsrat",
            NaiveDate::from_ymd_opt(2022, 3, 27).unwrap(),
            Domain::Canton,
            ElectionKind::Majorz,
        );
        let errors = import_majorz_table(&e, &catalogue(), &table).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].to_string(), "Results:3: 351/1 was found twice");
    }
}
