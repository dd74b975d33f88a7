// Wabsti exports. Votes: one line per vote and entity. Majorz elections:
// one line per entity with the candidates side by side. Proporz elections:
// a results file with one line per candidate and entity, and optional
// files with the list connections, the elected candidates and the ballot
// statistics.

use std::collections::BTreeMap;

use log::{debug, info};

use election_results::proporz::prefix_connection_id;
use election_results::reconcile::*;
use election_results::*;

use crate::imports::io_common::*;
use crate::imports::{FileImportError, ImportResult};

const VOTE: [&str; 15] = [
    "Vorlage-Nr.",
    "BfS-Nr.",
    "Stimmberechtigte",
    "leere SZ",
    "ungültige SZ",
    "Ja",
    "Nein",
    "InitOAntw",
    "GegenvJa",
    "GegenvNein",
    "GegenvOAntw",
    "StichfrJa",
    "StichfrNein",
    "StichfrOAntw",
    "StimmBet",
];
const MAJORZ: [&str; 7] = [
    "AnzMandate",
    "BFS",
    "StimmBer",
    "StimmAbgegeben",
    "StimmLeer",
    "StimmUngueltig",
    "StimmGueltig",
];
const MAJORZ_ELECTED: [&str; 3] = ["ID", "Name", "Vorname"];
// The pseudo candidates of the majorz exports.
const BLANK_LINES: &str = "Leere Zeilen";
const INVALID_VOTES: &str = "Ungültige Stimmen";

const RESULTS: [&str; 8] = [
    "einheit_bfs",
    "liste_kandid",
    "kand_nachname",
    "kand_vorname",
    "liste_id",
    "liste_code",
    "kand_stimmentotal",
    "liste_parteistimmentotal",
];
const CONNECTIONS: [&str; 3] = ["liste", "lv", "luv"];
const ELECTED: [&str; 1] = ["liste_kandid"];
const STATISTICS: [&str; 7] = [
    "einheit_bfs",
    "einheit_name",
    "stimbertotal",
    "wzeingegangen",
    "wzleer",
    "wzungueltig",
    "stmwzveraendertleeramtlleer",
];

/// The panachage columns, headed `{list id}.{list code}`, mapped to their
/// source list. `99` is the blank list.
fn panachage_columns(table: &Table) -> Vec<(String, String)> {
    table
        .headers
        .iter()
        .zip(table.columns.iter())
        .filter_map(|(header, column)| {
            let (list_id, _) = header.split_once('.')?;
            let list_id = if list_id == "99" { BLANK_LIST_ID } else { list_id };
            Some((column.clone(), list_id.to_string()))
        })
        .collect()
}

// ******** Votes ********

/// The yeas, nays and unanswered columns of each ballot.
fn ballot_columns(ballot_type: BallotType) -> (&'static str, &'static str, &'static str) {
    match ballot_type {
        BallotType::Proposal => ("ja", "nein", "initoantw"),
        BallotType::CounterProposal => ("gegenvja", "gegenvnein", "gegenvoantw"),
        BallotType::TieBreaker => ("stichfrja", "stichfrnein", "stichfroantw"),
    }
}

pub fn import_vote(
    vote: &Vote,
    catalogue: &EntityCatalogue,
    number: u64,
    path: &str,
) -> ImportResult {
    let table = load_table(path, "Results", &VOTE).map_err(|e| vec![e])?;
    import_vote_table(vote, catalogue, number, &table)
}

/// Imports the lines of the vote `number` (`Vorlage-Nr.`). An entity is
/// counted once its turnout (`StimmBet`) is not 0.
pub fn import_vote_table(
    vote: &Vote,
    catalogue: &EntityCatalogue,
    number: u64,
    table: &Table,
) -> ImportResult {
    let scope = Scope::of_vote(vote, catalogue);
    let ballot_types: &[BallotType] = if vote.ballot(BallotType::CounterProposal).is_some() {
        &[
            BallotType::Proposal,
            BallotType::CounterProposal,
            BallotType::TieBreaker,
        ]
    } else {
        &[BallotType::Proposal]
    };
    let mut errors: Vec<FileImportError> = Vec::new();
    let mut ballots: BTreeMap<BallotType, Vec<BallotResult>> = BTreeMap::new();
    let mut seen: Vec<EntityId> = Vec::new();

    for line in table.lines.iter() {
        let mut line_errors: Vec<String> = Vec::new();
        match line.int("vorlage_nr_") {
            Ok(n) if n != number => continue,
            Ok(_) => {}
            Err(e) => line_errors.push(e),
        }
        let entity = entity_id(line, "bfs_nr_");
        let mut int = |col: &str| line.int(col).map_err(|e| line_errors.push(e)).unwrap_or(0);
        let eligible_voters = int("stimmberechtigte");
        let invalid = int("ungultige_sz");
        let numbers: Vec<(BallotType, u64, u64)> = ballot_types
            .iter()
            .map(|bt| {
                let (yeas, nays, _) = ballot_columns(*bt);
                (*bt, int(yeas), int(nays))
            })
            .collect();
        let mut empties: Vec<u64> = Vec::new();
        for bt in ballot_types.iter() {
            let (_, _, unanswered) = ballot_columns(*bt);
            match line
                .int("leere_sz")
                .and_then(|leer| Ok(leer + line.int(unanswered)?))
            {
                Ok(e) => empties.push(e),
                Err(_) => {
                    let message = "Could not read the empty votes".to_string();
                    if !line_errors.contains(&message) {
                        line_errors.push(message);
                    }
                    empties.push(0);
                }
            }
        }
        let counted = match line.get("stimmbet").parse::<f64>() {
            Ok(turnout) => turnout != 0.0,
            Err(_) => {
                line_errors.push("Invalid float number: stimmbet".to_string());
                false
            }
        };

        let entity_id = match entity {
            Ok(id) => id,
            Err(e) => {
                line_errors.insert(0, e);
                table.extend_errors(&mut errors, line, line_errors);
                continue;
            }
        };
        if scope.skips(entity_id) {
            continue;
        }
        scope.check(entity_id, &mut line_errors);
        if seen.contains(&entity_id) {
            line_errors.push(format!("{} was found twice", entity_id));
        }
        if !line_errors.is_empty() {
            table.extend_errors(&mut errors, line, line_errors);
            continue;
        }
        seen.push(entity_id);
        for ((ballot_type, yeas, nays), empty) in numbers.into_iter().zip(empties) {
            let mut result = BallotResult::uncounted(entity_id, scope.locate(entity_id));
            if counted {
                result.counted = true;
                result.eligible_voters = eligible_voters;
                result.invalid = invalid;
                result.yeas = yeas;
                result.nays = nays;
                result.empty = empty;
            }
            ballots.entry(ballot_type).or_default().push(result);
        }
    }

    if errors.is_empty() && ballots.is_empty() {
        return Err(vec![FileImportError::new("No data found")]);
    }
    if !errors.is_empty() {
        return Err(errors);
    }
    let ballots: Vec<Ballot> = ballots
        .into_iter()
        .map(|(ballot_type, mut results)| {
            let present: Vec<EntityId> = results.iter().map(|r| r.entity_id).collect();
            for (id, location) in scope.missing(&present) {
                results.push(BallotResult::uncounted(id, location));
            }
            Ballot {
                ballot_type,
                results,
            }
        })
        .collect();
    info!(
        "import_vote_table: {} #{}: {} ballots",
        vote.id,
        number,
        ballots.len()
    );
    Ok(Import::Vote(VoteImport {
        status: None,
        has_expats: None,
        ballots,
    }))
}

// ******** Majorz ********

/// The numbers `n` of the candidate columns `KandID_n`, `KandName_n`,
/// `KandVorname_n` and `Stimmen_n`.
fn candidate_columns(table: &Table) -> Vec<String> {
    table
        .columns
        .iter()
        .filter_map(|c| c.strip_prefix("kandid_"))
        .map(|n| n.to_string())
        .collect()
}

pub fn import_majorz(
    election: &Election,
    catalogue: &EntityCatalogue,
    inputs: &BTreeMap<String, String>,
) -> ImportResult {
    let mut errors: Vec<FileImportError> = Vec::new();
    let elected = inputs.get("elected").and_then(|path| {
        load_table(path, "Elected Candidates", &MAJORZ_ELECTED)
            .map_err(|e| errors.push(e))
            .ok()
    });
    let results = match inputs.get("results") {
        Some(path) => load_table(path, "Results", &MAJORZ).map_err(|e| errors.push(e)).ok(),
        None => {
            errors.push(FileImportError::in_file("Results", "No file given"));
            None
        }
    };
    match results {
        Some(results) if errors.is_empty() => {
            import_majorz_tables(election, catalogue, &results, elected.as_ref())
        }
        _ => Err(errors),
    }
}

/// Imports a majorz election. Every entity with a line is counted. The
/// pseudo candidates `Leere Zeilen` and `Ungültige Stimmen` hold the blank
/// and invalid votes.
pub fn import_majorz_tables(
    election: &Election,
    catalogue: &EntityCatalogue,
    table: &Table,
    elected_table: Option<&Table>,
) -> ImportResult {
    let scope = Scope::of_election(election, catalogue);
    let columns = candidate_columns(table);
    let mut errors: Vec<FileImportError> = Vec::new();
    let mut candidates: Vec<Candidate> = Vec::new();
    let mut results: Vec<ElectionResult> = Vec::new();

    for line in table.lines.iter() {
        let mut line_errors: Vec<String> = Vec::new();
        let entity = entity_id(line, "bfs");
        let mut int = |col: &str| line.int(col).map_err(|e| line_errors.push(e)).unwrap_or(0);
        let eligible_voters = int("stimmber");
        let received_ballots = int("stimmabgegeben");
        let blank_ballots = int("stimmleer");
        let invalid_ballots = int("stimmungueltig");
        let mut blank_votes = 0;
        let mut invalid_votes = 0;
        let mut line_candidates: Vec<(Candidate, u64)> = Vec::new();
        for n in columns.iter() {
            let candidate_id = line.get(&format!("kandid_{}", n)).to_string();
            let family_name = line.get(&format!("kandname_{}", n)).to_string();
            if candidate_id.is_empty() && family_name.is_empty() {
                continue;
            }
            let votes = int(&format!("stimmen_{}", n));
            match family_name.as_str() {
                BLANK_LINES => blank_votes += votes,
                INVALID_VOTES => invalid_votes += votes,
                _ => line_candidates.push((
                    Candidate {
                        candidate_id,
                        family_name,
                        first_name: line.get(&format!("kandvorname_{}", n)).to_string(),
                        elected: false,
                        party: None,
                        party_color: None,
                        gender: None,
                        year_of_birth: None,
                        list_id: None,
                    },
                    votes,
                )),
            }
        }

        let entity_id = match entity {
            Ok(id) => id,
            Err(e) => {
                line_errors.insert(0, e);
                table.extend_errors(&mut errors, line, line_errors);
                continue;
            }
        };
        if scope.skips(entity_id) {
            continue;
        }
        scope.check(entity_id, &mut line_errors);
        if results.iter().any(|r| r.entity_id == entity_id) {
            line_errors.push(format!("{} was found twice", entity_id));
        }
        if line_candidates.iter().any(|(c, _)| c.candidate_id.is_empty()) {
            line_errors.push("Empty value: kandid".to_string());
        }
        if !line_errors.is_empty() {
            table.extend_errors(&mut errors, line, line_errors);
            continue;
        }
        let mut result = ElectionResult::uncounted(entity_id, scope.locate(entity_id));
        result.counted = true;
        result.eligible_voters = eligible_voters;
        result.received_ballots = received_ballots;
        result.blank_ballots = blank_ballots;
        result.invalid_ballots = invalid_ballots;
        result.blank_votes = blank_votes;
        result.invalid_votes = invalid_votes;
        for (candidate, votes) in line_candidates {
            result.candidate_results.push(CandidateResult {
                candidate_id: candidate.candidate_id.clone(),
                votes: VoteCount(votes),
            });
            if !candidates.iter().any(|c| c.candidate_id == candidate.candidate_id) {
                candidates.push(candidate);
            }
        }
        debug!(
            "import_majorz_tables: entity {}, {} candidates",
            entity_id,
            result.candidate_results.len()
        );
        results.push(result);
    }

    if let Some(t) = elected_table {
        for line in t.lines.iter() {
            let candidate_id = line.get("id");
            match candidates.iter_mut().find(|c| c.candidate_id == candidate_id) {
                Some(c) => c.elected = true,
                None => t.extend_errors(&mut errors, line, vec!["Unknown candidate".to_string()]),
            }
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
        "import_majorz_tables: {} candidates, {} results",
        candidates.len(),
        results.len()
    );
    Ok(Import::Election(ElectionImport {
        status: None,
        absolute_majority: None,
        majority_type: None,
        has_expats: None,
        candidates,
        results,
        proporz: None,
    }))
}

// ******** Proporz ********

pub fn import_proporz(
    election: &Election,
    catalogue: &EntityCatalogue,
    inputs: &BTreeMap<String, String>,
) -> ImportResult {
    let mut errors: Vec<FileImportError> = Vec::new();
    let mut optional = |key: &str, name: &str, headers: &[&str]| -> Option<Table> {
        let path = inputs.get(key)?;
        load_table(path, name, headers).map_err(|e| errors.push(e)).ok()
    };
    let connections = optional("connections", "List connections", &CONNECTIONS);
    let elected = optional("elected", "Elected Candidates", &ELECTED);
    let statistics = optional("statistics", "Election statistics", &STATISTICS);
    let results = match inputs.get("results") {
        Some(path) => load_table(path, "Results", &RESULTS).map_err(|e| errors.push(e)).ok(),
        None => {
            errors.push(FileImportError::in_file("Results", "No file given"));
            None
        }
    };
    match results {
        Some(results) if errors.is_empty() => import_proporz_tables(
            election,
            catalogue,
            &results,
            connections.as_ref(),
            elected.as_ref(),
            statistics.as_ref(),
        ),
        _ => Err(errors),
    }
}

pub fn import_proporz_tables(
    election: &Election,
    catalogue: &EntityCatalogue,
    table: &Table,
    connections_table: Option<&Table>,
    elected_table: Option<&Table>,
    statistics_table: Option<&Table>,
) -> ImportResult {
    let scope = Scope::of_election(election, catalogue);
    let panachage_columns = panachage_columns(table);
    let mut errors: Vec<FileImportError> = Vec::new();
    let mut results: Vec<ElectionResult> = Vec::new();
    let mut lists: Vec<List> = Vec::new();
    let mut candidates: Vec<Candidate> = Vec::new();
    let mut panachage: BTreeMap<String, BTreeMap<String, u64>> = BTreeMap::new();

    for line in table.lines.iter() {
        let mut line_errors: Vec<String> = Vec::new();
        let entity = entity_id(line, "einheit_bfs").map_err(|e| line_errors.push(e)).ok();
        if let Some(id) = entity {
            scope.check(id, &mut line_errors);
        }
        let candidate_id = line
            .int("liste_kandid")
            .map_err(|e| line_errors.push(e))
            .ok();
        let candidate_votes = line
            .int("kand_stimmentotal")
            .map_err(|e| line_errors.push(e))
            .unwrap_or(0);
        let list_id = line.list_id("liste_id").map_err(|e| line_errors.push(e)).ok();
        let list_votes = line
            .int("liste_parteistimmentotal")
            .map_err(|e| line_errors.push(e))
            .unwrap_or(0);
        let mut transfers: Vec<(String, u64)> = Vec::new();
        for (column, source) in panachage_columns.iter() {
            if Some(source) == list_id.as_ref() {
                continue;
            }
            match line.int(column) {
                Ok(votes) => transfers.push((source.clone(), votes)),
                Err(e) => line_errors.push(e),
            }
        }

        if entity.map(|id| scope.skips(id)).unwrap_or(false) {
            continue;
        }
        let (entity_id, candidate_id, list_id) = match (entity, candidate_id, list_id) {
            (Some(e), Some(c), Some(l)) if line_errors.is_empty() => (e, c.to_string(), l),
            _ => {
                table.extend_errors(&mut errors, line, line_errors);
                continue;
            }
        };

        let sums = panachage.entry(list_id.clone()).or_default();
        for (source, votes) in transfers {
            *sums.entry(source).or_default() += votes;
        }
        if !lists.iter().any(|l| l.list_id == list_id) {
            lists.push(List {
                list_id: list_id.clone(),
                name: line.get("liste_code").to_string(),
                number_of_mandates: 0,
                connection: None,
                color: None,
                panachage: vec![],
            });
        }
        let idx = match results.iter().position(|r| r.entity_id == entity_id) {
            Some(i) => i,
            None => {
                let mut result = ElectionResult::uncounted(entity_id, scope.locate(entity_id));
                result.counted = true;
                results.push(result);
                results.len() - 1
            }
        };
        let result = &mut results[idx];
        if !result.list_results.iter().any(|r| r.list_id == list_id) {
            result.list_results.push(ListResult {
                list_id: list_id.clone(),
                votes: VoteCount(list_votes),
            });
        }
        result.candidate_results.push(CandidateResult {
            candidate_id: candidate_id.clone(),
            votes: VoteCount(candidate_votes),
        });
        match candidates.iter_mut().find(|c| c.candidate_id == candidate_id) {
            Some(c) => c.list_id = Some(list_id),
            None => candidates.push(Candidate {
                candidate_id,
                family_name: line.get("kand_nachname").to_string(),
                first_name: line.get("kand_vorname").to_string(),
                elected: false,
                party: None,
                party_color: None,
                gender: None,
                year_of_birth: None,
                list_id: Some(list_id),
            }),
        }
    }

    let mut connections: Vec<ListConnection> = Vec::new();
    if let Some(t) = connections_table {
        for line in t.lines.iter() {
            let list_id = match line.list_id("liste") {
                Ok(id) => id,
                Err(e) => {
                    t.extend_errors(&mut errors, line, vec![e]);
                    continue;
                }
            };
            let list = match lists.iter_mut().find(|l| l.list_id == list_id) {
                Some(l) => l,
                None => continue,
            };
            let connection = line.get("lv");
            let subconnection = line.get("luv");
            if connection.is_empty() {
                continue;
            }
            if !connections.iter().any(|c| c.connection_id == connection) {
                connections.push(ListConnection {
                    connection_id: connection.to_string(),
                    parent: None,
                });
            }
            list.connection = Some(connection.to_string());
            if !subconnection.is_empty() {
                let sub = prefix_connection_id(subconnection, connection);
                if !connections.iter().any(|c| c.connection_id == sub) {
                    connections.push(ListConnection {
                        connection_id: sub.clone(),
                        parent: Some(connection.to_string()),
                    });
                }
                list.connection = Some(sub);
            }
        }
    }

    if let Some(t) = elected_table {
        for line in t.lines.iter() {
            let candidate_id = match line.int("liste_kandid") {
                Ok(id) => id.to_string(),
                Err(e) => {
                    t.extend_errors(&mut errors, line, vec![e]);
                    continue;
                }
            };
            let candidate = match candidates.iter_mut().find(|c| c.candidate_id == candidate_id) {
                Some(c) => c,
                None => {
                    t.extend_errors(&mut errors, line, vec!["Unknown candidate".to_string()]);
                    continue;
                }
            };
            candidate.elected = true;
            // Every elected candidate is a mandate of its list.
            if let Some(list) = lists
                .iter_mut()
                .find(|l| Some(&l.list_id) == candidate.list_id.as_ref())
            {
                list.number_of_mandates += 1;
            }
        }
    }

    if let Some(t) = statistics_table {
        for line in t.lines.iter() {
            let parsed = (|| -> Result<(u64, [u64; 5]), String> {
                Ok((
                    line.int("einheit_bfs")?,
                    [
                        line.int("stimbertotal")?,
                        line.int("wzeingegangen")?,
                        line.int("wzleer")?,
                        line.int("wzungueltig")?,
                        line.int("stmwzveraendertleeramtlleer")?,
                    ],
                ))
            })();
            let (id, [eligible_voters, received, blank_ballots, invalid_ballots, blank_votes]) =
                match parsed {
                    Ok(p) => p,
                    Err(e) => {
                        t.extend_errors(&mut errors, line, vec![e]);
                        continue;
                    }
                };
            let unknown = EntityId::try_from(id)
                .map(|id| !catalogue.contains(id))
                .unwrap_or(true);
            let entity_id = if unknown && line.get("einheit_name").eq_ignore_ascii_case("auslandschweizer") {
                EXPATS_ENTITY_ID
            } else {
                match EntityId::try_from(id) {
                    Ok(id) => id,
                    Err(_) => continue,
                }
            };
            if let Some(r) = results.iter_mut().find(|r| r.entity_id == entity_id) {
                r.eligible_voters = eligible_voters;
                r.received_ballots = received;
                r.blank_ballots = blank_ballots;
                r.invalid_ballots = invalid_ballots;
                r.blank_votes = blank_votes;
            }
        }
    }

    if errors.is_empty() && results.is_empty() {
        errors.push(FileImportError::new("No data found"));
    }
    if let Some((_, source)) = panachage_columns
        .iter()
        .find(|(_, s)| s != BLANK_LIST_ID && !lists.iter().any(|l| &l.list_id == s))
    {
        errors.push(FileImportError::new(format!(
            "Panachage results id {} not in list_id's",
            source
        )));
    }
    if !errors.is_empty() {
        return Err(errors);
    }

    for list in lists.iter_mut() {
        if let Some(sums) = panachage.remove(&list.list_id) {
            list.panachage = sums
                .into_iter()
                .map(|(source, votes)| ListPanachageResult {
                    source: if source == BLANK_LIST_ID { None } else { Some(source) },
                    votes: VoteCount(votes),
                })
                .collect();
        }
    }
    add_missing_election_results(&scope, &mut results);
    debug!(
        "import_proporz_tables: {} lists, {} candidates",
        lists.len(),
        candidates.len()
    );
    info!("import_proporz_tables: {} results", results.len());
    Ok(Import::Election(ElectionImport {
        status: None,
        absolute_majority: None,
        majority_type: None,
        has_expats: None,
        candidates,
        results,
        proporz: Some(ProporzImport {
            lists,
            list_connections: connections,
        }),
    }))
}
