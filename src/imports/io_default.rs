// The default vote format: one csv/xlsx file per ballot, one line per
// entity.

use std::collections::BTreeMap;

use log::{debug, info};

use election_results::reconcile::*;
use election_results::*;

use crate::imports::io_common::*;
use crate::imports::{FileImportError, ImportResult};

const HEADERS: [&str; 6] = [
    "ID",
    "Ja Stimmen",
    "Nein Stimmen",
    "Stimmberechtigte",
    "Leere Stimmzettel",
    "Ungültige Stimmzettel",
];

fn ballot_name(ballot_type: BallotType) -> &'static str {
    match ballot_type {
        BallotType::Proposal => "Proposal",
        BallotType::CounterProposal => "Counter-proposal",
        BallotType::TieBreaker => "Tie-breaker",
    }
}

/// A count, `None` while the entity is not counted.
fn count(line: &Line, col: &str) -> Result<Option<u64>, String> {
    match line.get(col) {
        "unbekannt" | "unknown" => Ok(None),
        _ => line.int(col).map(Some),
    }
}

/// Imports the ballot files of a vote, keyed by ballot type
/// (`proposal=`, `counter-proposal=`, `tie-breaker=`). A single file
/// without a ballot type is the proposal. The ballots without a file keep
/// their current results.
pub fn import_vote(
    vote: &Vote,
    catalogue: &EntityCatalogue,
    inputs: &BTreeMap<String, String>,
) -> ImportResult {
    let mut errors: Vec<FileImportError> = Vec::new();
    let mut ballots: Vec<Ballot> = Vec::new();
    for (key, path) in inputs.iter() {
        let ballot_type = match BallotType::parse(key) {
            Some(bt) => bt,
            None if inputs.len() == 1 => BallotType::Proposal,
            None => {
                errors.push(FileImportError::in_file(key, "Invalid ballot type"));
                continue;
            }
        };
        let table = match load_table(path, ballot_name(ballot_type), &HEADERS) {
            Ok(t) => t,
            Err(e) => {
                errors.push(e);
                continue;
            }
        };
        match import_ballot_table(vote, catalogue, ballot_type, &table) {
            Ok(ballot) => ballots.push(ballot),
            Err(e) => errors.extend(e),
        }
    }
    if !errors.is_empty() {
        return Err(errors);
    }
    for ballot in vote.ballots.iter() {
        if !ballots.iter().any(|b| b.ballot_type == ballot.ballot_type) {
            ballots.push(ballot.clone());
        }
    }
    info!("import_vote: {}: {} ballots", vote.id, ballots.len());
    Ok(Import::Vote(VoteImport {
        status: None,
        has_expats: None,
        ballots,
    }))
}

pub fn import_ballot_table(
    vote: &Vote,
    catalogue: &EntityCatalogue,
    ballot_type: BallotType,
    table: &Table,
) -> Result<Ballot, Vec<FileImportError>> {
    let scope = Scope::of_vote(vote, catalogue);
    let mut errors: Vec<FileImportError> = Vec::new();
    let mut results: Vec<BallotResult> = Vec::new();

    for line in table.lines.iter() {
        let mut line_errors: Vec<String> = Vec::new();
        let entity = entity_id(line, "id");
        let mut numbers: [Option<u64>; 5] = [None; 5];
        let columns = [
            "ja_stimmen",
            "nein_stimmen",
            "leere_stimmzettel",
            "ungultige_stimmzettel",
            "stimmberechtigte",
        ];
        for (n, col) in numbers.iter_mut().zip(columns.iter()) {
            match count(line, col) {
                Ok(v) => *n = v,
                Err(e) => line_errors.push(e),
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
        let mut result = BallotResult::uncounted(entity_id, scope.locate(entity_id));
        if let [Some(yeas), Some(nays), Some(empty), Some(invalid), Some(eligible_voters)] = numbers {
            if eligible_voters == 0 {
                line_errors.push("No eligible voters".to_string());
            }
            if yeas + nays + empty + invalid > eligible_voters {
                line_errors.push("More cast votes than eligible voters".to_string());
            }
            result.counted = true;
            result.yeas = yeas;
            result.nays = nays;
            result.empty = empty;
            result.invalid = invalid;
            result.eligible_voters = eligible_voters;
        }
        if !line_errors.is_empty() {
            table.extend_errors(&mut errors, line, line_errors);
            continue;
        }
        debug!(
            "import_ballot_table: {:?} entity {} counted {}",
            ballot_type, entity_id, result.counted
        );
        results.push(result);
    }

    if errors.is_empty() && results.is_empty() {
        return Err(vec![FileImportError::new("No data found")]);
    }
    if !errors.is_empty() {
        return Err(errors);
    }
    let present: Vec<EntityId> = results.iter().map(|r| r.entity_id).collect();
    for (id, location) in scope.missing(&present) {
        results.push(BallotResult::uncounted(id, location));
    }
    Ok(Ballot {
        ballot_type,
        results,
    })
}
