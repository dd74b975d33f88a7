// The internal format: one flat csv/xlsx file per vote or election, as
// produced by the export of the same name.

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, info};

use election_results::proporz::prefix_connection_id;
use election_results::reconcile::*;
use election_results::*;

use crate::imports::io_common::*;
use crate::imports::{FileImportError, ImportResult};

const RESULTS: &str = "Results";

pub const VOTE_HEADERS: [&str; 9] = [
    "status",
    "type",
    "entity_id",
    "counted",
    "yeas",
    "nays",
    "invalid",
    "empty",
    "eligible_voters",
];

pub const MAJORZ_HEADERS: [&str; 16] = [
    "election_status",
    "entity_id",
    "entity_counted",
    "entity_eligible_voters",
    "entity_received_ballots",
    "entity_blank_ballots",
    "entity_invalid_ballots",
    "entity_blank_votes",
    "entity_invalid_votes",
    "election_absolute_majority",
    "candidate_family_name",
    "candidate_first_name",
    "candidate_id",
    "candidate_elected",
    "candidate_votes",
    "candidate_party",
];

pub const PROPORZ_HEADERS: [&str; 21] = [
    "election_status",
    "entity_id",
    "entity_counted",
    "entity_eligible_voters",
    "entity_received_ballots",
    "entity_blank_ballots",
    "entity_invalid_ballots",
    "entity_blank_votes",
    "entity_invalid_votes",
    "candidate_family_name",
    "candidate_first_name",
    "candidate_id",
    "candidate_elected",
    "candidate_votes",
    "candidate_party",
    "list_name",
    "list_id",
    "list_number_of_mandates",
    "list_votes",
    "list_connection",
    "list_connection_parent",
];

fn parse_status(line: &Line, col: &str, errors: &mut Vec<String>) -> Option<Status> {
    let value = line.get(col);
    let value = if value.is_empty() { "unknown" } else { value };
    let status = Status::parse(value);
    if status.is_none() {
        errors.push("Invalid status".to_string());
    }
    status
}

fn no_data() -> Vec<FileImportError> {
    vec![FileImportError::new("No data found")]
}

// ******** Votes ********

pub fn import_vote(vote: &Vote, catalogue: &EntityCatalogue, path: &str) -> ImportResult {
    let table = load_table(path, RESULTS, &VOTE_HEADERS).map_err(|e| vec![e])?;
    import_vote_table(vote, catalogue, &table)
}

pub fn import_vote_table(vote: &Vote, catalogue: &EntityCatalogue, table: &Table) -> ImportResult {
    let scope = Scope::of_vote(vote, catalogue);
    let mut errors: Vec<FileImportError> = Vec::new();
    let mut status: Option<Status> = None;
    let mut ballots: BTreeMap<BallotType, Vec<BallotResult>> = BTreeMap::new();

    for line in table.lines.iter() {
        let mut line_errors: Vec<String> = Vec::new();
        status = parse_status(line, "status", &mut line_errors).or(status);
        let ballot_type = BallotType::parse(line.get("type"));
        if ballot_type.is_none() {
            line_errors.push("Invalid ballot type".to_string());
        }
        let entity = entity_id(line, "entity_id");
        let counted = line.flag("counted");
        let numbers = (|| -> Result<[u64; 5], String> {
            Ok([
                line.int("yeas")?,
                line.int("nays")?,
                line.int("invalid")?,
                line.int("empty")?,
                line.int("eligible_voters")?,
            ])
        })();
        let expats = line.opt_int("expats");

        let entity_id = match entity {
            Ok(id) => id,
            Err(e) => {
                line_errors.push(e);
                table.extend_errors(&mut errors, line, line_errors);
                continue;
            }
        };
        if scope.skips(entity_id) {
            continue;
        }
        scope.check(entity_id, &mut line_errors);
        if let Some(bt) = ballot_type {
            if ballots
                .get(&bt)
                .map(|rs| rs.iter().any(|r| r.entity_id == entity_id))
                .unwrap_or(false)
            {
                line_errors.push(format!("{} was found twice", entity_id));
            }
        }
        let [yeas, nays, invalid, empty, eligible_voters] = match numbers {
            Ok(n) => n,
            Err(e) => {
                line_errors.push(e);
                [0; 5]
            }
        };
        let expats = match expats {
            Ok(x) => x,
            Err(e) => {
                line_errors.push(e);
                None
            }
        };
        if counted && eligible_voters == 0 {
            line_errors.push("No eligible voters".to_string());
        }
        match (ballot_type, line_errors.is_empty()) {
            (Some(bt), true) => {
                let location = scope.locate(entity_id);
                let mut result = BallotResult::uncounted(entity_id, location);
                if counted {
                    result.counted = true;
                    result.yeas = yeas;
                    result.nays = nays;
                    result.invalid = invalid;
                    result.empty = empty;
                    result.eligible_voters = eligible_voters;
                    result.expats = expats;
                }
                ballots.entry(bt).or_default().push(result);
            }
            _ => table.extend_errors(&mut errors, line, line_errors),
        }
    }

    if errors.is_empty() && ballots.is_empty() {
        return Err(no_data());
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
        "import_vote_table: {}: {} ballots",
        vote.id,
        ballots.len()
    );
    Ok(Import::Vote(VoteImport {
        status,
        has_expats: None,
        ballots,
    }))
}

// ******** Elections ********

/// Reads the `entity_*` columns. Returns `None` for a line to skip.
fn parse_election_result(
    line: &Line,
    scope: &Scope,
    errors: &mut Vec<String>,
) -> Option<ElectionResult> {
    let entity_id = match entity_id(line, "entity_id") {
        Ok(id) => id,
        Err(e) => {
            errors.push(e);
            return None;
        }
    };
    scope.check(entity_id, errors);
    let counted = line.flag("entity_counted");
    let numbers = (|| -> Result<ElectionResult, String> {
        Ok(ElectionResult {
            entity_id,
            counted,
            eligible_voters: line.int("entity_eligible_voters")?,
            expats: line.opt_int("entity_expats")?,
            received_ballots: line.int("entity_received_ballots")?,
            blank_ballots: line.int("entity_blank_ballots")?,
            invalid_ballots: line.int("entity_invalid_ballots")?,
            blank_votes: line.int("entity_blank_votes")?,
            invalid_votes: line.int("entity_invalid_votes")?,
            ..Default::default()
        })
    })();
    match numbers {
        Ok(mut result) => {
            let location = scope.locate(entity_id);
            result.name = location.name;
            result.district = location.district;
            result.superregion = location.superregion;
            if !counted {
                result.clear_numbers();
            }
            Some(result)
        }
        Err(e) => {
            errors.push(e);
            None
        }
    }
}

fn parse_candidate(line: &Line, errors: &mut Vec<String>) -> Option<Candidate> {
    let parsed = (|| -> Result<Candidate, String> {
        Ok(Candidate {
            candidate_id: line.required("candidate_id")?,
            family_name: line.get("candidate_family_name").to_string(),
            first_name: line.get("candidate_first_name").to_string(),
            elected: line.flag("candidate_elected"),
            party: Some(line.get("candidate_party").to_string()).filter(|p| !p.is_empty()),
            party_color: line.color("candidate_party_color")?,
            gender: line.gender("candidate_gender")?,
            year_of_birth: line.opt_small_int("candidate_year_of_birth")?,
            list_id: None,
        })
    })();
    parsed.map_err(|e| errors.push(e)).ok()
}

/// Adds the line's candidate, or checks it matches the one already read.
fn add_candidate(candidates: &mut Vec<Candidate>, candidate: Candidate) {
    if !candidates
        .iter()
        .any(|c| c.candidate_id == candidate.candidate_id)
    {
        candidates.push(candidate);
    }
}

/// Adds the entity of a line (the first line of an entity defines it) and
/// returns its index.
fn add_result(results: &mut Vec<ElectionResult>, result: ElectionResult) -> usize {
    match results.iter().position(|r| r.entity_id == result.entity_id) {
        Some(i) => i,
        None => {
            results.push(result);
            results.len() - 1
        }
    }
}

pub fn import_majorz(election: &Election, catalogue: &EntityCatalogue, path: &str) -> ImportResult {
    let table = load_table(path, RESULTS, &MAJORZ_HEADERS).map_err(|e| vec![e])?;
    import_majorz_table(election, catalogue, &table)
}

pub fn import_majorz_table(
    election: &Election,
    catalogue: &EntityCatalogue,
    table: &Table,
) -> ImportResult {
    let scope = Scope::of_election(election, catalogue);
    let mut errors: Vec<FileImportError> = Vec::new();
    let mut status: Option<Status> = None;
    let mut absolute_majority: Option<u64> = None;
    let mut candidates: Vec<Candidate> = Vec::new();
    let mut results: Vec<ElectionResult> = Vec::new();
    let mut seen: BTreeSet<(EntityId, String)> = BTreeSet::new();

    for line in table.lines.iter() {
        let mut line_errors: Vec<String> = Vec::new();
        let result = parse_election_result(line, &scope, &mut line_errors);
        status = parse_status(line, "election_status", &mut line_errors).or(status);
        match line.signed_int("election_absolute_majority") {
            Ok(Some(m)) if m >= 0 => absolute_majority = Some(m as u64),
            Ok(_) => {}
            Err(e) => line_errors.push(e),
        }
        let candidate = parse_candidate(line, &mut line_errors);
        let votes = line
            .int("candidate_votes")
            .map_err(|e| line_errors.push(e))
            .unwrap_or(0);

        if result.as_ref().map(|r| scope.skips(r.entity_id)).unwrap_or(false) {
            continue;
        }
        let (result, candidate) = match (result, candidate) {
            (Some(r), Some(c)) if line_errors.is_empty() => (r, c),
            _ => {
                table.extend_errors(&mut errors, line, line_errors);
                continue;
            }
        };
        if !seen.insert((result.entity_id, candidate.candidate_id.clone())) {
            table.extend_errors(
                &mut errors,
                line,
                vec![format!(
                    "{}/{} was found twice",
                    result.entity_id, candidate.candidate_id
                )],
            );
            continue;
        }
        let counted = result.counted;
        let idx = add_result(&mut results, result);
        results[idx].candidate_results.push(CandidateResult {
            candidate_id: candidate.candidate_id.clone(),
            votes: VoteCount(if counted { votes } else { 0 }),
        });
        add_candidate(&mut candidates, candidate);
    }

    if errors.is_empty() && results.is_empty() {
        return Err(no_data());
    }
    if !errors.is_empty() {
        return Err(errors);
    }
    add_missing_election_results(&scope, &mut results);
    debug!(
        "import_majorz_table: {} candidates, {} results",
        candidates.len(),
        results.len()
    );
    Ok(Import::Election(ElectionImport {
        status,
        absolute_majority,
        majority_type: None,
        has_expats: None,
        candidates,
        results,
        proporz: None,
    }))
}

/// The panachage columns of a proporz file, mapped to their source list.
/// `list_panachage_votes_from_list_{id}` (or the older
/// `panachage_votes_from_list_{id}`) and
/// `candidate_panachage_votes_from_list_{id}`.
fn panachage_columns(table: &Table) -> (BTreeMap<String, String>, BTreeMap<String, String>) {
    let mut lists = BTreeMap::new();
    let mut candidates = BTreeMap::new();
    for col in table.columns.iter() {
        if let Some(source) = col.strip_prefix("candidate_panachage_votes_from_list_") {
            candidates.insert(col.clone(), source.to_string());
        } else if let Some(source) = col
            .strip_prefix("list_panachage_votes_from_list_")
            .or_else(|| col.strip_prefix("panachage_votes_from_list_"))
        {
            lists.insert(col.clone(), source.to_string());
        }
    }
    (lists, candidates)
}

fn source_list(source: &str) -> Option<String> {
    if source == BLANK_LIST_ID {
        None
    } else {
        Some(source.to_string())
    }
}

/// Reads the list connection of a line. Sub-connection ids are prefixed
/// with the id of their parent.
fn parse_connection(line: &Line) -> (Option<String>, Option<String>) {
    let connection = line.get("list_connection");
    let parent = line.get("list_connection_parent");
    match (connection.is_empty(), parent.is_empty()) {
        (true, _) => (None, None),
        (false, true) => (Some(connection.to_string()), None),
        (false, false) => (
            Some(parent.to_string()),
            Some(prefix_connection_id(connection, parent)),
        ),
    }
}

pub fn import_proporz(election: &Election, catalogue: &EntityCatalogue, path: &str) -> ImportResult {
    let table = load_table(path, RESULTS, &PROPORZ_HEADERS).map_err(|e| vec![e])?;
    import_proporz_table(election, catalogue, &table)
}

pub fn import_proporz_table(
    election: &Election,
    catalogue: &EntityCatalogue,
    table: &Table,
) -> ImportResult {
    let scope = Scope::of_election(election, catalogue);
    let (list_panachage_columns, candidate_panachage_columns) = panachage_columns(table);
    let mut errors: Vec<FileImportError> = Vec::new();
    let mut status: Option<Status> = None;
    let mut candidates: Vec<Candidate> = Vec::new();
    let mut results: Vec<ElectionResult> = Vec::new();
    let mut lists: Vec<List> = Vec::new();
    let mut connections: Vec<ListConnection> = Vec::new();
    let mut seen: BTreeSet<(EntityId, String)> = BTreeSet::new();

    for line in table.lines.iter() {
        let mut line_errors: Vec<String> = Vec::new();
        let result = parse_election_result(line, &scope, &mut line_errors);
        status = parse_status(line, "election_status", &mut line_errors).or(status);
        let candidate = parse_candidate(line, &mut line_errors);
        let candidate_votes = line
            .int("candidate_votes")
            .map_err(|e| line_errors.push(e))
            .unwrap_or(0);
        let list = (|| -> Result<List, String> {
            line.required("list_id")?;
            let list_id = line.list_id("list_id")?;
            Ok(List {
                list_id,
                name: line.get("list_name").to_string(),
                number_of_mandates: line.small_int("list_number_of_mandates")?,
                connection: None,
                color: line.color("list_color")?,
                panachage: vec![],
            })
        })()
        .map_err(|e| line_errors.push(e))
        .ok();
        let list_votes = line
            .int("list_votes")
            .map_err(|e| line_errors.push(e))
            .unwrap_or(0);
        let mut list_panachage: Vec<ListPanachageResult> = Vec::new();
        for (col, source) in list_panachage_columns.iter() {
            match line.opt_int(col) {
                Ok(Some(votes)) => list_panachage.push(ListPanachageResult {
                    source: source_list(source),
                    votes: VoteCount(votes),
                }),
                Ok(None) => {}
                Err(e) => line_errors.push(e),
            }
        }
        let mut candidate_panachage: Vec<(Option<String>, u64)> = Vec::new();
        for (col, source) in candidate_panachage_columns.iter() {
            match line.opt_int(col) {
                Ok(Some(votes)) if votes > 0 => candidate_panachage.push((source_list(source), votes)),
                Ok(_) => {}
                Err(e) => line_errors.push(e),
            }
        }

        if result.as_ref().map(|r| scope.skips(r.entity_id)).unwrap_or(false) {
            continue;
        }
        let (result, mut candidate, mut list) = match (result, candidate, list) {
            (Some(r), Some(c), Some(l)) if line_errors.is_empty() => (r, c, l),
            _ => {
                table.extend_errors(&mut errors, line, line_errors);
                continue;
            }
        };
        if !seen.insert((result.entity_id, candidate.candidate_id.clone())) {
            table.extend_errors(
                &mut errors,
                line,
                vec![format!(
                    "{}/{} was found twice",
                    result.entity_id, candidate.candidate_id
                )],
            );
            continue;
        }

        let (connection, subconnection) = parse_connection(line);
        if let Some(c) = &connection {
            if !connections.iter().any(|x| &x.connection_id == c) {
                connections.push(ListConnection {
                    connection_id: c.clone(),
                    parent: None,
                });
            }
            list.connection = Some(c.clone());
        }
        if let Some(s) = &subconnection {
            if !connections.iter().any(|x| &x.connection_id == s) {
                connections.push(ListConnection {
                    connection_id: s.clone(),
                    parent: connection.clone(),
                });
            }
            list.connection = Some(s.clone());
        }
        let list_id = list.list_id.clone();
        match lists.iter_mut().find(|l| l.list_id == list_id) {
            Some(existing) => {
                // The list panachage is read from the first line of a list.
                if existing.panachage.is_empty() {
                    existing.panachage = list_panachage
                        .into_iter()
                        .filter(|p| p.source.as_deref() != Some(list_id.as_str()))
                        .collect();
                }
            }
            None => {
                list.panachage = list_panachage
                    .into_iter()
                    .filter(|p| p.source.as_deref() != Some(list_id.as_str()))
                    .collect();
                lists.push(list);
            }
        }

        let counted = result.counted;
        let entity_id = result.entity_id;
        let idx = add_result(&mut results, result);
        let r = &mut results[idx];
        r.candidate_results.push(CandidateResult {
            candidate_id: candidate.candidate_id.clone(),
            votes: VoteCount(if counted { candidate_votes } else { 0 }),
        });
        if !r.list_results.iter().any(|lr| lr.list_id == list_id) {
            r.list_results.push(ListResult {
                list_id: list_id.clone(),
                votes: VoteCount(if counted { list_votes } else { 0 }),
            });
        }
        if counted {
            for (source, votes) in candidate_panachage {
                r.candidate_panachage.push(CandidatePanachageResult {
                    candidate_id: candidate.candidate_id.clone(),
                    source_list: source,
                    votes: VoteCount(votes),
                });
            }
        }
        debug!(
            "import_proporz_table: entity {} candidate {} list {}",
            entity_id, candidate.candidate_id, list_id
        );
        candidate.list_id = Some(list_id);
        add_candidate(&mut candidates, candidate);
    }

    if errors.is_empty() && results.is_empty() {
        return Err(no_data());
    }
    let known: BTreeSet<&str> = lists.iter().map(|l| l.list_id.as_str()).collect();
    let mut unknown_sources: BTreeSet<String> = BTreeSet::new();
    for l in lists.iter() {
        for p in l.panachage.iter() {
            if let Some(s) = &p.source {
                if !known.contains(s.as_str()) {
                    unknown_sources.insert(s.clone());
                }
            }
        }
    }
    for r in results.iter() {
        for p in r.candidate_panachage.iter() {
            if let Some(s) = &p.source_list {
                if !known.contains(s.as_str()) {
                    unknown_sources.insert(s.clone());
                }
            }
        }
    }
    errors.extend(
        unknown_sources
            .into_iter()
            .map(|id| FileImportError::new(format!("Panachage results id {} not in list_id's", id))),
    );
    if !errors.is_empty() {
        return Err(errors);
    }

    add_missing_election_results(&scope, &mut results);
    Ok(Import::Election(ElectionImport {
        status,
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

// ******** Election compounds ********

pub fn import_compound(
    compound: &ElectionCompound,
    catalogue: &EntityCatalogue,
    path: &str,
) -> ImportResult {
    let table = load_table(path, RESULTS, &PROPORZ_HEADERS).map_err(|e| vec![e])?;
    import_compound_table(compound, catalogue, &table)
}

/// Imports one file holding the results of every election of a compound.
/// A line goes to the election whose district (or municipality) contains
/// its entity; lines of entities outside all the elections are ignored.
/// Elections without any line are cleared.
pub fn import_compound_table(
    compound: &ElectionCompound,
    catalogue: &EntityCatalogue,
    table: &Table,
) -> ImportResult {
    if compound.elections.iter().any(|e| e.has_expats) {
        return Err(vec![FileImportError::new(
            "This format does not support separate results for expats",
        )]);
    }
    let mut errors: Vec<FileImportError> = Vec::new();
    let mut routed: Vec<Vec<Line>> = vec![Vec::new(); compound.elections.len()];
    for line in table.lines.iter() {
        let target = match entity_id(line, "entity_id") {
            // The first election reports every error of the line.
            Err(_) => Some(0),
            Ok(EXPATS_ENTITY_ID) => None,
            Ok(id) if !catalogue.contains(id) => {
                table.extend_errors(&mut errors, line, vec![format!("{} is unknown", id)]);
                continue;
            }
            Ok(id) => compound.elections.iter().position(|e| {
                catalogue
                    .scope_error(id, e.domain, e.domain_segment.as_deref())
                    .is_none()
            }),
        };
        match target.and_then(|i| routed.get_mut(i)) {
            Some(lines) => lines.push(line.clone()),
            None => debug!(
                "import_compound_table: line {} belongs to no election",
                line.rownumber
            ),
        }
    }

    let mut imports: Vec<(String, ElectionImport)> = Vec::new();
    for (election, lines) in compound.elections.iter().zip(routed.into_iter()) {
        if lines.is_empty() {
            imports.push((
                election.id.clone(),
                ElectionImport {
                    status: Some(Status::Unknown),
                    proporz: election.proporz().map(|_| ProporzImport::default()),
                    ..Default::default()
                },
            ));
            continue;
        }
        let part = Table {
            filename: table.filename.clone(),
            headers: table.headers.clone(),
            columns: table.columns.clone(),
            lines,
        };
        let import = match election.kind {
            ElectionKind::Majorz => import_majorz_table(election, catalogue, &part),
            ElectionKind::Proporz(_) => import_proporz_table(election, catalogue, &part),
        };
        match import {
            Ok(Import::Election(i)) => imports.push((election.id.clone(), i)),
            Ok(_) => {}
            Err(e) => errors.extend(e),
        }
    }
    if !errors.is_empty() {
        errors.sort_by_key(|e| e.line);
        return Err(errors);
    }
    info!(
        "import_compound_table: {}: {} elections",
        compound.id,
        imports.len()
    );
    Ok(Import::Compound(CompoundImport { elections: imports }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn catalogue() -> EntityCatalogue {
        let entity = |id: u32, name: &str, district: &str| PoliticalEntity {
            entity_id: id,
            name: name.to_string(),
            district: Some(district.to_string()),
            region: None,
            superregion: None,
        };
        EntityCatalogue::new(
            2022,
            PrincipalDomain::Canton,
            9,
            vec![
                entity(1701, "Baar", "Baar"),
                entity(1702, "Cham", "Cham"),
                entity(1703, "Hünenberg", "Hünenberg"),
            ],
        )
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2022, 3, 13).unwrap()
    }

    fn vote() -> Vote {
        Vote {
            id: "vote".to_string(),
            external_id: None,
            title: "Vote".to_string(),
            date: date(),
            domain: Domain::Canton,
            domain_segment: None,
            has_expats: false,
            status: Status::Unknown,
            last_result_change: None,
            ballots: vec![Ballot {
                ballot_type: BallotType::Proposal,
                results: vec![],
            }],
        }
    }

    fn load(text: &str, headers: &[&str]) -> Table {
        load_csv_text(text, RESULTS, headers).unwrap()
    }

    #[test]
    fn vote_with_missing_entities() {
        let text = "status,type,entity_id,counted,yeas,nays,invalid,empty,eligible_voters\n\
                    interim,proposal,1701,true,100,50,1,2,300\n\
                    interim,proposal,1702,false,1,1,1,1,1\n\
                    interim,proposal,19020,true,5,5,0,0,20\n";
        let import = import_vote_table(&vote(), &catalogue(), &load(text, &VOTE_HEADERS)).unwrap();
        let v = match import {
            Import::Vote(v) => v,
            _ => panic!("not a vote import"),
        };
        assert_eq!(v.status, Some(Status::Interim));
        assert_eq!(v.ballots.len(), 1);
        let results = &v.ballots[0].results;
        // The expats are skipped, Hünenberg is added.
        assert_eq!(
            results.iter().map(|r| r.entity_id).collect::<Vec<_>>(),
            vec![1701, 1702, 1703]
        );
        assert_eq!(results[0].yeas, 100);
        assert_eq!(results[1].yeas, 0);
        assert!(!results[2].counted);
        assert_eq!(results[2].name, "Hünenberg");
    }

    #[test]
    fn vote_errors() {
        let text = "status,type,entity_id,counted,yeas,nays,invalid,empty,eligible_voters\n\
                    final,proposal,1701,true,100,50,1,2,300\n\
                    done,other,1702,true,x,50,1,2,300\n\
                    final,proposal,9999,true,1,1,1,1,10\n\
                    final,proposal,1701,true,1,1,1,1,10\n";
        let errors = import_vote_table(&vote(), &catalogue(), &load(text, &VOTE_HEADERS)).unwrap_err();
        let messages: Vec<(Option<usize>, String)> =
            errors.iter().map(|e| (e.line, e.error.clone())).collect();
        assert_eq!(
            messages,
            vec![
                (Some(3), "Invalid status".to_string()),
                (Some(3), "Invalid ballot type".to_string()),
                (Some(3), "Invalid integer: yeas".to_string()),
                (Some(4), "9999 is unknown".to_string()),
                (Some(5), "1701 was found twice".to_string()),
            ]
        );
    }

    #[test]
    fn empty_vote() {
        let text = "status,type,entity_id,counted,yeas,nays,invalid,empty,eligible_voters\n";
        let errors = import_vote_table(&vote(), &catalogue(), &load(text, &VOTE_HEADERS)).unwrap_err();
        assert_eq!(errors, vec![FileImportError::new("No data found")]);
    }

    #[test]
    fn majorz() {
        let e = Election::new("majorz", "Majorz", date(), Domain::Canton, ElectionKind::Majorz);
        let header = MAJORZ_HEADERS.join(",");
        let text = format!(
            "{}\n\
             final,1701,true,1000,500,10,10,5,5,240,Muster,Hans,1,true,300,FDP\n\
             final,1701,true,1000,500,10,10,5,5,240,Meier,Anna,2,false,170,SP\n\
             final,1702,false,900,400,0,0,0,0,240,Muster,Hans,1,true,200,FDP\n",
            header
        );
        let import = import_majorz_table(&e, &catalogue(), &load(&text, &MAJORZ_HEADERS)).unwrap();
        let i = match import {
            Import::Election(i) => i,
            _ => panic!("not an election import"),
        };
        assert_eq!(i.status, Some(Status::Final));
        assert_eq!(i.absolute_majority, Some(240));
        assert_eq!(i.candidates.len(), 2);
        assert!(i.candidates[0].elected);
        assert_eq!(i.candidates[0].party, Some("FDP".to_string()));
        assert_eq!(i.results.len(), 3);
        assert_eq!(i.results[0].candidate_results.len(), 2);
        assert_eq!(i.results[0].accounted_ballots(), 480);
        // Uncounted entities carry no numbers.
        assert_eq!(i.results[1].eligible_voters, 0);
        assert_eq!(i.results[1].candidate_results[0].votes, VoteCount(0));
        assert_eq!(i.results[2].entity_id, 1703);
    }

    #[test]
    fn proporz_with_connections_and_panachage() {
        let e = Election::new(
            "proporz",
            "Proporz",
            date(),
            Domain::Canton,
            ElectionKind::Proporz(ProporzData::default()),
        );
        let mut headers: Vec<&str> = PROPORZ_HEADERS.to_vec();
        headers.push("candidate_panachage_votes_from_list_1");
        headers.push("candidate_panachage_votes_from_list_999");
        let text = format!(
            "{}\n\
             final,1701,true,1000,500,10,10,5,5,Muster,Hans,101,true,300,FDP,FDP,1,1,600,A,,0,7\n\
             final,1701,true,1000,500,10,10,5,5,Meier,Anna,201,false,170,SP,SP,2,0,400,B,A,12,3\n",
            headers.join(",")
        );
        let import = import_proporz_table(&e, &catalogue(), &load(&text, &headers)).unwrap();
        let i = match import {
            Import::Election(i) => i,
            _ => panic!("not an election import"),
        };
        let p = i.proporz.unwrap();
        assert_eq!(
            p.list_connections,
            vec![
                ListConnection {
                    connection_id: "A".to_string(),
                    parent: None
                },
                ListConnection {
                    connection_id: "AB".to_string(),
                    parent: Some("A".to_string())
                },
            ]
        );
        assert_eq!(p.lists[1].connection, Some("AB".to_string()));
        assert_eq!(i.candidates[1].list_id, Some("2".to_string()));
        let panachage = &i.results[0].candidate_panachage;
        assert_eq!(panachage.len(), 3);
        assert_eq!(panachage[0].source_list, None);
        assert_eq!(panachage[0].votes, VoteCount(7));
    }

    #[test]
    fn counts_out_of_range() {
        let e = Election::new(
            "proporz",
            "Proporz",
            date(),
            Domain::Canton,
            ElectionKind::Proporz(ProporzData::default()),
        );
        let mut headers: Vec<&str> = PROPORZ_HEADERS.to_vec();
        headers.push("candidate_year_of_birth");
        let text = format!(
            "{}\n\
             final,1701,true,1000,500,10,10,5,5,Muster,Hans,101,true,300,FDP,FDP,1,4294967296,600,,,1970\n\
             final,1702,true,1000,500,10,10,5,5,Meier,Anna,201,false,170,SP,SP,2,0,400,,,4294967297\n",
            headers.join(",")
        );
        let errors = import_proporz_table(&e, &catalogue(), &load(&text, &headers)).unwrap_err();
        let messages: Vec<(Option<usize>, String)> =
            errors.iter().map(|e| (e.line, e.error.clone())).collect();
        assert_eq!(
            messages,
            vec![
                (Some(2), "Invalid integer: list_number_of_mandates".to_string()),
                (Some(3), "Invalid integer: candidate_year_of_birth".to_string()),
            ]
        );
    }

    #[test]
    fn proporz_unknown_panachage_source() {
        let e = Election::new(
            "proporz",
            "Proporz",
            date(),
            Domain::Canton,
            ElectionKind::Proporz(ProporzData::default()),
        );
        let mut headers: Vec<&str> = PROPORZ_HEADERS.to_vec();
        headers.push("list_panachage_votes_from_list_7");
        let text = format!(
            "{}\n\
             final,1701,true,1000,500,10,10,5,5,Muster,Hans,101,true,300,FDP,FDP,1,1,600,,,4\n",
            headers.join(",")
        );
        let errors = import_proporz_table(&e, &catalogue(), &load(&text, &headers)).unwrap_err();
        assert_eq!(
            errors,
            vec![FileImportError::new("Panachage results id 7 not in list_id's")]
        );
    }

    fn compound(has_expats: bool) -> ElectionCompound {
        let district = |id: &str, segment: &str| {
            let mut e = Election::new(
                id,
                segment,
                date(),
                Domain::District,
                ElectionKind::Proporz(ProporzData::default()),
            );
            e.domain_segment = Some(segment.to_string());
            e.has_expats = has_expats;
            e
        };
        ElectionCompound {
            id: "compound".to_string(),
            title: "Compound".to_string(),
            date: date(),
            domain: Domain::Canton,
            elections: vec![district("baar", "Baar"), district("cham", "Cham")],
            completes_manually: false,
            manually_completed: false,
            after_pukelsheim: false,
            pukelsheim_completed: false,
            last_result_change: None,
            parties: PartyData::default(),
        }
    }

    fn import_compound_text(c: &ElectionCompound, rows: &str) -> ImportResult {
        let text = format!("{}\n{}", PROPORZ_HEADERS.join(","), rows);
        import_compound_table(c, &catalogue(), &load(&text, &PROPORZ_HEADERS))
    }

    #[test]
    fn compound_lines_go_to_their_district() {
        let c = compound(false);
        let import = import_compound_text(
            &c,
            "unknown,1701,true,111,11,1,1,1,1,xxx,xxx,1,false,1,,,10.5,,,,\n\
             unknown,1702,false,111,11,1,1,1,1,xxx,xxx,1,false,1,,,03B.04,,,,\n\
             unknown,1703,false,111,11,1,1,1,1,xxx,xxx,1,false,1,,,03B.04,,,,\n",
        )
        .unwrap();
        let i = match import {
            Import::Compound(i) => i,
            _ => panic!("not a compound import"),
        };
        assert_eq!(
            i.elections.iter().map(|(id, _)| id.as_str()).collect::<Vec<_>>(),
            vec!["baar", "cham"]
        );
        let (_, baar) = &i.elections[0];
        assert_eq!(baar.results.len(), 1);
        assert!(baar.results[0].counted);
        assert_eq!(baar.proporz.as_ref().unwrap().lists[0].list_id, "10.5");
        let (_, cham) = &i.elections[1];
        assert_eq!(cham.results.len(), 1);
        assert!(!cham.results[0].counted);
        assert_eq!(cham.proporz.as_ref().unwrap().lists[0].list_id, "03B.04");

        // Without Cham, its election is cleared.
        let import = import_compound_text(
            &c,
            "unknown,1701,true,111,11,1,1,1,1,xxx,xxx,1,false,1,,,10.5,,,,\n",
        )
        .unwrap();
        let i = match import {
            Import::Compound(i) => i,
            _ => panic!("not a compound import"),
        };
        let (_, cham) = &i.elections[1];
        assert!(cham.results.is_empty());
        assert!(cham.candidates.is_empty());
        assert_eq!(cham.status, Some(Status::Unknown));
    }

    #[test]
    fn compound_invalid_values() {
        let errors = import_compound_text(
            &compound(false),
            "xxx,xxx,xxx,xxx,xxx,xxx,xxx,xxx,xxx,xxx,xxx,xxx,xxx,xxx,xxx,xxx,x x x,xxx,xxx,xxx,xxx\n\
             unknown,1701,true,100,10,0,0,0,0,,,,,,,,,,,,\n\
             unknown,9999,true,100,10,0,0,0,0,,,1,,,,,1,,,,\n",
        )
        .unwrap_err();
        let mut messages: Vec<(Option<usize>, String)> =
            errors.iter().map(|e| (e.line, e.error.clone())).collect();
        messages.sort();
        assert_eq!(
            messages,
            vec![
                (Some(2), "Invalid integer: candidate_votes".to_string()),
                (Some(2), "Invalid integer: entity_id".to_string()),
                (Some(2), "Invalid integer: list_votes".to_string()),
                (Some(2), "Invalid status".to_string()),
                (Some(2), "Not an alphanumeric: list_id".to_string()),
                (Some(3), "Empty value: candidate_id".to_string()),
                (Some(3), "Empty value: list_id".to_string()),
                (Some(4), "9999 is unknown".to_string()),
            ]
        );
    }

    #[test]
    fn compound_expats() {
        let rows = "unknown,9170,true,111,11,1,1,1,1,xxx,xxx,1,false,1,,,10.5,,,,\n";
        let errors = import_compound_text(&compound(true), rows).unwrap_err();
        assert_eq!(
            errors,
            vec![FileImportError::new(
                "This format does not support separate results for expats"
            )]
        );
        let i = match import_compound_text(&compound(false), rows).unwrap() {
            Import::Compound(i) => i,
            _ => panic!("not a compound import"),
        };
        assert!(i.elections.iter().all(|(_, e)| e.results.is_empty()));
    }
}
