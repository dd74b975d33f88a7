// Wabsti-C exports: one set of files per canton, holding all the votes and
// elections of an election day. The business is selected by its
// `SortGeschaeft` (and its `SortWahlkreis`, if the export is split by
// district).

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, info};

use election_results::proporz::prefix_connection_id;
use election_results::reconcile::*;
use election_results::*;

use crate::imports::config_reader::WabstiCSource;
use crate::imports::io_common::*;
use crate::imports::{FileImportError, ImportResult};

const SG_GESCHAEFTE: [&str; 3] = ["art", "sortwahlkreis", "sortgeschaeft"];
const SG_GEMEINDEN: [&str; 17] = [
    "art",
    "sortwahlkreis",
    "sortgeschaeft",
    "bfsnrgemeinde",
    "sperrung",
    "stimmberechtigte",
    "stmungueltig",
    "stmleer",
    "stmhgja",
    "stmhgnein",
    "stmhgohneaw",
    "stmn1ja",
    "stmn1nein",
    "stmn1ohneaw",
    "stmn2ja",
    "stmn2nein",
    "stmn2ohneaw",
];

const WM_WAHL: [&str; 3] = ["sortgeschaeft", "absolutesmehr", "anzpendentgde"];
const WM_STATIC_GEMEINDEN: [&str; 4] = [
    "sortwahlkreis",
    "sortgeschaeft",
    "bfsnrgemeinde",
    "stimmberechtigte",
];
const WM_GEMEINDEN: [&str; 8] = [
    "bfsnrgemeinde",
    "stimmberechtigte",
    "sperrung",
    "stmabgegeben",
    "stmleer",
    "stmungueltig",
    "stimmenleer",
    "stimmenungueltig",
];
const WM_KANDIDATEN: [&str; 6] = ["sortgeschaeft", "knr", "nachname", "vorname", "gewaehlt", "partei"];
const WM_KANDIDATENGDE: [&str; 4] = ["sortgeschaeft", "bfsnrgemeinde", "knr", "stimmen"];

const WP_WAHL: [&str; 2] = ["sortgeschaeft", "anzpendentgde"];
const WP_STATIC_GEMEINDEN: [&str; 4] = WM_STATIC_GEMEINDEN;
const WP_GEMEINDEN: [&str; 7] = [
    "bfsnrgemeinde",
    "stimmberechtigte",
    "sperrung",
    "stmabgegeben",
    "stmleer",
    "stmungueltig",
    "anzwzamtleer",
];
const WP_LISTEN: [&str; 6] = ["sortgeschaeft", "listnr", "listcode", "sitze", "listverb", "listuntverb"];
const WP_LISTENGDE: [&str; 3] = ["bfsnrgemeinde", "listnr", "stimmentotal"];
const WP_STATIC_KANDIDATEN: [&str; 4] = ["sortgeschaeft", "knr", "nachname", "vorname"];
const WP_KANDIDATEN: [&str; 3] = ["sortgeschaeft", "knr", "gewaehlt"];
const WP_KANDIDATENGDE: [&str; 3] = ["bfsnrgemeinde", "knr", "stimmen"];

pub struct VoteFiles {
    pub sg_geschaefte: Table,
    pub sg_gemeinden: Table,
}

pub struct MajorzFiles {
    pub wm_wahl: Table,
    pub wmstatic_gemeinden: Table,
    pub wm_gemeinden: Table,
    pub wm_kandidaten: Table,
    pub wm_kandidatengde: Table,
}

pub struct ProporzFiles {
    pub wp_wahl: Table,
    pub wpstatic_gemeinden: Table,
    pub wp_gemeinden: Table,
    pub wp_listen: Table,
    pub wp_listengde: Table,
    pub wpstatic_kandidaten: Table,
    pub wp_kandidaten: Table,
    pub wp_kandidatengde: Table,
}

/// Collects the errors of the lines of one file.
struct Errors<'a> {
    table: &'a Table,
    errors: &'a mut Vec<FileImportError>,
}

impl<'a> Errors<'a> {
    fn of(table: &'a Table, errors: &'a mut Vec<FileImportError>) -> Errors<'a> {
        Errors { table, errors }
    }

    /// Records the errors of a line, returning true if there were any.
    fn failed(&mut self, line: &Line, messages: Vec<String>) -> bool {
        let failed = !messages.is_empty();
        self.table.extend_errors(self.errors, line, messages);
        failed
    }
}

/// The `BfsNrGemeinde` of a line. The expat numbers map to the expats.
fn bfs_entity_id(line: &Line) -> Result<EntityId, String> {
    entity_id(line, "bfsnrgemeinde")
}

/// The `wmstatic_gemeinden`/`wpstatic_gemeinden` file: the entities of the
/// election and their eligible voters.
fn parse_static_entities(
    table: &Table,
    scope: &Scope,
    source: &WabstiCSource,
    errors: &mut Vec<FileImportError>,
) -> BTreeMap<EntityId, ElectionResult> {
    let mut errs = Errors::of(table, errors);
    let mut added: BTreeMap<EntityId, ElectionResult> = BTreeMap::new();
    for line in table.lines.iter() {
        if !line_is_relevant(line, &source.number, source.district.as_deref()) {
            continue;
        }
        let mut line_errors: Vec<String> = Vec::new();
        let entity_id = match bfs_entity_id(line) {
            Ok(id) => id,
            Err(e) => {
                errs.failed(line, vec![e]);
                continue;
            }
        };
        if scope.skips(entity_id) {
            continue;
        }
        if added.contains_key(&entity_id) {
            line_errors.push(format!("{} was found twice", entity_id));
        }
        let eligible_voters = line
            .int("stimmberechtigte")
            .map_err(|e| line_errors.push(e))
            .unwrap_or(0);
        scope.check(entity_id, &mut line_errors);
        if errs.failed(line, line_errors) {
            continue;
        }
        let mut result = ElectionResult::uncounted(entity_id, scope.locate(entity_id));
        result.eligible_voters = eligible_voters;
        added.insert(entity_id, result);
    }
    added
}

/// The `wm_gemeinden`/`wp_gemeinden` file: the ballots of the entities.
/// Lines of entities not in the static file belong to other elections.
fn parse_entity_ballots(
    table: &Table,
    entities: &mut BTreeMap<EntityId, ElectionResult>,
    with_votes: bool,
    errors: &mut Vec<FileImportError>,
) {
    let mut errs = Errors::of(table, errors);
    for line in table.lines.iter() {
        let entity_id = match bfs_entity_id(line) {
            Ok(id) => id,
            Err(e) => {
                errs.failed(line, vec![e]);
                continue;
            }
        };
        let entity = match entities.get_mut(&entity_id) {
            Some(e) => e,
            None => continue,
        };
        let parsed = (|| -> Result<(), String> {
            // Locked entities carry the time of locking (1442 for 14:42).
            let counted = line.int("sperrung")? != 0;
            let eligible_voters = line.int("stimmberechtigte")?;
            let received_ballots = line.int("stmabgegeben")?;
            let blank_ballots = line.int("stmleer")?;
            let invalid_ballots = line.int("stmungueltig")?;
            let (blank_votes, invalid_votes) = if with_votes {
                (line.int("stimmenleer")?, line.int("stimmenungueltig")?)
            } else {
                (0, 0)
            };
            entity.counted = counted;
            if eligible_voters != 0 {
                entity.eligible_voters = eligible_voters;
            }
            entity.received_ballots = received_ballots;
            entity.blank_ballots = blank_ballots;
            entity.invalid_ballots = invalid_ballots;
            entity.blank_votes = blank_votes;
            entity.invalid_votes = invalid_votes;
            if !counted {
                entity.clear_numbers();
            }
            Ok(())
        })();
        if let Err(e) = parsed {
            errs.failed(line, vec![e]);
        }
    }
}

fn pending_entities(line: &Line) -> Result<Option<u64>, String> {
    line.opt_int("anzpendentgde")
        .map_err(|e| format!("Error in anzpendentgde: {}", e))
}

/// Only the entities with candidate results are stored, the others are
/// added as uncounted.
fn collect_results(
    scope: &Scope,
    mut entities: BTreeMap<EntityId, ElectionResult>,
    candidate_results: BTreeMap<EntityId, Vec<CandidateResult>>,
    mut list_results: BTreeMap<EntityId, Vec<ListResult>>,
) -> Vec<ElectionResult> {
    let mut results: Vec<ElectionResult> = candidate_results
        .into_iter()
        .filter_map(|(entity_id, candidate_results)| {
            let mut result = entities.remove(&entity_id)?;
            result.candidate_results = candidate_results;
            result.list_results = list_results.remove(&entity_id).unwrap_or_default();
            Some(result)
        })
        .collect();
    add_missing_election_results(scope, &mut results);
    results
}

fn load_files(
    inputs: &BTreeMap<String, String>,
    files: &[(&str, &[&str])],
) -> Result<Vec<Table>, Vec<FileImportError>> {
    let mut tables: Vec<Table> = Vec::new();
    let mut errors: Vec<FileImportError> = Vec::new();
    for (key, headers) in files {
        match load_input(inputs, key, headers) {
            Ok(t) => tables.push(t),
            Err(e) => errors.push(e),
        }
    }
    if errors.is_empty() {
        Ok(tables)
    } else {
        Err(errors)
    }
}

// ******** Votes ********

/// The column prefix of a ballot: `HG` is the main question, `N1` the
/// counter-proposal and `N2` the tie-breaker.
fn ballot_prefix(ballot_type: BallotType) -> &'static str {
    match ballot_type {
        BallotType::Proposal => "stmhg",
        BallotType::CounterProposal => "stmn1",
        BallotType::TieBreaker => "stmn2",
    }
}

pub fn import_vote(
    vote: &Vote,
    catalogue: &EntityCatalogue,
    source: &WabstiCSource,
    inputs: &BTreeMap<String, String>,
) -> ImportResult {
    let mut tables = load_files(
        inputs,
        &[("sg_geschaefte", &SG_GESCHAEFTE[..]), ("sg_gemeinden", &SG_GEMEINDEN[..])],
    )?
    .into_iter();
    let mut next = || tables.next().ok_or_else(|| vec![FileImportError::new("No file given")]);
    let files = VoteFiles {
        sg_geschaefte: next()?,
        sg_gemeinden: next()?,
    };
    import_vote_files(vote, catalogue, source, &files)
}

pub fn import_vote_files(
    vote: &Vote,
    catalogue: &EntityCatalogue,
    source: &WabstiCSource,
    files: &VoteFiles,
) -> ImportResult {
    let scope = Scope::of_vote(vote, catalogue);
    let number = source.number.as_str();
    let district = source.district.as_deref();
    let mut errors: Vec<FileImportError> = Vec::new();

    let mut remaining: Option<u64> = None;
    let mut complete: Option<u64> = None;
    let mut errs = Errors::of(&files.sg_geschaefte, &mut errors);
    for line in files.sg_geschaefte.lines.iter() {
        if !line_is_relevant(line, number, district) {
            continue;
        }
        let mut line_errors: Vec<String> = Vec::new();
        match line.opt_int("ausmittlungsstand") {
            Ok(c) => complete = c,
            Err(e) => line_errors.push(e),
        }
        match line.opt_int("anzgdependent") {
            Ok(r) => remaining = r,
            Err(e) => line_errors.push(e),
        }
        errs.failed(line, line_errors);
    }

    let ballot_types: &[BallotType] = if vote.ballot(BallotType::CounterProposal).is_some() {
        &[
            BallotType::Proposal,
            BallotType::CounterProposal,
            BallotType::TieBreaker,
        ]
    } else {
        &[BallotType::Proposal]
    };
    let mut ballots: BTreeMap<BallotType, Vec<BallotResult>> = ballot_types
        .iter()
        .map(|bt| (*bt, Vec::new()))
        .collect();
    let mut seen: BTreeSet<EntityId> = BTreeSet::new();
    let mut errs = Errors::of(&files.sg_gemeinden, &mut errors);
    for line in files.sg_gemeinden.lines.iter() {
        if !line_is_relevant(line, number, district) {
            continue;
        }
        let mut line_errors: Vec<String> = Vec::new();
        let entity = bfs_entity_id(line);
        // Locked entities carry the time of locking.
        let counted = match line.int("sperrung") {
            Ok(s) => s != 0,
            Err(_) => {
                line_errors.push("Invalid values".to_string());
                false
            }
        };
        let mut int = |col: &str| line.int(col).map_err(|e| line_errors.push(e)).unwrap_or(0);
        let eligible_voters = int("stimmberechtigte");
        let invalid = int("stmungueltig");
        let mut numbers: Vec<(BallotType, u64, u64)> = Vec::new();
        for bt in ballot_types.iter() {
            let prefix = ballot_prefix(*bt);
            let yeas = int(&format!("{}ja", prefix));
            let nays = int(&format!("{}nein", prefix));
            numbers.push((*bt, yeas, nays));
        }
        let mut empties: Vec<u64> = Vec::new();
        for bt in ballot_types.iter() {
            let empty = line
                .int("stmleer")
                .and_then(|leer| Ok(leer + line.int(&format!("{}ohneaw", ballot_prefix(*bt)))?));
            match empty {
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
        let entity_id = match entity {
            Ok(id) => id,
            Err(e) => {
                line_errors.insert(0, e);
                errs.failed(line, line_errors);
                continue;
            }
        };
        if scope.skips(entity_id) {
            continue;
        }
        scope.check(entity_id, &mut line_errors);
        if !seen.insert(entity_id) {
            line_errors.push(format!("{} was found twice", entity_id));
        }
        if errs.failed(line, line_errors) {
            continue;
        }
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
        debug!("import_vote_files: entity {} counted {}", entity_id, counted);
    }
    if !errors.is_empty() {
        return Err(errors);
    }

    let status = if remaining == Some(0) {
        Status::Final
    } else if complete == Some(1) {
        Status::Interim
    } else {
        Status::Unknown
    };
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
        "import_vote_files: {} {}: {} ballots, {:?}",
        number,
        district.unwrap_or(""),
        ballots.len(),
        status
    );
    Ok(Import::Vote(VoteImport {
        status: Some(status),
        has_expats: None,
        ballots,
    }))
}

// ******** Majorz ********

pub fn import_majorz(
    election: &Election,
    catalogue: &EntityCatalogue,
    source: &WabstiCSource,
    inputs: &BTreeMap<String, String>,
) -> ImportResult {
    let mut tables = load_files(
        inputs,
        &[
            ("wm_wahl", &WM_WAHL[..]),
            ("wmstatic_gemeinden", &WM_STATIC_GEMEINDEN[..]),
            ("wm_gemeinden", &WM_GEMEINDEN[..]),
            ("wm_kandidaten", &WM_KANDIDATEN[..]),
            ("wm_kandidatengde", &WM_KANDIDATENGDE[..]),
        ],
    )?
    .into_iter();
    let mut next = || tables.next().ok_or_else(|| vec![FileImportError::new("No file given")]);
    let files = MajorzFiles {
        wm_wahl: next()?,
        wmstatic_gemeinden: next()?,
        wm_gemeinden: next()?,
        wm_kandidaten: next()?,
        wm_kandidatengde: next()?,
    };
    import_majorz_files(election, catalogue, source, &files)
}

pub fn import_majorz_files(
    election: &Election,
    catalogue: &EntityCatalogue,
    source: &WabstiCSource,
    files: &MajorzFiles,
) -> ImportResult {
    let scope = Scope::of_election(election, catalogue);
    let number = source.number.as_str();
    let mut errors: Vec<FileImportError> = Vec::new();

    let mut absolute_majority: Option<u64> = None;
    let mut remaining: Option<u64> = None;
    let mut complete: Option<u64> = None;
    let mut errs = Errors::of(&files.wm_wahl, &mut errors);
    for line in files.wm_wahl.lines.iter() {
        if !line_is_relevant(line, number, None) {
            continue;
        }
        let mut line_errors: Vec<String> = Vec::new();
        match line.signed_int("absolutesmehr") {
            Ok(Some(m)) if m >= 0 => absolute_majority = Some(m as u64),
            Ok(_) => absolute_majority = None,
            Err(e) => line_errors.push(e),
        }
        match line.opt_int("ausmittlungsstand") {
            Ok(c) => complete = c,
            Err(e) => line_errors.push(e),
        }
        match pending_entities(line) {
            Ok(r) => remaining = r,
            Err(e) => line_errors.push(e),
        }
        errs.failed(line, line_errors);
    }

    let mut entities = parse_static_entities(&files.wmstatic_gemeinden, &scope, source, &mut errors);
    parse_entity_ballots(&files.wm_gemeinden, &mut entities, true, &mut errors);

    let mut candidates: Vec<Candidate> = Vec::new();
    for line in files.wm_kandidaten.lines.iter() {
        if !line_is_relevant(line, number, None) {
            continue;
        }
        let candidate_id = line.get("knr").to_string();
        if candidates.iter().any(|c| c.candidate_id == candidate_id) {
            continue;
        }
        candidates.push(Candidate {
            candidate_id,
            family_name: line.get("nachname").to_string(),
            first_name: line.get("vorname").to_string(),
            elected: line.get("gewaehlt") == "1",
            party: Some(line.get("partei").to_string()).filter(|p| !p.is_empty()),
            party_color: None,
            gender: None,
            year_of_birth: None,
            list_id: None,
        });
    }

    let mut candidate_results: BTreeMap<EntityId, Vec<CandidateResult>> = BTreeMap::new();
    let mut errs = Errors::of(&files.wm_kandidatengde, &mut errors);
    for line in files.wm_kandidatengde.lines.iter() {
        if !line_is_relevant(line, number, None) {
            continue;
        }
        let mut line_errors: Vec<String> = Vec::new();
        let candidate_id = line.get("knr").to_string();
        let parsed = bfs_entity_id(line).and_then(|id| Ok((id, line.int("stimmen")?)));
        let (entity_id, votes) = match parsed {
            Ok(p) => p,
            Err(_) => {
                errs.failed(line, vec!["Invalid candidate results".to_string()]);
                continue;
            }
        };
        if !candidates.is_empty() && !candidates.iter().any(|c| c.candidate_id == candidate_id) {
            line_errors.push(format!("Candidate with id {} not in wm_kandidaten", candidate_id));
        }
        if scope.skips(entity_id) {
            continue;
        }
        let counted = match entities.get(&entity_id) {
            Some(e) => e.counted,
            None => {
                line_errors.push(format!("Entity with id {} not in wmstatic_gemeinden", entity_id));
                false
            }
        };
        if errs.failed(line, line_errors) {
            continue;
        }
        let results = candidate_results.entry(entity_id).or_default();
        let votes = VoteCount(if counted { votes } else { 0 });
        match results.iter_mut().find(|r| r.candidate_id == candidate_id) {
            Some(r) => r.votes = votes,
            None => results.push(CandidateResult { candidate_id, votes }),
        }
    }

    if complete == Some(2) && remaining != Some(0) {
        errors.push(FileImportError::in_file(
            "wm_wahl",
            "Ausmittlungsstand set to final but AnzPendentGde is not 0",
        ));
    }
    if !errors.is_empty() {
        return Err(errors);
    }

    let status = if remaining == Some(0) {
        Status::Final
    } else if complete == Some(1) {
        Status::Interim
    } else {
        Status::Unknown
    };
    let results = collect_results(&scope, entities, candidate_results, BTreeMap::new());
    info!(
        "import_majorz_files: {} {}: {} candidates, {} results, {:?}",
        number,
        source.district.as_deref().unwrap_or(""),
        candidates.len(),
        results.len(),
        status
    );
    Ok(Import::Election(ElectionImport {
        status: Some(status),
        absolute_majority,
        majority_type: None,
        has_expats: None,
        candidates,
        results,
        proporz: None,
    }))
}

// ******** Proporz ********

/// `99` is the blank list.
fn wabstic_list_id(value: &str) -> String {
    match value {
        "" => "0".to_string(),
        "99" => BLANK_LIST_ID.to_string(),
        v => v.to_string(),
    }
}

/// The list of a candidate, derived from its number: `1.03` or `103` are
/// both the third candidate of list 1.
fn list_id_from_candidate_number(knr: &str) -> String {
    match knr.split_once('.') {
        Some((list, _)) => list.to_string(),
        None => {
            let cut = knr.char_indices().rev().nth(1).map(|(i, _)| i).unwrap_or(0);
            knr[..cut].to_string()
        }
    }
}

pub fn import_proporz(
    election: &Election,
    catalogue: &EntityCatalogue,
    source: &WabstiCSource,
    inputs: &BTreeMap<String, String>,
) -> ImportResult {
    let mut tables = load_files(
        inputs,
        &[
            ("wp_wahl", &WP_WAHL[..]),
            ("wpstatic_gemeinden", &WP_STATIC_GEMEINDEN[..]),
            ("wp_gemeinden", &WP_GEMEINDEN[..]),
            ("wp_listen", &WP_LISTEN[..]),
            ("wp_listengde", &WP_LISTENGDE[..]),
            ("wpstatic_kandidaten", &WP_STATIC_KANDIDATEN[..]),
            ("wp_kandidaten", &WP_KANDIDATEN[..]),
            ("wp_kandidatengde", &WP_KANDIDATENGDE[..]),
        ],
    )?
    .into_iter();
    let mut next = || tables.next().ok_or_else(|| vec![FileImportError::new("No file given")]);
    let files = ProporzFiles {
        wp_wahl: next()?,
        wpstatic_gemeinden: next()?,
        wp_gemeinden: next()?,
        wp_listen: next()?,
        wp_listengde: next()?,
        wpstatic_kandidaten: next()?,
        wp_kandidaten: next()?,
        wp_kandidatengde: next()?,
    };
    import_proporz_files(election, catalogue, source, &files)
}

pub fn import_proporz_files(
    election: &Election,
    catalogue: &EntityCatalogue,
    source: &WabstiCSource,
    files: &ProporzFiles,
) -> ImportResult {
    let scope = Scope::of_election(election, catalogue);
    let number = source.number.as_str();
    let mut errors: Vec<FileImportError> = Vec::new();

    let mut remaining: Option<u64> = None;
    let mut errs = Errors::of(&files.wp_wahl, &mut errors);
    for line in files.wp_wahl.lines.iter() {
        if !line_is_relevant(line, number, None) {
            continue;
        }
        match pending_entities(line) {
            Ok(r) => remaining = r,
            Err(e) => {
                errs.failed(line, vec![e]);
            }
        }
    }

    let mut entities = parse_static_entities(&files.wpstatic_gemeinden, &scope, source, &mut errors);
    parse_entity_ballots(&files.wp_gemeinden, &mut entities, false, &mut errors);

    // Lists and connections
    let mut lists: Vec<List> = Vec::new();
    let mut connections: Vec<ListConnection> = Vec::new();
    let mut errs = Errors::of(&files.wp_listen, &mut errors);
    for line in files.wp_listen.lines.iter() {
        if !line_is_relevant(line, number, None) {
            continue;
        }
        let mut line_errors: Vec<String> = Vec::new();
        let list_id = wabstic_list_id(line.get("listnr"));
        let number_of_mandates = line
            .small_int("sitze")
            .map_err(|e| line_errors.push(e))
            .unwrap_or(0);
        let connection = line.get("listverb");
        let subconnection = line.get("listuntverb");
        if !subconnection.is_empty() && connection.is_empty() {
            line_errors.push("connection is missing.".to_string());
        }
        if lists.iter().any(|l| l.list_id == list_id) {
            line_errors.push(format!("{} was found twice", list_id));
        }
        if errs.failed(line, line_errors) {
            continue;
        }
        let mut key: Option<String> = None;
        if !connection.is_empty() {
            if !connections.iter().any(|c| c.connection_id == connection) {
                connections.push(ListConnection {
                    connection_id: connection.to_string(),
                    parent: None,
                });
            }
            key = Some(connection.to_string());
            if !subconnection.is_empty() {
                let sub = prefix_connection_id(subconnection, connection);
                if !connections.iter().any(|c| c.connection_id == sub) {
                    connections.push(ListConnection {
                        connection_id: sub.clone(),
                        parent: Some(connection.to_string()),
                    });
                }
                key = Some(sub);
            }
        }
        lists.push(List {
            list_id,
            name: line.get("listcode").to_string(),
            number_of_mandates,
            connection: key,
            color: None,
            panachage: vec![],
        });
    }

    let mut list_results: BTreeMap<EntityId, Vec<ListResult>> = BTreeMap::new();
    let mut errs = Errors::of(&files.wp_listengde, &mut errors);
    for line in files.wp_listengde.lines.iter() {
        let parsed = bfs_entity_id(line).and_then(|id| Ok((id, line.int("stimmentotal")?)));
        let (entity_id, votes) = match parsed {
            Ok(p) => p,
            Err(e) => {
                errs.failed(line, vec![e]);
                continue;
            }
        };
        let list_id = wabstic_list_id(line.get("listnr"));
        let entity = match entities.get_mut(&entity_id) {
            Some(e) => e,
            None => continue,
        };
        let results = list_results.entry(entity_id).or_default();
        if results.iter().any(|r| r.list_id == list_id) {
            errs.failed(line, vec![format!("{}/{} was found twice", entity_id, list_id)]);
            continue;
        }
        let votes = if entity.counted { votes } else { 0 };
        if list_id == BLANK_LIST_ID {
            entity.blank_votes = votes;
        }
        results.push(ListResult {
            list_id,
            votes: VoteCount(votes),
        });
    }

    let mut candidates: Vec<Candidate> = Vec::new();
    let mut errs = Errors::of(&files.wpstatic_kandidaten, &mut errors);
    for line in files.wpstatic_kandidaten.lines.iter() {
        if !line_is_relevant(line, number, None) {
            continue;
        }
        let mut line_errors: Vec<String> = Vec::new();
        let candidate_id = line.get("knr").to_string();
        let list_id = list_id_from_candidate_number(&candidate_id);
        if candidates.iter().any(|c| c.candidate_id == candidate_id) {
            line_errors.push(format!("{} was found twice", candidate_id));
        }
        if !lists.iter().any(|l| l.list_id == list_id) {
            line_errors.push(format!("List_id {} has not been found in list numbers", list_id));
        }
        if errs.failed(line, line_errors) {
            continue;
        }
        candidates.push(Candidate {
            candidate_id,
            family_name: line.get("nachname").to_string(),
            first_name: line.get("vorname").to_string(),
            elected: false,
            party: None,
            party_color: None,
            gender: None,
            year_of_birth: None,
            list_id: Some(list_id),
        });
    }

    let mut errs = Errors::of(&files.wp_kandidaten, &mut errors);
    for line in files.wp_kandidaten.lines.iter() {
        if !line_is_relevant(line, number, None) {
            continue;
        }
        let candidate_id = line.get("knr");
        let elected = match line.int("gewaehlt") {
            Ok(g) => g == 1,
            Err(e) => {
                errs.failed(line, vec![e]);
                continue;
            }
        };
        match candidates.iter_mut().find(|c| c.candidate_id == candidate_id) {
            Some(c) => c.elected = elected,
            None => {
                errs.failed(
                    line,
                    vec![format!("Candidate with id {} not in wpstatic_kandidaten", candidate_id)],
                );
            }
        }
    }

    let mut candidate_results: BTreeMap<EntityId, Vec<CandidateResult>> = BTreeMap::new();
    let mut errs = Errors::of(&files.wp_kandidatengde, &mut errors);
    for line in files.wp_kandidatengde.lines.iter() {
        let parsed = bfs_entity_id(line).and_then(|id| Ok((id, line.int("stimmen")?)));
        let (entity_id, votes) = match parsed {
            Ok(p) => p,
            Err(e) => {
                errs.failed(line, vec![e]);
                continue;
            }
        };
        let candidate_id = line.get("knr").to_string();
        let counted = match entities.get(&entity_id) {
            Some(e) if candidates.iter().any(|c| c.candidate_id == candidate_id) => e.counted,
            _ => continue,
        };
        let results = candidate_results.entry(entity_id).or_default();
        if results.iter().any(|r| r.candidate_id == candidate_id) {
            errs.failed(line, vec![format!("{}/{} was found twice", entity_id, candidate_id)]);
            continue;
        }
        results.push(CandidateResult {
            candidate_id,
            votes: VoteCount(if counted { votes } else { 0 }),
        });
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    // The blank list only carries the blank votes.
    lists.retain(|l| l.list_id != BLANK_LIST_ID);
    let known: BTreeSet<String> = lists.iter().map(|l| l.list_id.clone()).collect();
    for results in list_results.values_mut() {
        results.retain(|r| known.contains(&r.list_id));
    }
    let status = if remaining == Some(0) {
        Status::Final
    } else {
        Status::Unknown
    };
    let results = collect_results(&scope, entities, candidate_results, list_results);
    debug!(
        "import_proporz_files: {}: {} lists, {} connections",
        number,
        lists.len(),
        connections.len()
    );
    Ok(Import::Election(ElectionImport {
        status: Some(status),
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
