//! Writing the output of an import adapter into an election, a compound or a
//! vote.
//!
//! Every reconciliation replaces the complete result set of its target: the
//! current results are cleared and the imported rows inserted. Importing the
//! same file twice therefore leads to the same results. A reconciliation
//! runs inside [`transaction`]: if any check fails, the target is left as it
//! was.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use snafu::prelude::*;

use crate::progress::{election_progress, item_progress, Progress};
use crate::*;

#[derive(Debug, Snafu, PartialEq, Eq, Clone)]
pub enum ResultError {
    #[snafu(display("Entity {entity_id} appears twice in the results"))]
    DuplicateEntity { entity_id: EntityId },
    #[snafu(display("Candidate {candidate_id} was found twice"))]
    DuplicateCandidate { candidate_id: String },
    #[snafu(display("Candidate {candidate_id} of entity {entity_id} does not exist"))]
    UnknownCandidate {
        entity_id: EntityId,
        candidate_id: String,
    },
    #[snafu(display("List {list_id} does not exist"))]
    UnknownList { list_id: String },
    #[snafu(display("Connection {connection_id} does not exist"))]
    UnknownConnection { connection_id: String },
    #[snafu(display("Ballot {ballot_type:?} was found twice"))]
    DuplicateBallot { ballot_type: BallotType },
    #[snafu(display("Lists can only be imported into proporz elections"))]
    NotProporz {},
    #[snafu(display("The import does not match the target {target}"))]
    WrongTarget { target: String },
}

pub type ResultResult<T> = Result<T, ResultError>;

/// The lists and list connections of a proporz import.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct ProporzImport {
    pub lists: Vec<List>,
    pub list_connections: Vec<ListConnection>,
}

/// The canonical output of an election import adapter.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct ElectionImport {
    /// The status from the file, if it delivers one.
    pub status: Option<Status>,
    pub absolute_majority: Option<u64>,
    pub majority_type: Option<MajorityType>,
    pub has_expats: Option<bool>,
    pub candidates: Vec<Candidate>,
    pub results: Vec<ElectionResult>,
    pub proporz: Option<ProporzImport>,
}

#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct VoteImport {
    pub status: Option<Status>,
    pub has_expats: Option<bool>,
    pub ballots: Vec<Ballot>,
}

#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct PartyImport {
    pub party_results: Vec<PartyResult>,
    pub panachage: Vec<PartyPanachageResult>,
    pub colors: std::collections::BTreeMap<String, String>,
}

/// The imports of the elections of a compound, by election id.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct CompoundImport {
    pub elections: Vec<(String, ElectionImport)>,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub enum Import {
    Election(ElectionImport),
    Compound(CompoundImport),
    Vote(VoteImport),
    PartyResults(PartyImport),
}

/// What a reconciliation changed.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ResultChange {
    pub previous: Progress,
    pub current: Progress,
    pub completed: bool,
    pub last_result_change: DateTime<Utc>,
}

/// Runs `f` against a copy of `target` and only keeps the changes if it
/// succeeds. This is the all-or-nothing unit of an import.
pub fn transaction<T, R, E, F>(target: &mut T, f: F) -> Result<R, E>
where
    T: Clone,
    F: FnOnce(&mut T) -> Result<R, E>,
{
    let mut working = target.clone();
    let res = f(&mut working)?;
    *target = working;
    Ok(res)
}

/// Reconciles an import with its target inside a transaction.
pub fn commit(item: &mut Item, import: Import, now: DateTime<Utc>) -> ResultResult<ResultChange> {
    transaction(item, |item| {
        let (_, previous) = item_progress(item);
        match (&mut *item, import) {
            (Item::Election(e), Import::Election(i)) => reconcile_election(e, i, now)?,
            (Item::Election(e), Import::PartyResults(i)) => {
                let data = e.proporz_mut().context(NotProporzSnafu {})?;
                reconcile_parties(&mut data.parties, i);
                e.last_result_change = Some(now);
            }
            (Item::ElectionCompound(c), Import::Compound(i)) => reconcile_compound(c, i, now)?,
            (Item::ElectionCompound(c), Import::PartyResults(i)) => {
                reconcile_parties(&mut c.parties, i);
                c.last_result_change = Some(now);
            }
            (Item::Vote(v), Import::Vote(i)) => reconcile_vote(v, i, now)?,
            (item, _) => {
                return WrongTargetSnafu {
                    target: item_id(item),
                }
                .fail()
            }
        }
        let (completed, current) = item_progress(item);
        if current.counted < previous.counted {
            warn!(
                "commit: {}: counted entities went down from {} to {}",
                item_id(item),
                previous.counted,
                current.counted
            );
        }
        Ok(ResultChange {
            previous,
            current,
            completed,
            last_result_change: now,
        })
    })
}

fn item_id(item: &Item) -> String {
    match item {
        Item::Election(e) => e.id.clone(),
        Item::ElectionCompound(c) => c.id.clone(),
        Item::Vote(v) => v.id.clone(),
    }
}

fn check_election_import(election: &Election, import: &ElectionImport) -> ResultResult<()> {
    let mut candidates: BTreeSet<&str> = BTreeSet::new();
    for c in import.candidates.iter() {
        ensure!(
            candidates.insert(c.candidate_id.as_str()),
            DuplicateCandidateSnafu {
                candidate_id: c.candidate_id.clone()
            }
        );
    }
    let lists: BTreeSet<&str> = match &import.proporz {
        None => BTreeSet::new(),
        Some(p) => {
            ensure!(election.proporz().is_some(), NotProporzSnafu {});
            let connections: BTreeSet<&str> = p
                .list_connections
                .iter()
                .map(|c| c.connection_id.as_str())
                .collect();
            for c in p.list_connections.iter() {
                if let Some(parent) = &c.parent {
                    ensure!(
                        connections.contains(parent.as_str()),
                        UnknownConnectionSnafu {
                            connection_id: parent.clone()
                        }
                    );
                }
            }
            for l in p.lists.iter() {
                if let Some(connection) = &l.connection {
                    ensure!(
                        connections.contains(connection.as_str()),
                        UnknownConnectionSnafu {
                            connection_id: connection.clone()
                        }
                    );
                }
            }
            p.lists.iter().map(|l| l.list_id.as_str()).collect()
        }
    };
    for c in import.candidates.iter() {
        if let Some(list_id) = &c.list_id {
            ensure!(
                lists.contains(list_id.as_str()),
                UnknownListSnafu {
                    list_id: list_id.clone()
                }
            );
        }
    }
    let mut entities: BTreeSet<EntityId> = BTreeSet::new();
    for r in import.results.iter() {
        ensure!(
            entities.insert(r.entity_id),
            DuplicateEntitySnafu {
                entity_id: r.entity_id
            }
        );
        for cr in r.candidate_results.iter() {
            ensure!(
                candidates.contains(cr.candidate_id.as_str()),
                UnknownCandidateSnafu {
                    entity_id: r.entity_id,
                    candidate_id: cr.candidate_id.clone()
                }
            );
        }
        for p in r.candidate_panachage.iter() {
            ensure!(
                candidates.contains(p.candidate_id.as_str()),
                UnknownCandidateSnafu {
                    entity_id: r.entity_id,
                    candidate_id: p.candidate_id.clone()
                }
            );
            if let Some(source) = &p.source_list {
                ensure!(
                    lists.contains(source.as_str()),
                    UnknownListSnafu {
                        list_id: source.clone()
                    }
                );
            }
        }
        for lr in r.list_results.iter() {
            ensure!(
                lists.contains(lr.list_id.as_str()),
                UnknownListSnafu {
                    list_id: lr.list_id.clone()
                }
            );
        }
    }
    Ok(())
}

/// Replaces the results, candidates and lists of an election by the
/// imported ones.
pub fn reconcile_election(
    election: &mut Election,
    import: ElectionImport,
    now: DateTime<Utc>,
) -> ResultResult<()> {
    check_election_import(election, &import)?;
    let previous = election_progress(election);

    clear_election_results(election);
    election.candidates = import.candidates;
    election.results = import.results;
    election.absolute_majority = import.absolute_majority;
    if let Some(majority_type) = import.majority_type {
        election.majority_type = majority_type;
    }
    if let Some(has_expats) = import.has_expats {
        election.has_expats = has_expats;
    }
    let mut aggregate_panachage = false;
    if let (Some(data), Some(p)) = (election.proporz_mut(), import.proporz) {
        aggregate_panachage = p.lists.iter().all(|l| l.panachage.is_empty());
        data.lists = p.lists;
        data.list_connections = p.list_connections;
    }
    if aggregate_panachage {
        crate::proporz::aggregate_candidate_panachage(election);
    }
    crate::majorz::recompute_majorz(election);

    let current = election_progress(election);
    election.status = match import.status {
        Some(status) => status,
        None if current.is_complete() => Status::Final,
        None => Status::Interim,
    };
    election.last_result_change = Some(now);
    info!(
        "reconcile_election: {}: {} results, progress {:?} -> {:?}, status {:?}",
        election.id,
        election.results.len(),
        previous,
        current,
        election.status
    );
    Ok(())
}

/// Reconciles the imports of the member elections of a compound. Every
/// election of the import must belong to the compound.
pub fn reconcile_compound(
    compound: &mut ElectionCompound,
    import: CompoundImport,
    now: DateTime<Utc>,
) -> ResultResult<()> {
    for (election_id, election_import) in import.elections.into_iter() {
        let election = compound
            .elections
            .iter_mut()
            .find(|e| e.id == election_id)
            .context(WrongTargetSnafu {
                target: election_id.clone(),
            })?;
        reconcile_election(election, election_import, now)?;
    }
    compound.last_result_change = Some(now);
    info!("reconcile_compound: {}", compound.id);
    Ok(())
}

/// Removes everything an import wrote into an election. This is the only
/// operation that may lower the progress of an election.
pub fn clear_election_results(election: &mut Election) {
    debug!("clear_election_results: {}", election.id);
    election.results.clear();
    election.candidates.clear();
    election.absolute_majority = None;
    election.status = Status::Unknown;
    election.last_result_change = None;
    if let Some(data) = election.proporz_mut() {
        data.lists.clear();
        data.list_connections.clear();
    }
}

/// Replaces the results of the imported ballots of a vote.
pub fn reconcile_vote(vote: &mut Vote, import: VoteImport, now: DateTime<Utc>) -> ResultResult<()> {
    let mut types: BTreeSet<BallotType> = BTreeSet::new();
    for b in import.ballots.iter() {
        ensure!(
            types.insert(b.ballot_type),
            DuplicateBallotSnafu {
                ballot_type: b.ballot_type
            }
        );
        let mut entities: BTreeSet<EntityId> = BTreeSet::new();
        for r in b.results.iter() {
            ensure!(
                entities.insert(r.entity_id),
                DuplicateEntitySnafu {
                    entity_id: r.entity_id
                }
            );
        }
    }

    clear_vote_results(vote);
    for ballot in import.ballots.into_iter() {
        match vote
            .ballots
            .iter_mut()
            .find(|b| b.ballot_type == ballot.ballot_type)
        {
            Some(existing) => existing.results = ballot.results,
            None => vote.ballots.push(ballot),
        }
    }
    vote.ballots.sort_by_key(|b| b.ballot_type);
    if let Some(has_expats) = import.has_expats {
        vote.has_expats = has_expats;
    }
    let completed = crate::progress::vote_completed(vote);
    vote.status = match import.status {
        Some(status) => status,
        None if completed => Status::Final,
        None => Status::Interim,
    };
    vote.last_result_change = Some(now);
    info!(
        "reconcile_vote: {}: {} ballots, completed {}",
        vote.id,
        vote.ballots.len(),
        completed
    );
    Ok(())
}

/// Removes the results of every ballot of a vote.
pub fn clear_vote_results(vote: &mut Vote) {
    debug!("clear_vote_results: {}", vote.id);
    for b in vote.ballots.iter_mut() {
        b.results.clear();
    }
    vote.status = Status::Unknown;
    vote.last_result_change = None;
}

/// Replaces the party results, the party panachage and the colors.
pub fn reconcile_parties(parties: &mut PartyData, import: PartyImport) {
    info!(
        "reconcile_parties: {} party results, {} panachage results",
        import.party_results.len(),
        import.panachage.len()
    );
    parties.party_results = import.party_results;
    parties.panachage = import.panachage;
    parties.colors = import.colors;
}
