//! Majorz elections: absolute majority and elected candidates.

use log::{debug, info};

use crate::*;

/// The absolute majority for a number of valid votes.
pub fn absolute_majority_of(total_valid_votes: u64) -> u64 {
    total_valid_votes / 2 + 1
}

/// The valid votes from which the absolute majority is derived: the
/// accounted votes of the election, per mandate.
pub fn total_valid_votes(election: &Election) -> u64 {
    let votes = accounted_votes(election).max(0) as u64;
    votes / election.number_of_mandates.max(1) as u64
}

/// The absolute majority of an election: the value delivered by the import
/// if there is one, otherwise derived from the valid votes. Relative
/// majority elections have none.
pub fn absolute_majority(election: &Election) -> Option<u64> {
    if election.majority_type == MajorityType::Relative {
        return None;
    }
    match election.absolute_majority {
        Some(x) => Some(x),
        None if election.results.is_empty() => None,
        None => Some(absolute_majority_of(total_valid_votes(election))),
    }
}

/// Computes the elected candidates from the votes.
///
/// Candidates are ranked by their total votes. Candidates with the same
/// number of votes keep the order in which the import delivered them, the
/// first one wins. At most `number_of_mandates` candidates are elected and,
/// under an absolute majority, only those reaching it.
pub fn compute_elected(election: &Election) -> Vec<String> {
    let majority = absolute_majority(election);
    let mut totals = candidate_totals(election);
    // Stable sort: ties stay in import order.
    totals.sort_by(|a, b| b.1.cmp(&a.1));
    let elected: Vec<String> = totals
        .iter()
        .filter(|(_, votes)| match majority {
            Some(m) => votes.0 >= m,
            None => true,
        })
        .take(election.number_of_mandates as usize)
        .map(|(cid, _)| cid.clone())
        .collect();
    debug!(
        "compute_elected: {}: majority {:?} elected {:?}",
        election.id, majority, elected
    );
    elected
}

/// Fills in what a majorz import did not deliver: the absolute majority if
/// it can be derived, and the elected candidates if none has been flagged.
/// Elected candidates are only derived once all the entities are counted.
pub fn recompute_majorz(election: &mut Election) {
    if election.proporz().is_some() {
        return;
    }
    if election.absolute_majority.is_none() {
        election.absolute_majority = absolute_majority(election);
    }
    let flagged = election.candidates.iter().any(|c| c.elected);
    if !flagged && crate::progress::election_counted(election) {
        let elected = compute_elected(election);
        info!(
            "recompute_majorz: {}: derived {} elected candidates",
            election.id,
            elected.len()
        );
        for c in election.candidates.iter_mut() {
            c.elected = elected.contains(&c.candidate_id);
        }
    }
}
