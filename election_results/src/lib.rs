mod model;
use log::debug;

pub mod headers;
pub mod majorz;
pub mod manual;
pub mod notify;
pub mod progress;
pub mod proporz;
pub mod query;
pub mod reconcile;
pub mod summary;

pub use crate::model::*;

// **** Entity level accounting ****

impl ElectionResult {
    /// The ballots which count: received minus blank and invalid ballots.
    pub fn accounted_ballots(&self) -> i64 {
        self.received_ballots as i64 - self.blank_ballots as i64 - self.invalid_ballots as i64
    }

    /// The votes which count. Every accounted ballot carries one vote per
    /// mandate, minus the blank and invalid votes.
    pub fn accounted_votes(&self, number_of_mandates: u32) -> i64 {
        number_of_mandates as i64 * self.accounted_ballots()
            - self.blank_votes as i64
            - self.invalid_votes as i64
    }

    /// Turnout in percent (0 if there are no eligible voters).
    pub fn turnout(&self) -> f64 {
        if self.eligible_voters == 0 {
            0.0
        } else {
            self.received_ballots as f64 / self.eligible_voters as f64 * 100.0
        }
    }
}

impl BallotResult {
    pub fn cast_ballots(&self) -> u64 {
        self.yeas + self.nays + self.empty + self.invalid
    }

    /// Turnout in percent (0 if there are no eligible voters).
    pub fn turnout(&self) -> f64 {
        if self.eligible_voters == 0 {
            0.0
        } else {
            self.cast_ballots() as f64 / self.eligible_voters as f64 * 100.0
        }
    }
}

// **** Election level aggregates ****
//
// These are the in-memory versions of the aggregates. The functions in
// `query` build the database side of the same numbers and must stay
// equivalent to these.

/// Totals over all the entities of an election.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Default)]
pub struct ElectionTotals {
    pub eligible_voters: u64,
    pub expats: u64,
    pub received_ballots: u64,
    pub accounted_ballots: i64,
    pub blank_ballots: u64,
    pub invalid_ballots: u64,
    pub accounted_votes: i64,
}

pub fn election_totals(election: &Election) -> ElectionTotals {
    let mut totals = ElectionTotals::default();
    for r in election.results.iter() {
        totals.eligible_voters += r.eligible_voters;
        totals.expats += r.expats.unwrap_or(0);
        totals.received_ballots += r.received_ballots;
        totals.accounted_ballots += r.accounted_ballots();
        totals.blank_ballots += r.blank_ballots;
        totals.invalid_ballots += r.invalid_ballots;
        totals.accounted_votes += r.accounted_votes(election.number_of_mandates);
    }
    debug!("election_totals: {}: {:?}", election.id, totals);
    totals
}

pub fn accounted_votes(election: &Election) -> i64 {
    election
        .results
        .iter()
        .map(|r| r.accounted_votes(election.number_of_mandates))
        .sum()
}

pub fn accounted_ballots(election: &Election) -> i64 {
    election.results.iter().map(|r| r.accounted_ballots()).sum()
}

/// The total votes of every candidate, in the order of the candidates.
pub fn candidate_totals(election: &Election) -> Vec<(String, VoteCount)> {
    election
        .candidates
        .iter()
        .map(|c| {
            let total: VoteCount = election
                .results
                .iter()
                .flat_map(|r| r.candidate_results.iter())
                .filter(|cr| cr.candidate_id == c.candidate_id)
                .map(|cr| cr.votes)
                .sum();
            (c.candidate_id.clone(), total)
        })
        .collect()
}

/// Yeas, nays, empty and invalid votes of a ballot over all its entities.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Default)]
pub struct BallotTotals {
    pub yeas: u64,
    pub nays: u64,
    pub empty: u64,
    pub invalid: u64,
    pub eligible_voters: u64,
}

impl BallotTotals {
    pub fn yeas_percentage(&self) -> f64 {
        let accounted = (self.yeas + self.nays).max(1);
        self.yeas as f64 / accounted as f64 * 100.0
    }

    pub fn nays_percentage(&self) -> f64 {
        100.0 - self.yeas_percentage()
    }

    pub fn accepted(&self) -> bool {
        self.yeas > self.nays
    }
}

pub fn ballot_totals(ballot: &Ballot) -> BallotTotals {
    let mut totals = BallotTotals::default();
    for r in ballot.results.iter() {
        totals.yeas += r.yeas;
        totals.nays += r.nays;
        totals.empty += r.empty;
        totals.invalid += r.invalid;
        totals.eligible_voters += r.eligible_voters;
    }
    totals
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(received: u64, blank: u64, invalid: u64, blank_votes: u64, invalid_votes: u64) -> ElectionResult {
        ElectionResult {
            entity_id: 1,
            counted: true,
            eligible_voters: 2 * received,
            received_ballots: received,
            blank_ballots: blank,
            invalid_ballots: invalid,
            blank_votes,
            invalid_votes,
            ..Default::default()
        }
    }

    #[test]
    fn entity_accounting() {
        let r = result(1000, 10, 20, 30, 40);
        assert_eq!(r.accounted_ballots(), 970);
        assert_eq!(r.accounted_votes(1), 900);
        assert_eq!(r.accounted_votes(3), 3 * 970 - 70);
        assert_eq!(r.turnout(), 50.0);
        assert!(r.accounted_votes(3) <= r.accounted_ballots() * 3);
    }

    #[test]
    fn turnout_without_voters() {
        let r = ElectionResult::default();
        assert_eq!(r.turnout(), 0.0);
        let b = BallotResult::default();
        assert_eq!(b.turnout(), 0.0);
    }

    #[test]
    fn yeas_percentage_without_votes() {
        let t = BallotTotals::default();
        assert_eq!(t.yeas_percentage(), 0.0);
        let t = BallotTotals {
            yeas: 3,
            nays: 1,
            ..Default::default()
        };
        assert_eq!(t.yeas_percentage(), 75.0);
        assert!(t.accepted());
    }
}
