//! Progress and completion of elections, compounds and votes.

use crate::*;

/// Counted and total entities.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Default, serde::Serialize)]
pub struct Progress {
    pub counted: usize,
    pub total: usize,
}

impl Progress {
    /// All the entities are counted, and there is at least one.
    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.counted == self.total
    }
}

pub fn election_progress(election: &Election) -> Progress {
    Progress {
        counted: election.results.iter().filter(|r| r.counted).count(),
        total: election.results.len(),
    }
}

/// There are results and all of them are counted.
pub fn election_counted(election: &Election) -> bool {
    election_progress(election).is_complete()
}

/// An election on its own is completed once all its entities are counted.
pub fn election_completed(election: &Election) -> bool {
    election_counted(election)
}

/// An election belonging to a compound which completes manually is only
/// completed once the compound has been completed by an operator.
pub fn election_completed_in(election: &Election, compound: &ElectionCompound) -> bool {
    if compound.completes_manually && !compound.manually_completed {
        return false;
    }
    election_completed(election)
}

/// The mandates already allocated: none until the election is completed.
pub fn allocated_mandates(election: &Election) -> u32 {
    if !election_completed(election) {
        return 0;
    }
    match &election.kind {
        ElectionKind::Majorz => election.candidates.iter().filter(|c| c.elected).count() as u32,
        ElectionKind::Proporz(_) => crate::proporz::list_mandates(election),
    }
}

/// Completed and total elections of a compound.
pub fn compound_progress(compound: &ElectionCompound) -> Progress {
    Progress {
        counted: compound
            .elections
            .iter()
            .filter(|e| election_completed_in(e, compound))
            .count(),
        total: compound.elections.len(),
    }
}

/// A compound is completed when all its elections are completed, when the
/// operator completed it (if it completes manually) and, for compounds
/// apportioned after the biproportional method, once that apportionment is
/// done.
pub fn compound_completed(compound: &ElectionCompound) -> bool {
    if compound.completes_manually && !compound.manually_completed {
        return false;
    }
    if compound.after_pukelsheim && !compound.pukelsheim_completed {
        return false;
    }
    compound_progress(compound).is_complete()
}

pub fn compound_mandates(compound: &ElectionCompound) -> u32 {
    compound.elections.iter().map(|e| e.number_of_mandates).sum()
}

pub fn compound_allocated_mandates(compound: &ElectionCompound) -> u32 {
    compound
        .elections
        .iter()
        .filter(|e| election_completed_in(e, compound))
        .map(allocated_mandates)
        .sum()
}

pub fn ballot_progress(ballot: &Ballot) -> Progress {
    Progress {
        counted: ballot.results.iter().filter(|r| r.counted).count(),
        total: ballot.results.len(),
    }
}

/// The progress of a vote, averaged over its ballots.
pub fn vote_progress(vote: &Vote) -> Progress {
    let n = vote.ballots.len();
    if n == 0 {
        return Progress::default();
    }
    let (counted, total) = vote
        .ballots
        .iter()
        .map(ballot_progress)
        .fold((0, 0), |(c, t), p| (c + p.counted, t + p.total));
    Progress {
        counted: counted / n,
        total: total / n,
    }
}

pub fn vote_completed(vote: &Vote) -> bool {
    !vote.ballots.is_empty() && vote.ballots.iter().all(|b| ballot_progress(b).is_complete())
}

/// Completion and progress of any item.
pub fn item_progress(item: &Item) -> (bool, Progress) {
    match item {
        Item::Election(e) => (election_completed(e), election_progress(e)),
        Item::ElectionCompound(c) => (compound_completed(c), compound_progress(c)),
        Item::Vote(v) => (vote_completed(v), vote_progress(v)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2022, 3, 13).unwrap()
    }

    fn election(id: &str, counted: &[bool]) -> Election {
        let mut e = Election::new(id, id, date(), Domain::Canton, ElectionKind::Majorz);
        e.results = counted
            .iter()
            .enumerate()
            .map(|(i, c)| ElectionResult {
                entity_id: i as u32 + 1,
                counted: *c,
                ..Default::default()
            })
            .collect();
        e
    }

    fn compound(elections: Vec<Election>) -> ElectionCompound {
        ElectionCompound {
            id: "compound".to_string(),
            title: "Compound".to_string(),
            date: date(),
            domain: Domain::Canton,
            elections,
            completes_manually: false,
            manually_completed: false,
            after_pukelsheim: false,
            pukelsheim_completed: false,
            last_result_change: None,
            parties: PartyData::default(),
        }
    }

    #[test]
    fn election_states() {
        let e = election("e", &[]);
        assert_eq!(election_progress(&e), Progress { counted: 0, total: 0 });
        assert!(!election_completed(&e));

        let e = election("e", &[true, false]);
        assert_eq!(election_progress(&e), Progress { counted: 1, total: 2 });
        assert!(!election_completed(&e));
        assert_eq!(allocated_mandates(&e), 0);

        let mut e = election("e", &[true, true]);
        assert!(election_completed(&e));
        e.candidates = vec![Candidate {
            candidate_id: "1".to_string(),
            family_name: "A".to_string(),
            first_name: "B".to_string(),
            elected: true,
            party: None,
            party_color: None,
            gender: None,
            year_of_birth: None,
            list_id: None,
        }];
        assert_eq!(allocated_mandates(&e), 1);
    }

    #[test]
    fn compound_states() {
        let mut c = compound(vec![election("a", &[true]), election("b", &[true, false])]);
        assert_eq!(compound_progress(&c), Progress { counted: 1, total: 2 });
        assert!(!compound_completed(&c));

        c.elections[1].results[1].counted = true;
        assert!(compound_completed(&c));

        c.completes_manually = true;
        assert!(!compound_completed(&c));
        assert_eq!(compound_progress(&c), Progress { counted: 0, total: 2 });
        c.manually_completed = true;
        assert!(compound_completed(&c));

        c.after_pukelsheim = true;
        assert!(!compound_completed(&c));
        c.pukelsheim_completed = true;
        assert!(compound_completed(&c));
        assert_eq!(compound_mandates(&c), 2);
    }

    #[test]
    fn vote_progress_is_averaged() {
        let ballot = |counted: &[bool]| Ballot {
            ballot_type: BallotType::Proposal,
            results: counted
                .iter()
                .enumerate()
                .map(|(i, c)| BallotResult {
                    entity_id: i as u32 + 1,
                    counted: *c,
                    ..Default::default()
                })
                .collect(),
        };
        let vote = Vote {
            id: "vote".to_string(),
            external_id: None,
            title: "Vote".to_string(),
            date: date(),
            domain: Domain::Canton,
            domain_segment: None,
            has_expats: false,
            status: Status::Unknown,
            last_result_change: None,
            ballots: vec![ballot(&[true, true, false]), ballot(&[true, false, false])],
        };
        assert_eq!(vote_progress(&vote), Progress { counted: 1, total: 3 });
        assert!(!vote_completed(&vote));
    }
}
