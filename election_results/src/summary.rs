//! The summary read model of elections, compounds and votes.
//!
//! Summaries are computed from the current state and never change it.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::progress::*;
use crate::*;

#[derive(PartialEq, Debug, Clone, Serialize)]
pub struct Summary {
    pub completed: bool,
    pub date: String,
    pub domain: String,
    pub progress: Progress,
    pub title: String,
    #[serde(rename = "type")]
    pub item_type: String,
    pub url: String,
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub details: Option<SummaryDetails>,
}

/// The type specific part of a summary.
#[derive(PartialEq, Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum SummaryDetails {
    Election {
        /// Elected candidates as (first name, family name).
        elected: Vec<(String, String)>,
        allocated_mandates: u32,
    },
    ElectionCompound {
        elections: Vec<String>,
        elected: Vec<(String, String)>,
        number_of_mandates: u32,
    },
    Vote {
        answer: Option<String>,
        yeas_percentage: f64,
        nays_percentage: f64,
    },
}

fn elected_names(election: &Election) -> Vec<(String, String)> {
    election
        .candidates
        .iter()
        .filter(|c| c.elected)
        .map(|c| (c.first_name.clone(), c.family_name.clone()))
        .collect()
}

/// The answer of a vote once it is completed: `accepted` or `rejected` for
/// simple votes; `proposal`, `counter-proposal` or `rejected` for votes with
/// a counter proposal.
pub fn vote_answer(vote: &Vote) -> Option<String> {
    if !vote_completed(vote) {
        return None;
    }
    let proposal = ballot_totals(vote.proposal()?).accepted();
    let counter = match vote.ballot(BallotType::CounterProposal) {
        None => {
            return Some(if proposal { "accepted" } else { "rejected" }.to_string());
        }
        Some(b) => ballot_totals(b).accepted(),
    };
    let answer = match (proposal, counter) {
        (true, true) => {
            // The yeas of the tie-breaker are for the proposal.
            let tie_breaker = vote
                .ballot(BallotType::TieBreaker)
                .map(|b| ballot_totals(b).accepted())
                .unwrap_or(true);
            if tie_breaker {
                "proposal"
            } else {
                "counter-proposal"
            }
        }
        (true, false) => "proposal",
        (false, true) => "counter-proposal",
        (false, false) => "rejected",
    };
    Some(answer.to_string())
}

fn url_for(base_url: &str, item: &Item) -> String {
    let base = base_url.trim_end_matches('/');
    match item {
        Item::Election(e) => format!("{}/election/{}", base, e.id),
        Item::ElectionCompound(c) => format!("{}/elections/{}", base, c.id),
        Item::Vote(v) => format!("{}/vote/{}", base, v.id),
    }
}

/// Builds the summary of an item. `base_url` is the address under which
/// the items are published.
pub fn get_summary(item: &Item, base_url: &str) -> Summary {
    let (completed, progress) = item_progress(item);
    let url = url_for(base_url, item);
    match item {
        Item::Election(e) => Summary {
            completed,
            date: e.date.format("%Y-%m-%d").to_string(),
            domain: e.domain.as_str().to_string(),
            progress,
            title: e.title.clone(),
            item_type: "election".to_string(),
            url,
            last_modified: e.last_result_change,
            details: Some(SummaryDetails::Election {
                elected: elected_names(e),
                allocated_mandates: allocated_mandates(e),
            }),
        },
        Item::ElectionCompound(c) => Summary {
            completed,
            date: c.date.format("%Y-%m-%d").to_string(),
            domain: c.domain.as_str().to_string(),
            progress,
            title: c.title.clone(),
            item_type: "election_compound".to_string(),
            url,
            last_modified: c
                .elections
                .iter()
                .filter_map(|e| e.last_result_change)
                .chain(c.last_result_change)
                .max(),
            details: Some(SummaryDetails::ElectionCompound {
                elections: c
                    .elections
                    .iter()
                    .map(|e| url_for(base_url, &Item::Election(e.clone())))
                    .collect(),
                elected: c.elections.iter().flat_map(elected_names).collect(),
                number_of_mandates: compound_mandates(c),
            }),
        },
        Item::Vote(v) => {
            let totals = v.proposal().map(ballot_totals).unwrap_or_default();
            Summary {
                completed,
                date: v.date.format("%Y-%m-%d").to_string(),
                domain: v.domain.as_str().to_string(),
                progress,
                title: v.title.clone(),
                item_type: "vote".to_string(),
                url,
                last_modified: v.last_result_change,
                details: Some(SummaryDetails::Vote {
                    answer: vote_answer(v),
                    yeas_percentage: totals.yeas_percentage(),
                    nays_percentage: totals.nays_percentage(),
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ballot(ballot_type: BallotType, yeas: u64, nays: u64) -> Ballot {
        Ballot {
            ballot_type,
            results: vec![BallotResult {
                entity_id: 1701,
                name: "Baar".to_string(),
                counted: true,
                eligible_voters: 1000,
                yeas,
                nays,
                ..Default::default()
            }],
        }
    }

    fn vote(ballots: Vec<Ballot>) -> Vote {
        Vote {
            id: "vote".to_string(),
            external_id: None,
            title: "Vote".to_string(),
            date: NaiveDate::from_ymd_opt(2022, 3, 13).unwrap(),
            domain: Domain::Federation,
            domain_segment: None,
            has_expats: false,
            status: Status::Final,
            last_result_change: None,
            ballots,
        }
    }

    #[test]
    fn answers() {
        let v = vote(vec![ballot(BallotType::Proposal, 60, 40)]);
        assert_eq!(vote_answer(&v), Some("accepted".to_string()));
        let v = vote(vec![ballot(BallotType::Proposal, 40, 60)]);
        assert_eq!(vote_answer(&v), Some("rejected".to_string()));
        let v = vote(vec![
            ballot(BallotType::Proposal, 60, 40),
            ballot(BallotType::CounterProposal, 70, 30),
            ballot(BallotType::TieBreaker, 30, 70),
        ]);
        assert_eq!(vote_answer(&v), Some("counter-proposal".to_string()));
        let mut v = vote(vec![ballot(BallotType::Proposal, 60, 40)]);
        v.ballots[0].results[0].counted = false;
        assert_eq!(vote_answer(&v), None);
    }

    #[test]
    fn vote_summary() {
        let item = Item::Vote(vote(vec![ballot(BallotType::Proposal, 60, 40)]));
        let before = item.clone();
        let s = get_summary(&item, "https://example.org/");
        assert_eq!(before, item);
        assert!(s.completed);
        assert_eq!(s.url, "https://example.org/vote/vote");
        assert_eq!(s.date, "2022-03-13");
        assert_eq!(s.domain, "federation");
        assert_eq!(s.progress, Progress { counted: 1, total: 1 });
        assert_eq!(
            s.details,
            Some(SummaryDetails::Vote {
                answer: Some("accepted".to_string()),
                yeas_percentage: 60.0,
                nays_percentage: 40.0,
            })
        );
    }

    #[test]
    fn election_summary() {
        let date = NaiveDate::from_ymd_opt(2022, 3, 13).unwrap();
        let mut e = Election::new("majorz", "Majorz", date, Domain::Canton, ElectionKind::Majorz);
        e.results = vec![ElectionResult {
            entity_id: 1701,
            counted: false,
            ..Default::default()
        }];
        let s = get_summary(&Item::Election(e), "https://example.org");
        assert!(!s.completed);
        assert_eq!(s.item_type, "election");
        assert_eq!(s.progress, Progress { counted: 0, total: 1 });
    }
}
