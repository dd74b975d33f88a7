//! Proporz elections: list connections, party results and panachage.

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, warn};

use crate::*;

/// The total votes of every list over all the entities.
pub fn list_votes(election: &Election) -> BTreeMap<String, VoteCount> {
    let mut totals: BTreeMap<String, VoteCount> = BTreeMap::new();
    if let Some(data) = election.proporz() {
        for l in data.lists.iter() {
            totals.insert(l.list_id.clone(), VoteCount::EMPTY);
        }
    }
    for r in election.results.iter() {
        for lr in r.list_results.iter() {
            *totals.entry(lr.list_id.clone()).or_default() += lr.votes;
        }
    }
    totals
}

/// The votes of a list connection: the votes of its own lists plus the
/// votes of all its sub-connections, computed bottom-up.
pub fn connection_votes(
    data: &ProporzData,
    list_totals: &BTreeMap<String, VoteCount>,
    connection_id: &str,
) -> VoteCount {
    connection_votes_rec(data, list_totals, connection_id, &mut BTreeSet::new())
}

fn connection_votes_rec(
    data: &ProporzData,
    list_totals: &BTreeMap<String, VoteCount>,
    connection_id: &str,
    visited: &mut BTreeSet<String>,
) -> VoteCount {
    // Only inconsistent connection data contains cycles.
    if !visited.insert(connection_id.to_string()) {
        warn!(
            "connection_votes: cycle detected at connection {}",
            connection_id
        );
        return VoteCount::EMPTY;
    }
    let own: VoteCount = data
        .lists
        .iter()
        .filter(|l| l.connection.as_deref() == Some(connection_id))
        .map(|l| list_totals.get(&l.list_id).cloned().unwrap_or_default())
        .sum();
    let children: Vec<&ListConnection> = data
        .list_connections
        .iter()
        .filter(|c| c.parent.as_deref() == Some(connection_id))
        .collect();
    let mut total = own;
    for child in children {
        total += connection_votes_rec(data, list_totals, &child.connection_id, visited);
    }
    total
}

/// The votes of every list connection of an election.
pub fn connection_totals(election: &Election) -> BTreeMap<String, VoteCount> {
    let data = match election.proporz() {
        Some(d) => d,
        None => return BTreeMap::new(),
    };
    let totals = list_votes(election);
    data.list_connections
        .iter()
        .map(|c| {
            (
                c.connection_id.clone(),
                connection_votes(data, &totals, &c.connection_id),
            )
        })
        .collect()
}

/// Prefixes the id of a sub-connection with the id of its parent when it is
/// not already longer than it, so that sub-connection ids are unique within
/// an election (sub-connection `1` of connection `2` becomes `21`).
pub fn prefix_connection_id(connection_id: &str, parent_id: &str) -> String {
    if connection_id.len() <= parent_id.len() {
        format!("{}{}", parent_id, connection_id)
    } else {
        connection_id.to_string()
    }
}

/// Aggregates the candidate panachage results into list panachage results.
///
/// The votes a candidate received from another list count for the list of
/// the candidate. Votes from the own list are not a transfer and are
/// skipped. The list panachage of every list receiving votes is replaced.
pub fn aggregate_candidate_panachage(election: &mut Election) {
    let list_of: BTreeMap<String, String> = election
        .candidates
        .iter()
        .filter_map(|c| c.list_id.clone().map(|l| (c.candidate_id.clone(), l)))
        .collect();
    let mut aggregated: BTreeMap<String, BTreeMap<Option<String>, VoteCount>> = BTreeMap::new();
    for r in election.results.iter() {
        for p in r.candidate_panachage.iter() {
            let target = match list_of.get(&p.candidate_id) {
                Some(t) => t,
                None => continue,
            };
            if p.source_list.as_ref() == Some(target) {
                continue;
            }
            *aggregated
                .entry(target.clone())
                .or_default()
                .entry(p.source_list.clone())
                .or_default() += p.votes;
        }
    }
    debug!(
        "aggregate_candidate_panachage: {}: {} target lists",
        election.id,
        aggregated.len()
    );
    if let Some(data) = election.proporz_mut() {
        for list in data.lists.iter_mut() {
            if let Some(sources) = aggregated.remove(&list.list_id) {
                list.panachage = sources
                    .into_iter()
                    .map(|(source, votes)| ListPanachageResult { source, votes })
                    .collect();
            }
        }
    }
}

// **** Party results ****

/// The party results of one year, restricted to a domain and segment.
/// Results without a domain belong to every domain.
pub fn party_results_for<'a>(
    parties: &'a PartyData,
    domain: Option<&str>,
    domain_segment: Option<&str>,
    year: i32,
) -> Vec<&'a PartyResult> {
    parties
        .party_results
        .iter()
        .filter(|r| r.year == year)
        .filter(|r| r.domain.is_none() || r.domain.as_deref() == domain)
        .filter(|r| r.domain_segment.is_none() || r.domain_segment.as_deref() == domain_segment)
        .collect()
}

/// Votes and voters count of a year, summed over the matching party results.
pub fn party_totals(
    parties: &PartyData,
    domain: Option<&str>,
    domain_segment: Option<&str>,
    year: i32,
) -> (VoteCount, Centi) {
    let results = party_results_for(parties, domain, domain_segment, year);
    let votes: VoteCount = results.iter().map(|r| r.votes).sum();
    let voters = Centi(results.iter().filter_map(|r| r.voters_count).map(|c| c.0).sum());
    (votes, voters)
}

/// The party results including the results of the related historical
/// election or compound, for the years not yet present. Sorted by year,
/// most recent first, then by party.
pub fn historical_party_results(parties: &PartyData) -> Vec<PartyResult> {
    let mut results = parties.party_results.clone();
    if parties.use_historical_party_results {
        if let Some(historical) = &parties.historical {
            let years: BTreeSet<i32> = parties.party_results.iter().map(|r| r.year).collect();
            results.extend(
                historical
                    .party_results
                    .iter()
                    .filter(|r| !years.contains(&r.year))
                    .cloned(),
            );
        }
    }
    results.sort_by(|a, b| b.year.cmp(&a.year).then_with(|| a.party_id.cmp(&b.party_id)));
    results
}

/// The party colors, falling back to the colors of the historical election
/// or compound for the parties without a current color.
pub fn historical_colors(parties: &PartyData) -> BTreeMap<String, String> {
    let mut colors = parties.colors.clone();
    if parties.use_historical_party_results {
        if let Some(historical) = &parties.historical {
            for (name, color) in historical.colors.iter() {
                colors.entry(name.clone()).or_insert_with(|| color.clone());
            }
        }
    }
    colors
}

// **** Panachage ****

/// A panachage matrix: for every (source, target) pair, the votes going from
/// the source to the target.
///
/// The diagonal holds the votes which stayed: the total of the party (or
/// list) minus everything it gave away. It is not clamped: a negative value
/// means that the transfers are inconsistent with the totals.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct PanachageMatrix {
    pub entries: BTreeMap<(String, String), i64>,
}

impl PanachageMatrix {
    pub fn get(&self, source: &str, target: &str) -> i64 {
        self.entries
            .get(&(source.to_string(), target.to_string()))
            .cloned()
            .unwrap_or(0)
    }

    /// The diagonal entries that went negative.
    pub fn inconsistencies(&self) -> Vec<(String, i64)> {
        self.entries
            .iter()
            .filter(|((s, t), v)| s == t && **v < 0)
            .map(|((s, _), v)| (s.clone(), *v))
            .collect()
    }
}

/// Builds a panachage matrix from totals and (source, target, votes)
/// transfers. Transfers from a key to itself are ignored.
pub fn panachage_matrix(
    totals: &BTreeMap<String, i64>,
    transfers: &[(String, String, u64)],
) -> PanachageMatrix {
    let mut entries: BTreeMap<(String, String), i64> = BTreeMap::new();
    let mut outgoing: BTreeMap<&str, i64> = BTreeMap::new();
    for (source, target, votes) in transfers.iter() {
        if source == target {
            continue;
        }
        *entries.entry((source.clone(), target.clone())).or_default() += *votes as i64;
        *outgoing.entry(source.as_str()).or_default() += *votes as i64;
    }
    for (key, total) in totals.iter() {
        let remaining = total - outgoing.get(key.as_str()).cloned().unwrap_or(0);
        if remaining < 0 {
            warn!(
                "panachage_matrix: {} gives away more votes than it has: {}",
                key, remaining
            );
        }
        entries.insert((key.clone(), key.clone()), remaining);
    }
    PanachageMatrix { entries }
}

/// The party panachage matrix of a year, restricted to a domain and
/// segment. Transfers from or to parties without a result there are left
/// out; the blank list (empty source) is always kept.
pub fn party_panachage(
    parties: &PartyData,
    domain: Option<&str>,
    domain_segment: Option<&str>,
    year: i32,
) -> PanachageMatrix {
    let mut totals: BTreeMap<String, i64> = BTreeMap::new();
    for r in party_results_for(parties, domain, domain_segment, year) {
        *totals.entry(r.party_id.clone()).or_default() += r.votes.signed();
    }
    let transfers: Vec<(String, String, u64)> = parties
        .panachage
        .iter()
        .filter(|p| totals.contains_key(&p.target))
        .filter(|p| p.source.is_empty() || totals.contains_key(&p.source))
        .map(|p| (p.source.clone(), p.target.clone(), p.votes.0))
        .collect();
    panachage_matrix(&totals, &transfers)
}

/// The list panachage matrix of an election. The blank list is the empty
/// source.
pub fn list_panachage(election: &Election) -> PanachageMatrix {
    let totals: BTreeMap<String, i64> = list_votes(election)
        .into_iter()
        .map(|(k, v)| (k, v.signed()))
        .collect();
    let mut transfers: Vec<(String, String, u64)> = Vec::new();
    if let Some(data) = election.proporz() {
        for list in data.lists.iter() {
            for p in list.panachage.iter() {
                transfers.push((
                    p.source.clone().unwrap_or_default(),
                    list.list_id.clone(),
                    p.votes.0,
                ));
            }
        }
    }
    panachage_matrix(&totals, &transfers)
}

/// The number of mandates allocated to the lists.
pub fn list_mandates(election: &Election) -> u32 {
    election
        .proporz()
        .map(|d| d.lists.iter().map(|l| l.number_of_mandates).sum())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn list(id: &str, connection: Option<&str>) -> List {
        List {
            list_id: id.to_string(),
            name: format!("List {}", id),
            number_of_mandates: 0,
            connection: connection.map(|c| c.to_string()),
            color: None,
            panachage: vec![],
        }
    }

    fn election(lists: Vec<List>, connections: Vec<ListConnection>, votes: &[(&str, u64)]) -> Election {
        let date = NaiveDate::from_ymd_opt(2022, 3, 13).unwrap();
        let mut e = Election::new(
            "proporz",
            "Proporz",
            date,
            Domain::Canton,
            ElectionKind::Proporz(ProporzData {
                lists,
                list_connections: connections,
                parties: PartyData::default(),
            }),
        );
        e.results = vec![ElectionResult {
            entity_id: 1701,
            counted: true,
            list_results: votes
                .iter()
                .map(|(l, v)| ListResult {
                    list_id: l.to_string(),
                    votes: VoteCount(*v),
                })
                .collect(),
            ..Default::default()
        }];
        e
    }

    fn connection(id: &str, parent: Option<&str>) -> ListConnection {
        ListConnection {
            connection_id: id.to_string(),
            parent: parent.map(|p| p.to_string()),
        }
    }

    #[test]
    fn connection_totals_are_bottom_up() {
        let e = election(
            vec![
                list("1", Some("A")),
                list("2", Some("A")),
                list("3", Some("A1")),
                list("4", None),
            ],
            vec![connection("A", None), connection("A1", Some("A"))],
            &[("1", 100), ("2", 150), ("3", 80), ("4", 1000)],
        );
        let totals = connection_totals(&e);
        assert_eq!(totals.get("A"), Some(&VoteCount(330)));
        assert_eq!(totals.get("A1"), Some(&VoteCount(80)));
    }

    #[test]
    fn connection_ids() {
        assert_eq!(prefix_connection_id("1", "2"), "21");
        assert_eq!(prefix_connection_id("21", "2"), "21");
        assert_eq!(prefix_connection_id("3", "12"), "123");
    }

    #[test]
    fn panachage_diagonal_is_not_clamped() {
        let totals: BTreeMap<String, i64> =
            vec![("A".to_string(), 100), ("B".to_string(), 10)].into_iter().collect();
        let m = panachage_matrix(
            &totals,
            &[
                ("A".to_string(), "B".to_string(), 30),
                ("B".to_string(), "A".to_string(), 25),
                ("A".to_string(), "A".to_string(), 999),
            ],
        );
        assert_eq!(m.get("A", "B"), 30);
        assert_eq!(m.get("A", "A"), 70);
        assert_eq!(m.get("B", "B"), -15);
        assert_eq!(m.inconsistencies(), vec![("B".to_string(), -15)]);
    }

    #[test]
    fn candidate_panachage_feeds_lists() {
        let mut e = election(vec![list("1", None), list("2", None)], vec![], &[]);
        e.candidates = vec![Candidate {
            candidate_id: "101".to_string(),
            family_name: "Muster".to_string(),
            first_name: "Max".to_string(),
            elected: false,
            party: None,
            party_color: None,
            gender: None,
            year_of_birth: None,
            list_id: Some("1".to_string()),
        }];
        e.results[0].candidate_panachage = vec![
            CandidatePanachageResult {
                candidate_id: "101".to_string(),
                source_list: Some("2".to_string()),
                votes: VoteCount(5),
            },
            CandidatePanachageResult {
                candidate_id: "101".to_string(),
                source_list: None,
                votes: VoteCount(3),
            },
            CandidatePanachageResult {
                candidate_id: "101".to_string(),
                source_list: Some("1".to_string()),
                votes: VoteCount(50),
            },
        ];
        aggregate_candidate_panachage(&mut e);
        let lists = &e.proporz().unwrap().lists;
        assert_eq!(
            lists[0].panachage,
            vec![
                ListPanachageResult {
                    source: None,
                    votes: VoteCount(3)
                },
                ListPanachageResult {
                    source: Some("2".to_string()),
                    votes: VoteCount(5)
                },
            ]
        );
        assert!(lists[1].panachage.is_empty());
    }

    fn party(year: i32, id: &str, votes: u64) -> PartyResult {
        PartyResult {
            domain: None,
            domain_segment: None,
            year,
            party_id: id.to_string(),
            name: id.to_string(),
            name_translations: BTreeMap::new(),
            total_votes: VoteCount(1000),
            votes: VoteCount(votes),
            voters_count: Some(Centi(votes * 10)),
            voters_count_percentage: None,
            number_of_mandates: 0,
        }
    }

    #[test]
    fn historical_results_fill_missing_years() {
        let mut parties = PartyData {
            party_results: vec![party(2022, "P1", 500)],
            colors: vec![("P1".to_string(), "#111111".to_string())].into_iter().collect(),
            ..Default::default()
        };
        parties.historical = Some(Box::new(PartyData {
            party_results: vec![party(2022, "P1", 1), party(2018, "P1", 400), party(2014, "P2", 300)],
            colors: vec![
                ("P1".to_string(), "#222222".to_string()),
                ("P2".to_string(), "#333333".to_string()),
            ]
            .into_iter()
            .collect(),
            ..Default::default()
        }));
        assert_eq!(historical_party_results(&parties).len(), 1);

        parties.use_historical_party_results = true;
        let results = historical_party_results(&parties);
        let years: Vec<(i32, u64)> = results.iter().map(|r| (r.year, r.votes.0)).collect();
        assert_eq!(years, vec![(2022, 500), (2018, 400), (2014, 300)]);
        let colors = historical_colors(&parties);
        assert_eq!(colors.get("P1"), Some(&"#111111".to_string()));
        assert_eq!(colors.get("P2"), Some(&"#333333".to_string()));
    }

    #[test]
    fn party_totals_by_year() {
        let parties = PartyData {
            party_results: vec![party(2022, "P1", 500), party(2022, "P2", 200), party(2018, "P1", 1)],
            ..Default::default()
        };
        assert_eq!(
            party_totals(&parties, None, None, 2022),
            (VoteCount(700), Centi(7000))
        );
    }

    #[test]
    fn party_panachage_per_domain() {
        let mut p1_region = party(2022, "P1", 9000);
        p1_region.domain = Some("superregion".to_string());
        let mut p1 = party(2022, "P1", 500);
        p1.domain = Some("canton".to_string());
        let mut p2 = party(2022, "P2", 300);
        p2.domain = Some("canton".to_string());
        let transfer = |source: &str, target: &str, votes: u64| PartyPanachageResult {
            source: source.to_string(),
            target: target.to_string(),
            votes: VoteCount(votes),
        };
        let parties = PartyData {
            party_results: vec![p1_region, p1, p2, party(2018, "P1", 1)],
            panachage: vec![transfer("P2", "P1", 100), transfer("P1", "P2", 50), transfer("", "P2", 7)],
            ..Default::default()
        };

        let m = party_panachage(&parties, Some("canton"), None, 2022);
        assert_eq!(m.get("P1", "P1"), 450);
        assert_eq!(m.get("P2", "P2"), 200);
        assert_eq!(m.get("P2", "P1"), 100);
        assert_eq!(m.get("", "P2"), 7);

        let m = party_panachage(&parties, Some("superregion"), None, 2022);
        assert_eq!(m.get("P1", "P1"), 9000);
        assert_eq!(m.get("P2", "P1"), 0);
        assert_eq!(m.get("P1", "P2"), 0);
    }
}
