// eCH-0252 deliveries. Elements are looked up by their local name, so the
// namespace prefix of a delivery does not matter.

use std::collections::BTreeMap;

use log::{debug, info, warn};
use roxmltree::{Document, Node};

use election_results::reconcile::*;
use election_results::*;

use crate::imports::io_common::*;
use crate::imports::{FileImportError, ImportResult};

fn child<'a, 'i: 'a>(node: Node<'a, 'i>, name: &str) -> Option<Node<'a, 'i>> {
    node.children()
        .find(|c| c.is_element() && c.tag_name().name() == name)
}

fn children<'a, 'i: 'a>(node: Node<'a, 'i>, name: &'a str) -> impl Iterator<Item = Node<'a, 'i>> + 'a {
    node.children()
        .filter(move |c| c.is_element() && c.tag_name().name() == name)
}

/// Follows a path of child elements.
fn path<'a, 'i: 'a>(node: Node<'a, 'i>, names: &[&str]) -> Option<Node<'a, 'i>> {
    names.iter().try_fold(node, |n, name| child(n, name))
}

/// The trimmed text of a child element, empty if there is none.
fn text<'a, 'i: 'a>(node: Node<'a, 'i>, name: &str) -> &'a str {
    child(node, name)
        .and_then(|c| c.text())
        .map(|t| t.trim())
        .unwrap_or("")
}

/// A count held by a child element. Absent counts are 0.
fn count(node: Node, name: &str) -> Result<u64, String> {
    let value = text(node, name);
    if value.is_empty() {
        return Ok(0);
    }
    value
        .parse::<u64>()
        .map_err(|_| format!("Invalid integer: {}", name))
}

fn parse_document(xml: &str) -> Result<Document, Vec<FileImportError>> {
    Document::parse(xml).map_err(|e| {
        warn!("parse_document: {}", e);
        vec![FileImportError::new(format!("Not a valid eCH xml file: {}", e))]
    })
}

fn read_xml(path: &str) -> Result<String, Vec<FileImportError>> {
    info!("read_xml: reading {:?}", path);
    let bytes = std::fs::read(path).map_err(|e| {
        vec![FileImportError::new(format!("Not a valid eCH xml file: {}", e))]
    })?;
    Ok(decode(&bytes))
}

/// Maps a counting circle to an entity. The expat circles map to the
/// expats.
fn counting_circle_entity(node: Node, errors: &mut Vec<String>) -> Option<EntityId> {
    let value = text(node, "countingCircleId");
    match value.parse::<u64>() {
        Ok(id) if is_expats(id) => Some(EXPATS_ENTITY_ID),
        Ok(id) => EntityId::try_from(id).ok(),
        Err(_) => {
            errors.push(format!("Invalid integer: countingCircleId {}", value));
            None
        }
    }
}

/// The eligible voters and the expats subtotal (`voterType` 2, not split by
/// sex) of a counting circle.
fn voters(info: Option<Node>) -> Result<(u64, Option<u64>), String> {
    let info = match info {
        Some(i) => i,
        None => return Ok((0, None)),
    };
    let total = count(info, "countOfVotersTotal")?;
    let mut expats = None;
    for subtotal in children(info, "subtotalInfo") {
        if text(subtotal, "voterType") == "2" && child(subtotal, "sex").is_none() {
            expats = Some(count(subtotal, "countOfVoters")?);
        }
    }
    Ok((total, expats))
}

fn scope_errors(scope: &Scope, entity_id: EntityId) -> Vec<String> {
    let mut errors = Vec::new();
    scope.check(entity_id, &mut errors);
    errors
}

// ******** Elections ********

fn gender(value: &str) -> Option<Gender> {
    match value {
        "1" => Some(Gender::Male),
        "2" => Some(Gender::Female),
        "3" => Some(Gender::Undetermined),
        _ => None,
    }
}

/// The candidates, lists and connections of an election information
/// delivery.
fn parse_information(information: Node) -> (Vec<Candidate>, Vec<List>, Vec<ListConnection>) {
    let mut candidates: Vec<Candidate> = children(information, "candidate")
        .map(|c| Candidate {
            candidate_id: text(c, "candidateIdentification").to_string(),
            family_name: text(c, "familyName").to_string(),
            first_name: text(c, "callName").to_string(),
            elected: false,
            party: children(c, "partyAffiliation")
                .flat_map(|p| children(p, "partyAffiliationInfo"))
                .map(|p| text(p, "partyAffiliationShort").to_string())
                .find(|p| !p.is_empty()),
            party_color: None,
            gender: gender(text(c, "sex")),
            year_of_birth: text(c, "dateOfBirth")
                .get(0..4)
                .and_then(|y| y.parse().ok()),
            list_id: None,
        })
        .collect();

    let mut lists: Vec<List> = Vec::new();
    for l in children(information, "list") {
        let list_id = text(l, "listIdentification").to_string();
        let name = path(l, &["listDescription", "listDescriptionInfo"])
            .map(|d| text(d, "listDescription").to_string())
            .unwrap_or_default();
        for position in children(l, "candidatePosition") {
            let candidate_id = text(position, "candidateIdentification");
            if let Some(c) = candidates.iter_mut().find(|c| c.candidate_id == candidate_id) {
                c.list_id = Some(list_id.clone());
            }
        }
        lists.push(List {
            list_id,
            name,
            number_of_mandates: 0,
            connection: None,
            color: None,
            panachage: vec![],
        });
    }

    let mut connections: Vec<ListConnection> = Vec::new();
    for union in children(information, "listUnion") {
        let connection_id = text(union, "listUnionIdentification").to_string();
        for referenced in children(union, "referencedList") {
            let list_id = referenced.text().unwrap_or("").trim();
            if let Some(l) = lists.iter_mut().find(|l| l.list_id == list_id) {
                l.connection = Some(connection_id.clone());
            }
        }
        // Type 2 is a sub-connection.
        let parent = if text(union, "listUnionType") == "2" {
            Some(text(union, "referencedListUnion").to_string()).filter(|p| !p.is_empty())
        } else {
            None
        };
        connections.push(ListConnection {
            connection_id,
            parent,
        });
    }
    (candidates, lists, connections)
}

struct ElectionContext<'e> {
    candidates: &'e [Candidate],
    lists: &'e [List],
    errors: Vec<FileImportError>,
}

impl<'e> ElectionContext<'e> {
    fn candidate(&mut self, candidate_id: &str) -> bool {
        let known = self.candidates.iter().any(|c| c.candidate_id == candidate_id);
        if !known {
            self.errors
                .push(FileImportError::in_file(candidate_id, "Candidate does not exist"));
        }
        known
    }

    fn list(&mut self, list_id: &str) -> bool {
        let known = self.lists.iter().any(|l| l.list_id == list_id);
        if !known {
            self.errors
                .push(FileImportError::in_file(list_id, "List does not exist"));
        }
        known
    }
}

fn parse_majoral_result(
    node: Node,
    result: &mut ElectionResult,
    ctx: &mut ElectionContext,
) -> Result<(), String> {
    result.invalid_votes = count(node, "countOfInvalidVotesTotal")?;
    result.blank_votes = count(node, "countOfBlankVotesTotal")?;
    for c in children(node, "candidateResult") {
        let candidate_id = text(c, "candidateIdentification");
        if !ctx.candidate(candidate_id) {
            continue;
        }
        result.candidate_results.push(CandidateResult {
            candidate_id: candidate_id.to_string(),
            votes: VoteCount(count(c, "countOfVotesTotal")?),
        });
    }
    Ok(())
}

fn parse_proportional_result(
    node: Node,
    result: &mut ElectionResult,
    ctx: &mut ElectionContext,
) -> Result<(), String> {
    result.invalid_votes = 0;
    result.blank_votes = count(node, "countOfEmptyVotesOfChangedBallotsWithoutListDesignation")?;
    for l in children(node, "listResults") {
        let list_id = text(l, "listIdentification");
        if !ctx.list(list_id) {
            continue;
        }
        result.list_results.push(ListResult {
            list_id: list_id.to_string(),
            votes: VoteCount(count(l, "countOfCandidateVotes")?),
        });
        for c in children(l, "candidateResults") {
            let candidate_id = text(c, "candidateIdentification");
            if !ctx.candidate(candidate_id) {
                continue;
            }
            let votes = count(c, "countOfVotesFromUnchangedBallots")?
                + count(c, "countOfVotesFromChangedBallots")?;
            result.candidate_results.push(CandidateResult {
                candidate_id: candidate_id.to_string(),
                votes: VoteCount(votes),
            });
            let panachage = match child(c, "candidateListResultsInfo") {
                Some(p) => p,
                None => continue,
            };
            result.candidate_panachage.push(CandidatePanachageResult {
                candidate_id: candidate_id.to_string(),
                source_list: None,
                votes: VoteCount(count(panachage, "countOfVotesFromBallotsWithoutListDesignation")?),
            });
            for source in children(panachage, "candidateListResults") {
                let source_id = text(source, "listIdentification");
                if !ctx.list(source_id) {
                    continue;
                }
                result.candidate_panachage.push(CandidatePanachageResult {
                    candidate_id: candidate_id.to_string(),
                    source_list: Some(source_id.to_string()),
                    votes: VoteCount(count(source, "countOfVotesFromChangedBallots")?),
                });
            }
        }
    }
    Ok(())
}

pub fn import_election(election: &Election, catalogue: &EntityCatalogue, path: &str) -> ImportResult {
    let xml = read_xml(path)?;
    import_election_xml(election, catalogue, &xml)
}

pub fn import_election_xml(election: &Election, catalogue: &EntityCatalogue, xml: &str) -> ImportResult {
    let doc = parse_document(xml)?;
    let identifies = |id: &str| id == election.id || election.external_id.as_deref() == Some(id);
    let scope = Scope::of_election(election, catalogue);

    let (mut candidates, mut lists, connections) = match doc
        .descendants()
        .filter(|n| n.tag_name().name() == "electionInformation")
        .find(|n| {
            child(*n, "election")
                .map(|e| identifies(text(e, "electionIdentification")))
                .unwrap_or(false)
        }) {
        Some(information) => parse_information(information),
        None => {
            debug!("import_election_xml: no information delivery for {}", election.id);
            (
                election.candidates.clone(),
                election.proporz().map(|p| p.lists.clone()).unwrap_or_default(),
                election
                    .proporz()
                    .map(|p| p.list_connections.clone())
                    .unwrap_or_default(),
            )
        }
    };

    let delivered = doc
        .descendants()
        .filter(|n| n.tag_name().name() == "electionResult")
        .find(|n| identifies(text(*n, "electionIdentification")));
    let delivered = match delivered {
        Some(d) => d,
        None => return Err(vec![FileImportError::new("No data found")]),
    };

    let mut ctx = ElectionContext {
        candidates: &candidates,
        lists: &lists,
        errors: Vec::new(),
    };
    let mut has_expats = false;
    let mut results: Vec<ElectionResult> = Vec::new();
    for circle in children(delivered, "countingCircleResult") {
        let mut circle_errors: Vec<String> = Vec::new();
        let entity_id = match counting_circle_entity(circle, &mut circle_errors) {
            Some(id) => id,
            None => {
                ctx.errors.extend(circle_errors.into_iter().map(FileImportError::new));
                continue;
            }
        };
        circle_errors.extend(scope_errors(&scope, entity_id));
        if entity_id == EXPATS_ENTITY_ID {
            has_expats = true;
        }
        if results.iter().any(|r| r.entity_id == entity_id) {
            circle_errors.push(format!("{} was found twice", entity_id));
        }
        let mut result = ElectionResult::uncounted(entity_id, scope.locate(entity_id));
        result.counted = text(circle, "fullyCountedTrue") == "true";
        if result.counted {
            let parsed = (|| -> Result<(), String> {
                let (eligible_voters, expats) = voters(child(circle, "countOfVotersInformation"))?;
                result.eligible_voters = eligible_voters;
                result.expats = expats;
                result.received_ballots = count(circle, "countOfReceivedBallots")?;
                result.blank_ballots = count(circle, "countOfBlankBallots")?;
                result.invalid_ballots = count(circle, "countOfInvalidBallots")?;
                if let Some(inner) = child(circle, "electionResult") {
                    if let Some(m) = child(inner, "majoralElection") {
                        parse_majoral_result(m, &mut result, &mut ctx)?;
                    }
                    if let Some(p) = child(inner, "proportionalElection") {
                        parse_proportional_result(p, &mut result, &mut ctx)?;
                    }
                }
                Ok(())
            })();
            if let Err(e) = parsed {
                circle_errors.push(e);
            }
        }
        if circle_errors.is_empty() {
            results.push(result);
        } else {
            ctx.errors.extend(
                circle_errors
                    .into_iter()
                    .map(|e| FileImportError::in_file(&entity_id.to_string(), e)),
            );
        }
    }

    // Elected candidates and the absolute majority
    let mut absolute_majority: Option<u64> = None;
    let mut majority_type: Option<MajorityType> = None;
    let mut elected: Vec<String> = Vec::new();
    let mut mandates: BTreeMap<String, u32> = BTreeMap::new();
    if let Some(e) = child(delivered, "elected") {
        if let Some(m) = child(e, "majoralElection") {
            let value = text(m, "absoluteMajority");
            if !value.is_empty() {
                match value.parse::<u64>() {
                    Ok(v) => {
                        absolute_majority = Some(v);
                        majority_type = Some(MajorityType::Absolute);
                    }
                    Err(_) => ctx
                        .errors
                        .push(FileImportError::new("Invalid integer: absoluteMajority")),
                }
            }
            elected.extend(
                children(m, "electedCandidate").map(|c| text(c, "candidateIdentification").to_string()),
            );
        }
        if let Some(p) = child(e, "proportionalElection") {
            for l in children(p, "list") {
                let list_id = text(l, "listIdentification");
                if !ctx.list(list_id) {
                    continue;
                }
                let list_elected: Vec<String> = children(l, "electedCandidate")
                    .map(|c| text(c, "candidateIdentification").to_string())
                    .collect();
                match u32::try_from(list_elected.len()) {
                    Ok(n) => {
                        mandates.insert(list_id.to_string(), n);
                    }
                    Err(_) => ctx
                        .errors
                        .push(FileImportError::new("Invalid integer: electedCandidate")),
                }
                elected.extend(list_elected);
            }
        }
    }
    for candidate_id in elected.iter() {
        ctx.candidate(candidate_id);
    }
    let errors = ctx.errors;
    if !errors.is_empty() {
        return Err(errors);
    }

    for c in candidates.iter_mut() {
        c.elected = elected.contains(&c.candidate_id);
    }
    for l in lists.iter_mut() {
        if let Some(m) = mandates.get(&l.list_id) {
            l.number_of_mandates = *m;
        }
    }
    let mut scope = scope;
    scope.has_expats = scope.has_expats || has_expats;
    add_missing_election_results(&scope, &mut results);
    let status = if results.iter().all(|r| r.counted) {
        Status::Final
    } else {
        Status::Interim
    };
    info!(
        "import_election_xml: {}: {} results, {:?}",
        election.id,
        results.len(),
        status
    );
    Ok(Import::Election(ElectionImport {
        status: Some(status),
        absolute_majority,
        majority_type,
        has_expats: if has_expats { Some(true) } else { None },
        candidates,
        results,
        proporz: election.proporz().map(|_| ProporzImport {
            lists,
            list_connections: connections,
        }),
    }))
}

// ******** Votes ********

fn ballot_counts(
    node: Node,
    yeas: &str,
    nays: &str,
    empty: &str,
    invalid: &str,
) -> Result<[u64; 4], String> {
    Ok([
        count(node, yeas)?,
        count(node, nays)?,
        count(node, empty)?,
        count(node, invalid)?,
    ])
}

/// The ballots of a counting circle, as (type, [yeas, nays, empty, invalid]).
fn parse_ballots(result_data: Node) -> Result<Vec<(BallotType, [u64; 4])>, String> {
    let mut ballots = Vec::new();
    for ballot in children(result_data, "ballotResult") {
        if let Some(standard) = child(ballot, "standardBallot") {
            ballots.push((
                BallotType::Proposal,
                ballot_counts(
                    standard,
                    "countOfYesVotes",
                    "countOfNoVotes",
                    "countOfUnaccountedBlankBallots",
                    "countOfUnaccountedInvalidBallots",
                )?,
            ));
        }
        if let Some(variant) = child(ballot, "variantBallot") {
            for (idx, question) in children(variant, "questionInformation").enumerate() {
                let id = text(question, "questionIdentification");
                let ballot_type = if id.ends_with("counter-proposal") || (id.is_empty() && idx == 1) {
                    BallotType::CounterProposal
                } else {
                    BallotType::Proposal
                };
                ballots.push((
                    ballot_type,
                    ballot_counts(
                        question,
                        "countOfAnswerYes",
                        "countOfAnswerNo",
                        "countOfAnswerEmpty",
                        "countOfAnswerInvalid",
                    )?,
                ));
            }
            // The yeas of the tie-breaker are for the proposal.
            for tie_breaker in children(variant, "tieBreakInformation") {
                ballots.push((
                    BallotType::TieBreaker,
                    ballot_counts(
                        tie_breaker,
                        "countOfAnswerInitiative",
                        "countOfAnswerCounterProposal",
                        "countOfAnswerEmpty",
                        "countOfAnswerInvalid",
                    )?,
                ));
            }
        }
    }
    Ok(ballots)
}

pub fn import_vote(vote: &Vote, catalogue: &EntityCatalogue, path: &str) -> ImportResult {
    let xml = read_xml(path)?;
    import_vote_xml(vote, catalogue, &xml)
}

pub fn import_vote_xml(vote: &Vote, catalogue: &EntityCatalogue, xml: &str) -> ImportResult {
    let doc = parse_document(xml)?;
    let identifies = |id: &str| id == vote.id || vote.external_id.as_deref() == Some(id);
    let vote_info = doc
        .descendants()
        .filter(|n| n.tag_name().name() == "voteInfo")
        .find(|n| {
            child(*n, "vote")
                .map(|v| identifies(text(v, "voteIdentification")))
                .unwrap_or(false)
        });
    let vote_info = match vote_info {
        Some(v) => v,
        None => return Err(vec![FileImportError::new("No data found")]),
    };

    let mut scope = Scope::of_vote(vote, catalogue);
    let mut errors: Vec<FileImportError> = Vec::new();
    let mut ballots: BTreeMap<BallotType, Vec<BallotResult>> = BTreeMap::new();
    let mut has_expats = false;
    for info in children(vote_info, "countingCircleInfo") {
        let mut circle_errors: Vec<String> = Vec::new();
        let circle = child(info, "countingCircle").unwrap_or(info);
        let entity_id = match counting_circle_entity(circle, &mut circle_errors) {
            Some(id) => id,
            None => {
                errors.extend(circle_errors.into_iter().map(FileImportError::new));
                continue;
            }
        };
        circle_errors.extend(scope_errors(&scope, entity_id));
        if entity_id == EXPATS_ENTITY_ID {
            has_expats = true;
        }
        let data = child(info, "resultData").unwrap_or(info);
        let counted = text(data, "fullyCountedTrue") == "true";
        let parsed = voters(child(data, "countOfVotersInformation"))
            .and_then(|v| Ok((v, parse_ballots(data)?)));
        let ((eligible_voters, expats), circle_ballots) = match parsed {
            Ok(p) => p,
            Err(e) => {
                circle_errors.push(e);
                ((0, None), vec![])
            }
        };
        for (ballot_type, _) in circle_ballots.iter() {
            let seen = ballots
                .get(ballot_type)
                .map(|rs| rs.iter().any(|r| r.entity_id == entity_id))
                .unwrap_or(false);
            if seen {
                circle_errors.push(format!("{} was found twice", entity_id));
            }
        }
        if !circle_errors.is_empty() {
            errors.extend(
                circle_errors
                    .into_iter()
                    .map(|e| FileImportError::in_file(&entity_id.to_string(), e)),
            );
            continue;
        }
        for (ballot_type, [yeas, nays, empty, invalid]) in circle_ballots {
            let mut result = BallotResult::uncounted(entity_id, scope.locate(entity_id));
            if counted {
                result.counted = true;
                result.eligible_voters = eligible_voters;
                result.expats = expats;
                result.yeas = yeas;
                result.nays = nays;
                result.empty = empty;
                result.invalid = invalid;
            }
            ballots.entry(ballot_type).or_default().push(result);
        }
    }
    if !errors.is_empty() {
        return Err(errors);
    }
    if ballots.is_empty() {
        return Err(vec![FileImportError::new("No data found")]);
    }

    scope.has_expats = scope.has_expats || has_expats;
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
    let counted = ballots.iter().all(|b| b.results.iter().all(|r| r.counted));
    Ok(Import::Vote(VoteImport {
        status: Some(if counted { Status::Final } else { Status::Interim }),
        has_expats: if has_expats { Some(true) } else { None },
        ballots,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn catalogue() -> EntityCatalogue {
        let entity = |id: u32, name: &str| PoliticalEntity {
            entity_id: id,
            name: name.to_string(),
            district: None,
            region: None,
            superregion: None,
        };
        EntityCatalogue::new(
            2023,
            PrincipalDomain::Canton,
            1,
            vec![entity(261, "Zürich"), entity(230, "Winterthur")],
        )
    }

    const PROPORTIONAL: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<eCH-0252:delivery xmlns:eCH-0252="http://www.ech.ch/xmlns/eCH-0252/2">
  <eCH-0252:electionInformationDelivery>
    <eCH-0252:pollingDay>2023-10-22</eCH-0252:pollingDay>
    <eCH-0252:electionGroupInfo>
      <eCH-0252:electionInformation>
        <eCH-0252:election>
          <eCH-0252:electionIdentification>nr-2023</eCH-0252:electionIdentification>
        </eCH-0252:election>
        <eCH-0252:candidate>
          <eCH-0252:candidateIdentification>c1</eCH-0252:candidateIdentification>
          <eCH-0252:familyName>Muster</eCH-0252:familyName>
          <eCH-0252:callName>Hans</eCH-0252:callName>
          <eCH-0252:dateOfBirth>1970-01-01</eCH-0252:dateOfBirth>
          <eCH-0252:sex>1</eCH-0252:sex>
          <eCH-0252:partyAffiliation>
            <eCH-0252:partyAffiliationInfo>
              <eCH-0252:language>de</eCH-0252:language>
              <eCH-0252:partyAffiliationShort>FDP</eCH-0252:partyAffiliationShort>
            </eCH-0252:partyAffiliationInfo>
          </eCH-0252:partyAffiliation>
        </eCH-0252:candidate>
        <eCH-0252:candidate>
          <eCH-0252:candidateIdentification>c2</eCH-0252:candidateIdentification>
          <eCH-0252:familyName>Meier</eCH-0252:familyName>
          <eCH-0252:callName>Anna</eCH-0252:callName>
          <eCH-0252:dateOfBirth>1980-05-05</eCH-0252:dateOfBirth>
          <eCH-0252:sex>2</eCH-0252:sex>
        </eCH-0252:candidate>
        <eCH-0252:list>
          <eCH-0252:listIdentification>l1</eCH-0252:listIdentification>
          <eCH-0252:listDescription>
            <eCH-0252:listDescriptionInfo>
              <eCH-0252:listDescription>FDP</eCH-0252:listDescription>
            </eCH-0252:listDescriptionInfo>
          </eCH-0252:listDescription>
          <eCH-0252:candidatePosition>
            <eCH-0252:candidateIdentification>c1</eCH-0252:candidateIdentification>
          </eCH-0252:candidatePosition>
        </eCH-0252:list>
        <eCH-0252:list>
          <eCH-0252:listIdentification>l2</eCH-0252:listIdentification>
          <eCH-0252:candidatePosition>
            <eCH-0252:candidateIdentification>c2</eCH-0252:candidateIdentification>
          </eCH-0252:candidatePosition>
        </eCH-0252:list>
        <eCH-0252:listUnion>
          <eCH-0252:listUnionIdentification>u1</eCH-0252:listUnionIdentification>
          <eCH-0252:listUnionType>1</eCH-0252:listUnionType>
          <eCH-0252:referencedList>l1</eCH-0252:referencedList>
          <eCH-0252:referencedList>l2</eCH-0252:referencedList>
        </eCH-0252:listUnion>
      </eCH-0252:electionInformation>
    </eCH-0252:electionGroupInfo>
  </eCH-0252:electionInformationDelivery>
  <eCH-0252:electionResultDelivery>
    <eCH-0252:pollingDay>2023-10-22</eCH-0252:pollingDay>
    <eCH-0252:electionGroupResult>
      <eCH-0252:electionResult>
        <eCH-0252:electionIdentification>nr-2023</eCH-0252:electionIdentification>
        <eCH-0252:countingCircleResult>
          <eCH-0252:countingCircleId>261</eCH-0252:countingCircleId>
          <eCH-0252:fullyCountedTrue>true</eCH-0252:fullyCountedTrue>
          <eCH-0252:countOfVotersInformation>
            <eCH-0252:countOfVotersTotal>1000</eCH-0252:countOfVotersTotal>
            <eCH-0252:subtotalInfo>
              <eCH-0252:countOfVoters>30</eCH-0252:countOfVoters>
              <eCH-0252:voterType>2</eCH-0252:voterType>
            </eCH-0252:subtotalInfo>
          </eCH-0252:countOfVotersInformation>
          <eCH-0252:countOfReceivedBallots>500</eCH-0252:countOfReceivedBallots>
          <eCH-0252:countOfBlankBallots>5</eCH-0252:countOfBlankBallots>
          <eCH-0252:countOfInvalidBallots>3</eCH-0252:countOfInvalidBallots>
          <eCH-0252:electionResult>
            <eCH-0252:proportionalElection>
              <eCH-0252:countOfEmptyVotesOfChangedBallotsWithoutListDesignation>12</eCH-0252:countOfEmptyVotesOfChangedBallotsWithoutListDesignation>
              <eCH-0252:listResults>
                <eCH-0252:listIdentification>l1</eCH-0252:listIdentification>
                <eCH-0252:countOfCandidateVotes>300</eCH-0252:countOfCandidateVotes>
                <eCH-0252:candidateResults>
                  <eCH-0252:candidateIdentification>c1</eCH-0252:candidateIdentification>
                  <eCH-0252:countOfVotesFromUnchangedBallots>200</eCH-0252:countOfVotesFromUnchangedBallots>
                  <eCH-0252:countOfVotesFromChangedBallots>50</eCH-0252:countOfVotesFromChangedBallots>
                  <eCH-0252:candidateListResultsInfo>
                    <eCH-0252:countOfVotesFromBallotsWithoutListDesignation>4</eCH-0252:countOfVotesFromBallotsWithoutListDesignation>
                    <eCH-0252:candidateListResults>
                      <eCH-0252:listIdentification>l2</eCH-0252:listIdentification>
                      <eCH-0252:countOfVotesFromChangedBallots>9</eCH-0252:countOfVotesFromChangedBallots>
                    </eCH-0252:candidateListResults>
                  </eCH-0252:candidateListResultsInfo>
                </eCH-0252:candidateResults>
              </eCH-0252:listResults>
            </eCH-0252:proportionalElection>
          </eCH-0252:electionResult>
        </eCH-0252:countingCircleResult>
        <eCH-0252:countingCircleResult>
          <eCH-0252:countingCircleId>230</eCH-0252:countingCircleId>
          <eCH-0252:fullyCountedTrue>false</eCH-0252:fullyCountedTrue>
        </eCH-0252:countingCircleResult>
        <eCH-0252:elected>
          <eCH-0252:proportionalElection>
            <eCH-0252:list>
              <eCH-0252:listIdentification>l1</eCH-0252:listIdentification>
              <eCH-0252:electedCandidate>
                <eCH-0252:candidateIdentification>c1</eCH-0252:candidateIdentification>
              </eCH-0252:electedCandidate>
            </eCH-0252:list>
          </eCH-0252:proportionalElection>
        </eCH-0252:elected>
      </eCH-0252:electionResult>
    </eCH-0252:electionGroupResult>
  </eCH-0252:electionResultDelivery>
</eCH-0252:delivery>
"#;

    fn proporz_election() -> Election {
        let mut e = Election::new(
            "nationalrat",
            "Nationalrat",
            NaiveDate::from_ymd_opt(2023, 10, 22).unwrap(),
            Domain::Canton,
            ElectionKind::Proporz(ProporzData::default()),
        );
        e.external_id = Some("nr-2023".to_string());
        e
    }

    #[test]
    fn proportional_delivery() {
        let import = import_election_xml(&proporz_election(), &catalogue(), PROPORTIONAL).unwrap();
        let i = match import {
            Import::Election(i) => i,
            _ => panic!("not an election import"),
        };
        assert_eq!(i.status, Some(Status::Interim));
        assert_eq!(i.candidates.len(), 2);
        assert_eq!(i.candidates[0].party, Some("FDP".to_string()));
        assert_eq!(i.candidates[0].year_of_birth, Some(1970));
        assert_eq!(i.candidates[1].gender, Some(Gender::Female));
        assert!(i.candidates[0].elected);
        assert!(!i.candidates[1].elected);
        let p = i.proporz.unwrap();
        assert_eq!(p.lists[0].number_of_mandates, 1);
        assert_eq!(p.lists[1].connection, Some("u1".to_string()));
        let r = &i.results[0];
        assert_eq!(r.entity_id, 261);
        assert_eq!(r.expats, Some(30));
        assert_eq!(r.blank_votes, 12);
        assert_eq!(r.candidate_results[0].votes, VoteCount(250));
        assert_eq!(r.candidate_panachage.len(), 2);
        assert_eq!(r.candidate_panachage[0].source_list, None);
        assert_eq!(r.candidate_panachage[1].votes, VoteCount(9));
        assert!(!i.results[1].counted);
    }

    #[test]
    fn unknown_lists_and_invalid_xml() {
        // The last reference to l2 is a panachage source.
        let marker = "<eCH-0252:listIdentification>l2<";
        let at = PROPORTIONAL.rfind(marker).unwrap();
        let xml = format!(
            "{}<eCH-0252:listIdentification>l9<{}",
            &PROPORTIONAL[..at],
            &PROPORTIONAL[at + marker.len()..]
        );
        let errors = import_election_xml(&proporz_election(), &catalogue(), &xml).unwrap_err();
        assert_eq!(errors, vec![FileImportError::in_file("l9", "List does not exist")]);

        let errors = import_election_xml(&proporz_election(), &catalogue(), "<delivery>").unwrap_err();
        assert!(errors[0].error.starts_with("Not a valid eCH xml file: "));

        let mut other = proporz_election();
        other.external_id = None;
        let errors = import_election_xml(&other, &catalogue(), PROPORTIONAL).unwrap_err();
        assert_eq!(errors, vec![FileImportError::new("No data found")]);
    }

    const VOTE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<delivery xmlns="http://www.ech.ch/xmlns/eCH-0252/2">
  <voteBaseDelivery>
    <cantonId>1</cantonId>
    <pollingDay>2023-06-18</pollingDay>
    <voteInfo>
      <vote>
        <voteIdentification>vote-1</voteIdentification>
      </vote>
      <countingCircleInfo>
        <countingCircle>
          <countingCircleId>261</countingCircleId>
        </countingCircle>
        <resultData>
          <countOfVotersInformation>
            <countOfVotersTotal>1000</countOfVotersTotal>
          </countOfVotersInformation>
          <fullyCountedTrue>true</fullyCountedTrue>
          <ballotResult>
            <ballotIdentification>vote-1</ballotIdentification>
            <variantBallot>
              <questionInformation>
                <questionIdentification>vote-1-proposal</questionIdentification>
                <countOfAnswerYes>300</countOfAnswerYes>
                <countOfAnswerNo>200</countOfAnswerNo>
                <countOfAnswerEmpty>4</countOfAnswerEmpty>
                <countOfAnswerInvalid>1</countOfAnswerInvalid>
              </questionInformation>
              <questionInformation>
                <questionIdentification>vote-1-counter-proposal</questionIdentification>
                <countOfAnswerYes>250</countOfAnswerYes>
                <countOfAnswerNo>250</countOfAnswerNo>
              </questionInformation>
              <tieBreakInformation>
                <questionIdentification>vote-1-tie-breaker</questionIdentification>
                <countOfAnswerInitiative>270</countOfAnswerInitiative>
                <countOfAnswerCounterProposal>230</countOfAnswerCounterProposal>
              </tieBreakInformation>
            </variantBallot>
          </ballotResult>
        </resultData>
      </countingCircleInfo>
      <countingCircleInfo>
        <countingCircle>
          <countingCircleId>19010</countingCircleId>
        </countingCircle>
        <resultData>
          <fullyCountedTrue>false</fullyCountedTrue>
          <ballotResult>
            <variantBallot>
              <questionInformation/>
              <questionInformation/>
              <tieBreakInformation/>
            </variantBallot>
          </ballotResult>
        </resultData>
      </countingCircleInfo>
    </voteInfo>
  </voteBaseDelivery>
</delivery>
"#;

    #[test]
    fn complex_vote_delivery() {
        let vote = Vote {
            id: "vote-1".to_string(),
            external_id: None,
            title: "Initiative".to_string(),
            date: NaiveDate::from_ymd_opt(2023, 6, 18).unwrap(),
            domain: Domain::Canton,
            domain_segment: None,
            has_expats: false,
            status: Status::Unknown,
            last_result_change: None,
            ballots: vec![],
        };
        let v = match import_vote_xml(&vote, &catalogue(), VOTE).unwrap() {
            Import::Vote(v) => v,
            _ => panic!("not a vote import"),
        };
        assert_eq!(v.status, Some(Status::Interim));
        assert_eq!(v.has_expats, Some(true));
        assert_eq!(
            v.ballots.iter().map(|b| b.ballot_type).collect::<Vec<_>>(),
            vec![BallotType::Proposal, BallotType::CounterProposal, BallotType::TieBreaker]
        );
        let proposal = &v.ballots[0].results;
        assert_eq!(proposal[0].yeas, 300);
        assert_eq!(proposal[0].empty, 4);
        assert_eq!(proposal[1].entity_id, EXPATS_ENTITY_ID);
        assert!(!proposal[1].counted);
        // Winterthur is missing.
        assert_eq!(proposal[2].entity_id, 230);
        assert_eq!(v.ballots[2].results[0].yeas, 270);
    }
}
