// The eCH-0252 vote export and the internal party results export.

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, info};
use snafu::{prelude::*, Snafu};

use election_results::*;

#[derive(Debug, Snafu)]
pub enum ExportError {
    #[snafu(display("Error writing the csv export"))]
    WritingCsv { source: csv::Error },
    #[snafu(display("Error flushing the csv export"))]
    FlushingCsv { source: std::io::Error },
}

pub type ExportResult<T> = Result<T, ExportError>;

// ******** eCH-0252 ********

fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// The counting circle of an entity. The expats are counted in
/// `19{canton}0`.
pub fn counting_circle_id(entity_id: EntityId, canton_id: u32) -> String {
    if entity_id == EXPATS_ENTITY_ID {
        format!("19{:02}0", canton_id)
    } else {
        entity_id.to_string()
    }
}

/// Writes `<name>value</name>` on its own line.
fn element(xml: &mut String, indent: usize, name: &str, value: impl std::fmt::Display) {
    xml.push_str(&format!("{:indent$}<{name}>{value}</{name}>\n", "", indent = indent, name = name, value = value));
}

fn open(xml: &mut String, indent: usize, name: &str) {
    xml.push_str(&format!("{:indent$}<{}>\n", "", name, indent = indent));
}

fn close(xml: &mut String, indent: usize, name: &str) {
    xml.push_str(&format!("{:indent$}</{}>\n", "", name, indent = indent));
}

fn question(xml: &mut String, id: &str, result: &BallotResult) {
    open(xml, 14, "questionInformation");
    element(xml, 16, "questionIdentification", escape(id));
    element(xml, 16, "countOfAnswerYes", result.yeas);
    element(xml, 16, "countOfAnswerNo", result.nays);
    element(xml, 16, "countOfAnswerEmpty", result.empty);
    element(xml, 16, "countOfAnswerInvalid", result.invalid);
    close(xml, 14, "questionInformation");
}

/// Exports the results of a vote as an eCH-0252 vote base delivery. One
/// counting circle is written per entity of the proposal.
pub fn export_vote_ech(vote: &Vote, catalogue: &EntityCatalogue) -> String {
    let vote_id = vote.external_id.as_deref().unwrap_or(&vote.id);
    let by_type: BTreeMap<BallotType, BTreeMap<EntityId, &BallotResult>> = vote
        .ballots
        .iter()
        .map(|b| {
            (
                b.ballot_type,
                b.results.iter().map(|r| (r.entity_id, r)).collect(),
            )
        })
        .collect();
    let complex = by_type.len() > 1;

    let mut xml = String::new();
    xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xml.push_str("<delivery xmlns=\"http://www.ech.ch/xmlns/eCH-0252/2\">\n");
    open(&mut xml, 2, "voteBaseDelivery");
    element(&mut xml, 4, "cantonId", catalogue.canton_id);
    element(&mut xml, 4, "pollingDay", vote.date.format("%Y-%m-%d"));
    open(&mut xml, 4, "voteInfo");
    open(&mut xml, 6, "vote");
    element(&mut xml, 8, "voteIdentification", escape(vote_id));
    element(&mut xml, 8, "domainOfInfluenceIdentification", vote.domain.as_str());
    close(&mut xml, 6, "vote");

    let proposal = vote.proposal().map(|b| b.results.as_slice()).unwrap_or(&[]);
    for result in proposal {
        open(&mut xml, 6, "countingCircleInfo");
        open(&mut xml, 8, "countingCircle");
        element(
            &mut xml,
            10,
            "countingCircleId",
            counting_circle_id(result.entity_id, catalogue.canton_id),
        );
        element(&mut xml, 10, "countingCircleName", escape(&result.name));
        close(&mut xml, 8, "countingCircle");
        open(&mut xml, 8, "resultData");
        open(&mut xml, 10, "countOfVotersInformation");
        element(&mut xml, 12, "countOfVotersTotal", result.eligible_voters);
        if let Some(expats) = result.expats {
            open(&mut xml, 12, "subtotalInfo");
            element(&mut xml, 14, "countOfVoters", expats);
            element(&mut xml, 14, "voterType", 2);
            close(&mut xml, 12, "subtotalInfo");
        }
        close(&mut xml, 10, "countOfVotersInformation");
        element(&mut xml, 10, "fullyCountedTrue", result.counted);
        element(&mut xml, 10, "voterTurnout", format!("{:.2}", result.turnout()));
        open(&mut xml, 10, "ballotResult");
        element(&mut xml, 12, "ballotIdentification", escape(vote_id));
        if complex {
            open(&mut xml, 12, "variantBallot");
            question(&mut xml, &format!("{}-proposal", vote_id), result);
            if let Some(r) = by_type
                .get(&BallotType::CounterProposal)
                .and_then(|rs| rs.get(&result.entity_id))
            {
                question(&mut xml, &format!("{}-counter-proposal", vote_id), r);
            }
            if let Some(r) = by_type
                .get(&BallotType::TieBreaker)
                .and_then(|rs| rs.get(&result.entity_id))
            {
                open(&mut xml, 14, "tieBreakInformation");
                element(
                    &mut xml,
                    16,
                    "questionIdentification",
                    escape(&format!("{}-tie-breaker", vote_id)),
                );
                element(&mut xml, 16, "countOfAnswerInitiative", r.yeas);
                element(&mut xml, 16, "countOfAnswerCounterProposal", r.nays);
                element(&mut xml, 16, "countOfAnswerEmpty", r.empty);
                element(&mut xml, 16, "countOfAnswerInvalid", r.invalid);
                close(&mut xml, 14, "tieBreakInformation");
            }
            close(&mut xml, 12, "variantBallot");
        } else {
            open(&mut xml, 12, "standardBallot");
            element(&mut xml, 14, "countOfUnaccountedInvalidBallots", result.invalid);
            element(&mut xml, 14, "countOfUnaccountedBlankBallots", result.empty);
            element(&mut xml, 14, "countOfYesVotes", result.yeas);
            element(&mut xml, 14, "countOfNoVotes", result.nays);
            close(&mut xml, 12, "standardBallot");
        }
        close(&mut xml, 10, "ballotResult");
        close(&mut xml, 8, "resultData");
        close(&mut xml, 6, "countingCircleInfo");
    }
    close(&mut xml, 4, "voteInfo");
    close(&mut xml, 2, "voteBaseDelivery");
    xml.push_str("</delivery>\n");
    info!(
        "export_vote_ech: {} counting circles for {}",
        proposal.len(),
        vote_id
    );
    xml
}

// ******** Party results ********

/// Exports the party results with the columns of the party results import.
/// The panachage columns are filled for the most recent year only.
pub fn export_party_results(parties: &PartyData) -> ExportResult<String> {
    let locales: BTreeSet<&String> = parties
        .party_results
        .iter()
        .flat_map(|r| r.name_translations.keys())
        .collect();
    let sources: BTreeSet<&str> = parties
        .panachage
        .iter()
        .map(|p| p.source.as_str())
        .collect();
    let latest = parties.party_results.iter().map(|r| r.year).max();

    let mut header: Vec<String> = [
        "domain",
        "domain_segment",
        "year",
        "id",
        "name",
        "color",
        "mandates",
        "total_votes",
        "votes",
        "voters_count",
        "voters_count_percentage",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    header.extend(locales.iter().map(|l| format!("name_{}", l.to_lowercase())));
    header.extend(sources.iter().map(|s| {
        format!(
            "panachage_votes_from_{}",
            if s.is_empty() { BLANK_LIST_ID } else { s }
        )
    }));

    let mut results: Vec<&PartyResult> = parties.party_results.iter().collect();
    results.sort_by(|a, b| {
        (&a.domain, &a.domain_segment, std::cmp::Reverse(a.year), &a.party_id).cmp(&(
            &b.domain,
            &b.domain_segment,
            std::cmp::Reverse(b.year),
            &b.party_id,
        ))
    });

    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record(&header).context(WritingCsvSnafu {})?;
    for r in results {
        let optional = |v: &Option<String>| v.clone().unwrap_or_default();
        let centi = |v: &Option<Centi>| v.map(|c| c.to_string()).unwrap_or_default();
        let mut row: Vec<String> = vec![
            optional(&r.domain),
            optional(&r.domain_segment),
            r.year.to_string(),
            r.party_id.clone(),
            r.name.clone(),
            parties.colors.get(&r.name).cloned().unwrap_or_default(),
            r.number_of_mandates.to_string(),
            r.total_votes.0.to_string(),
            r.votes.0.to_string(),
            centi(&r.voters_count),
            centi(&r.voters_count_percentage),
        ];
        row.extend(
            locales
                .iter()
                .map(|l| r.name_translations.get(*l).cloned().unwrap_or_default()),
        );
        row.extend(sources.iter().map(|source| {
            if Some(r.year) != latest {
                return String::new();
            }
            parties
                .panachage
                .iter()
                .find(|p| p.target == r.party_id && p.source == *source)
                .map(|p| p.votes.0.to_string())
                .unwrap_or_default()
        }));
        writer.write_record(&row).context(WritingCsvSnafu {})?;
    }
    writer.flush().context(FlushingCsvSnafu {})?;
    let contents = String::from_utf8_lossy(writer.get_ref()).into_owned();
    debug!("export_party_results: {} bytes", contents.len());
    Ok(contents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imports::{import_files, ImportFormat};
    use chrono::NaiveDate;
    use election_results::reconcile::{Import, PartyImport};

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
            9,
            vec![entity(1701, "Baar"), entity(1702, "Cham & Hünenberg")],
        )
    }

    fn result(entity_id: u32, name: &str, counted: bool, numbers: [u64; 4]) -> BallotResult {
        BallotResult {
            entity_id,
            name: name.to_string(),
            district: String::new(),
            counted,
            eligible_voters: if counted { 1000 } else { 0 },
            expats: if counted { Some(15) } else { None },
            yeas: numbers[0],
            nays: numbers[1],
            empty: numbers[2],
            invalid: numbers[3],
        }
    }

    fn vote(ballots: Vec<Ballot>) -> Vote {
        Vote {
            id: "steuergesetz".to_string(),
            external_id: None,
            title: "Steuergesetz".to_string(),
            date: NaiveDate::from_ymd_opt(2023, 6, 18).unwrap(),
            domain: Domain::Canton,
            domain_segment: None,
            has_expats: true,
            status: Status::Interim,
            last_result_change: None,
            ballots,
        }
    }

    #[test]
    fn simple_vote() {
        let v = vote(vec![Ballot {
            ballot_type: BallotType::Proposal,
            results: vec![
                result(1701, "Baar", true, [300, 200, 5, 1]),
                result(1702, "Cham & Hünenberg", false, [0, 0, 0, 0]),
                result(0, "", true, [10, 4, 0, 1]),
            ],
        }]);
        let xml = export_vote_ech(&v, &catalogue());
        assert!(xml.contains("<countingCircleName>Cham &amp; Hünenberg</countingCircleName>"));
        assert!(xml.contains("<countingCircleId>19090</countingCircleId>"));
        assert!(xml.contains("<voterTurnout>50.60</voterTurnout>"));
        assert!(xml.contains("<fullyCountedTrue>false</fullyCountedTrue>"));
        assert!(xml.contains("<countOfUnaccountedBlankBallots>5</countOfUnaccountedBlankBallots>"));
        roxmltree::Document::parse(&xml).unwrap();
    }

    #[test]
    fn complex_vote_reimports() {
        let v = vote(vec![
            Ballot {
                ballot_type: BallotType::Proposal,
                results: vec![
                    result(1701, "Baar", true, [300, 200, 5, 1]),
                    result(1702, "Cham & Hünenberg", false, [0, 0, 0, 0]),
                ],
            },
            Ballot {
                ballot_type: BallotType::CounterProposal,
                results: vec![result(1701, "Baar", true, [250, 250, 5, 1])],
            },
            Ballot {
                ballot_type: BallotType::TieBreaker,
                results: vec![result(1701, "Baar", true, [280, 220, 5, 1])],
            },
        ]);
        let xml = export_vote_ech(&v, &catalogue());
        let path = std::env::temp_dir().join("election-day-export-vote.xml");
        std::fs::write(&path, &xml).unwrap();
        let definition = crate::imports::config_reader::Definition {
            item: Item::Vote(v.clone()),
            base_url: None,
            wabstic: None,
            wabsti: None,
        };
        let inputs: BTreeMap<String, String> =
            [("vote".to_string(), path.to_string_lossy().to_string())].into();
        let import = import_files(ImportFormat::Ech, &definition, &catalogue(), &inputs).unwrap();
        let i = match import {
            Import::Vote(i) => i,
            _ => panic!("not a vote import"),
        };
        assert_eq!(i.status, Some(Status::Interim));
        assert_eq!(i.ballots.len(), 3);
        for (imported, exported) in i.ballots.iter().zip(v.ballots.iter()) {
            assert_eq!(imported.ballot_type, exported.ballot_type);
            let counted: Vec<&BallotResult> = imported.results.iter().filter(|r| r.counted).collect();
            assert_eq!(counted[0], &exported.results[0]);
        }
    }

    #[test]
    fn party_results_reimport() {
        let mut parties = PartyData::default();
        for (year, id, name, votes, mandates) in [
            (2015, "1", "P1", 5000, 1),
            (2011, "1", "P1", 3000, 0),
            (2015, "2", "P2", 4000, 0),
        ] {
            parties.party_results.push(PartyResult {
                domain: Some("canton".to_string()),
                domain_segment: None,
                year,
                party_id: id.to_string(),
                name: name.to_string(),
                name_translations: [("de_CH".to_string(), name.to_string())].into(),
                total_votes: VoteCount(10000),
                votes: VoteCount(votes),
                voters_count: Centi::parse("12.5"),
                voters_count_percentage: None,
                number_of_mandates: mandates,
            });
        }
        parties.colors.insert("P1".to_string(), "#123456".to_string());
        parties.panachage.push(PartyPanachageResult {
            target: "1".to_string(),
            source: "2".to_string(),
            votes: VoteCount(7),
        });
        parties.panachage.push(PartyPanachageResult {
            target: "2".to_string(),
            source: String::new(),
            votes: VoteCount(3),
        });

        let csv = export_party_results(&parties).unwrap();
        assert_eq!(
            csv.lines().next(),
            Some(
                "domain,domain_segment,year,id,name,color,mandates,total_votes,votes,\
                 voters_count,voters_count_percentage,name_de_ch,\
                 panachage_votes_from_2,panachage_votes_from_999"
            )
        );
        let path = std::env::temp_dir().join("election-day-export-parties.csv");
        std::fs::write(&path, &csv).unwrap();
        let compound = ElectionCompound {
            id: "kantonsrat".to_string(),
            title: "Kantonsrat".to_string(),
            date: NaiveDate::from_ymd_opt(2015, 10, 18).unwrap(),
            domain: Domain::Canton,
            elections: vec![],
            completes_manually: false,
            manually_completed: false,
            after_pukelsheim: false,
            pukelsheim_completed: false,
            last_result_change: None,
            parties: PartyData::default(),
        };
        let definition = crate::imports::config_reader::Definition {
            item: Item::ElectionCompound(compound),
            base_url: None,
            wabstic: None,
            wabsti: None,
        };
        let inputs: BTreeMap<String, String> =
            [("parties".to_string(), path.to_string_lossy().to_string())].into();
        let import =
            import_files(ImportFormat::PartyResults, &definition, &catalogue(), &inputs).unwrap();
        let p = match import {
            Import::PartyResults(p) => p,
            _ => panic!("not a party import"),
        };
        let tuples = |p: &[PartyResult]| {
            let mut t: Vec<(i32, String, u64, u32)> = p
                .iter()
                .map(|r| (r.year, r.party_id.clone(), r.votes.0, r.number_of_mandates))
                .collect();
            t.sort();
            t
        };
        assert_eq!(tuples(&p.party_results), tuples(&parties.party_results));
        assert_eq!(p.colors.get("P1"), Some(&"#123456".to_string()));
        let PartyImport { panachage, .. } = p;
        let mut transfers: Vec<(String, String, u64)> = panachage
            .into_iter()
            .filter(|t| t.votes.0 > 0)
            .map(|t| (t.target, t.source, t.votes.0))
            .collect();
        transfers.sort();
        assert_eq!(
            transfers,
            vec![
                ("1".to_string(), "2".to_string(), 7),
                ("2".to_string(), String::new(), 3),
            ]
        );
    }
}
