// ********* Reference data ***********

use std::collections::BTreeMap;
use std::fmt::Display;
use std::ops::{Add, AddAssign};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub type EntityId = u32;

/// The pseudo entity collecting the ballots of the Swiss citizens living abroad.
pub const EXPATS_ENTITY_ID: EntityId = 0;

/// The identifier of the blank list, used as a panachage source.
pub const BLANK_LIST_ID: &str = "999";

/// A municipality (or district) for which results are tabulated.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct PoliticalEntity {
    pub entity_id: EntityId,
    pub name: String,
    #[serde(default)]
    pub district: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub superregion: Option<String>,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrincipalDomain {
    Canton,
    Municipality,
}

/// The domain of influence of an election or a vote.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Federation,
    Canton,
    Region,
    District,
    Municipality,
    None,
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Federation => "federation",
            Domain::Canton => "canton",
            Domain::Region => "region",
            Domain::District => "district",
            Domain::Municipality => "municipality",
            Domain::None => "none",
        }
    }
}

/// Where an entity is located, as seen from a given domain of influence.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct EntityLocation {
    pub name: String,
    pub district: String,
    pub superregion: String,
}

/// The catalogue of valid entities of a principal (canton or municipality)
/// for a single year.
///
/// It is shared read-only by all the imports of that year.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct EntityCatalogue {
    pub year: i32,
    pub domain: PrincipalDomain,
    /// The BFS number of the canton, used to build the expats counting circle.
    pub canton_id: u32,
    pub entities: BTreeMap<EntityId, PoliticalEntity>,
}

impl EntityCatalogue {
    pub fn new(
        year: i32,
        domain: PrincipalDomain,
        canton_id: u32,
        entities: Vec<PoliticalEntity>,
    ) -> EntityCatalogue {
        EntityCatalogue {
            year,
            domain,
            canton_id,
            entities: entities
                .into_iter()
                .map(|e| (e.entity_id, e))
                .collect(),
        }
    }

    pub fn contains(&self, entity_id: EntityId) -> bool {
        self.entities.contains_key(&entity_id)
    }

    pub fn get(&self, entity_id: EntityId) -> Option<&PoliticalEntity> {
        self.entities.get(&entity_id)
    }

    /// Returns the name and the district (or region, depending on the domain)
    /// of an entity. The expats are nowhere.
    pub fn locate(&self, entity_id: EntityId, domain: Domain) -> EntityLocation {
        if entity_id == EXPATS_ENTITY_ID {
            return EntityLocation::default();
        }
        match self.entities.get(&entity_id) {
            None => EntityLocation::default(),
            Some(entity) => EntityLocation {
                name: entity.name.clone(),
                district: if domain == Domain::Region {
                    entity.region.clone().unwrap_or_default()
                } else {
                    entity.district.clone().unwrap_or_default()
                },
                superregion: entity.superregion.clone().unwrap_or_default(),
            },
        }
    }

    /// Checks that an entity belongs to the domain segment of an election or
    /// a vote, returning the operator message if it does not.
    pub fn scope_error(
        &self,
        entity_id: EntityId,
        domain: Domain,
        domain_segment: Option<&str>,
    ) -> Option<String> {
        if entity_id == EXPATS_ENTITY_ID {
            return None;
        }
        let location = self.locate(entity_id, domain);
        let segment = domain_segment.unwrap_or("");
        match domain {
            Domain::Municipality
                if self.domain != PrincipalDomain::Municipality && location.name != segment =>
            {
                Some(format!("{} is not part of this business", entity_id))
            }
            Domain::Region | Domain::District if location.district != segment => {
                Some(format!("{} is not part of {}", entity_id, segment))
            }
            _ => None,
        }
    }

    /// The entities expected in a result set but absent from an import,
    /// restricted to the domain segment.
    pub fn missing_entities(
        &self,
        present: &[EntityId],
        domain: Domain,
        domain_segment: Option<&str>,
        has_expats: bool,
    ) -> Vec<(EntityId, EntityLocation)> {
        if domain == Domain::None {
            return vec![];
        }
        let segment = domain_segment.unwrap_or("");
        let mut candidates: Vec<EntityId> = self.entities.keys().cloned().collect();
        if has_expats {
            candidates.insert(0, EXPATS_ENTITY_ID);
        }
        candidates
            .into_iter()
            .filter(|id| !present.contains(id))
            .map(|id| (id, self.locate(id, domain)))
            .filter(|(_, location)| match domain {
                Domain::Municipality if self.domain != PrincipalDomain::Municipality => {
                    location.name == segment
                }
                Domain::Region | Domain::District => location.district == segment,
                _ => true,
            })
            .collect()
    }
}

// ********* Counts ***********

/// A number of votes. Derived quantities that may turn negative on
/// inconsistent data are computed as `i64` instead.
#[derive(Eq, PartialEq, Debug, Clone, Copy, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoteCount(pub u64);

impl VoteCount {
    pub const EMPTY: VoteCount = VoteCount(0);

    pub fn signed(self) -> i64 {
        self.0 as i64
    }
}

impl std::iter::Sum for VoteCount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        VoteCount(iter.map(|vc| vc.0).sum())
    }
}

impl AddAssign for VoteCount {
    fn add_assign(&mut self, rhs: VoteCount) {
        self.0 += rhs.0;
    }
}

impl Add for VoteCount {
    type Output = VoteCount;
    fn add(self: VoteCount, rhs: VoteCount) -> VoteCount {
        VoteCount(self.0 + rhs.0)
    }
}

impl Display for VoteCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A non-negative decimal number with exactly two decimal places, stored in
/// hundredths so that it survives an import/export cycle unchanged.
#[derive(Eq, PartialEq, Debug, Clone, Copy, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Centi(pub u64);

impl Centi {
    /// Parses `12`, `12.3` or `12.34`. More than two decimal places are
    /// rejected rather than rounded.
    pub fn parse(s: &str) -> Option<Centi> {
        let s = s.trim();
        let (int_part, frac_part) = match s.split_once('.') {
            Some((i, f)) => (i, f),
            None => (s, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return None;
        }
        if frac_part.len() > 2 || !frac_part.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let int_value: u64 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().ok()?
        };
        let frac_value: u64 = match frac_part.len() {
            0 => 0,
            1 => frac_part.parse::<u64>().ok()? * 10,
            _ => frac_part.parse().ok()?,
        };
        int_value.checked_mul(100)?.checked_add(frac_value).map(Centi)
    }

    pub fn as_f64(&self) -> f64 {
        self.0 as f64 / 100.0
    }
}

impl Display for Centi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

// ********* Results ***********

#[derive(Eq, PartialEq, Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Unknown,
    Interim,
    Final,
}

impl Status {
    pub fn parse(s: &str) -> Option<Status> {
        match s {
            "unknown" => Some(Status::Unknown),
            "interim" => Some(Status::Interim),
            "final" => Some(Status::Final),
            _ => None,
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Undetermined,
}

impl Gender {
    pub fn parse(s: &str) -> Option<Gender> {
        match s {
            "male" => Some(Gender::Male),
            "female" => Some(Gender::Female),
            "undetermined" => Some(Gender::Undetermined),
            _ => None,
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct CandidateResult {
    pub candidate_id: String,
    pub votes: VoteCount,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ListResult {
    pub list_id: String,
    pub votes: VoteCount,
}

/// Votes a candidate received from ballots of another list. A source of
/// `None` stands for the ballots without list designation.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct CandidatePanachageResult {
    pub candidate_id: String,
    pub source_list: Option<String>,
    pub votes: VoteCount,
}

/// The result of an election in one entity.
#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct ElectionResult {
    pub entity_id: EntityId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub district: String,
    #[serde(default)]
    pub superregion: String,
    pub counted: bool,
    pub eligible_voters: u64,
    #[serde(default)]
    pub expats: Option<u64>,
    pub received_ballots: u64,
    pub blank_ballots: u64,
    pub invalid_ballots: u64,
    pub blank_votes: u64,
    pub invalid_votes: u64,
    #[serde(default)]
    pub candidate_results: Vec<CandidateResult>,
    #[serde(default)]
    pub list_results: Vec<ListResult>,
    #[serde(default)]
    pub candidate_panachage: Vec<CandidatePanachageResult>,
}

impl ElectionResult {
    /// A row for an entity which has not been counted yet: all the numbers
    /// are zero.
    pub fn uncounted(entity_id: EntityId, location: EntityLocation) -> ElectionResult {
        ElectionResult {
            entity_id,
            name: location.name,
            district: location.district,
            superregion: location.superregion,
            ..Default::default()
        }
    }

    /// Zeroes all the numbers, keeping the location. Used for the rows of
    /// entities which are not counted yet.
    pub fn clear_numbers(&mut self) {
        self.eligible_voters = 0;
        self.expats = None;
        self.received_ballots = 0;
        self.blank_ballots = 0;
        self.invalid_ballots = 0;
        self.blank_votes = 0;
        self.invalid_votes = 0;
        for c in self.candidate_results.iter_mut() {
            c.votes = VoteCount::EMPTY;
        }
        for l in self.list_results.iter_mut() {
            l.votes = VoteCount::EMPTY;
        }
        self.candidate_panachage.clear();
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub candidate_id: String,
    pub family_name: String,
    pub first_name: String,
    #[serde(default)]
    pub elected: bool,
    #[serde(default)]
    pub party: Option<String>,
    #[serde(default)]
    pub party_color: Option<String>,
    #[serde(default)]
    pub gender: Option<Gender>,
    #[serde(default)]
    pub year_of_birth: Option<u32>,
    /// The list of the candidate (proporz only).
    #[serde(default)]
    pub list_id: Option<String>,
}

/// Votes a list received from the ballots of another list.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ListPanachageResult {
    /// `None` for the ballots without list designation.
    pub source: Option<String>,
    pub votes: VoteCount,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct List {
    pub list_id: String,
    pub name: String,
    #[serde(default)]
    pub number_of_mandates: u32,
    /// The key of the (sub-)connection this list belongs to.
    #[serde(default)]
    pub connection: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub panachage: Vec<ListPanachageResult>,
}

/// A list connection (or, when it has a parent, a sub-connection).
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ListConnection {
    pub connection_id: String,
    #[serde(default)]
    pub parent: Option<String>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct PartyResult {
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub domain_segment: Option<String>,
    pub year: i32,
    pub party_id: String,
    pub name: String,
    #[serde(default)]
    pub name_translations: BTreeMap<String, String>,
    pub total_votes: VoteCount,
    pub votes: VoteCount,
    #[serde(default)]
    pub voters_count: Option<Centi>,
    #[serde(default)]
    pub voters_count_percentage: Option<Centi>,
    pub number_of_mandates: u32,
}

/// Votes a party received from the lists of another party.
/// An empty source stands for the blank list.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct PartyPanachageResult {
    pub target: String,
    pub source: String,
    pub votes: VoteCount,
}

/// Party results, party panachage and party colors, shared by proporz
/// elections and election compounds.
#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartyData {
    #[serde(default)]
    pub party_results: Vec<PartyResult>,
    #[serde(default)]
    pub panachage: Vec<PartyPanachageResult>,
    #[serde(default)]
    pub colors: BTreeMap<String, String>,
    #[serde(default)]
    pub use_historical_party_results: bool,
    /// A snapshot of the party data of the related earlier election or
    /// compound.
    #[serde(default)]
    pub historical: Option<Box<PartyData>>,
}

// ********* Elections ***********

#[derive(Eq, PartialEq, Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MajorityType {
    #[default]
    Absolute,
    Relative,
}

#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProporzData {
    #[serde(default)]
    pub lists: Vec<List>,
    #[serde(default)]
    pub list_connections: Vec<ListConnection>,
    #[serde(default)]
    pub parties: PartyData,
}

/// The kind-specific part of an election.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ElectionKind {
    Majorz,
    Proporz(ProporzData),
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Election {
    pub id: String,
    #[serde(default)]
    pub external_id: Option<String>,
    pub title: String,
    pub date: NaiveDate,
    pub domain: Domain,
    #[serde(default)]
    pub domain_segment: Option<String>,
    #[serde(default = "default_mandates")]
    pub number_of_mandates: u32,
    #[serde(default)]
    pub has_expats: bool,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub last_result_change: Option<DateTime<Utc>>,
    #[serde(default)]
    pub absolute_majority: Option<u64>,
    #[serde(default)]
    pub majority_type: MajorityType,
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub results: Vec<ElectionResult>,
    #[serde(flatten)]
    pub kind: ElectionKind,
}

fn default_mandates() -> u32 {
    1
}

impl Election {
    pub fn new(id: &str, title: &str, date: NaiveDate, domain: Domain, kind: ElectionKind) -> Election {
        Election {
            id: id.to_string(),
            external_id: None,
            title: title.to_string(),
            date,
            domain,
            domain_segment: None,
            number_of_mandates: 1,
            has_expats: false,
            status: Status::Unknown,
            last_result_change: None,
            absolute_majority: None,
            majority_type: MajorityType::Absolute,
            candidates: vec![],
            results: vec![],
            kind,
        }
    }

    pub fn proporz(&self) -> Option<&ProporzData> {
        match &self.kind {
            ElectionKind::Proporz(data) => Some(data),
            ElectionKind::Majorz => None,
        }
    }

    pub fn proporz_mut(&mut self) -> Option<&mut ProporzData> {
        match &mut self.kind {
            ElectionKind::Proporz(data) => Some(data),
            ElectionKind::Majorz => None,
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ElectionCompound {
    pub id: String,
    pub title: String,
    pub date: NaiveDate,
    pub domain: Domain,
    #[serde(default)]
    pub elections: Vec<Election>,
    #[serde(default)]
    pub completes_manually: bool,
    #[serde(default)]
    pub manually_completed: bool,
    #[serde(default)]
    pub after_pukelsheim: bool,
    #[serde(default)]
    pub pukelsheim_completed: bool,
    #[serde(default)]
    pub last_result_change: Option<DateTime<Utc>>,
    #[serde(default)]
    pub parties: PartyData,
}

// ********* Votes ***********

#[derive(Eq, PartialEq, Debug, Clone, Copy, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BallotType {
    Proposal,
    CounterProposal,
    TieBreaker,
}

impl BallotType {
    pub fn parse(s: &str) -> Option<BallotType> {
        match s {
            "proposal" => Some(BallotType::Proposal),
            "counter-proposal" => Some(BallotType::CounterProposal),
            "tie-breaker" => Some(BallotType::TieBreaker),
            _ => None,
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct BallotResult {
    pub entity_id: EntityId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub district: String,
    pub counted: bool,
    pub eligible_voters: u64,
    #[serde(default)]
    pub expats: Option<u64>,
    pub yeas: u64,
    pub nays: u64,
    pub empty: u64,
    pub invalid: u64,
}

impl BallotResult {
    pub fn uncounted(entity_id: EntityId, location: EntityLocation) -> BallotResult {
        BallotResult {
            entity_id,
            name: location.name,
            district: location.district,
            ..Default::default()
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Ballot {
    #[serde(rename = "type")]
    pub ballot_type: BallotType,
    #[serde(default)]
    pub results: Vec<BallotResult>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    pub id: String,
    #[serde(default)]
    pub external_id: Option<String>,
    pub title: String,
    pub date: NaiveDate,
    pub domain: Domain,
    #[serde(default)]
    pub domain_segment: Option<String>,
    #[serde(default)]
    pub has_expats: bool,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub last_result_change: Option<DateTime<Utc>>,
    pub ballots: Vec<Ballot>,
}

impl Vote {
    pub fn ballot(&self, ballot_type: BallotType) -> Option<&Ballot> {
        self.ballots.iter().find(|b| b.ballot_type == ballot_type)
    }

    pub fn proposal(&self) -> Option<&Ballot> {
        self.ballot(BallotType::Proposal)
    }
}

/// Any item that carries results.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Item {
    Election(Election),
    ElectionCompound(ElectionCompound),
    Vote(Vote),
}
