//! The aggregates of the result rows as database expressions.
//!
//! Each aggregate can be rendered as SQL (for a store that sums in the
//! database) or evaluated over rows in memory. Both give the same numbers
//! as the in-memory aggregates of the crate root.
//!
//! ```
//! use election_results::query::*;
//! use election_results::ElectionResult;
//!
//! let q = accounted_ballots();
//! assert_eq!(
//!     q.to_sql(ElectionResult::TABLE),
//!     "COALESCE(SUM(election_results.received_ballots - election_results.blank_ballots - election_results.invalid_ballots), 0)"
//! );
//! ```

use crate::{BallotResult, ElectionResult};

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum Column {
    Counted,
    EligibleVoters,
    Expats,
    ReceivedBallots,
    BlankBallots,
    InvalidBallots,
    BlankVotes,
    InvalidVotes,
    Yeas,
    Nays,
    Empty,
    Invalid,
}

impl Column {
    pub fn name(&self) -> &'static str {
        match self {
            Column::Counted => "counted",
            Column::EligibleVoters => "eligible_voters",
            Column::Expats => "expats",
            Column::ReceivedBallots => "received_ballots",
            Column::BlankBallots => "blank_ballots",
            Column::InvalidBallots => "invalid_ballots",
            Column::BlankVotes => "blank_votes",
            Column::InvalidVotes => "invalid_votes",
            Column::Yeas => "yeas",
            Column::Nays => "nays",
            Column::Empty => "empty",
            Column::Invalid => "invalid",
        }
    }
}

/// A row of a result table. `None` is the NULL of the database: a nullable
/// column without value, or a column the table does not have.
pub trait Row {
    const TABLE: &'static str;
    fn value(&self, column: Column) -> Option<i64>;
}

impl Row for ElectionResult {
    const TABLE: &'static str = "election_results";

    fn value(&self, column: Column) -> Option<i64> {
        let v = match column {
            Column::Counted => self.counted as u64,
            Column::EligibleVoters => self.eligible_voters,
            Column::Expats => return self.expats.map(|e| e as i64),
            Column::ReceivedBallots => self.received_ballots,
            Column::BlankBallots => self.blank_ballots,
            Column::InvalidBallots => self.invalid_ballots,
            Column::BlankVotes => self.blank_votes,
            Column::InvalidVotes => self.invalid_votes,
            _ => return None,
        };
        Some(v as i64)
    }
}

impl Row for BallotResult {
    const TABLE: &'static str = "ballot_results";

    fn value(&self, column: Column) -> Option<i64> {
        let v = match column {
            Column::Counted => self.counted as u64,
            Column::EligibleVoters => self.eligible_voters,
            Column::Expats => return self.expats.map(|e| e as i64),
            Column::Yeas => self.yeas,
            Column::Nays => self.nays,
            Column::Empty => self.empty,
            Column::Invalid => self.invalid,
            _ => return None,
        };
        Some(v as i64)
    }
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub enum Expr {
    Column(Column),
    Literal(i64),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    /// `CASE WHEN <column> THEN <then> ELSE <otherwise> END` on a boolean column.
    When(Column, Box<Expr>, Box<Expr>),
    Coalesce(Box<Expr>, Box<Expr>),
}

pub fn col(column: Column) -> Expr {
    Expr::Column(column)
}

pub fn lit(value: i64) -> Expr {
    Expr::Literal(value)
}

impl std::ops::Add for Expr {
    type Output = Expr;
    fn add(self, rhs: Expr) -> Expr {
        Expr::Add(Box::new(self), Box::new(rhs))
    }
}

impl std::ops::Sub for Expr {
    type Output = Expr;
    fn sub(self, rhs: Expr) -> Expr {
        Expr::Sub(Box::new(self), Box::new(rhs))
    }
}

impl std::ops::Mul for Expr {
    type Output = Expr;
    fn mul(self, rhs: Expr) -> Expr {
        Expr::Mul(Box::new(self), Box::new(rhs))
    }
}

impl Expr {
    pub fn coalesce(self, otherwise: Expr) -> Expr {
        Expr::Coalesce(Box::new(self), Box::new(otherwise))
    }

    /// Evaluates the expression on a row, propagating NULL like SQL does.
    pub fn eval<R: Row>(&self, row: &R) -> Option<i64> {
        match self {
            Expr::Column(c) => row.value(*c),
            Expr::Literal(v) => Some(*v),
            Expr::Add(a, b) => Some(a.eval(row)? + b.eval(row)?),
            Expr::Sub(a, b) => Some(a.eval(row)? - b.eval(row)?),
            Expr::Mul(a, b) => Some(a.eval(row)? * b.eval(row)?),
            Expr::When(c, then, otherwise) => {
                if row.value(*c).unwrap_or(0) != 0 {
                    then.eval(row)
                } else {
                    otherwise.eval(row)
                }
            }
            Expr::Coalesce(a, b) => a.eval(row).or_else(|| b.eval(row)),
        }
    }

    fn write_sql(&self, table: &str, out: &mut String, nested: bool) {
        match self {
            Expr::Column(c) => {
                out.push_str(&format!("{}.{}", table, c.name()));
            }
            Expr::Literal(v) => {
                out.push_str(&v.to_string());
            }
            Expr::Add(a, b) | Expr::Sub(a, b) => {
                let op = if matches!(self, Expr::Add(..)) { "+" } else { "-" };
                if nested {
                    out.push('(');
                }
                a.write_sql(table, out, false);
                out.push(' ');
                out.push_str(op);
                out.push(' ');
                b.write_sql(table, out, true);
                if nested {
                    out.push(')');
                }
            }
            Expr::Mul(a, b) => {
                a.write_sql(table, out, true);
                out.push_str(" * ");
                b.write_sql(table, out, true);
            }
            Expr::When(c, then, otherwise) => {
                out.push_str(&format!("CASE WHEN {}.{} THEN ", table, c.name()));
                then.write_sql(table, out, false);
                out.push_str(" ELSE ");
                otherwise.write_sql(table, out, false);
                out.push_str(" END");
            }
            Expr::Coalesce(a, b) => {
                out.push_str("COALESCE(");
                a.write_sql(table, out, false);
                out.push_str(", ");
                b.write_sql(table, out, false);
                out.push(')');
            }
        }
    }

    pub fn to_sql(&self, table: &str) -> String {
        let mut out = String::new();
        self.write_sql(table, &mut out, false);
        out
    }
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub enum Aggregate {
    /// The sum over all rows, 0 when there are none.
    Sum(Expr),
    Count,
}

impl Aggregate {
    /// SQL `SUM` skips NULL values.
    pub fn eval<R: Row>(&self, rows: &[R]) -> i64 {
        match self {
            Aggregate::Sum(e) => rows.iter().filter_map(|r| e.eval(r)).sum(),
            Aggregate::Count => rows.len() as i64,
        }
    }

    pub fn to_sql(&self, table: &str) -> String {
        match self {
            Aggregate::Sum(e) => format!("COALESCE(SUM({}), 0)", e.to_sql(table)),
            Aggregate::Count => "COUNT(*)".to_string(),
        }
    }
}

/// Renders a `SELECT` of named aggregates over the results of one election
/// or ballot.
pub fn select(table: &str, owner_column: &str, aggregates: &[(&str, Aggregate)]) -> String {
    let columns: Vec<String> = aggregates
        .iter()
        .map(|(name, a)| format!("{} AS {}", a.to_sql(table), name))
        .collect();
    format!(
        "SELECT {} FROM {} WHERE {}.{} = :id",
        columns.join(", "),
        table,
        table,
        owner_column
    )
}

// **** The aggregates ****

pub fn accounted_ballots() -> Aggregate {
    Aggregate::Sum(
        col(Column::ReceivedBallots) - col(Column::BlankBallots) - col(Column::InvalidBallots),
    )
}

pub fn accounted_votes(number_of_mandates: u32) -> Aggregate {
    let ballots =
        col(Column::ReceivedBallots) - col(Column::BlankBallots) - col(Column::InvalidBallots);
    Aggregate::Sum(
        lit(number_of_mandates as i64) * ballots
            - col(Column::BlankVotes)
            - col(Column::InvalidVotes),
    )
}

pub fn counted_entities() -> Aggregate {
    Aggregate::Sum(Expr::When(Column::Counted, Box::new(lit(1)), Box::new(lit(0))))
}

pub fn total_entities() -> Aggregate {
    Aggregate::Count
}

pub fn sum_of(column: Column) -> Aggregate {
    Aggregate::Sum(col(column))
}

pub fn expats() -> Aggregate {
    Aggregate::Sum(col(Column::Expats).coalesce(lit(0)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::*;
    use crate::*;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn election_result() -> impl Strategy<Value = ElectionResult> {
        (
            any::<bool>(),
            0u64..10_000,
            0u64..100,
            0u64..100,
            0u64..100,
            0u64..100,
            proptest::option::of(0u64..50),
        )
            .prop_map(|(counted, received, blank, invalid, bv, iv, expats)| ElectionResult {
                entity_id: 1,
                counted,
                eligible_voters: received * 2,
                expats,
                received_ballots: received,
                blank_ballots: blank,
                invalid_ballots: invalid,
                blank_votes: bv,
                invalid_votes: iv,
                ..Default::default()
            })
    }

    fn ballot_result() -> impl Strategy<Value = BallotResult> {
        (any::<bool>(), 0u64..5000, 0u64..5000, 0u64..100, 0u64..100).prop_map(
            |(counted, yeas, nays, empty, invalid)| BallotResult {
                entity_id: 1,
                counted,
                eligible_voters: yeas + nays + empty + invalid,
                yeas,
                nays,
                empty,
                invalid,
                ..Default::default()
            },
        )
    }

    #[test]
    fn renders_sql() {
        assert_eq!(
            accounted_votes(2).to_sql(ElectionResult::TABLE),
            "COALESCE(SUM(2 * (election_results.received_ballots - election_results.blank_ballots - election_results.invalid_ballots) - election_results.blank_votes - election_results.invalid_votes), 0)"
        );
        assert_eq!(
            counted_entities().to_sql("ballot_results"),
            "COALESCE(SUM(CASE WHEN ballot_results.counted THEN 1 ELSE 0 END), 0)"
        );
        assert_eq!(
            select(
                BallotResult::TABLE,
                "ballot_id",
                &[("yeas", sum_of(Column::Yeas)), ("total", total_entities())]
            ),
            "SELECT COALESCE(SUM(ballot_results.yeas), 0) AS yeas, COUNT(*) AS total FROM ballot_results WHERE ballot_results.ballot_id = :id"
        );
    }

    #[test]
    fn null_is_skipped() {
        let rows = vec![
            ElectionResult {
                expats: Some(3),
                ..Default::default()
            },
            ElectionResult::default(),
        ];
        assert_eq!(sum_of(Column::Expats).eval(&rows), 3);
        assert_eq!(expats().eval(&rows), 3);
        assert_eq!(sum_of(Column::Yeas).eval(&rows), 0);
        assert_eq!(total_entities().eval::<ElectionResult>(&[]), 0);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn election_aggregates_agree(
            results in proptest::collection::vec(election_result(), 0..20),
            mandates in 1u32..8,
        ) {
            let date = NaiveDate::from_ymd_opt(2022, 3, 13).unwrap();
            let mut e = Election::new("e", "e", date, Domain::Canton, ElectionKind::Majorz);
            e.number_of_mandates = mandates;
            e.results = results;
            let totals = election_totals(&e);
            let progress = election_progress(&e);
            prop_assert_eq!(accounted_ballots().eval(&e.results), totals.accounted_ballots);
            prop_assert_eq!(accounted_votes(mandates).eval(&e.results), totals.accounted_votes);
            prop_assert_eq!(accounted_votes(mandates).eval(&e.results), crate::accounted_votes(&e));
            prop_assert_eq!(expats().eval(&e.results), totals.expats as i64);
            prop_assert_eq!(sum_of(Column::ReceivedBallots).eval(&e.results), totals.received_ballots as i64);
            prop_assert_eq!(counted_entities().eval(&e.results), progress.counted as i64);
            prop_assert_eq!(total_entities().eval(&e.results), progress.total as i64);
        }

        #[test]
        fn ballot_aggregates_agree(results in proptest::collection::vec(ballot_result(), 0..20)) {
            let ballot = Ballot { ballot_type: BallotType::Proposal, results };
            let totals = ballot_totals(&ballot);
            let progress = ballot_progress(&ballot);
            prop_assert_eq!(sum_of(Column::Yeas).eval(&ballot.results), totals.yeas as i64);
            prop_assert_eq!(sum_of(Column::Nays).eval(&ballot.results), totals.nays as i64);
            prop_assert_eq!(sum_of(Column::Empty).eval(&ballot.results), totals.empty as i64);
            prop_assert_eq!(sum_of(Column::Invalid).eval(&ballot.results), totals.invalid as i64);
            prop_assert_eq!(sum_of(Column::EligibleVoters).eval(&ballot.results), totals.eligible_voters as i64);
            prop_assert_eq!(counted_entities().eval(&ballot.results), progress.counted as i64);
        }
    }
}
