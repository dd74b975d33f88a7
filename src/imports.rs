use log::{debug, info, warn};

use snafu::{prelude::*, Snafu};

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use text_diff::print_diff;

use election_results::notify::{NotificationOption, Notifications, Notifier, NotifyError};
use election_results::reconcile::{commit, Import, ResultError};
use election_results::summary::{get_summary, Summary};
use election_results::*;

use crate::args::Args;
use crate::exports;
use crate::imports::config_reader::*;

mod io_common;
mod io_default;
mod io_ech;
mod io_internal;
mod io_party_results;
mod io_sesam;
mod io_wabsti;
mod io_wabstic;

#[derive(Debug, Snafu)]
pub enum ImportError {
    #[snafu(display("Error opening file {path}"))]
    OpeningFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error writing file {path}"))]
    WritingFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing the JSON file {path}"))]
    ParsingJson {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("Error serializing the output"))]
    SerializingJson { source: serde_json::Error },
    #[snafu(display("The results could not be stored: {source}"))]
    Reconciling { source: ResultError },
    #[snafu(display("The export failed: {source}"))]
    Exporting { source: exports::ExportError },
    #[snafu(display("The import failed with {count} errors"))]
    InvalidFile { count: usize },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type ImportRunResult<T> = Result<T, ImportError>;

/// An error found in an imported file, as shown to the operator.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct FileImportError {
    pub filename: Option<String>,
    /// The row in the file, the header being row 1.
    pub line: Option<usize>,
    pub error: String,
}

impl FileImportError {
    pub fn new(error: impl Into<String>) -> FileImportError {
        FileImportError {
            filename: None,
            line: None,
            error: error.into(),
        }
    }

    pub fn in_file(filename: &str, error: impl Into<String>) -> FileImportError {
        FileImportError {
            filename: Some(filename.to_string()),
            line: None,
            error: error.into(),
        }
    }
}

impl Display for FileImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.filename, self.line) {
            (Some(name), Some(line)) => write!(f, "{}:{}: {}", name, line, self.error),
            (Some(name), None) => write!(f, "{}: {}", name, self.error),
            (None, Some(line)) => write!(f, "line {}: {}", line, self.error),
            (None, None) => write!(f, "{}", self.error),
        }
    }
}

/// The output of an import adapter: the canonical import, or every error
/// found in the files.
pub type ImportResult = Result<Import, Vec<FileImportError>>;

pub mod config_reader {
    use super::*;
    use serde::{Deserialize, Serialize};

    /// Selects an election in the files of a Wabsti-C export.
    #[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
    pub struct WabstiCSource {
        /// The `SortGeschaeft` of the election.
        pub number: String,
        /// The `SortWahlkreis`, if the export contains several districts.
        #[serde(default)]
        pub district: Option<String>,
    }

    /// Selects a vote in a Wabsti export.
    #[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
    pub struct WabstiSource {
        /// The `Vorlage-Nr.` of the vote.
        pub number: u64,
    }

    /// The business the files are imported into.
    #[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
    pub struct Definition {
        pub item: Item,
        #[serde(rename = "baseUrl", default)]
        pub base_url: Option<String>,
        #[serde(rename = "wabstiC", default)]
        pub wabstic: Option<WabstiCSource>,
        #[serde(default)]
        pub wabsti: Option<WabstiSource>,
    }

    pub fn read_json<T: serde::de::DeserializeOwned>(path: &str) -> ImportRunResult<T> {
        let contents = fs::read_to_string(path).context(OpeningFileSnafu { path })?;
        debug!("read_json: {} bytes from {}", contents.len(), path);
        serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path })
    }

    /// Parses the `--input` arguments. Each is either `key=path` or a path,
    /// keyed by its lowercased file stem (`WM_Wahl.csv` gives `wm_wahl`).
    pub fn parse_inputs(inputs: &[String]) -> BTreeMap<String, String> {
        inputs
            .iter()
            .map(|s| match s.split_once('=') {
                Some((key, path)) if !key.contains(std::path::MAIN_SEPARATOR) => {
                    (key.trim().to_lowercase(), path.to_string())
                }
                _ => {
                    let stem = Path::new(s)
                        .file_stem()
                        .and_then(|x| x.to_str())
                        .unwrap_or(s)
                        .to_lowercase();
                    (stem, s.clone())
                }
            })
            .collect()
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum ImportFormat {
    Default,
    Internal,
    Wabsti,
    WabstiC,
    Sesam,
    Ech,
    PartyResults,
}

impl ImportFormat {
    pub fn parse(s: &str) -> Option<ImportFormat> {
        match s {
            "default" => Some(ImportFormat::Default),
            "internal" => Some(ImportFormat::Internal),
            "wabsti" => Some(ImportFormat::Wabsti),
            "wabstic" => Some(ImportFormat::WabstiC),
            "sesam" => Some(ImportFormat::Sesam),
            "ech" => Some(ImportFormat::Ech),
            "party_results" | "party-results" => Some(ImportFormat::PartyResults),
            _ => None,
        }
    }
}

fn single_input(inputs: &BTreeMap<String, String>) -> Result<&str, Vec<FileImportError>> {
    match inputs.values().next() {
        Some(p) if inputs.len() == 1 => Ok(p.as_str()),
        _ => Err(vec![FileImportError::new("Exactly one input file is expected")]),
    }
}

/// Runs the adapter of a format against the files. Nothing is stored.
pub fn import_files(
    format: ImportFormat,
    definition: &Definition,
    catalogue: &EntityCatalogue,
    inputs: &BTreeMap<String, String>,
) -> ImportResult {
    let wabstic = || {
        definition
            .wabstic
            .clone()
            .ok_or_else(|| vec![FileImportError::new("The Wabsti-C election number is missing")])
    };
    let wabsti_number = || {
        definition
            .wabsti
            .as_ref()
            .map(|w| w.number)
            .ok_or_else(|| vec![FileImportError::new("The Wabsti vote number is missing")])
    };
    match (&definition.item, format) {
        (Item::Vote(v), ImportFormat::Default) => io_default::import_vote(v, catalogue, inputs),
        (Item::Vote(v), ImportFormat::Internal) => {
            io_internal::import_vote(v, catalogue, single_input(inputs)?)
        }
        (Item::Vote(v), ImportFormat::Wabsti) => {
            io_wabsti::import_vote(v, catalogue, wabsti_number()?, single_input(inputs)?)
        }
        (Item::Vote(v), ImportFormat::WabstiC) => {
            io_wabstic::import_vote(v, catalogue, &wabstic()?, inputs)
        }
        (Item::Vote(v), ImportFormat::Ech) => io_ech::import_vote(v, catalogue, single_input(inputs)?),
        (Item::Election(e), ImportFormat::Internal) => match e.kind {
            ElectionKind::Majorz => io_internal::import_majorz(e, catalogue, single_input(inputs)?),
            ElectionKind::Proporz(_) => {
                io_internal::import_proporz(e, catalogue, single_input(inputs)?)
            }
        },
        (Item::Election(e), ImportFormat::Wabsti) => match e.kind {
            ElectionKind::Majorz => io_wabsti::import_majorz(e, catalogue, inputs),
            ElectionKind::Proporz(_) => io_wabsti::import_proporz(e, catalogue, inputs),
        },
        (Item::Election(e), ImportFormat::WabstiC) => match e.kind {
            ElectionKind::Majorz => io_wabstic::import_majorz(e, catalogue, &wabstic()?, inputs),
            ElectionKind::Proporz(_) => {
                io_wabstic::import_proporz(e, catalogue, &wabstic()?, inputs)
            }
        },
        (Item::Election(e), ImportFormat::Sesam) if e.proporz().is_none() => {
            io_sesam::import_majorz(e, catalogue, single_input(inputs)?)
        }
        (Item::Election(e), ImportFormat::Ech) => {
            io_ech::import_election(e, catalogue, single_input(inputs)?)
        }
        (Item::Election(e), ImportFormat::PartyResults) if e.proporz().is_some() => {
            let target = io_party_results::PartyTarget::of_election(e);
            io_party_results::import_party_results(&target, single_input(inputs)?)
        }
        (Item::ElectionCompound(c), ImportFormat::Internal) => {
            io_internal::import_compound(c, catalogue, single_input(inputs)?)
        }
        (Item::ElectionCompound(c), ImportFormat::PartyResults) => {
            let target = io_party_results::PartyTarget::of_compound(c, catalogue);
            io_party_results::import_party_results(&target, single_input(inputs)?)
        }
        (_, f) => Err(vec![FileImportError::new(format!(
            "The format {:?} cannot be imported into this item",
            f
        ))]),
    }
}

/// Stands in for the mail, SMS and webhook transports of a deployment: the
/// summary is written to the log.
struct LogNotifier {
    option: NotificationOption,
}

impl Notifier for LogNotifier {
    fn notify(&self, summary: &Summary) -> Result<(), NotifyError> {
        let js = serde_json::to_string(summary)?;
        info!("notification ({:?}): {}", self.option, js);
        Ok(())
    }
}

fn notifications() -> Notifications {
    [
        NotificationOption::Email,
        NotificationOption::Sms,
        NotificationOption::Webhooks,
    ]
    .into_iter()
    .fold(Notifications::new(), |n, option| {
        n.register(option, Arc::new(LogNotifier { option }))
    })
}

fn write_output(out: &Option<String>, contents: &str) -> ImportRunResult<()> {
    match out.as_deref() {
        None | Some("") | Some("stdout") => {
            println!("{}", contents);
            Ok(())
        }
        Some(path) => fs::write(path, contents).context(WritingFileSnafu { path }),
    }
}

/// Imports the files into the item of the definition, then notifies, prints
/// the summary and runs the requested export.
pub fn run_import(args: &Args) -> ImportRunResult<()> {
    let definition: Definition = read_json(&args.definition)?;
    let catalogue: EntityCatalogue = read_json(&args.entities)?;
    info!(
        "run_import: catalogue {} with {} entities",
        catalogue.year,
        catalogue.entities.len()
    );
    let mut item = definition.item.clone();

    if !args.input.is_empty() {
        let format_name = args.format.clone().unwrap_or_else(|| "internal".to_string());
        let format = match ImportFormat::parse(&format_name) {
            Some(f) => f,
            None => whatever!("Unknown format {:?}", format_name),
        };
        let inputs = parse_inputs(&args.input);
        info!("run_import: format {:?}, inputs {:?}", format, inputs);

        let import = match import_files(format, &definition, &catalogue, &inputs) {
            Ok(i) => i,
            Err(errors) => {
                for e in errors.iter() {
                    eprintln!("{}", e);
                }
                return InvalidFileSnafu {
                    count: errors.len(),
                }
                .fail();
            }
        };
        let change = commit(&mut item, import, Utc::now()).context(ReconcilingSnafu {})?;
        info!("run_import: {:?}", change);

        let options: BTreeSet<NotificationOption> = args
            .notify
            .as_deref()
            .unwrap_or("")
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .filter_map(|s| {
                let o = NotificationOption::parse(s);
                if o.is_none() {
                    warn!("run_import: unknown notification option {:?}", s);
                }
                o
            })
            .collect();
        let summary = get_summary(&item, definition.base_url.as_deref().unwrap_or(""));
        if let Some(handle) = notifications().notify(summary, &options) {
            if handle.join().is_err() {
                warn!("run_import: the notification thread panicked");
            }
        }
    }

    let summary = get_summary(&item, definition.base_url.as_deref().unwrap_or(""));
    let pretty_summary = serde_json::to_string_pretty(&summary).context(SerializingJsonSnafu {})?;

    match args.export.as_deref() {
        None => write_output(&args.out, &pretty_summary)?,
        Some(kind) => {
            info!("summary: {}", pretty_summary);
            let contents = match (kind, &item) {
                ("ech-0252", Item::Vote(v)) => exports::export_vote_ech(v, &catalogue),
                ("party-results", Item::Election(e)) => match e.proporz() {
                    Some(data) => {
                        exports::export_party_results(&data.parties).context(ExportingSnafu {})?
                    }
                    None => whatever!("Only proporz elections have party results"),
                },
                ("party-results", Item::ElectionCompound(c)) => {
                    exports::export_party_results(&c.parties).context(ExportingSnafu {})?
                }
                (k, _) => whatever!("The export {:?} is not available for this item", k),
            };
            write_output(&args.out, &contents)?;
        }
    }

    // The reference summary, if provided for comparison
    if let Some(reference_path) = &args.reference {
        let reference: serde_json::Value = read_json(reference_path)?;
        let pretty_reference =
            serde_json::to_string_pretty(&reference).context(SerializingJsonSnafu {})?;
        let computed: serde_json::Value =
            serde_json::from_str(&pretty_summary).context(ParsingJsonSnafu { path: "summary" })?;
        let pretty_computed =
            serde_json::to_string_pretty(&computed).context(SerializingJsonSnafu {})?;
        if pretty_reference != pretty_computed {
            warn!("Found differences with the reference summary");
            print_diff(pretty_reference.as_str(), pretty_computed.as_str(), "\n");
            whatever!("Difference detected between computed summary and reference summary")
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_errors() {
        let e = FileImportError {
            filename: Some("wm_wahl".to_string()),
            line: Some(3),
            error: "Invalid integer: absolutesmehr".to_string(),
        };
        assert_eq!(e.to_string(), "wm_wahl:3: Invalid integer: absolutesmehr");
        assert_eq!(FileImportError::new("No data found").to_string(), "No data found");
    }

    #[test]
    fn parses_inputs() {
        let inputs = parse_inputs(&[
            "data/WM_Wahl.csv".to_string(),
            "connections=lv.xlsx".to_string(),
        ]);
        assert_eq!(inputs.get("wm_wahl"), Some(&"data/WM_Wahl.csv".to_string()));
        assert_eq!(inputs.get("connections"), Some(&"lv.xlsx".to_string()));
    }

    #[test]
    fn parses_formats() {
        assert_eq!(ImportFormat::parse("wabstic"), Some(ImportFormat::WabstiC));
        assert_eq!(ImportFormat::parse("party-results"), Some(ImportFormat::PartyResults));
        assert_eq!(ImportFormat::parse("default"), Some(ImportFormat::Default));
        assert_eq!(ImportFormat::parse("xml"), None);
    }

    #[test]
    fn wabsti_votes_need_a_number() {
        let definition: Definition = serde_json::from_str(
            r#"{"item": {"type": "vote", "id": "vote", "title": "Vote", "date": "2022-03-13",
                "domain": "federation", "ballots": [{"type": "proposal"}]}}"#,
        )
        .unwrap();
        assert_eq!(definition.wabsti, None);
        let catalogue = EntityCatalogue::new(2022, PrincipalDomain::Canton, 17, vec![]);
        let inputs = parse_inputs(&["results.csv".to_string()]);
        let errors = import_files(ImportFormat::Wabsti, &definition, &catalogue, &inputs).unwrap_err();
        assert_eq!(errors, vec![FileImportError::new("The Wabsti vote number is missing")]);

        let definition: Definition = serde_json::from_str(
            r#"{"item": {"type": "vote", "id": "vote", "title": "Vote", "date": "2022-03-13",
                "domain": "federation", "ballots": [{"type": "proposal"}]},
                "wabsti": {"number": 4}}"#,
        )
        .unwrap();
        assert_eq!(definition.wabsti, Some(WabstiSource { number: 4 }));
    }
}
