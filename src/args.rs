use clap::Parser;

/// Imports vote and election results into a business and prints its summary.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path) The business in JSON format: the vote, election or election compound the results
    /// are imported into, with its existing results.
    #[clap(short, long, value_parser)]
    pub definition: String,

    /// (file path) The catalogue of the political entities of the year, in JSON format.
    #[clap(short, long, value_parser)]
    pub entities: String,

    /// (default internal) The format of the input files: default, internal, wabsti, wabstic, sesam,
    /// ech or party-results.
    #[clap(short, long, value_parser)]
    pub format: Option<String>,

    /// (file paths, repeatable) The files to import. Formats made of several files take them as
    /// key=path (connections=lv.csv) or by their file name (WM_Wahl.csv). Without input, only the
    /// summary of the business is printed.
    #[clap(short, long, value_parser)]
    pub input: Vec<String>,

    /// (file path, 'stdout' or empty) Where the summary (or the export) is written.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (file path) A reference summary in JSON format. If provided, the computed summary must match it.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    /// (ech-0252 or party-results) Writes this export instead of the summary.
    #[clap(long, value_parser)]
    pub export: Option<String>,

    /// (list of comma-separated values or not specified) The notifications to send after a
    /// successful import: email, sms, webhooks.
    #[clap(long, value_parser)]
    pub notify: Option<String>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
