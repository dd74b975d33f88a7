use clap::Parser;
use env_logger::Env;
use log::debug;

mod args;
mod exports;
mod imports;

fn main() {
    let args = args::Args::parse();
    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();
    debug!("args: {:?}", args);

    if let Err(e) = imports::run_import(&args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
