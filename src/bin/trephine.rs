use std::process;

use log::error;
use structopt::StructOpt;

use trephine::cli::{self, CliParams};

fn setup_logger(verbose: u8) -> Result<(), fern::InitError> {
    let level = match verbose {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!("[{}][{}] {}", record.level(), record.target(), message))
        })
        .level(level)
        .chain(std::io::stderr())
        .apply()?;
    Ok(())
}

fn main() {
    let params = CliParams::from_args();

    if let Err(e) = setup_logger(params.verbose) {
        eprintln!("could not set up logging: {}", e);
        process::exit(1);
    }

    if let Err(e) = cli::run(params) {
        error!("{:#}", e);
        process::exit(1);
    }
}
