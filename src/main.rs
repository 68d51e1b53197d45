use anyhow::Result;
use clap::Parser;
use log::{LevelFilter, debug};
use std::io;
use std::process::ExitCode;

use pingr::cli::Args;
use pingr::config::Config;
use pingr::export::{Reporter, SummaryFormat};
use pingr::ping::{Pinger, StopFlag, install_interrupt_handler};
use pingr::probe::{IcmpSocket, get_identifier};
use pingr::resolve::resolve_target;
use pingr::state::{Session, Target};

fn main() -> ExitCode {
    let args = Args::parse();

    env_logger::Builder::new()
        .format_timestamp(None)
        .filter_level(if args.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Warn
        })
        .parse_default_env()
        .init();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("pingr: {}", e);
        return ExitCode::from(2);
    }

    match run(&args) {
        Ok(received) if received > 0 => ExitCode::SUCCESS,
        Ok(_) => ExitCode::from(1),
        Err(e) => {
            eprintln!("pingr: {:#}", e);
            ExitCode::from(1)
        }
    }
}

/// Ping the target until done, returning the number of replies received
fn run(args: &Args) -> Result<u32> {
    let address = resolve_target(&args.host)?;
    let config = Config::from(args);

    // Socket first: no point installing handlers without permission
    let socket = IcmpSocket::open(&config)?;

    let stop = StopFlag::new();
    install_interrupt_handler(&stop)?;

    let identifier = get_identifier();
    debug!("Pinging {} with identifier {:#06x}", address, identifier);

    let format = if args.json {
        SummaryFormat::Json
    } else {
        SummaryFormat::Text
    };
    let reporter = Reporter::new(io::stdout().lock(), &config, format);
    let session = Session::new(Target::new(args.host.clone(), address), config, identifier);

    let summary = Pinger::new(session, socket, reporter, stop).run()?;
    Ok(summary.received)
}
