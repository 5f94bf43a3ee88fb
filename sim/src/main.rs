// Copyright (c) 2022-2023 The MobileCoin Foundation

use std::path::PathBuf;

use clap::Parser;
use log::{debug, info, LevelFilter};

use jcre_core::apdu::ProtocolType;
use jcre_sim::*;

/// Java Card runtime simulator
///
/// Replays a JSON script of command APDUs through the runtime and
/// demonstration applet, printing the resulting exchanges.
#[derive(Clone, Debug, PartialEq, Parser)]
pub struct Args {
    /// Script file to replay
    script: PathBuf,

    /// Override the script transport protocol (t0, t1)
    #[clap(long, env = "JCRE_PROTOCOL")]
    protocol: Option<ProtocolType>,

    /// Enable extended length support in the applet
    #[clap(long)]
    extended: bool,

    /// Print exchanges as JSON
    #[clap(long)]
    json: bool,

    /// Log level
    #[clap(long, default_value = "info")]
    log_level: LevelFilter,
}

fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Setup logging
    let _ = simplelog::SimpleLogger::init(args.log_level, simplelog::Config::default());

    // Load script
    let s = std::fs::read_to_string(&args.script)?;
    let mut script: Script = serde_json::from_str(&s)?;

    if let Some(p) = args.protocol {
        script.link.protocol = p;
    }
    if args.extended {
        script.extended = true;
    }

    debug!("script: {:?}", script);

    info!(
        "replaying {} commands from {}",
        script.steps.len(),
        args.script.display()
    );

    let x = run_script(&script)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&x)?);
        return Ok(());
    }

    for e in &x {
        let sw = match (e.sw, &e.state) {
            (Some(sw), _) => format!("{sw:04x}"),
            (None, Some(s)) => format!("silent ({s})"),
            (None, None) => "silent".to_string(),
        };

        println!("> {}", e.apdu);
        println!("< {} {}", e.response, sw);
    }

    Ok(())
}
