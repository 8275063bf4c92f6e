use clap::Parser;
use colored::*;
use sdls_harness::cli::ApplyCli;
use sdls_harness::config::RunConfiguration;
use sdls_harness::engine::{SecurityEngine, VirtualSdlsEngine};
use sdls_harness::error::{EngineFailure, HarnessError};
use sdls_harness::types::FrameSource;
use sdls_harness::{frame_source, telemetry};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = ApplyCli::parse();
    telemetry::init(cli.output.verbose);
    if cli.output.no_color {
        colored::control::set_override(false);
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", "✗".red(), e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &ApplyCli) -> Result<(), HarnessError> {
    let source = FrameSource::File(cli.file.clone());
    let frame = frame_source::resolve(&source)?;
    println!("{} {} ({} bytes)", "Input:".green(), source.identifier(), frame.len());
    println!("  {}", frame.to_hex());

    if !cli.layer.is_implemented() {
        return Err(HarnessError::NotImplemented { kind: cli.layer });
    }

    let mut engine = VirtualSdlsEngine::new(cli.seed);
    engine
        .initialize(&RunConfiguration::unit_test())
        .map_err(|status| EngineFailure::initialization(status.code(), engine.status_name(status)))?;

    let result = engine.apply_security(cli.layer.layer(), frame.as_slice());
    engine.shutdown();
    let applied = result.map_err(|status| EngineFailure {
        kind: Some(cli.layer),
        source_id: source.identifier(),
        status: status.code(),
        status_name: engine.status_name(status),
    })?;

    println!("{} {} ({} bytes)", "✓".green(), cli.layer, applied.len());
    println!("  {}", hex::encode_upper(&applied));
    Ok(())
}
