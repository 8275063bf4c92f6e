use clap::Parser;
use colored::*;
use sdls_harness::cli::PerformanceCli;
use sdls_harness::engine::{SecurityEngine, VirtualSdlsEngine};
use sdls_harness::error::{EngineFailure, HarnessError};
use sdls_harness::performance::PerformanceLoop;
use sdls_harness::report::ReportFormatter;
use sdls_harness::{frame_source, telemetry};
use std::fs;
use std::process::ExitCode;
use tracing::info;

fn main() -> ExitCode {
    let cli = PerformanceCli::parse();
    telemetry::init(cli.output.verbose);
    if cli.output.no_color {
        colored::control::set_override(false);
    }
    let formatter = ReportFormatter::new(!cli.output.no_color);

    match run(&cli, &formatter) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{} {}", "✗".red(), e);
            ExitCode::FAILURE
        }
    }
}

/// Returns whether every iteration succeeded
fn run(cli: &PerformanceCli, formatter: &ReportFormatter) -> Result<bool, Box<dyn std::error::Error>> {
    let config = cli.config.resolve()?;
    let source = cli
        .frame_source()
        .ok_or_else(|| HarnessError::configuration("frame", "--frame or --frame_file is required"))?;
    let frame = frame_source::resolve(&source)?;

    let mut benchmark = PerformanceLoop::new(cli.kind(), cli.numloops);
    benchmark.validate()?;

    print!("{}", formatter.render_configuration(&config, Some(&frame)));

    let mut engine = VirtualSdlsEngine::new(cli.seed);
    engine
        .initialize(&config)
        .map_err(|status| EngineFailure::initialization(status.code(), engine.status_name(status)))
        .map_err(HarnessError::from)?;

    let result = benchmark.run(&mut engine, &frame);
    engine.shutdown();
    let summary = result?;

    let error = summary.failure_error(&source.identifier());
    print!("{}", formatter.render_performance(&summary, error.as_ref()));

    if let Some(path) = &cli.json {
        fs::write(path, summary.to_json()?)?;
        info!(path = %path.display(), "wrote JSON summary");
    }
    if let Some(path) = &cli.csv {
        fs::write(path, summary.export_csv())?;
        info!(path = %path.display(), "wrote CSV samples");
    }

    Ok(!summary.is_failure())
}
