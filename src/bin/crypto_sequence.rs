use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use sdls_harness::cli::SequenceCli;
use sdls_harness::config::RunConfiguration;
use sdls_harness::engine::VirtualSdlsEngine;
use sdls_harness::report::ReportFormatter;
use sdls_harness::sequence::SequenceEngine;
use sdls_harness::telemetry;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = SequenceCli::parse();
    telemetry::init(cli.output.verbose);
    if cli.output.no_color {
        colored::control::set_override(false);
    }

    let steps = match cli.steps() {
        Ok(steps) => steps,
        Err(msg) => SequenceCli::command().error(ErrorKind::InvalidValue, msg).exit(),
    };

    let config = RunConfiguration::unit_test();
    let mut engine = VirtualSdlsEngine::new(cli.seed);
    let report = SequenceEngine::new(&mut engine)
        .abort_on_engine_failure(cli.stop_on_error)
        .run(&config, &steps);

    let formatter = ReportFormatter::new(!cli.output.no_color);
    print!("{}", formatter.render_sequence(&report));

    if report.is_clean() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
