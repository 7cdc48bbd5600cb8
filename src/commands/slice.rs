//! # Slice Command Implementation
//!
//! Implements `unit-mirror slice`: resolves the closure of the roots in the
//! metadata sources and prints it without writing anything.

use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use serde_json::json;

use unit_mirror::app::MirrorApplication;
use unit_mirror::cancel::CancelToken;
use unit_mirror::output::{emoji, format_entry, severity_label, severity_marker, OutputConfig};
use unit_mirror::slicer::SliceOutcome;
use unit_mirror::status::Severity;

use super::SelectionArgs;

/// Print the closure of the root units without mirroring
#[derive(Args, Debug)]
pub struct SliceArgs {
    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Print the closure as JSON
    #[arg(long)]
    pub json: bool,
}

/// Execute the `slice` command.
pub fn execute(args: SliceArgs, color_flag: &str) -> Result<ExitCode> {
    let out = OutputConfig::from_env_and_flag(color_flag);
    let config = args.selection.load_config()?;
    let outcome = MirrorApplication::new(config)
        .with_slicing_planner()
        .resolve(&CancelToken::new())?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&closure_json(&outcome))?);
    } else {
        print_closure(&out, &outcome);
    }

    if outcome.status.severity() == Severity::Error {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn closure_json(outcome: &SliceOutcome) -> serde_json::Value {
    let units: Vec<serde_json::Value> = outcome
        .closure
        .units()
        .iter()
        .map(|unit| {
            json!({
                "id": unit.id,
                "version": unit.version.to_string(),
                "artifacts": unit.artifacts.iter().map(|k| k.to_string()).collect::<Vec<_>>(),
            })
        })
        .collect();
    json!({
        "units": units,
        "severity": outcome.status.severity(),
        "status": outcome.status.entries(),
    })
}

fn print_closure(out: &OutputConfig, outcome: &SliceOutcome) {
    println!(
        "{} Closure: {} units",
        emoji(out, "🔍", "[SLICE]"),
        outcome.closure.len()
    );
    for unit in outcome.closure.units() {
        println!(
            "   {} {} ({} artifacts)",
            unit.id,
            unit.version,
            unit.artifacts.len()
        );
    }
    for entry in outcome.status.entries() {
        println!("   {}", format_entry(out, entry));
    }
    let severity = outcome.status.severity();
    println!(
        "{} Slice finished: {}",
        severity_marker(out, severity),
        severity_label(out, severity)
    );
}
