//! Clear command implementation

use miette::Result;
use tracing::warn;

use shellfrag_core::{ClearOptions, ClearReport, ClearScope, StepOutcome, StepStatus};

use crate::cli::Cli;
use crate::commands::{load_config, service_builder};

pub fn run_clear(cli: &Cli, scope: ClearScope, dry_run: bool, remove_file: bool) -> Result<bool> {
    let config = load_config(cli)?;

    if remove_file && scope != ClearScope::All {
        warn!("--remove-file only applies to --scope all; clearing rows instead");
    }

    // Clearing must not create a store that is not there yet.
    let builder = service_builder(cli, config);
    let mut service = if dry_run {
        builder.read_only().build()
    } else {
        builder.defer_store_creation().build()
    };

    let report = service.clear(
        scope,
        ClearOptions {
            remove_store_file: remove_file,
            dry_run,
        },
    );
    output_report(&report);

    Ok(!report.is_complete())
}

fn output_report(report: &ClearReport) {
    let verb = if report.dry_run { "Would clear" } else { "Cleared" };
    println!("{} fragment cache (scope: {:?})", verb, report.scope);
    output_step(&report.memory, "entries");
    output_step(&report.store, "rows");

    if report.file_removed {
        println!("  store file removed ({} bytes)", report.bytes_removed);
    } else if report.bytes_removed > 0 {
        println!("  {} bytes reclaimed", report.bytes_removed);
    }
}

fn output_step(step: &StepOutcome, unit: &str) {
    match step.status {
        StepStatus::Succeeded => println!("  {}: ok ({} {})", step.name, step.removed, unit),
        StepStatus::Skipped => println!(
            "  {}: skipped ({})",
            step.name,
            step.detail.as_deref().unwrap_or("not applicable")
        ),
        StepStatus::Failed => println!(
            "  {}: FAILED ({})",
            step.name,
            step.detail.as_deref().unwrap_or("unknown error")
        ),
    }
}
