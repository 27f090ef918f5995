//! Verify command implementation

use std::path::Path;

use miette::{IntoDiagnostic, Result};

use shellfrag_core::VerifyReport;

use crate::cli::{Cli, OutputFormat};
use crate::commands::{load_config, print_json, service_builder};

pub fn run_verify(cli: &Cli, path: Option<&Path>, format: OutputFormat) -> Result<bool> {
    let config = load_config(cli)?;
    let mut service = service_builder(cli, config).read_only().build();

    let report = service.verify(path).into_diagnostic()?;
    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Text => output_text(&report),
    }

    Ok(report.has_errors())
}

fn output_text(report: &VerifyReport) {
    match &report.store_path {
        Some(path) => println!("Store: {}", path.display()),
        None => println!("Store: <none>"),
    }
    println!("  exists: {}", report.store_exists);
    println!("  size: {} bytes", report.store_size);
    println!("  AST entries: {}", report.ast_entries);
    println!("  regex entries: {}", report.regex_entries);
    println!("  engine available: {}", report.engine_available);
    println!("  memory only: {}", report.memory_only);
    if let Some(reason) = &report.degraded_reason {
        println!("  degraded: {}", reason);
    }

    for coverage in &report.coverage {
        println!(
            "Coverage ({}): {}/{} fragments cached, {} missing or stale",
            coverage.mode, coverage.cached, coverage.fragments, coverage.missing
        );
    }

    for error in &report.errors {
        println!("error: {}", error);
    }
}
