//! Build command implementation

use std::path::Path;

use miette::{IntoDiagnostic, Result};

use shellfrag_core::BuildReport;

use crate::cli::Cli;
use crate::commands::{load_config, service_builder};

pub fn run_build(cli: &Cli, path: &Path, force: bool) -> Result<bool> {
    let config = load_config(cli)?;
    let mut service = service_builder(cli, config).build();

    let report = service.build(path, force).into_diagnostic()?;
    output_report(&report);

    Ok(report.has_errors())
}

fn output_report(report: &BuildReport) {
    let stats = &report.stats;

    if let Some(cleared) = &report.cleared {
        println!(
            "Cleared {} entries and {} rows before building",
            cleared.memory.removed, cleared.store.removed
        );
    }

    println!(
        "Built fragment cache for {} in {:.2?}",
        report.root.display(),
        report.elapsed
    );
    println!(
        "  fragments: {} discovered, {} parsed, {} failed",
        stats.fragments_discovered, stats.fragments_parsed, stats.fragments_failed
    );
    println!(
        "  commands: {} discovered, {} registered",
        stats.commands_discovered, stats.commands_registered
    );
    println!(
        "  cache: {} AST hits, {} regex hits, {} misses",
        stats.ast_cache_hits, stats.content_cache_hits, stats.cache_misses
    );
    if report.stale_purged > 0 {
        println!("  purged {} superseded entries", report.stale_purged);
    }
    if !report.persisted {
        println!("  warning: results were not persisted");
    }
}
