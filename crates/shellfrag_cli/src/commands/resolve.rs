//! Resolve command implementation

use std::path::Path;

use miette::{IntoDiagnostic, Result, miette};

use shellfrag_core::{FragmentFinder, FragmentLoader, LoadedProfile};

use crate::cli::{Cli, OutputFormat};
use crate::commands::{load_config, print_json, service_builder};

pub fn run_resolve(cli: &Cli, path: &Path, both_modes: bool, format: OutputFormat) -> Result<bool> {
    let config = load_config(cli)?;
    let finder = FragmentFinder::from_config(&config).into_diagnostic()?;
    let mut service = service_builder(cli, config).build();

    let profile = FragmentLoader::new(&mut service, finder)
        .force_both_modes(both_modes)
        .load(path);

    // The loader never fails; a missing root is still a setup error here.
    if let Some(error) = &profile.error {
        return Err(miette!("{}", error));
    }

    match format {
        OutputFormat::Json => print_json(&profile)?,
        OutputFormat::Text => output_text(&profile),
    }

    Ok(profile.stats.fragments_failed > 0)
}

fn output_text(profile: &LoadedProfile) {
    for fragment in &profile.fragments {
        let marker = if fragment.failed { " (failed)" } else { "" };
        println!("{}{}:", fragment.path.display(), marker);
        for command in &fragment.commands {
            println!("  {}", command);
        }
    }

    let stats = &profile.stats;
    println!();
    println!(
        "Resolved {} commands from {} fragments ({} failed); {} cache hits, {} misses",
        stats.commands_registered,
        stats.fragments_discovered,
        stats.fragments_failed,
        stats.cache_hits(),
        stats.cache_misses
    );
}
