//! `tickswap inspect` command implementation

use std::path::{Path, PathBuf};

use anyhow::Context;
use colored::Colorize;
use serde::Serialize;
use tickswap_runtime::{DomainSetup, ModuleDomain, NativeBackend};

/// What `inspect` found in a module
#[derive(Debug, Serialize)]
struct InspectReport {
    path: PathBuf,
    layers: Vec<String>,
}

/// Execute the `tickswap inspect` command
pub fn run(path: &Path, json: bool) -> anyhow::Result<()> {
    let report = inspect(path)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{} {}", "Module:".bold(), report.path.display().to_string().cyan());
    if report.layers.is_empty() {
        println!("  {}", "(no layers)".dimmed());
    }
    for (index, name) in report.layers.iter().enumerate() {
        println!("  {:>2}. {}", index + 1, name.green());
    }
    Ok(())
}

/// Instantiate the module's layers in a throwaway domain, without attaching them.
fn inspect(path: &Path) -> anyhow::Result<InspectReport> {
    let base_dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut domain = ModuleDomain::create(DomainSetup::new("tickswap-inspect", base_dir));
    let loaded = domain.load_from(&NativeBackend::new(), path);
    let layers = domain.layer_names();

    if let Err(e) = domain.destroy() {
        eprintln!("{} Teardown failed: {}", "!".yellow(), e);
    }
    loaded.with_context(|| format!("failed to load {}", path.display()))?;

    Ok(InspectReport {
        path: path.to_path_buf(),
        layers,
    })
}
