//! `quarry check` command implementation.
//!
//! Loads a configuration exactly as `serve` would and prints a summary.
//! No database connection is opened.

use crate::commands::serve::load_registry;
use anyhow::Result;
use quarry_core::QuarryConfig;
use std::path::Path;

pub fn run(path: &Path) -> Result<()> {
    let registry = load_registry(path)?;
    let config = QuarryConfig::from_file(path)?;

    println!("Configuration {:?} is valid", path);
    println!("  sources:       {}", config.sources.len());
    for (name, source) in &config.sources {
        println!("    {} ({}) {}", name, source.kind, source.redacted_url());
    }
    println!("  auth services: {}", config.auth_services.len());
    println!("  tools:         {}", registry.len());
    println!("  toolsets:      {}", registry.toolset_names().len());
    for toolset in registry.toolset_names() {
        let members = registry.resolve_toolset(toolset)?;
        println!("    {} ({} tools)", toolset, members.len());
    }

    Ok(())
}
