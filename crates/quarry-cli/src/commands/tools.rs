//! `quarry tools` command implementation.

use crate::commands::serve::load_registry;
use anyhow::Result;
use std::path::Path;

/// Print the tools of a toolset (every tool when `toolset` is `None`).
pub fn list(path: &Path, toolset: Option<&str>) -> Result<()> {
    let registry = load_registry(path)?;
    let tools = registry.resolve_toolset(toolset.unwrap_or(""))?;

    for tool in tools {
        println!("{} [{}] on {}", tool.name, tool.kind.as_str(), tool.source);
        if !tool.description.is_empty() {
            println!("    {}", tool.description);
        }
        for param in &tool.parameters {
            let origin = if param.is_claim_filled() {
                " (from auth claims)"
            } else {
                ""
            };
            println!(
                "    ${} {}: {}{}",
                param.param.name, param.param.kind, param.param.description, origin
            );
        }
        for param in &tool.template_parameters {
            println!(
                "    {{{{.{}}}}} {}: {}",
                param.param.name, param.param.kind, param.param.description
            );
        }
        if !tool.auth.required.is_empty() {
            println!("    auth: one of {}", tool.auth.required.join(", "));
        }
    }

    Ok(())
}
