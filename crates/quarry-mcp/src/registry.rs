//! Tool registry.
//!
//! A [`Registry`] is one immutable, fully validated snapshot of a
//! configuration: tools, toolsets, source pools and the auth gate. The
//! [`RegistryHandle`] holds the current snapshot and swaps in a new one on
//! reload; invocations that already took a snapshot finish on it.

use crate::error::InvocationError;
use crate::source::{DataSource, SqlSource};
use crate::tool::ToolDefinition;
use quarry_auth::AuthGate;
use quarry_core::{ConfigError, QuarryConfig, SourceConfig};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Toolset names taken by fixed routes under `/mcp/`.
pub const RESERVED_TOOLSET_NAMES: &[&str] = &["sse", "message"];

/// One validated configuration snapshot.
pub struct Registry {
    tools: BTreeMap<String, ToolDefinition>,
    toolsets: BTreeMap<String, Vec<String>>,
    sources: HashMap<String, Arc<dyn DataSource>>,
    auth: AuthGate,
}

impl Registry {
    /// Build a registry, creating one pool per configured source.
    pub fn load(config: &QuarryConfig) -> Result<Self, ConfigError> {
        Self::load_with(config, |name, source| {
            Ok(Arc::new(SqlSource::connect_lazy(name, source)?) as Arc<dyn DataSource>)
        })
    }

    /// Build a registry with a custom source factory.
    ///
    /// The whole configuration is rejected on the first violation.
    pub fn load_with<F>(config: &QuarryConfig, mut make_source: F) -> Result<Self, ConfigError>
    where
        F: FnMut(&str, &SourceConfig) -> Result<Arc<dyn DataSource>, ConfigError>,
    {
        let mut tools = BTreeMap::new();
        for (name, tool_config) in &config.tools {
            let source = config.sources.get(&tool_config.source).ok_or_else(|| {
                ConfigError::invalid(
                    format!("tools.{}", name),
                    format!("unknown source `{}`", tool_config.source),
                )
            })?;
            let tool =
                ToolDefinition::from_config(name, tool_config, source, &config.auth_services)?;
            tools.insert(name.clone(), tool);
        }

        for (name, members) in &config.toolsets {
            let location = format!("toolsets.{}", name);
            if name.is_empty() {
                return Err(ConfigError::invalid(location, "toolset name must not be empty"));
            }
            if RESERVED_TOOLSET_NAMES.contains(&name.as_str()) {
                return Err(ConfigError::invalid(
                    location,
                    format!("`{}` is reserved by the MCP endpoints", name),
                ));
            }
            let mut seen = HashSet::new();
            for member in members {
                if !tools.contains_key(member) {
                    return Err(ConfigError::invalid(
                        location,
                        format!("unknown tool `{}`", member),
                    ));
                }
                if !seen.insert(member.as_str()) {
                    return Err(ConfigError::invalid(
                        location,
                        format!("tool `{}` listed twice", member),
                    ));
                }
            }
        }

        let auth = AuthGate::from_config(&config.auth_services)?;

        let mut sources = HashMap::new();
        for (name, source_config) in &config.sources {
            sources.insert(name.clone(), make_source(name, source_config)?);
        }

        tracing::info!(
            tools = tools.len(),
            toolsets = config.toolsets.len(),
            sources = sources.len(),
            auth_services = config.auth_services.len(),
            "Registry loaded"
        );

        Ok(Self {
            tools,
            toolsets: config.toolsets.clone(),
            sources,
            auth,
        })
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Result<&ToolDefinition, InvocationError> {
        self.tools
            .get(name)
            .ok_or_else(|| InvocationError::ToolNotFound {
                name: name.to_string(),
            })
    }

    /// Tools of a toolset, in configured order.
    ///
    /// The empty name is the default toolset: every tool, ordered by name.
    pub fn resolve_toolset(&self, name: &str) -> Result<Vec<&ToolDefinition>, InvocationError> {
        if name.is_empty() {
            return Ok(self.tools.values().collect());
        }
        let members = self
            .toolsets
            .get(name)
            .ok_or_else(|| InvocationError::ToolsetNotFound {
                name: name.to_string(),
            })?;
        Ok(members.iter().filter_map(|m| self.tools.get(m)).collect())
    }

    /// Look up a tool within a toolset scope.
    pub fn get_in_toolset(
        &self,
        toolset: &str,
        name: &str,
    ) -> Result<&ToolDefinition, InvocationError> {
        let in_scope = toolset.is_empty()
            || self
                .toolsets
                .get(toolset)
                .ok_or_else(|| InvocationError::ToolsetNotFound {
                    name: toolset.to_string(),
                })?
                .iter()
                .any(|m| m == name);
        if !in_scope {
            return Err(InvocationError::ToolNotFound {
                name: name.to_string(),
            });
        }
        self.get(name)
    }

    /// Names of the configured toolsets.
    pub fn toolset_names(&self) -> Vec<&str> {
        self.toolsets.keys().map(|s| s.as_str()).collect()
    }

    /// Source a tool runs against.
    pub fn source(&self, name: &str) -> Option<&Arc<dyn DataSource>> {
        self.sources.get(name)
    }

    pub fn auth(&self) -> &AuthGate {
        &self.auth
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Shared handle to the current registry snapshot.
#[derive(Clone)]
pub struct RegistryHandle {
    current: Arc<RwLock<Arc<Registry>>>,
}

impl RegistryHandle {
    pub fn new(registry: Registry) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(registry))),
        }
    }

    /// The current snapshot. Holding it keeps it alive across reloads.
    pub async fn snapshot(&self) -> Arc<Registry> {
        self.current.read().await.clone()
    }

    /// Replace the current snapshot, returning the previous one.
    pub async fn swap(&self, registry: Registry) -> Arc<Registry> {
        let mut current = self.current.write().await;
        std::mem::replace(&mut *current, Arc::new(registry))
    }
}
