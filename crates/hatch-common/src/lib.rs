use std::collections::HashMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub mod events;
pub mod logging;

// ============================================================================
// Connection Parameters
// ============================================================================

/// Connection parameters for a single pooled container.
///
/// Produced by a pool's adapter from the container's inspection snapshot and
/// handed to checkout callers and lifecycle actions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Params {
    /// Container id this record belongs to.
    pub id: String,
    pub hostname: String,
    /// Published host port bound to the pool's primary exposed port.
    pub port: u16,
    /// Full exposed-port to host-port map.
    #[serde(default)]
    pub ports: HashMap<u16, u16>,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub database: String,
    /// Rendered connection URL.
    #[serde(default)]
    pub url: String,
}

// ============================================================================
// Pool Definitions
// ============================================================================

/// Declarative definition of a single pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PoolSpec {
    /// Container image reference.
    pub image: String,
    /// Target population.
    pub size: usize,
    /// Primary exposed TCP port.
    pub port: u16,
    #[serde(default)]
    pub container: ContainerSection,
    #[serde(default)]
    pub params: ParamsTemplate,
    #[serde(default)]
    pub actions: LifecycleSpec,
}

/// Container-level settings for a pool.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContainerSection {
    /// Environment entries, `KEY=VAL` form.
    #[serde(default)]
    pub env: Vec<String>,
}

/// Template variables used to build [`Params`] records.
///
/// The `url` template may reference `{{.Hostname}}`, `{{.Port}}`,
/// `{{.Username}}`, `{{.Password}}` and `{{.Database}}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParamsTemplate {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub database: String,
    #[serde(default)]
    pub url: String,
}

/// Declared lifecycle actions for a pool.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LifecycleSpec {
    #[serde(default)]
    pub healthcheck: Option<ActionSpec>,
    #[serde(default)]
    pub initialize: Option<ActionSpec>,
    #[serde(default)]
    pub reset: Option<ActionSpec>,
}

/// Raw declaration of one action.
///
/// `kind` selects the registered plugin; retry settings are shared by every
/// plugin, anything else stays in `rest` for the plugin's own parser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionSpec {
    #[serde(rename = "type")]
    pub kind: String,
    /// Attempt budget (at least 1).
    pub retries: Option<u32>,
    /// Per-attempt timeout in milliseconds.
    pub timeout: Option<u64>,
    /// Delay between attempts in milliseconds.
    pub delay: Option<u64>,
    #[serde(flatten)]
    pub rest: serde_json::Map<String, serde_json::Value>,
}

impl ActionSpec {
    /// Shorthand used by tests and builders.
    pub fn of_kind(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            retries: None,
            timeout: None,
            delay: None,
            rest: serde_json::Map::new(),
        }
    }

    /// Deserialize the plugin-specific remainder of the declaration.
    pub fn plugin_fields<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(serde_json::Value::Object(self.rest.clone()))
    }
}

/// A full configuration document: named pools in declaration order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PoolsFile {
    #[serde(default)]
    pub pools: IndexMap<String, PoolSpec>,
}
