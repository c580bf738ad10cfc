//! Authority node configuration.

use crate::error::{AuthorityError, AuthorityResult};
use serde::{Deserialize, Serialize};
use starport_types::{TemplateId, Transform};
use std::time::Duration;

/// A spawnable template and its population cap.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TemplateConfig {
    pub id: TemplateId,
    /// Falls back to `AuthorityConfig::default_population_cap` when unset.
    #[serde(default)]
    pub population_cap: Option<usize>,
}

impl TemplateConfig {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: TemplateId::new(id),
            population_cap: None,
        }
    }

    pub fn with_cap(mut self, cap: usize) -> Self {
        self.population_cap = Some(cap);
        self
    }
}

/// Configuration for the authority node.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorityConfig {
    /// Capacity of the command channel feeding the node loop.
    pub command_capacity: usize,

    /// Capacity of the channel carrying game-logic events.
    pub event_capacity: usize,

    /// Population cap for templates that do not set their own.
    pub default_population_cap: usize,

    /// Half-size of the cube around a spawn point that must be free of live instances.
    pub spawn_block_radius: f32,

    /// How long a disposer holds items before despawning them (milliseconds).
    pub disposal_duration_ms: u64,

    /// Upper bound on a single interaction policy decision (milliseconds).
    pub policy_timeout_ms: u64,

    /// Template used for player characters.
    pub actor_template: TemplateId,

    /// Where new actors appear, used in turn. Empty means the origin.
    pub actor_spawn_points: Vec<Transform>,

    /// Templates the spawn coordinator may instantiate.
    pub templates: Vec<TemplateConfig>,
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            command_capacity: 32,
            event_capacity: 256,
            default_population_cap: 100,
            spawn_block_radius: 0.5,
            disposal_duration_ms: 3_000,
            policy_timeout_ms: 1_000,
            actor_template: TemplateId::new("character"),
            actor_spawn_points: Vec::new(),
            templates: Vec::new(),
        }
    }
}

impl AuthorityConfig {
    /// Parses a config from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> AuthorityResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_template(mut self, template: TemplateConfig) -> Self {
        self.templates.push(template);
        self
    }

    pub fn validate(&self) -> AuthorityResult<()> {
        if self.command_capacity == 0 || self.event_capacity == 0 {
            return Err(AuthorityError::Config(
                "channel capacities must be non-zero".into(),
            ));
        }
        if self.policy_timeout_ms == 0 {
            return Err(AuthorityError::Config("policy_timeout_ms must be non-zero".into()));
        }
        if self.disposal_duration_ms < 100 {
            return Err(AuthorityError::Config(
                "disposal_duration_ms must be at least 100".into(),
            ));
        }
        if !self.spawn_block_radius.is_finite() || self.spawn_block_radius < 0.0 {
            return Err(AuthorityError::Config(
                "spawn_block_radius must be a non-negative number".into(),
            ));
        }
        if let Some(t) = self.templates.iter().find(|t| t.population_cap == Some(0)) {
            return Err(AuthorityError::Config(format!(
                "template {} has a zero population cap",
                t.id
            )));
        }
        Ok(())
    }

    pub fn disposal_duration(&self) -> Duration {
        Duration::from_millis(self.disposal_duration_ms)
    }

    pub fn policy_timeout(&self) -> Duration {
        Duration::from_millis(self.policy_timeout_ms)
    }

    /// Effective cap for `template`, or `None` if the template is not configured.
    pub fn population_cap(&self, template: &TemplateId) -> Option<usize> {
        self.templates
            .iter()
            .find(|t| t.id == *template)
            .map(|t| t.population_cap.unwrap_or(self.default_population_cap))
    }
}
