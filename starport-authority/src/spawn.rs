//! Spawn coordinator: creates objects that start life under the registry.
//!
//! Population caps and the blocking-volume check are evaluated inside the
//! same `&mut self` call that performs the spawn, on the node loop, so two
//! spawn requests can never both pass a nearly-full cap.

use crate::config::AuthorityConfig;
use crate::error::{AuthorityError, AuthorityResult};
use crate::registry::{AuthorityRegistry, NodeRole};
use starport_types::{ObjectId, SpawnFailureReason, TemplateId, Transform, Vec3, Volume};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info, warn};

/// Creates and destroys replicated object instances. Implemented by the host engine.
pub trait ObjectFactory: Send {
    fn instantiate(&mut self, template: &TemplateId, transform: &Transform) -> AuthorityResult<ObjectId>;

    fn destroy(&mut self, _object: &ObjectId) {}
}

/// Factory that only allocates ids. Used when the host keeps no scene graph.
#[derive(Debug, Default)]
pub struct LocalObjectFactory;

impl ObjectFactory for LocalObjectFactory {
    fn instantiate(&mut self, _template: &TemplateId, _transform: &Transform) -> AuthorityResult<ObjectId> {
        Ok(ObjectId::new())
    }
}

/// Why `spawn_under_authority` returned no object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpawnFailure {
    NotAuthorityNode,
    UnknownTemplate(TemplateId),
    LimitReached,
    Blocked,
    Factory(String),
}

impl SpawnFailure {
    /// The reason observers are told about. Local failures are not broadcast.
    pub fn broadcast_reason(&self) -> Option<SpawnFailureReason> {
        match self {
            SpawnFailure::LimitReached => Some(SpawnFailureReason::LimitReached),
            SpawnFailure::Blocked => Some(SpawnFailureReason::Blocked),
            _ => None,
        }
    }
}

impl fmt::Display for SpawnFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpawnFailure::NotAuthorityNode => write!(f, "not the authority node"),
            SpawnFailure::UnknownTemplate(t) => write!(f, "unknown template {t}"),
            SpawnFailure::LimitReached => write!(f, "population limit reached"),
            SpawnFailure::Blocked => write!(f, "spawn point blocked"),
            SpawnFailure::Factory(e) => write!(f, "factory failed: {e}"),
        }
    }
}

/// A successful spawn, ready to be announced.
#[derive(Debug, Clone, PartialEq)]
pub struct Spawned {
    pub object: ObjectId,
    pub template: TemplateId,
    pub transform: Transform,
}

#[derive(Debug, Clone)]
struct Instance {
    template: TemplateId,
    position: Vec3,
}

pub struct SpawnCoordinator {
    role: NodeRole,
    caps: HashMap<TemplateId, usize>,
    default_cap: usize,
    block_radius: f32,
    instances: HashMap<ObjectId, Instance>,
    population: HashMap<TemplateId, usize>,
    factory: Box<dyn ObjectFactory>,
}

impl SpawnCoordinator {
    pub fn new(role: NodeRole, config: &AuthorityConfig, factory: Box<dyn ObjectFactory>) -> Self {
        let caps = config
            .templates
            .iter()
            .map(|t| (t.id.clone(), t.population_cap.unwrap_or(config.default_population_cap)))
            .collect();
        Self {
            role,
            caps,
            default_cap: config.default_population_cap,
            block_radius: config.spawn_block_radius,
            instances: HashMap::new(),
            population: HashMap::new(),
            factory,
        }
    }

    /// Makes `template` spawnable with the given cap, or the default cap.
    pub fn register_template(&mut self, template: TemplateId, cap: Option<usize>) {
        self.caps.insert(template, cap.unwrap_or(self.default_cap));
    }

    /// Creates an instance at `transform` with a fresh, unowned authority record.
    ///
    /// The cap is checked before the spawn point, so a full template always
    /// reports `LimitReached`.
    pub fn spawn_under_authority(
        &mut self,
        template: &TemplateId,
        transform: Transform,
        registry: &mut AuthorityRegistry,
    ) -> Result<Spawned, SpawnFailure> {
        if self.role != NodeRole::Authority || registry.role() != NodeRole::Authority {
            warn!("[SPAWN] Refusing to spawn {} off the authority node", template);
            return Err(SpawnFailure::NotAuthorityNode);
        }

        let cap = *self
            .caps
            .get(template)
            .ok_or_else(|| SpawnFailure::UnknownTemplate(template.clone()))?;

        let live = self.population(template);
        if live >= cap {
            info!("[SPAWN] {} has reached its limit of {}", template, cap);
            return Err(SpawnFailure::LimitReached);
        }

        if let Some(blocker) = self.first_blocker(&transform.position) {
            info!("[SPAWN] {} spawn point blocked by {}", template, blocker);
            return Err(SpawnFailure::Blocked);
        }

        let object = self
            .factory
            .instantiate(template, &transform)
            .map_err(|e| SpawnFailure::Factory(e.to_string()))?;

        if let Err(e) = registry.register(object) {
            self.factory.destroy(&object);
            return Err(match e {
                AuthorityError::NotAuthorityNode => SpawnFailure::NotAuthorityNode,
                other => SpawnFailure::Factory(other.to_string()),
            });
        }

        self.instances.insert(
            object,
            Instance {
                template: template.clone(),
                position: transform.position,
            },
        );
        *self.population.entry(template.clone()).or_default() += 1;
        info!("[SPAWN] Spawned {} as {} ({}/{})", template, object, live + 1, cap);

        Ok(Spawned {
            object,
            template: template.clone(),
            transform,
        })
    }

    fn first_blocker(&self, point: &Vec3) -> Option<ObjectId> {
        let volume = Volume::cube(*point, self.block_radius);
        self.instances
            .iter()
            .filter(|(_, i)| volume.contains(&i.position))
            .map(|(id, _)| *id)
            .min()
    }

    /// Forgets a spawned instance and frees its population slot.
    ///
    /// Returns the template, or `None` if the object was not spawned here.
    pub fn despawn(&mut self, object: &ObjectId) -> Option<TemplateId> {
        let instance = self.instances.remove(object)?;
        if let Some(count) = self.population.get_mut(&instance.template) {
            *count = count.saturating_sub(1);
        }
        self.factory.destroy(object);
        debug!("[SPAWN] Despawned {} ({})", object, instance.template);
        Some(instance.template)
    }

    /// Returns false for objects this coordinator did not spawn.
    pub fn report_position(&mut self, object: &ObjectId, position: Vec3) -> bool {
        match self.instances.get_mut(object) {
            Some(instance) => {
                instance.position = position;
                true
            }
            None => false,
        }
    }

    pub fn position_of(&self, object: &ObjectId) -> Option<Vec3> {
        self.instances.get(object).map(|i| i.position)
    }

    /// Live instances inside `volume`, sorted.
    pub fn instances_in(&self, volume: &Volume) -> Vec<ObjectId> {
        let mut found: Vec<ObjectId> = self
            .instances
            .iter()
            .filter(|(_, i)| volume.contains(&i.position))
            .map(|(id, _)| *id)
            .collect();
        found.sort();
        found
    }

    /// Every live instance with its template and last known position, sorted.
    pub fn instances(&self) -> Vec<(ObjectId, TemplateId, Vec3)> {
        let mut all: Vec<_> = self
            .instances
            .iter()
            .map(|(id, i)| (*id, i.template.clone(), i.position))
            .collect();
        all.sort_by_key(|(id, _, _)| *id);
        all
    }

    pub fn population(&self, template: &TemplateId) -> usize {
        self.population.get(template).copied().unwrap_or(0)
    }

    pub fn is_live(&self, object: &ObjectId) -> bool {
        self.instances.contains_key(object)
    }

    /// Delegates to the factory; the object is not tracked against any cap.
    pub(crate) fn instantiate_untracked(
        &mut self,
        template: &TemplateId,
        transform: &Transform,
    ) -> AuthorityResult<ObjectId> {
        self.factory.instantiate(template, transform)
    }

    pub(crate) fn destroy_untracked(&mut self, object: &ObjectId) {
        self.factory.destroy(object);
    }
}

impl fmt::Debug for SpawnCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpawnCoordinator")
            .field("role", &self.role)
            .field("templates", &self.caps.len())
            .field("instances", &self.instances.len())
            .finish()
    }
}
