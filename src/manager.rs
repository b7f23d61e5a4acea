//! Process-wide arena orchestration.
//!
//! The manager owns the template registry, the running instances, and the
//! pieces every instance shares: the event bus, the player registry, the
//! victory-rule registry, and the list of restoration modules. It is the
//! explicit init/teardown boundary — [`shutdown`](ArenaManager::shutdown)
//! releases everything, and the whole state is re-creatable afterwards.

use std::sync::{Arc, PoisonError, RwLock};

use dashmap::DashMap;
use indexmap::IndexMap;
use tracing::{info, warn};

use crate::arena::{Arena, ArenaRuntime, Phase};
use crate::config::schema::{ArenaTemplate, ArenasConfig};
use crate::error::{JoinError, TemplateError};
use crate::event::EventBus;
use crate::ids::{InstanceId, ModuleId, PlayerId, TeamId};
use crate::registry::PlayerRegistry;
use crate::victory::VictoryRegistry;

struct InstanceEntry {
    arena: Arc<Arena>,
    runtime: Option<ArenaRuntime>,
}

/// Registry of templates and running instances.
pub struct ArenaManager {
    templates: RwLock<IndexMap<String, Arc<ArenaTemplate>>>,
    instances: DashMap<InstanceId, InstanceEntry>,
    bus: Arc<EventBus>,
    players: Arc<PlayerRegistry>,
    rules: Arc<VictoryRegistry>,
    restorers: Arc<RwLock<Vec<ModuleId>>>,
}

impl ArenaManager {
    /// Creates a manager sharing the given bus and rule registry.
    #[must_use]
    pub fn new(bus: Arc<EventBus>, rules: Arc<VictoryRegistry>) -> Self {
        Self {
            templates: RwLock::new(IndexMap::new()),
            instances: DashMap::new(),
            bus,
            players: Arc::new(PlayerRegistry::new()),
            rules,
            restorers: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// The shared event bus.
    #[must_use]
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// The process-wide player registry.
    #[must_use]
    pub fn players(&self) -> &Arc<PlayerRegistry> {
        &self.players
    }

    // -- templates ----------------------------------------------------------

    /// Registers a template, validating it against the victory-rule
    /// registry and its own layout.
    ///
    /// # Errors
    ///
    /// [`TemplateError::DuplicateTemplate`],
    /// [`TemplateError::UnknownVictoryRule`], or
    /// [`TemplateError::InvalidLayout`].
    pub fn register_template(&self, template: ArenaTemplate) -> Result<(), TemplateError> {
        if !self.rules.contains(&template.victory_rule) {
            return Err(TemplateError::UnknownVictoryRule {
                rule: template.victory_rule.clone(),
                template: template.name.clone(),
            });
        }
        if template.teams.count == 0 || template.teams.capacity == 0 {
            return Err(TemplateError::InvalidLayout {
                template: template.name.clone(),
                message: "team count and capacity must be positive".to_string(),
            });
        }
        if template.min_players == 0 || template.min_players > template.max_players() {
            return Err(TemplateError::InvalidLayout {
                template: template.name.clone(),
                message: format!(
                    "min_players {} outside 1..={}",
                    template.min_players,
                    template.max_players()
                ),
            });
        }

        let mut templates = self
            .templates
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if templates.contains_key(&template.name) {
            return Err(TemplateError::DuplicateTemplate(template.name));
        }
        info!(template = %template.name, rule = %template.victory_rule, "template registered");
        templates.insert(template.name.clone(), Arc::new(template));
        Ok(())
    }

    /// Registers every template of a loaded configuration, in file order.
    ///
    /// # Errors
    ///
    /// Stops at the first [`TemplateError`].
    pub fn load_config(&self, config: ArenasConfig) -> Result<(), TemplateError> {
        for template in config.templates {
            self.register_template(template)?;
        }
        Ok(())
    }

    /// Looks up a registered template.
    #[must_use]
    pub fn template(&self, name: &str) -> Option<Arc<ArenaTemplate>> {
        self.templates
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Registered template names, in registration order.
    #[must_use]
    pub fn template_names(&self) -> Vec<String> {
        self.templates
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    // -- instances ----------------------------------------------------------

    /// Creates an idle instance of a registered template.
    ///
    /// A timer driver is spawned when a tokio runtime is available;
    /// without one the instance still serves every synchronous operation,
    /// which the unit tests use.
    ///
    /// # Errors
    ///
    /// [`TemplateError::NotFound`], or [`TemplateError::UnknownVictoryRule`]
    /// if the rule was unregistered after the template was accepted.
    pub fn create_instance(&self, template_name: &str) -> Result<Arc<Arena>, TemplateError> {
        let template = self
            .template(template_name)
            .ok_or_else(|| TemplateError::NotFound(template_name.to_string()))?;
        let rule =
            self.rules
                .create(&template)
                .ok_or_else(|| TemplateError::UnknownVictoryRule {
                    rule: template.victory_rule.clone(),
                    template: template.name.clone(),
                })?;

        let arena = Arena::new(
            InstanceId::new(),
            template,
            rule,
            Arc::clone(&self.bus),
            Arc::clone(&self.players),
            Arc::clone(&self.restorers),
        );
        let runtime = tokio::runtime::Handle::try_current()
            .ok()
            .map(|_| ArenaRuntime::spawn(Arc::clone(&arena)));

        info!(arena = %arena.id(), template = template_name, "instance created");
        self.instances.insert(
            arena.id(),
            InstanceEntry {
                arena: Arc::clone(&arena),
                runtime,
            },
        );
        crate::observability::metrics::record_active_instances(self.instances.len());
        Ok(arena)
    }

    /// Looks up a running instance.
    #[must_use]
    pub fn instance(&self, id: InstanceId) -> Option<Arc<Arena>> {
        self.instances.get(&id).map(|e| Arc::clone(&e.arena))
    }

    /// Every running instance, in no particular order.
    #[must_use]
    pub fn list_instances(&self) -> Vec<Arc<Arena>> {
        self.instances
            .iter()
            .map(|e| Arc::clone(&e.arena))
            .collect()
    }

    /// Tears one instance down, forcing it through the synthesized
    /// transition chain. Returns whether it existed.
    pub fn teardown_instance(&self, id: InstanceId) -> bool {
        let Some((_, entry)) = self.instances.remove(&id) else {
            return false;
        };
        entry.arena.force_shutdown();
        if let Some(runtime) = entry.runtime {
            runtime.abort();
        }
        crate::observability::metrics::record_active_instances(self.instances.len());
        true
    }

    // -- participant surface -------------------------------------------------

    /// Joins a player into a running instance.
    ///
    /// # Errors
    ///
    /// [`JoinError::NoSuchInstance`], or any rejection from
    /// [`Arena::join`].
    pub fn join(
        &self,
        id: InstanceId,
        player: PlayerId,
        requested: Option<TeamId>,
    ) -> Result<TeamId, JoinError> {
        let arena = self.instance(id).ok_or(JoinError::NoSuchInstance(id))?;
        arena.join(player, requested)
    }

    /// Removes a player from a running instance. Returns whether they were
    /// a member there.
    #[must_use]
    pub fn leave(&self, id: InstanceId, player: &PlayerId) -> bool {
        self.instance(id).is_some_and(|arena| arena.leave(player))
    }

    // -- restoration ---------------------------------------------------------

    /// Registers a restoration module. Instances entering `Restoring`
    /// snapshot the current list as their pending set.
    pub fn register_restorer(&self, module: ModuleId) {
        let mut restorers = self
            .restorers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if !restorers.contains(&module) {
            info!(module = %module, "restorer registered");
            restorers.push(module);
        }
    }

    /// Removes a restoration module from future snapshots. Instances
    /// already in `Restoring` keep waiting for it until their timeout.
    pub fn unregister_restorer(&self, module: &ModuleId) {
        self.restorers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|m| m != module);
    }

    /// Routes a restorer's completion report to an instance. Returns
    /// whether the instance exists.
    pub fn restoration_complete(&self, id: InstanceId, module: &ModuleId) -> bool {
        match self.instance(id) {
            Some(arena) => {
                arena.restoration_complete(module);
                true
            }
            None => {
                warn!(arena = %id, module = %module, "restoration report for unknown instance");
                false
            }
        }
    }

    // -- teardown boundary ----------------------------------------------------

    /// Releases everything: forces every instance down, clears templates,
    /// memberships, restorers, and bus subscriptions. The manager is fully
    /// re-usable afterwards.
    pub fn shutdown(&self) {
        let ids: Vec<InstanceId> = self.instances.iter().map(|e| *e.key()).collect();
        for id in ids {
            self.teardown_instance(id);
        }
        self.templates
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.restorers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.players.teardown();
        self.bus.teardown();
        info!("arena manager shut down");
    }

    /// Count of instances currently in each non-idle phase; handy for the
    /// administrative surface.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.instances
            .iter()
            .filter(|e| e.arena.phase() != Phase::Idle)
            .count()
    }
}

impl std::fmt::Debug for ArenaManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArenaManager")
            .field("templates", &self.template_names())
            .field("instances", &self.instances.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::test_support::template;

    fn manager() -> ArenaManager {
        ArenaManager::new(
            Arc::new(EventBus::new()),
            Arc::new(VictoryRegistry::with_builtins()),
        )
    }

    #[test]
    fn register_and_lookup_template() {
        let m = manager();
        m.register_template(template("duel", 2, 2, 2)).unwrap();
        assert!(m.template("duel").is_some());
        assert_eq!(m.template_names(), vec!["duel".to_string()]);
    }

    #[test]
    fn duplicate_template_is_rejected() {
        let m = manager();
        m.register_template(template("duel", 2, 2, 2)).unwrap();
        assert!(matches!(
            m.register_template(template("duel", 2, 2, 2)),
            Err(TemplateError::DuplicateTemplate(_))
        ));
    }

    #[test]
    fn unknown_victory_rule_is_fatal_at_registration() {
        let m = manager();
        let mut t = template("duel", 2, 2, 2);
        t.victory_rule = "coin_flip".to_string();
        assert!(matches!(
            m.register_template(t),
            Err(TemplateError::UnknownVictoryRule { .. })
        ));
    }

    #[test]
    fn impossible_layout_is_rejected() {
        let m = manager();
        let t = template("cramped", 1, 1, 5);
        assert!(matches!(
            m.register_template(t),
            Err(TemplateError::InvalidLayout { .. })
        ));
    }

    #[test]
    fn create_instance_requires_a_template() {
        let m = manager();
        assert!(matches!(
            m.create_instance("ghost"),
            Err(TemplateError::NotFound(_))
        ));
    }

    #[test]
    fn create_list_and_teardown() {
        let m = manager();
        m.register_template(template("duel", 2, 2, 2)).unwrap();
        let arena = m.create_instance("duel").unwrap();
        assert_eq!(m.list_instances().len(), 1);
        assert!(m.instance(arena.id()).is_some());

        assert!(m.teardown_instance(arena.id()));
        assert!(m.list_instances().is_empty());
        assert!(!m.teardown_instance(arena.id()));
    }

    #[test]
    fn single_membership_across_instances() {
        let m = manager();
        m.register_template(template("duel", 2, 2, 2)).unwrap();
        let first = m.create_instance("duel").unwrap();
        let second = m.create_instance("duel").unwrap();

        m.join(first.id(), PlayerId::new("steve"), None).unwrap();
        let err = m
            .join(second.id(), PlayerId::new("steve"), None)
            .unwrap_err();
        assert!(matches!(err, JoinError::AlreadyMember { .. }));

        // Teardown of the first frees the player for the second.
        m.teardown_instance(first.id());
        m.join(second.id(), PlayerId::new("steve"), None).unwrap();
    }

    #[test]
    fn join_unknown_instance() {
        let m = manager();
        assert!(matches!(
            m.join(InstanceId::new(), PlayerId::new("a"), None),
            Err(JoinError::NoSuchInstance(_))
        ));
    }

    #[test]
    fn restorer_registration_is_idempotent() {
        let m = manager();
        m.register_restorer(ModuleId::from("world"));
        m.register_restorer(ModuleId::from("world"));
        assert_eq!(
            m.restorers
                .read()
                .unwrap()
                .len(),
            1
        );
        m.unregister_restorer(&ModuleId::from("world"));
        assert!(m.restorers.read().unwrap().is_empty());
    }

    #[test]
    fn shutdown_releases_everything_and_is_rebuildable() {
        let m = manager();
        m.register_template(template("duel", 2, 2, 2)).unwrap();
        let arena = m.create_instance("duel").unwrap();
        m.join(arena.id(), PlayerId::new("a"), None).unwrap();
        m.register_restorer(ModuleId::from("world"));

        m.shutdown();
        assert!(m.list_instances().is_empty());
        assert!(m.template_names().is_empty());
        assert!(m.players().is_empty());

        // Everything is re-creatable after teardown.
        m.register_template(template("duel", 2, 2, 2)).unwrap();
        let again = m.create_instance("duel").unwrap();
        m.join(again.id(), PlayerId::new("a"), None).unwrap();
    }
}
