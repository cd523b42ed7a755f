use crate::errors::{BrainError, BrainResult};
use crate::machine::AgentBrain;
use chipper_core::AgentId;
use chipper_core::config::Config;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use log::info;
use std::sync::Arc;

/// The brains of all active agents, keyed by agent.
///
/// Cloning the registry shares the underlying map, so the task loop and the
/// channel handles see the same agents. An agent is active exactly while it
/// has an entry.
#[derive(Debug, Clone)]
pub struct BrainRegistry {
    brains: Arc<DashMap<AgentId, AgentBrain>>,
    config: Arc<Config>,
}

impl BrainRegistry {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            brains: Arc::new(DashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    /// Creates a fresh brain for `agent`.
    ///
    /// # Returns
    ///
    /// `false` if the agent was already active, its brain is left untouched.
    pub fn start(&self, agent: AgentId) -> bool {
        match self.brains.entry(agent) {
            Entry::Occupied(_) => false,
            Entry::Vacant(vacant) => {
                vacant.insert(AgentBrain::new(&self.config));
                info!("Started {}", agent);
                true
            }
        }
    }

    /// Drops the brain of `agent`.
    ///
    /// # Returns
    ///
    /// Whether the agent was active.
    pub fn stop(&self, agent: AgentId) -> bool {
        let removed = self.brains.remove(&agent).is_some();
        if removed {
            info!("Stopped {}", agent);
        }
        removed
    }

    pub fn contains(&self, agent: AgentId) -> bool {
        self.brains.contains_key(&agent)
    }

    pub fn len(&self) -> usize {
        self.brains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.brains.is_empty()
    }

    /// Active agents in ascending order.
    pub fn agents(&self) -> Vec<AgentId> {
        let mut agents: Vec<AgentId> = self.brains.iter().map(|entry| *entry.key()).collect();
        agents.sort();
        agents
    }

    /// Runs `f` on the brain of `agent` if it is active.
    pub fn read<R>(&self, agent: AgentId, f: impl FnOnce(&AgentBrain) -> R) -> Option<R> {
        self.brains.get(&agent).map(|brain| f(&brain))
    }

    /// Runs `f` on the brain of `agent` if it is active.
    ///
    /// `f` must not call back into the registry.
    pub fn update<R>(&self, agent: AgentId, f: impl FnOnce(&mut AgentBrain) -> R) -> Option<R> {
        self.brains.get_mut(&agent).map(|mut brain| f(&mut brain))
    }

    /// Status line of an active agent.
    pub fn status(&self, agent: AgentId) -> BrainResult<String> {
        self.read(agent, |brain| format!("Active | {}", brain.summary()))
            .ok_or(BrainError::UnknownAgent(agent))
    }
}
