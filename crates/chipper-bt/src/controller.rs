use crate::context::{AgentLocalContext, MovementIntents, TickContext};
use crate::leaves::{Leaf, chop_tree};
use crate::node::{Node, Status};
use chipper_core::config::Config;
use chipper_core::sync::{TaskChannel, ThinkingState};
use chipper_core::{AgentId, AgentSnapshot, BlockPos, Interaction, WorldQuery};
use chipper_nav::Pathfinder;
use log::{debug, info};
use std::sync::Arc;
use std::time::Instant;

/// Status display contents, refreshed at the display rate.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HudSnapshot {
    pub active: bool,
    pub state: &'static str,
    pub tree_target: Option<BlockPos>,
    pub mining_target: Option<BlockPos>,
    pub waypoints: usize,
    pub thinking: ThinkingState,
    pub server_target: Option<BlockPos>,
    pub repositioning: bool,
    pub clearing_leaves: bool,
}

impl HudSnapshot {
    /// Coarse summary of which branch of the tree is in charge.
    pub fn decision(&self) -> &'static str {
        match (self.tree_target, self.waypoints, self.mining_target) {
            (None, _, _) => "Finding tree",
            (Some(_), n, _) if n > 0 => "Following path",
            (Some(_), _, Some(_)) => "Mining target",
            (Some(_), _, None) => "Calculating path",
        }
    }

    /// Plain text lines for a status display.
    pub fn lines(&self) -> Vec<String> {
        fn describe(pos: Option<BlockPos>) -> String {
            pos.map_or_else(|| "None".to_string(), |p| p.to_string())
        }

        let mut lines = vec![
            format!(
                "STATUS: {}",
                if self.active { "ACTIVE" } else { "INACTIVE" }
            ),
            format!("STATE: {}", self.state),
        ];
        if !self.active {
            return lines;
        }

        lines.push(format!("TREE TARGET: {}", describe(self.tree_target)));
        if let Some(mining) = self.mining_target {
            lines.push(format!("MINING BLOCK: {}", mining));
        }
        if self.waypoints > 0 {
            lines.push(format!("PATH: following ({} waypoints)", self.waypoints));
        } else {
            lines.push("PATH: idle or calculating".to_string());
        }
        lines.push(format!("DECISION: {}", self.decision()));
        lines.push(format!("THINKING: {}", self.thinking.description()));
        if self.repositioning {
            lines.push("Server is repositioning".to_string());
        }
        if self.clearing_leaves {
            lines.push("Server is clearing leaves".to_string());
        }
        lines.push(format!("SERVER TARGET: {}", describe(self.server_target)));
        lines
    }
}

/// Reactive controller of one agent: owns the tree, its local context and its path cache.
pub struct Controller {
    agent: AgentId,
    tree: Node<Leaf>,
    local: AgentLocalContext,
    intents: MovementIntents,
    pathfinder: Pathfinder,
    config: Arc<Config>,
    hud: HudSnapshot,
}

impl Controller {
    /// Creates an inactive controller for `agent`.
    ///
    /// # Arguments
    ///
    /// * `agent` - The agent this controller drives.
    /// * `config` - Shared configuration.
    ///
    /// # Returns
    ///
    /// The new [`Controller`].
    pub fn new(agent: AgentId, config: Arc<Config>) -> Self {
        let pathfinder = Pathfinder::new(config.pathfinder.clone());
        Self {
            agent,
            tree: chop_tree(),
            local: AgentLocalContext::new(),
            intents: MovementIntents::default(),
            pathfinder,
            config,
            hud: HudSnapshot::default(),
        }
    }

    pub fn agent(&self) -> AgentId {
        self.agent
    }

    pub fn is_active(&self) -> bool {
        self.local.active
    }

    /// Activates the reactive loop and starts the authoritative task for the agent.
    pub fn activate(&mut self, snapshot: &AgentSnapshot, channel: &dyn TaskChannel) {
        if self.local.active {
            return;
        }
        info!("Activating {}", self.agent);
        self.local.active = true;
        self.local.current_state = "Initializing";
        self.local.last_position = snapshot.position;
        channel.start(self.agent);
    }

    /// Deactivates the loop, forgets all local state and stops the authoritative task.
    pub fn deactivate(&mut self, channel: &dyn TaskChannel, interaction: &mut dyn Interaction) {
        if !self.local.active {
            return;
        }
        info!("Deactivating {}", self.agent);
        self.local.reset();
        self.local.active = false;
        self.local.current_state = "Inactive";
        self.intents.release();
        interaction.cancel_breaking();
        self.hud = HudSnapshot::default();
        channel.stop(self.agent);
    }

    /// Flips the activation state.
    ///
    /// # Returns
    ///
    /// Whether the controller is active afterwards.
    pub fn toggle(
        &mut self,
        snapshot: &AgentSnapshot,
        channel: &dyn TaskChannel,
        interaction: &mut dyn Interaction,
    ) -> bool {
        if self.local.active {
            self.deactivate(channel, interaction);
        } else {
            self.activate(snapshot, channel);
        }
        self.local.active
    }

    /// Runs one host tick. The tree is only evaluated every `ai_interval` ticks.
    ///
    /// # Arguments
    ///
    /// * `world` - The world the agent lives in.
    /// * `snapshot` - Current body state of the agent.
    /// * `channel` - Channel to the authoritative task state machine.
    /// * `interaction` - Block interaction collaborator.
    /// * `now` - Current time.
    ///
    /// # Returns
    ///
    /// The status of the root if the tree was evaluated this tick.
    pub fn tick(
        &mut self,
        world: &dyn WorldQuery,
        snapshot: &AgentSnapshot,
        channel: &dyn TaskChannel,
        interaction: &mut dyn Interaction,
        now: Instant,
    ) -> Option<Status> {
        if !self.local.active {
            return None;
        }

        let mut status = None;
        if self.local.should_process_ai(self.config.behavior.ai_interval) {
            let mut ctx = TickContext {
                world,
                agent: snapshot,
                channel,
                interaction,
                local: &mut self.local,
                intents: &mut self.intents,
                pathfinder: &mut self.pathfinder,
                config: &self.config,
                now,
            };
            let result = self.tree.tick(&mut ctx);
            debug!("{} tree -> {:?} ({})", self.agent, result, self.local.current_state);
            status = Some(result);
        }

        if self.local.should_update_hud(self.config.behavior.hud_interval) {
            self.hud = self.capture_hud(channel);
        }
        status
    }

    /// Movement the host should apply this tick.
    pub fn intents(&self) -> &MovementIntents {
        &self.intents
    }

    pub fn local(&self) -> &AgentLocalContext {
        &self.local
    }

    pub fn hud(&self) -> &HudSnapshot {
        &self.hud
    }

    pub fn pathfinder(&self) -> &Pathfinder {
        &self.pathfinder
    }

    fn capture_hud(&self, channel: &dyn TaskChannel) -> HudSnapshot {
        HudSnapshot {
            active: self.local.active,
            state: self.local.current_state,
            tree_target: self.local.tree_target,
            mining_target: self.local.mining_target,
            waypoints: self.local.path.len(),
            thinking: channel.thinking_state(self.agent),
            server_target: channel.active_target(self.agent).map(BlockPos::containing),
            repositioning: channel.is_repositioning(self.agent),
            clearing_leaves: channel.is_clearing_leaves(self.agent),
        }
    }
}
