use chipper_core::config::Config;
use chipper_core::sync::TaskChannel;
use chipper_core::{AgentSnapshot, BlockPos, Interaction, Rotation, Ticks, Vec3, WorldQuery};
use chipper_nav::Pathfinder;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Key presses and facing requested by the behavior tree.
///
/// Intents persist until a leaf changes them, the host applies them every tick.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MovementIntents {
    pub forward: bool,
    pub back: bool,
    pub left: bool,
    pub right: bool,
    pub jump: bool,
    pub sprint: bool,
    /// Facing to turn to, `None` keeps the current facing.
    pub look: Option<Rotation>,
}

impl MovementIntents {
    /// Releases every movement key.
    pub fn release(&mut self) {
        *self = Self {
            look: self.look,
            ..Self::default()
        };
    }

    pub fn is_moving(&self) -> bool {
        self.forward || self.back || self.left || self.right || self.jump
    }
}

/// Timestamp of the last time a rate limited leaf fired.
#[derive(Debug, Clone, Copy, Default)]
pub struct Cooldown {
    last_fired: Option<Instant>,
}

impl Cooldown {
    /// Fires and restarts the cooldown if `period` elapsed since the last firing.
    pub fn try_fire(&mut self, now: Instant, period: Duration) -> bool {
        let ready = self
            .last_fired
            .is_none_or(|last| now.saturating_duration_since(last) >= period);
        if ready {
            self.last_fired = Some(now);
        }
        ready
    }
}

/// Per-agent cooldowns of the rate limited leaves.
#[derive(Debug, Clone, Copy, Default)]
pub struct Cooldowns {
    pub emergency: Cooldown,
    pub search: Cooldown,
    pub invalidate: Cooldown,
}

/// Everything the reactive loop remembers about its agent.
#[derive(Debug, Clone)]
pub struct AgentLocalContext {
    pub active: bool,
    /// Label of what the tree did last, shown on the status display.
    pub current_state: &'static str,
    pub tree_target: Option<BlockPos>,
    pub mining_target: Option<BlockPos>,
    /// Remaining waypoints, consumed front first.
    pub path: VecDeque<BlockPos>,
    pub last_position: Vec3,
    pub ticks_stuck: u32,
    /// Evaluations spent in the current stuck recovery, zero when not recovering.
    pub resolve_ticks: u32,
    pub ai_tick_counter: Ticks,
    pub hud_tick_counter: Ticks,
    pub last_mine_time: Option<Instant>,
    pub cooldowns: Cooldowns,
}

impl Default for AgentLocalContext {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentLocalContext {
    pub fn new() -> Self {
        Self {
            active: false,
            current_state: "Inactive",
            tree_target: None,
            mining_target: None,
            path: VecDeque::new(),
            last_position: Vec3::new(0.0, 0.0, 0.0),
            ticks_stuck: 0,
            resolve_ticks: 0,
            ai_tick_counter: 0,
            hud_tick_counter: 0,
            last_mine_time: None,
            cooldowns: Cooldowns::default(),
        }
    }

    /// Forgets targets, path and stuck tracking.
    pub fn reset(&mut self) {
        self.tree_target = None;
        self.mining_target = None;
        self.path.clear();
        self.ticks_stuck = 0;
        self.resolve_ticks = 0;
        self.last_mine_time = None;
    }

    /// Counts a tick and reports whether the tree is due for evaluation.
    pub fn should_process_ai(&mut self, interval: Ticks) -> bool {
        self.ai_tick_counter += 1;
        if self.ai_tick_counter >= interval {
            self.ai_tick_counter = 0;
            true
        } else {
            false
        }
    }

    /// Counts a tick and reports whether the status display is due for a refresh.
    pub fn should_update_hud(&mut self, interval: Ticks) -> bool {
        self.hud_tick_counter += 1;
        if self.hud_tick_counter >= interval {
            self.hud_tick_counter = 0;
            true
        } else {
            false
        }
    }
}

/// What a leaf sees while the tree is being ticked.
pub struct TickContext<'a> {
    pub world: &'a dyn WorldQuery,
    pub agent: &'a AgentSnapshot,
    pub channel: &'a dyn TaskChannel,
    pub interaction: &'a mut dyn Interaction,
    pub local: &'a mut AgentLocalContext,
    pub intents: &'a mut MovementIntents,
    pub pathfinder: &'a mut Pathfinder,
    pub config: &'a Config,
    pub now: Instant,
}

impl TickContext<'_> {
    /// Releases every key and stops breaking blocks.
    pub fn release_all(&mut self) {
        self.intents.release();
        self.interaction.cancel_breaking();
    }
}
