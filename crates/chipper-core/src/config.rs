//! Tunables of the agent.
//!
//! All values default to the behaviour the agent was tuned with. Loading
//! them from disk is the host's business.

use crate::Ticks;
use crate::errors::{CoreError, CoreResult};
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub pathfinder: PathfinderConfig,
    pub behavior: BehaviorConfig,
    pub task: TaskConfig,
    pub intelligence: IntelligenceConfig,
}

impl Config {
    /// Checks that every value is usable.
    ///
    /// # Returns
    ///
    /// [`CoreError::InvalidConfig`] naming the first offending value.
    pub fn validate(&self) -> CoreResult<()> {
        fn ensure(ok: bool, what: &str) -> CoreResult<()> {
            if ok {
                Ok(())
            } else {
                Err(CoreError::InvalidConfig(what.to_string()))
            }
        }

        ensure(
            self.pathfinder.node_budget_ceiling > 0,
            "pathfinder.node_budget_ceiling must be positive",
        )?;
        ensure(
            self.pathfinder.cache_capacity > 0,
            "pathfinder.cache_capacity must be positive",
        )?;
        ensure(
            self.behavior.ai_interval > 0,
            "behavior.ai_interval must be positive",
        )?;
        ensure(
            self.behavior.hud_interval > 0,
            "behavior.hud_interval must be positive",
        )?;
        ensure(
            self.behavior.mining_range > 0.0,
            "behavior.mining_range must be positive",
        )?;
        ensure(
            self.behavior.turn_speed >= 1.0,
            "behavior.turn_speed must be at least 1",
        )?;
        ensure(
            self.task.search_radius > 0 && self.task.forced_exploration_radius > 0,
            "task search radii must be positive",
        )?;
        ensure(
            self.task.reach_distance > 0.0,
            "task.reach_distance must be positive",
        )?;
        ensure(
            self.task.leaf_probe_interval > 0,
            "task.leaf_probe_interval must be positive",
        )?;
        ensure(
            self.task.los_low_threshold < self.task.los_mid_threshold
                && self.task.los_mid_threshold < self.task.los_high_threshold,
            "line of sight thresholds must be strictly increasing",
        )?;
        ensure(
            self.intelligence.history_capacity >= self.intelligence.stuck_window,
            "intelligence.history_capacity must cover the stuck window",
        )?;
        ensure(
            self.intelligence.stuck_majority <= self.intelligence.stuck_window,
            "intelligence.stuck_majority cannot exceed the stuck window",
        )?;
        Ok(())
    }
}

/// Grid search and path cache settings.
#[derive(Debug, Clone)]
pub struct PathfinderConfig {
    /// Hard ceiling on visited nodes, whatever a caller requests.
    pub node_budget_ceiling: usize,
    /// Budget requested by the reactive loop.
    pub requested_budget: usize,
    pub straight_cost: f64,
    /// Cost of a step that also changes level.
    pub diagonal_cost: f64,
    pub cache_ttl: Duration,
    /// Expired entries are purged once the cache grows past this size.
    pub cache_capacity: usize,
}

impl Default for PathfinderConfig {
    fn default() -> Self {
        Self {
            node_budget_ceiling: 300,
            requested_budget: 1000,
            straight_cost: 1.0,
            diagonal_cost: 1.4,
            cache_ttl: Duration::from_secs(10),
            cache_capacity: 20,
        }
    }
}

/// Reactive loop settings.
#[derive(Debug, Clone)]
pub struct BehaviorConfig {
    /// The tree is evaluated once every this many ticks.
    pub ai_interval: Ticks,
    pub hud_interval: Ticks,
    /// Evaluations without movement before the agent counts as stuck.
    pub stuck_threshold: u32,
    /// Movement below this distance between evaluations counts as standing still.
    pub stuck_epsilon: f64,
    /// Evaluations spent backing off once stuck.
    pub resolve_stuck_duration: u32,
    pub mining_range: f64,
    pub mine_timeout: Duration,
    /// Mining progress is only reported after mining this long.
    pub progress_report_delay: Duration,
    pub waypoint_tolerance: f64,
    /// Divisor applied to the yaw error each evaluation.
    pub turn_speed: f32,
    pub sprint_distance: f64,
    /// Squared distance between the local and the authoritative target that forces a resync.
    pub target_divergence_sq: f64,
    pub emergency_cooldown: Duration,
    pub search_cooldown: Duration,
    pub invalidate_cooldown: Duration,
    pub local_search_radius: i32,
    pub local_search_height: i32,
    /// Outermost ring searched for a standable spot next to the tree.
    pub standable_search_radius: i32,
    /// How far above the tree base a fallback mining target may be.
    pub fallback_log_height: i32,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            ai_interval: 4,
            hud_interval: 6,
            stuck_threshold: 60,
            stuck_epsilon: 0.05,
            resolve_stuck_duration: 20,
            mining_range: 6.0,
            mine_timeout: Duration::from_millis(4000),
            progress_report_delay: Duration::from_millis(500),
            waypoint_tolerance: 1.2,
            turn_speed: 8.0,
            sprint_distance: 10.0,
            target_divergence_sq: 100.0,
            emergency_cooldown: Duration::from_millis(2000),
            search_cooldown: Duration::from_millis(1000),
            invalidate_cooldown: Duration::from_millis(500),
            local_search_radius: 16,
            local_search_height: 5,
            standable_search_radius: 7,
            fallback_log_height: 10,
        }
    }
}

/// Authoritative task state machine settings.
#[derive(Debug, Clone)]
pub struct TaskConfig {
    pub search_radius: i32,
    pub forced_exploration_radius: i32,
    pub search_depth_below: i32,
    pub search_height_above: i32,
    pub collection_radius: f64,
    pub reach_distance: f64,
    /// Tree targets further than this are abandoned.
    pub abandon_distance: f64,
    pub quick_timeout: Ticks,
    pub aggressive_timeout: Ticks,
    /// Within this distance an overdue approach proceeds to chopping anyway.
    pub forced_chop_distance: f64,
    pub leaf_clear_timeout: Ticks,
    pub leaf_probe_interval: Ticks,
    pub chop_timeout: Ticks,
    /// Ticks to wait after switching to a new log before re-evaluating it.
    pub chop_cooldown: Ticks,
    pub reposition_timeout: Ticks,
    pub reposition_arrival: f64,
    pub collect_grace: Ticks,
    pub item_arrival: f64,
    /// Items further than this are assumed gone.
    pub item_lost_distance: f64,
    /// Idle ticks before falling back to a plain nearest-tree scan.
    pub idle_fallback_after: Ticks,
    pub collection_attempt_limit: u32,
    pub collection_reset_after: Ticks,
    pub los_low_threshold: u32,
    pub los_mid_threshold: u32,
    pub los_high_threshold: u32,
    /// Line of sight failures are logged every this many occurrences.
    pub los_log_every: u32,
    /// Ticks credited back to the task timeout on mining progress.
    pub progress_credit: Ticks,
    /// Degrees turned per tick towards the rotation target.
    pub rotation_speed: f32,
    /// Outermost ring searched around a broken log for the next one.
    pub next_log_radius: i32,
    pub alternative_log_radius: i32,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            search_radius: 20,
            forced_exploration_radius: 30,
            search_depth_below: 3,
            search_height_above: 6,
            collection_radius: 10.0,
            reach_distance: 4.5,
            abandon_distance: 50.0,
            quick_timeout: 15,
            aggressive_timeout: 40,
            forced_chop_distance: 8.0,
            leaf_clear_timeout: 20,
            leaf_probe_interval: 3,
            chop_timeout: 30,
            chop_cooldown: 8,
            reposition_timeout: 200,
            reposition_arrival: 1.5,
            collect_grace: 60,
            item_arrival: 2.0,
            item_lost_distance: 20.0,
            idle_fallback_after: 100,
            collection_attempt_limit: 5,
            collection_reset_after: 200,
            los_low_threshold: 2,
            los_mid_threshold: 12,
            los_high_threshold: 40,
            los_log_every: 20,
            progress_credit: 10,
            rotation_speed: 2.5,
            next_log_radius: 4,
            alternative_log_radius: 3,
        }
    }
}

/// Failure memory, loop detection and scoring settings.
#[derive(Debug, Clone)]
pub struct IntelligenceConfig {
    pub history_capacity: usize,
    pub history_interval: Duration,
    /// Number of newest samples inspected by the emergency stuck check.
    pub stuck_window: usize,
    /// Samples of the window that must sit near the newest one.
    pub stuck_majority: usize,
    pub stuck_radius: f64,
    /// How many samples back the stagnation check compares against.
    pub stagnation_lookback: usize,
    pub minimum_progress: f64,
    pub pattern_threshold: usize,
    pub loop_window: Duration,
    pub history_retention: Duration,
    pub abandon_age: Duration,
    pub abandon_attempts: u32,
    /// Attempts after which a recorded failure blacklists the target.
    pub failure_blacklist_attempts: u32,
    pub leaf_failure_limit: u32,
    pub reposition_memory: Duration,
    pub alternatives_memory: Duration,
    /// Positions tried this often are skipped when picking the next log.
    pub retry_limit: u32,
    pub decision_history: usize,
    /// Failures after which an exhausted search switches to forced exploration.
    pub exploration_failure_threshold: u32,
    pub scoring: ScoringWeights,
}

impl Default for IntelligenceConfig {
    fn default() -> Self {
        Self {
            history_capacity: 10,
            history_interval: Duration::from_secs(1),
            stuck_window: 5,
            stuck_majority: 4,
            stuck_radius: 2.0,
            stagnation_lookback: 3,
            minimum_progress: 1.0,
            pattern_threshold: 3,
            loop_window: Duration::from_secs(30),
            history_retention: Duration::from_secs(60),
            abandon_age: Duration::from_secs(30),
            abandon_attempts: 5,
            failure_blacklist_attempts: 3,
            leaf_failure_limit: 2,
            reposition_memory: Duration::from_secs(10),
            alternatives_memory: Duration::from_secs(5),
            retry_limit: 2,
            decision_history: 10,
            exploration_failure_threshold: 3,
            scoring: ScoringWeights::default(),
        }
    }
}

/// Weights of the candidate target score. Higher scores win.
#[derive(Debug, Clone)]
pub struct ScoringWeights {
    pub base: f64,
    /// Multiplies the squared distance to the candidate.
    pub distance: f64,
    pub height_threshold: i32,
    pub height: f64,
    pub leaf: f64,
    pub line_of_sight: f64,
    pub navigation: f64,
    pub attempt: f64,
    /// Multiplies the distance when exploring away from an exhausted area.
    pub exploration: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            base: 100.0,
            distance: 2.0,
            height_threshold: 3,
            height: 10.0,
            leaf: 15.0,
            line_of_sight: 30.0,
            navigation: 25.0,
            attempt: 40.0,
            exploration: 5.0,
        }
    }
}
