//! The authoritative task state machine of one agent.
//!
//! [`AgentBrain`] is ticked once per world tick. It owns the agent's
//! [`TaskState`] and [`Intelligence`], picks targets, handles obstructions and
//! timeouts, and reacts to the notifications sent by the reactive loop.

use crate::intelligence::Intelligence;
use crate::probes::{self, ScoreMode};
use crate::task::{Task, TaskState};
use chipper_core::config::Config;
use chipper_core::event::Notification;
use chipper_core::geometry::squared_distance_to_center;
use chipper_core::sync::ThinkingState;
use chipper_core::{AgentSnapshot, BlockPos, Rotation, WorldQuery};
use log::{debug, info};
use std::time::Instant;

/// The agent stops turning once this close to its rotation target, in degrees.
const ROTATION_TOLERANCE: f32 = 2.0;
/// Searches run by one intelligent tree search: the normal one and a forced exploration one.
const SEARCH_PASSES: usize = 2;
/// Ticks between two "collecting" log lines.
const COLLECT_LOG_EVERY: u32 = 40;

/// What the task state machine perceives on one tick.
pub struct Surroundings<'a> {
    pub world: &'a dyn WorldQuery,
    pub body: &'a AgentSnapshot,
    pub config: &'a Config,
    pub now: Instant,
}

impl Surroundings<'_> {
    fn feet(&self) -> BlockPos {
        self.body.block_pos()
    }

    fn distance_to(&self, pos: BlockPos) -> f64 {
        squared_distance_to_center(self.body.position, pos).sqrt()
    }
}

/// Task state and failure memory of one active agent.
#[derive(Debug, Clone)]
pub struct AgentBrain {
    state: TaskState,
    intelligence: Intelligence,
    /// The task the position history was sampled under.
    sampled_task: Task,
}

impl AgentBrain {
    pub fn new(config: &Config) -> Self {
        Self {
            state: TaskState::new(config.intelligence.decision_history),
            intelligence: Intelligence::new(config.intelligence.clone()),
            sampled_task: Task::Idle,
        }
    }

    pub fn state(&self) -> &TaskState {
        &self.state
    }

    pub fn intelligence(&self) -> &Intelligence {
        &self.intelligence
    }

    /// One line summary of the task, the thinking state, the counters and the last decision.
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "Task: {} | Thinking: {} | {}",
            self.state.task,
            self.state.thinking.description(),
            self.intelligence.stats()
        );
        if let Some(decision) = self.state.decisions.last() {
            summary.push_str(&format!(
                " | Last decision: {} -> {}",
                decision.reason, decision.target
            ));
        }
        summary
    }

    /// Runs one world tick.
    ///
    /// # Arguments
    ///
    /// * `env` - The agent's body, the world and the configuration.
    ///
    /// # Returns
    ///
    /// The rotation the host should apply to the agent, if it is turning.
    pub fn tick(&mut self, env: &Surroundings) -> Option<Rotation> {
        self.state.ticks_since_progress = self.state.ticks_since_progress.saturating_add(1);
        self.state.chop_cooldown = self.state.chop_cooldown.saturating_sub(1);

        if self.sampled_task != self.state.task {
            self.intelligence.forget_positions();
            self.sampled_task = self.state.task;
        }
        self.intelligence.sample_position(env.feet(), env.now);
        if self.state.task.is_travelling() && self.intelligence.is_completely_stuck() {
            info!("Completely stuck while {}, resetting", self.state.task);
            self.emergency_reset();
            return None;
        }

        match self.state.task {
            Task::Idle => self.tick_idle(env),
            Task::MovingToTree => self.tick_moving_to_tree(env),
            Task::ClearingLeaves => self.tick_clearing_leaves(env),
            Task::Chopping => self.tick_chopping(env),
            Task::Repositioning => self.tick_repositioning(env),
            Task::Collecting => self.tick_collecting(env),
            Task::MovingToItem => self.tick_moving_to_item(env),
        }
        self.update_rotation(env.body, env.config.task.rotation_speed)
    }

    /// Applies a notification from the reactive loop.
    pub fn handle(&mut self, notification: Notification, env: &Surroundings) {
        match notification {
            Notification::MiningProgress => self.on_mining_progress(env.config.task.progress_credit),
            Notification::LineOfSightFailure => self.on_line_of_sight_failure(env),
            Notification::ForceNewTarget => self.on_force_new_target(env),
        }
    }

    // Tasks

    fn tick_idle(&mut self, env: &Surroundings) {
        let cfg = &env.config.task;
        self.state.rotation_target = None;
        self.state.thinking = ThinkingState::Scanning;

        if self.find_tree_intelligent(env) {
            return;
        }
        if self.state.ticks_since_progress <= cfg.idle_fallback_after {
            return;
        }
        if self.find_nearest_tree(env, cfg.search_radius * 2) {
            return;
        }
        if self.state.collection_attempts < cfg.collection_attempt_limit {
            if self.collect_nearby_items(env) {
                self.state.collection_attempts += 1;
            }
        } else if self.state.ticks_since_progress > cfg.collection_reset_after {
            info!("Resetting collection attempts");
            self.state.collection_attempts = 0;
        }
    }

    fn tick_moving_to_tree(&mut self, env: &Surroundings) {
        let cfg = &env.config.task;
        self.state.thinking = ThinkingState::Pathfinding;
        let Some(tree) = self.state.target_tree else {
            self.state.go_idle();
            return;
        };

        if self.intelligence.is_blacklisted(tree) {
            info!("Target {} is blacklisted, finding a new tree", tree);
            self.state.go_idle();
            return;
        }

        if self.state.ticks_since_progress > cfg.quick_timeout
            && self.intelligence.has_movement_stagnated()
        {
            info!("Movement towards {} stagnated, looking for an alternative", tree);
            if !self.try_alternative_approach(env, tree) {
                self.abandon_to_idle(tree, "Movement stagnation");
            }
            self.state.ticks_since_progress = 0;
            return;
        }

        let distance = env.distance_to(tree);
        if distance <= cfg.reach_distance {
            if probes::should_clear_leaves_first(env.world, env.feet(), tree) {
                info!("Leaves in front of {}, clearing them first", tree);
                self.start_clearing_leaves();
            } else {
                info!("Reached {}, chopping", tree);
                self.intelligence.record_success("Reached tree for chopping");
                self.start_chopping(env, tree);
            }
        } else if distance > cfg.abandon_distance {
            self.abandon_to_idle(tree, "Too far away");
        } else {
            if self.state.rotation_target.is_none() {
                self.state.look_at(env.body, tree);
            }
            if self.state.ticks_since_progress > cfg.aggressive_timeout {
                if distance < cfg.forced_chop_distance {
                    info!("Approach to {} overdue, chopping from here", tree);
                    self.start_chopping(env, tree);
                } else {
                    self.abandon_to_idle(tree, "Movement timeout");
                }
            }
        }
    }

    fn tick_clearing_leaves(&mut self, env: &Surroundings) {
        let cfg = &env.config.task;
        self.state.thinking = ThinkingState::ClearingObstacles;
        let Some(tree) = self.state.target_tree else {
            self.state.go_idle();
            self.state.thinking = ThinkingState::Idle;
            return;
        };

        if self.intelligence.is_in_leaf_clearing_loop(tree, env.now) {
            info!("Leaf clearing loop at {}, leaving the area", tree);
            self.intelligence.forced_exploration = true;
            self.abandon_to_idle(tree, "Leaf-clearing loop detected");
            return;
        }
        if self.state.ticks_since_progress > cfg.leaf_clear_timeout {
            info!("Clearing leaves at {} took too long", tree);
            self.intelligence.record_leaf_clearing_failure(tree);
            self.abandon_to_idle(tree, "Leaf clearing ultra-timeout");
            return;
        }
        if self.state.current_leaf.is_some()
            && !self
                .state
                .ticks_since_progress
                .is_multiple_of(cfg.leaf_probe_interval)
        {
            return;
        }

        let from = env.feet();
        match probes::find_obstructing_leaf(env.world, from, tree) {
            Some(leaf) if !self.is_problematic_leaf(leaf) => self.target_leaf(env, tree, leaf),
            Some(_) => {
                let alternative =
                    probes::find_alternative_leaf(env.world, from, tree, &self.state.problematic_leaves)
                        .filter(|leaf| !self.intelligence.is_problematic(*leaf));
                match alternative {
                    Some(leaf) => self.target_leaf(env, tree, leaf),
                    None => {
                        info!("Every leaf in front of {} is problematic", tree);
                        self.abandon_to_idle(tree, "All leaves problematic");
                    }
                }
            }
            None if probes::has_line_of_sight(env.world, from, tree) => {
                info!("Path to {} verified clear, chopping", tree);
                self.start_chopping(env, tree);
            }
            None => {
                info!("No leaf in front of {} but the view is still blocked", tree);
                self.abandon_to_idle(tree, "Persistent obstruction");
            }
        }
    }

    fn tick_chopping(&mut self, env: &Surroundings) {
        self.state.thinking = ThinkingState::Chopping;
        let Some(tree) = self.state.target_tree else {
            self.state.go_idle();
            self.state.thinking = ThinkingState::Idle;
            return;
        };

        if self.state.chop_cooldown == 0 && self.evaluate_chopping(env, tree) {
            return;
        }
        if self.state.ticks_since_progress > env.config.task.chop_timeout {
            self.on_chop_timeout(env, tree);
        }
    }

    /// Checks the log being chopped.
    ///
    /// # Returns
    ///
    /// Whether the tick was fully handled, in which case the timeout is not checked.
    fn evaluate_chopping(&mut self, env: &Surroundings, tree: BlockPos) -> bool {
        let now = env.now;
        if self.intelligence.is_in_upgrade_loop(tree, now) {
            info!("Upgrade loop around {}, breaking the cycle", tree);
            self.abandon_to_collecting(tree, "Intelligent upgrade loop");
            return true;
        }
        if self.intelligence.should_abandon(tree, now) {
            info!("Giving up on {} after repeated failures", tree);
            self.abandon_to_collecting(tree, "Repeated failures");
            return true;
        }

        if !env.world.is_log(tree) {
            match self.find_intelligent_target(env, tree) {
                Some(next) => {
                    info!("Log at {} is gone, next log at {}", tree, next);
                    self.retarget(env, next);
                    self.state.chop_cooldown = env.config.task.chop_cooldown;
                }
                None => {
                    info!("Tree at {} completed", tree);
                    self.intelligence.record_success("Tree completed");
                    self.state.degrade_to_collecting();
                }
            }
            return true;
        }

        let from = env.feet();
        if probes::should_clear_leaves_first(env.world, from, tree) {
            if self.intelligence.has_recent_leaf_clearing_failures(tree) {
                info!("Leaves at {} failed before, skipping the tree", tree);
                self.abandon_to_idle(tree, "Persistent leaf problems");
                return true;
            }
            if !self.intelligence.has_recently_tried_alternatives(tree, now)
                && !self.intelligence.is_in_upgrade_loop(tree, now)
                && let Some(better) = self.find_intelligent_target(env, tree)
                && better != tree
                && probes::has_line_of_sight(env.world, from, better)
                && !probes::should_clear_leaves_first(env.world, from, better)
            {
                info!("Switching from {} to the unobstructed log {}", tree, better);
                self.intelligence.record_upgrade(tree, better, now);
                self.retarget(env, better);
                return true;
            }
            info!("Clearing leaves in front of {}", tree);
            self.start_clearing_leaves();
            self.intelligence.mark_alternatives_tried(tree, now);
            return true;
        }

        if self.state.los_failures >= env.config.task.los_low_threshold {
            self.respond_to_lost_sight(env, tree);
            return true;
        }
        false
    }

    /// First reaction to the reactive side losing sight of the log.
    fn respond_to_lost_sight(&mut self, env: &Surroundings, tree: BlockPos) {
        info!(
            "{} line of sight failures at {}, looking for another log",
            self.state.los_failures, tree
        );
        if self.intelligence.has_recently_repositioned(tree, env.now)
            || self.intelligence.is_in_upgrade_loop(tree, env.now)
        {
            self.abandon_to_idle(tree, "LOS failures after cycling");
            return;
        }

        let from = env.feet();
        match self.find_intelligent_target(env, tree) {
            Some(alternative)
                if alternative != tree
                    && probes::has_line_of_sight(env.world, from, alternative) =>
            {
                info!("Recovering sight with {}", alternative);
                self.retarget(env, alternative);
                self.state.los_failures = 0;
                self.intelligence.mark_repositioned(alternative, env.now);
            }
            _ => self.abandon_to_idle(tree, "LOS failures, no alternatives"),
        }
    }

    fn on_chop_timeout(&mut self, env: &Surroundings, tree: BlockPos) {
        self.intelligence.record_failure(Some(tree), "Chopping timeout");
        if self.intelligence.is_in_upgrade_loop(tree, env.now)
            || self.intelligence.has_recently_repositioned(tree, env.now)
        {
            info!("Chopping {} timed out after cycling", tree);
            self.abandon_to_collecting(tree, "Timeout after cycling");
            return;
        }

        let from = env.feet();
        match self.find_intelligent_target(env, tree) {
            Some(recovery)
                if recovery != tree && probes::has_line_of_sight(env.world, from, recovery) =>
            {
                info!("Chopping {} timed out, trying {}", tree, recovery);
                self.retarget(env, recovery);
                self.state.los_failures = 0;
            }
            _ => {
                info!("Chopping {} timed out without a way out", tree);
                self.abandon_to_collecting(tree, "Timeout - no valid recovery");
            }
        }
    }

    fn tick_repositioning(&mut self, env: &Surroundings) {
        self.state.thinking = ThinkingState::Repositioning;
        let resume = if self.state.current_leaf.is_some() {
            Task::ClearingLeaves
        } else {
            Task::Chopping
        };
        let Some(spot) = self.state.reposition_target else {
            self.state.task = resume;
            return;
        };

        if env.distance_to(spot) <= env.config.task.reposition_arrival {
            info!("Reached {}, back to {}", spot, resume);
            self.state.task = resume;
            self.state.reposition_target = None;
            self.state.ticks_since_progress = 0;
            self.state.los_failures = 0;
            if let Some(tree) = self.state.target_tree {
                self.state.look_at(env.body, tree);
            }
        } else if self.state.ticks_since_progress > env.config.task.reposition_timeout {
            info!("Repositioning to {} timed out", spot);
            self.state.go_idle();
        }
    }

    fn tick_collecting(&mut self, env: &Surroundings) {
        self.state.thinking = ThinkingState::Collecting;
        if self.collect_nearby_items(env) {
            self.state.ticks_since_progress = 0;
        } else if self.state.ticks_since_progress > env.config.task.collect_grace {
            info!("No more items to collect");
            self.state.go_idle();
            self.state.collection_attempts = 0;
            self.state.thinking = ThinkingState::Idle;
        }
    }

    fn tick_moving_to_item(&mut self, env: &Surroundings) {
        self.state.thinking = ThinkingState::Collecting;
        let Some(item) = self.state.target_item else {
            self.state.task = Task::Collecting;
            return;
        };

        let distance = env.distance_to(item);
        if distance <= env.config.task.item_arrival {
            info!("Reached item at {}", item);
            self.state.task = Task::Collecting;
            self.state.target_item = None;
        } else if distance > env.config.task.item_lost_distance {
            info!("Item at {} is out of reach", item);
            self.state.task = Task::Collecting;
            self.state.target_item = None;
        }
    }

    // Notifications

    fn on_mining_progress(&mut self, credit: u32) {
        if matches!(self.state.task, Task::Chopping | Task::ClearingLeaves) {
            self.state.ticks_since_progress = self.state.ticks_since_progress.saturating_sub(credit);
            self.state.los_failures = 0;
        }
    }

    fn on_line_of_sight_failure(&mut self, env: &Surroundings) {
        if !matches!(self.state.task, Task::Chopping | Task::ClearingLeaves) {
            return;
        }
        let cfg = &env.config.task;
        self.state.los_failures += 1;
        let failures = self.state.los_failures;
        if (failures - 1).is_multiple_of(cfg.los_log_every) {
            info!(
                "Line of sight failure #{} for {:?}",
                failures,
                self.state.mining_target()
            );
        }

        if failures >= cfg.los_high_threshold {
            info!("Sight lost for good, leaving the tree");
            if let Some(tree) = self.state.target_tree {
                self.intelligence.blacklist(tree, "Persistent line of sight failures");
            }
            self.state.degrade_to_collecting();
            self.state.los_failures = 0;
        } else if failures == cfg.los_mid_threshold {
            self.escalate_lost_sight(env);
        }
    }

    /// Tries one alternative after the sight of the target was lost for a while.
    fn escalate_lost_sight(&mut self, env: &Surroundings) {
        let Some(tree) = self.state.target_tree else {
            return;
        };
        let from = env.feet();
        match self.state.task {
            Task::Chopping => {
                if let Some(alternative) = probes::find_alternative_log(
                    env.world,
                    from,
                    tree,
                    env.config.task.alternative_log_radius,
                ) {
                    info!("Switching to the nearby log {} after losing sight", alternative);
                    self.retarget(env, alternative);
                    self.state.los_failures = 0;
                } else if let Some(spot) = probes::find_better_position(env.world, from, tree) {
                    self.start_repositioning(spot);
                } else if probes::should_clear_leaves_first(env.world, from, tree) {
                    info!("Leaves hide {}, clearing them", tree);
                    self.start_clearing_leaves();
                    self.state.los_failures = 0;
                }
            }
            Task::ClearingLeaves => {
                if let Some(leaf) = self.state.current_leaf {
                    debug!("Marking leaf {} as problematic", leaf);
                    self.state.problematic_leaves.insert(leaf);
                    self.intelligence.mark_problematic(leaf);
                }
                if let Some(leaf) =
                    probes::find_alternative_leaf(env.world, from, tree, &self.state.problematic_leaves)
                {
                    info!("Switching to the leaf at {}", leaf);
                    self.state.current_leaf = Some(leaf);
                    self.state.look_at(env.body, leaf);
                    self.state.ticks_since_progress = 0;
                    self.state.los_failures = 0;
                } else if let Some(spot) = probes::find_better_leaf_position(env.world, from, tree) {
                    self.start_repositioning(spot);
                } else {
                    info!("Leaving the leaves of {} alone, chopping", tree);
                    self.state.task = Task::Chopping;
                    self.state.current_leaf = None;
                    self.state.thinking = ThinkingState::Chopping;
                    self.state.los_failures = 0;
                }
            }
            _ => {}
        }
    }

    fn on_force_new_target(&mut self, env: &Surroundings) {
        if self.state.task != Task::Chopping {
            return;
        }
        let Some(tree) = self.state.target_tree else {
            return;
        };
        match probes::find_next_log(env.world, tree) {
            Some(next) => {
                info!("Mining {} timed out, moving on to {}", tree, next);
                self.state.target_tree = Some(next);
                self.state.look_at(env.body, next);
            }
            None => {
                info!("No more accessible logs around {}, collecting", tree);
                self.state.degrade_to_collecting();
                self.state.collection_attempts = 0;
            }
        }
    }

    // Target search

    /// Scores the tree bases around the agent and heads for the best one.
    ///
    /// When nothing is found after enough failures the search is repeated once
    /// in forced exploration mode, further out and preferring distant trees.
    fn find_tree_intelligent(&mut self, env: &Surroundings) -> bool {
        let cfg = env.config;
        let from = env.feet();
        for _ in 0..SEARCH_PASSES {
            let exploring = self.intelligence.forced_exploration;
            let (radius, mode) = if exploring {
                (cfg.task.forced_exploration_radius, ScoreMode::Explore)
            } else {
                (cfg.task.search_radius, ScoreMode::Nearest)
            };
            let radius_sq = f64::from(radius * radius);

            let candidates = probes::tree_bases(
                env.world,
                from,
                radius,
                cfg.task.search_depth_below,
                cfg.task.search_height_above,
            );
            let intelligence = &self.intelligence;
            let best = probes::best_scored(
                candidates
                    .into_iter()
                    .filter(|c| !intelligence.is_blacklisted(*c))
                    .filter(|c| mode == ScoreMode::Nearest || from.squared_distance(*c) <= radius_sq)
                    .map(|c| {
                        let score = probes::score_target(
                            env.world,
                            from,
                            c,
                            intelligence.attempts(c),
                            &cfg.intelligence.scoring,
                            mode,
                        );
                        (c, score)
                    }),
            );

            if let Some(tree) = best {
                if exploring {
                    info!("Forced exploration found a distant tree");
                    self.intelligence.forced_exploration = false;
                }
                info!("Found tree at {} (distance {:.2})", tree, env.distance_to(tree));
                self.head_for(tree, "New tree target", env.now);
                return true;
            }

            if exploring
                || self.intelligence.failure_count() <= cfg.intelligence.exploration_failure_threshold
            {
                return false;
            }
            info!("No trees nearby, enabling forced exploration");
            self.intelligence.forced_exploration = true;
        }
        false
    }

    /// Heads for the closest tree base within `radius`, skipping blacklisted ones.
    fn find_nearest_tree(&mut self, env: &Surroundings, radius: i32) -> bool {
        let from = env.feet();
        let cfg = &env.config.task;
        debug!("Falling back to a plain tree scan within {}", radius);
        let nearest = probes::tree_bases(
            env.world,
            from,
            radius,
            cfg.search_depth_below,
            cfg.search_height_above,
        )
        .into_iter()
        .filter(|c| !self.intelligence.is_blacklisted(*c))
        .min_by(|a, b| from.squared_distance(*a).total_cmp(&from.squared_distance(*b)));

        match nearest {
            Some(tree) => {
                info!("Fallback scan found tree at {} (distance {:.2})", tree, env.distance_to(tree));
                self.head_for(tree, "Fallback tree target", env.now);
                true
            }
            None => false,
        }
    }

    /// The best scored log around `around`, skipping logs already tried too often.
    fn find_intelligent_target(&mut self, env: &Surroundings, around: BlockPos) -> Option<BlockPos> {
        let retry_limit = env.config.intelligence.retry_limit;
        let decisions = &self.state.decisions;
        let candidates = probes::logs_near(env.world, around, env.config.task.next_log_radius, |pos| {
            decisions.attempts(pos) < retry_limit
        });
        if candidates.is_empty() {
            self.state.thinking = ThinkingState::ProblemSolving;
            return None;
        }

        let from = env.feet();
        let best = probes::best_scored(candidates.into_iter().map(|c| {
            let score = probes::score_target(
                env.world,
                from,
                c,
                decisions.attempts(c),
                &env.config.intelligence.scoring,
                ScoreMode::Nearest,
            );
            (c, score)
        }))?;
        self.state
            .decisions
            .record(best, "Intelligent target selection", env.now);
        self.state.thinking = ThinkingState::Analyzing;
        Some(best)
    }

    fn try_alternative_approach(&mut self, env: &Surroundings, tree: BlockPos) -> bool {
        match self.find_intelligent_target(env, tree) {
            Some(alternative)
                if alternative != tree && !self.intelligence.is_blacklisted(alternative) =>
            {
                info!("Approaching {} instead", alternative);
                self.retarget(env, alternative);
                true
            }
            _ => false,
        }
    }

    /// Collects the closest item, or heads for it when out of reach.
    ///
    /// # Returns
    ///
    /// Whether there was an item to collect.
    fn collect_nearby_items(&mut self, env: &Surroundings) -> bool {
        let cfg = &env.config.task;
        let Some(item) = probes::nearest_item(env.world, env.body.position, cfg.collection_radius)
        else {
            return false;
        };

        let item_pos = BlockPos::containing(item.position);
        if env.distance_to(item_pos) <= cfg.item_arrival {
            if self.state.ticks_since_progress.is_multiple_of(COLLECT_LOG_EVERY) {
                debug!("Collecting item at {}", item_pos);
            }
            return true;
        }
        if self.state.target_item != Some(item_pos) {
            info!("Moving towards item at {}", item_pos);
            self.state.task = Task::MovingToItem;
            self.state.target_item = Some(item_pos);
            self.state.thinking = ThinkingState::Collecting;
            self.state.ticks_since_progress = 0;
        }
        true
    }

    // Transitions

    fn head_for(&mut self, tree: BlockPos, reason: &'static str, now: Instant) {
        self.state.move_to_tree(tree);
        self.state.thinking = ThinkingState::Pathfinding;
        self.state.decisions.record(tree, reason, now);
        self.intelligence.record_attempt(tree, now);
    }

    fn retarget(&mut self, env: &Surroundings, log: BlockPos) {
        self.state.target_tree = Some(log);
        self.state.look_at(env.body, log);
        self.state.ticks_since_progress = 0;
    }

    fn start_chopping(&mut self, env: &Surroundings, tree: BlockPos) {
        self.state.task = Task::Chopping;
        self.state.current_leaf = None;
        self.state.ticks_since_progress = 0;
        self.state.los_failures = 0;
        self.state.thinking = ThinkingState::Chopping;
        self.state.look_at(env.body, tree);
    }

    fn start_clearing_leaves(&mut self) {
        self.state.task = Task::ClearingLeaves;
        self.state.current_leaf = None;
        self.state.ticks_since_progress = 0;
        self.state.thinking = ThinkingState::ClearingObstacles;
    }

    fn start_repositioning(&mut self, spot: BlockPos) {
        info!("Repositioning to {}", spot);
        self.state.task = Task::Repositioning;
        self.state.reposition_target = Some(spot);
        self.state.ticks_since_progress = 0;
        self.state.los_failures = 0;
        self.state.thinking = ThinkingState::Repositioning;
    }

    fn target_leaf(&mut self, env: &Surroundings, tree: BlockPos, leaf: BlockPos) {
        if self.state.current_leaf != Some(leaf) {
            info!("Targeting leaf {} in front of {}", leaf, tree);
            self.intelligence.record_leaf_clearing_attempt(tree, env.now);
        }
        self.state.current_leaf = Some(leaf);
        self.state.look_at(env.body, leaf);
    }

    fn is_problematic_leaf(&self, leaf: BlockPos) -> bool {
        self.state.problematic_leaves.contains(&leaf) || self.intelligence.is_problematic(leaf)
    }

    fn abandon_to_idle(&mut self, tree: BlockPos, reason: &str) {
        self.intelligence.blacklist(tree, reason);
        self.state.go_idle();
        self.state.thinking = ThinkingState::Idle;
    }

    fn abandon_to_collecting(&mut self, tree: BlockPos, reason: &str) {
        self.intelligence.blacklist(tree, reason);
        self.state.degrade_to_collecting();
    }

    /// Drops every target and all failure memory, then searches further out.
    fn emergency_reset(&mut self) {
        self.state.go_idle();
        self.state.los_failures = 0;
        self.state.chop_cooldown = 0;
        self.state.rotation_target = None;
        self.state.problematic_leaves.clear();
        self.state.decisions.clear();
        self.state.thinking = ThinkingState::StuckRecovery;
        self.intelligence.emergency_reset();
        self.sampled_task = Task::Idle;
    }

    fn update_rotation(&mut self, body: &AgentSnapshot, speed: f32) -> Option<Rotation> {
        let target = self.state.rotation_target?;
        if body.rotation.is_close_to(target, ROTATION_TOLERANCE) {
            self.state.rotation_target = None;
        }
        Some(body.rotation.step_towards(target, speed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chipper_core::config::TaskConfig;
    use chipper_core::grid::{Block, VoxelGrid};
    use chipper_core::{AgentId, Vec3};
    use std::time::Duration;

    fn body() -> AgentSnapshot {
        AgentSnapshot::new(AgentId(1), Vec3::new(0.5, 0.0, 0.5))
    }

    fn env<'a>(
        world: &'a VoxelGrid,
        body: &'a AgentSnapshot,
        config: &'a Config,
        now: Instant,
    ) -> Surroundings<'a> {
        Surroundings {
            world,
            body,
            config,
            now,
        }
    }

    fn chopping(config: &Config, tree: BlockPos) -> AgentBrain {
        let mut brain = AgentBrain::new(config);
        brain.state.task = Task::Chopping;
        brain.state.target_tree = Some(tree);
        brain.sampled_task = Task::Chopping;
        brain
    }

    fn clearing_leaves(config: &Config, tree: BlockPos) -> AgentBrain {
        let mut brain = chopping(config, tree);
        brain.start_clearing_leaves();
        brain.sampled_task = Task::ClearingLeaves;
        brain
    }

    fn lose_sight(brain: &mut AgentBrain, env: &Surroundings) {
        for _ in 0..env.config.task.los_mid_threshold {
            brain.handle(Notification::LineOfSightFailure, env);
        }
    }

    #[test]
    fn test_idle_picks_the_base_of_a_visible_tree() {
        let config = Config::default();
        let mut world = VoxelGrid::flat(12, -1);
        world.plant_tree(BlockPos::new(4, 0, 0), 3, false);
        let body = body();
        let mut brain = AgentBrain::new(&config);

        brain.tick(&env(&world, &body, &config, Instant::now()));
        assert_eq!(brain.state().task, Task::MovingToTree);
        assert_eq!(brain.state().target_tree, Some(BlockPos::new(4, 0, 0)));
        assert_eq!(brain.intelligence().attempts(BlockPos::new(4, 0, 0)), 1);
        assert!(brain.summary().contains("New tree target"));
    }

    #[test]
    fn test_reaching_a_clear_tree_starts_chopping() {
        let config = Config::default();
        let mut world = VoxelGrid::flat(8, -1);
        world.set(BlockPos::new(2, 0, 0), Block::Log);
        let body = body();
        let mut brain = AgentBrain::new(&config);
        brain.state.move_to_tree(BlockPos::new(2, 0, 0));

        let rotation = brain.tick(&env(&world, &body, &config, Instant::now()));
        assert_eq!(brain.state().task, Task::Chopping);
        assert_eq!(brain.state().thinking, ThinkingState::Chopping);
        assert!(rotation.is_some());
    }

    #[test]
    fn test_far_tree_is_blacklisted() {
        let config = Config::default();
        let mut world = VoxelGrid::new();
        let tree = BlockPos::new(60, 0, 0);
        world.set(tree, Block::Log);
        let body = body();
        let mut brain = AgentBrain::new(&config);
        brain.state.move_to_tree(tree);

        brain.tick(&env(&world, &body, &config, Instant::now()));
        assert_eq!(brain.state().task, Task::Idle);
        assert!(brain.state().target_tree.is_none());
        assert_eq!(brain.intelligence().blacklist_reason(tree), Some("Too far away"));
    }

    #[test]
    fn test_broken_log_moves_up_the_trunk() {
        let config = Config::default();
        let mut world = VoxelGrid::flat(8, -1);
        world.plant_tree(BlockPos::new(3, 0, 0), 3, false);
        world.break_block(BlockPos::new(3, 0, 0));
        let body = body();
        let mut brain = chopping(&config, BlockPos::new(3, 0, 0));

        brain.tick(&env(&world, &body, &config, Instant::now()));
        assert_eq!(brain.state().task, Task::Chopping);
        assert_eq!(brain.state().target_tree, Some(BlockPos::new(3, 1, 0)));
        assert_eq!(brain.state().chop_cooldown, config.task.chop_cooldown);
        assert_eq!(brain.state().thinking, ThinkingState::Analyzing);
    }

    #[test]
    fn test_finished_tree_degrades_to_collecting() {
        let config = Config::default();
        let mut world = VoxelGrid::flat(8, -1);
        world.set(BlockPos::new(3, 0, 0), Block::Log);
        world.break_block(BlockPos::new(3, 0, 0));
        let body = body();
        let mut brain = chopping(&config, BlockPos::new(3, 0, 0));

        brain.tick(&env(&world, &body, &config, Instant::now()));
        assert_eq!(brain.state().task, Task::Collecting);
        assert!(brain.state().target_tree.is_none());
        assert_eq!(brain.intelligence().success_count(), 1);
    }

    #[test]
    fn test_mining_progress_credits_the_timeout() {
        let config = Config::default();
        let world = VoxelGrid::new();
        let body = body();
        let mut brain = chopping(&config, BlockPos::new(3, 0, 0));
        brain.state.ticks_since_progress = 25;
        brain.state.los_failures = 3;

        brain.handle(
            Notification::MiningProgress,
            &env(&world, &body, &config, Instant::now()),
        );
        assert_eq!(brain.state().ticks_since_progress, 15);
        assert_eq!(brain.state().los_failures, 0);

        brain.state.go_idle();
        brain.state.ticks_since_progress = 25;
        brain.handle(
            Notification::MiningProgress,
            &env(&world, &body, &config, Instant::now()),
        );
        assert_eq!(brain.state().ticks_since_progress, 25);
    }

    #[test]
    fn test_mid_threshold_switches_to_a_nearby_log() {
        let config = Config::default();
        let mut world = VoxelGrid::flat(8, -1);
        let tree = BlockPos::new(3, 0, 0);
        let alternative = BlockPos::new(1, 0, 2);
        world.set(tree, Block::Log);
        world.set(alternative, Block::Log);
        let body = body();
        let mut brain = chopping(&config, tree);
        let env = env(&world, &body, &config, Instant::now());

        for _ in 1..config.task.los_mid_threshold {
            brain.handle(Notification::LineOfSightFailure, &env);
        }
        assert_eq!(brain.state().target_tree, Some(tree));
        brain.handle(Notification::LineOfSightFailure, &env);
        assert_eq!(brain.state().target_tree, Some(alternative));
        assert_eq!(brain.state().los_failures, 0);
    }

    #[test]
    fn test_high_threshold_abandons_without_alternatives() {
        let config = Config::default();
        // No ground anywhere, so there is no spot to reposition to
        let mut world = VoxelGrid::new();
        let tree = BlockPos::new(3, 0, 0);
        world.set(tree, Block::Log);
        let body = body();
        let mut brain = chopping(&config, tree);
        let env = env(&world, &body, &config, Instant::now());

        for _ in 0..config.task.los_high_threshold {
            brain.handle(Notification::LineOfSightFailure, &env);
        }
        assert_eq!(brain.state().task, Task::Collecting);
        assert!(brain.state().target_tree.is_none());
        assert!(brain.intelligence().is_blacklisted(tree));
        assert_eq!(brain.state().los_failures, 0);
    }

    #[test]
    fn test_lost_sight_of_a_lone_log_repositions_then_resumes_chopping() {
        let config = Config::default();
        let mut world = VoxelGrid::flat(8, -1);
        let tree = BlockPos::new(3, 0, 0);
        world.set(tree, Block::Log);
        let body = body();
        let mut brain = chopping(&config, tree);
        let now = Instant::now();

        lose_sight(&mut brain, &env(&world, &body, &config, now));
        assert_eq!(brain.state().task, Task::Repositioning);
        assert_eq!(brain.state().reposition_target, Some(BlockPos::new(1, 0, 0)));
        assert_eq!(brain.state().thinking, ThinkingState::Repositioning);
        assert_eq!(brain.state().los_failures, 0);
        assert_eq!(
            brain.state().active_target(),
            Some(BlockPos::new(1, 0, 0).center())
        );

        brain.state.los_failures = 3;
        let arrived = AgentSnapshot::new(AgentId(1), Vec3::new(1.5, 0.0, 0.5));
        let rotation = brain.tick(&env(&world, &arrived, &config, now));
        assert_eq!(brain.state().task, Task::Chopping);
        assert_eq!(brain.state().target_tree, Some(tree));
        assert!(brain.state().reposition_target.is_none());
        assert_eq!(brain.state().los_failures, 0);
        assert_eq!(brain.state().ticks_since_progress, 0);
        assert!(rotation.is_some());
    }

    #[test]
    fn test_unreached_reposition_spot_times_out_to_idle() {
        let config = Config {
            task: TaskConfig {
                reposition_timeout: 5,
                ..TaskConfig::default()
            },
            ..Config::default()
        };
        let mut world = VoxelGrid::flat(8, -1);
        let tree = BlockPos::new(3, 0, 0);
        world.set(tree, Block::Log);
        let body = body();
        let mut brain = chopping(&config, tree);
        let now = Instant::now();
        lose_sight(&mut brain, &env(&world, &body, &config, now));
        assert_eq!(brain.state().task, Task::Repositioning);

        let stranded = AgentSnapshot::new(AgentId(1), Vec3::new(-4.5, 0.0, 0.5));
        for _ in 0..config.task.reposition_timeout {
            brain.tick(&env(&world, &stranded, &config, now));
            assert_eq!(brain.state().task, Task::Repositioning);
        }
        brain.tick(&env(&world, &stranded, &config, now));
        assert_eq!(brain.state().task, Task::Idle);
        assert!(brain.state().reposition_target.is_none());
        assert!(brain.state().target_tree.is_none());
    }

    #[test]
    fn test_leaf_clearing_loop_leaves_the_area() {
        let config = Config::default();
        let world = VoxelGrid::new();
        let body = body();
        let tree = BlockPos::new(3, 0, 0);
        let mut brain = clearing_leaves(&config, tree);
        let now = Instant::now();
        for _ in 0..config.intelligence.pattern_threshold {
            brain.intelligence.record_leaf_clearing_attempt(tree, now);
        }

        brain.tick(&env(&world, &body, &config, now));
        assert_eq!(brain.state().task, Task::Idle);
        assert_eq!(brain.state().thinking, ThinkingState::Idle);
        assert_eq!(
            brain.intelligence().blacklist_reason(tree),
            Some("Leaf-clearing loop detected")
        );
        assert!(brain.intelligence().forced_exploration);
    }

    #[test]
    fn test_slow_leaf_clearing_gives_up_the_tree() {
        let config = Config::default();
        let world = VoxelGrid::new();
        let body = body();
        let tree = BlockPos::new(3, 0, 0);
        let mut brain = clearing_leaves(&config, tree);
        brain.state.ticks_since_progress = config.task.leaf_clear_timeout;

        brain.tick(&env(&world, &body, &config, Instant::now()));
        assert_eq!(brain.state().task, Task::Idle);
        assert!(brain.state().target_tree.is_none());
        assert_eq!(
            brain.intelligence().blacklist_reason(tree),
            Some("Leaf clearing ultra-timeout")
        );
        assert!(!brain.intelligence().forced_exploration);
    }

    #[test]
    fn test_only_problematic_leaves_in_the_way_gives_up_the_tree() {
        let config = Config::default();
        let mut world = VoxelGrid::flat(8, -1);
        let tree = BlockPos::new(3, 0, 0);
        let leaf = BlockPos::new(2, 0, 0);
        world.set(tree, Block::Log);
        world.set(leaf, Block::Leaf);
        let body = body();
        let mut brain = clearing_leaves(&config, tree);
        brain.intelligence.mark_problematic(leaf);

        brain.tick(&env(&world, &body, &config, Instant::now()));
        assert_eq!(brain.state().task, Task::Idle);
        assert!(brain.state().current_leaf.is_none());
        assert_eq!(
            brain.intelligence().blacklist_reason(tree),
            Some("All leaves problematic")
        );
        assert!(!brain.intelligence().forced_exploration);
    }

    #[test]
    fn test_view_blocked_by_something_else_gives_up_the_tree() {
        let config = Config::default();
        let mut world = VoxelGrid::flat(8, -1);
        let tree = BlockPos::new(3, 0, 0);
        world.set(tree, Block::Log);
        world.fill(BlockPos::new(2, 0, 0), BlockPos::new(2, 1, 0), Block::Stone);
        let body = body();
        let mut brain = clearing_leaves(&config, tree);

        brain.tick(&env(&world, &body, &config, Instant::now()));
        assert_eq!(brain.state().task, Task::Idle);
        assert_eq!(
            brain.intelligence().blacklist_reason(tree),
            Some("Persistent obstruction")
        );
        assert!(!brain.intelligence().forced_exploration);
    }

    #[test]
    fn test_lost_sight_of_a_leaf_switches_to_another_leaf() {
        let config = Config::default();
        let mut world = VoxelGrid::flat(8, -1);
        let tree = BlockPos::new(3, 0, 0);
        let stubborn = BlockPos::new(1, 1, 0);
        let other = BlockPos::new(2, 0, 0);
        world.set(tree, Block::Log);
        world.set(stubborn, Block::Leaf);
        world.set(other, Block::Leaf);
        let body = body();
        let mut brain = clearing_leaves(&config, tree);
        brain.state.current_leaf = Some(stubborn);
        brain.state.ticks_since_progress = 7;

        lose_sight(&mut brain, &env(&world, &body, &config, Instant::now()));
        assert_eq!(brain.state().task, Task::ClearingLeaves);
        assert_eq!(brain.state().current_leaf, Some(other));
        assert!(brain.state().problematic_leaves.contains(&stubborn));
        assert!(brain.intelligence().is_problematic(stubborn));
        assert_eq!(brain.state().los_failures, 0);
        assert_eq!(brain.state().ticks_since_progress, 0);
    }

    #[test]
    fn test_lost_sight_of_the_last_leaf_repositions_then_resumes_clearing() {
        let config = Config::default();
        let mut world = VoxelGrid::flat(8, -1);
        let tree = BlockPos::new(3, 0, 0);
        let leaf = BlockPos::new(2, 0, 0);
        world.set(tree, Block::Log);
        world.set(leaf, Block::Leaf);
        let body = body();
        let mut brain = clearing_leaves(&config, tree);
        brain.state.current_leaf = Some(leaf);
        let now = Instant::now();

        lose_sight(&mut brain, &env(&world, &body, &config, now));
        assert_eq!(brain.state().task, Task::Repositioning);
        assert_eq!(brain.state().reposition_target, Some(BlockPos::new(1, 0, -2)));
        assert!(brain.intelligence().is_problematic(leaf));

        let arrived = AgentSnapshot::new(AgentId(1), Vec3::new(1.5, 0.0, -1.5));
        brain.tick(&env(&world, &arrived, &config, now));
        assert_eq!(brain.state().task, Task::ClearingLeaves);
        assert_eq!(brain.state().current_leaf, Some(leaf));
        assert!(brain.state().reposition_target.is_none());
    }

    #[test]
    fn test_lost_sight_of_a_leaf_with_nowhere_to_stand_falls_back_to_chopping() {
        let config = Config::default();
        // No ground anywhere, so there is no spot to reposition to
        let mut world = VoxelGrid::new();
        let tree = BlockPos::new(3, 0, 0);
        let leaf = BlockPos::new(2, 0, 0);
        world.set(tree, Block::Log);
        world.set(leaf, Block::Leaf);
        let body = body();
        let mut brain = clearing_leaves(&config, tree);
        brain.state.current_leaf = Some(leaf);

        lose_sight(&mut brain, &env(&world, &body, &config, Instant::now()));
        assert_eq!(brain.state().task, Task::Chopping);
        assert_eq!(brain.state().thinking, ThinkingState::Chopping);
        assert!(brain.state().current_leaf.is_none());
        assert!(brain.state().problematic_leaves.contains(&leaf));
        assert_eq!(brain.state().target_tree, Some(tree));
        assert_eq!(brain.state().los_failures, 0);
    }

    #[test]
    fn test_line_of_sight_failures_are_ignored_while_idle() {
        let config = Config::default();
        let world = VoxelGrid::new();
        let body = body();
        let mut brain = AgentBrain::new(&config);
        let env = env(&world, &body, &config, Instant::now());
        for _ in 0..50 {
            brain.handle(Notification::LineOfSightFailure, &env);
        }
        assert_eq!(brain.state().los_failures, 0);
        assert_eq!(brain.state().task, Task::Idle);
    }

    #[test]
    fn test_force_new_target() {
        let config = Config::default();
        let mut world = VoxelGrid::flat(8, -1);
        world.plant_tree(BlockPos::new(3, 0, 0), 3, false);
        let body = body();
        let mut brain = chopping(&config, BlockPos::new(3, 0, 0));

        brain.handle(
            Notification::ForceNewTarget,
            &env(&world, &body, &config, Instant::now()),
        );
        assert_eq!(brain.state().target_tree, Some(BlockPos::new(3, 1, 0)));

        let mut lonely = VoxelGrid::flat(8, -1);
        lonely.set(BlockPos::new(3, 0, 0), Block::Log);
        let mut brain = chopping(&config, BlockPos::new(3, 0, 0));
        brain.state.collection_attempts = 4;
        brain.handle(
            Notification::ForceNewTarget,
            &env(&lonely, &body, &config, Instant::now()),
        );
        assert_eq!(brain.state().task, Task::Collecting);
        assert_eq!(brain.state().collection_attempts, 0);
    }

    #[test]
    fn test_stuck_travel_triggers_emergency_reset() {
        let config = Config::default();
        let mut world = VoxelGrid::flat(16, -1);
        let tree = BlockPos::new(10, 0, 0);
        world.set(tree, Block::Log);
        let body = body();
        let mut brain = AgentBrain::new(&config);
        brain.intelligence.blacklist(BlockPos::new(-5, 0, 0), "Old failure");
        brain.state.move_to_tree(tree);

        let start = Instant::now();
        for i in 0..config.intelligence.stuck_window as u32 {
            assert_eq!(brain.state().task, Task::MovingToTree);
            brain.tick(&env(&world, &body, &config, start + Duration::from_millis(1100) * i));
        }
        assert_eq!(brain.state().task, Task::Idle);
        assert_eq!(brain.state().thinking, ThinkingState::StuckRecovery);
        assert_eq!(brain.intelligence().blacklist_len(), 0);
        assert!(brain.intelligence().forced_exploration);
    }

    #[test]
    fn test_standing_still_while_chopping_is_not_stuck() {
        let config = Config::default();
        let mut world = VoxelGrid::flat(8, -1);
        let tree = BlockPos::new(2, 0, 0);
        world.set(tree, Block::Log);
        let body = body();
        let mut brain = chopping(&config, tree);

        let start = Instant::now();
        for i in 0..8 {
            brain.tick(&env(&world, &body, &config, start + Duration::from_millis(1100) * i));
        }
        assert_eq!(brain.state().task, Task::Chopping);
        assert_eq!(brain.state().target_tree, Some(tree));
    }

    #[test]
    fn test_rotation_is_stepped_then_cleared() {
        let config = Config::default();
        let world = VoxelGrid::new();
        let mut body = body();
        let mut brain = AgentBrain::new(&config);
        brain.state.task = Task::Collecting;
        brain.state.rotation_target = Some(Rotation::new(10.0, 0.0));

        let rotation = brain.tick(&env(&world, &body, &config, Instant::now()));
        assert_eq!(rotation, Some(Rotation::new(2.5, 0.0)));
        assert!(brain.state().rotation_target.is_some());

        body.rotation = Rotation::new(9.0, 0.0);
        let rotation = brain.tick(&env(&world, &body, &config, Instant::now()));
        assert_eq!(rotation, Some(Rotation::new(10.0, 0.0)));
        assert!(brain.state().rotation_target.is_none());
    }

    #[test]
    fn test_collecting_heads_for_distant_items_then_goes_idle() {
        let config = Config::default();
        let mut world = VoxelGrid::flat(8, -1);
        world.spawn_item(Vec3::new(6.5, 0.2, 0.5));
        let body = body();
        let mut brain = AgentBrain::new(&config);
        brain.state.degrade_to_collecting();

        brain.tick(&env(&world, &body, &config, Instant::now()));
        assert_eq!(brain.state().task, Task::MovingToItem);
        assert_eq!(brain.state().target_item, Some(BlockPos::new(6, 0, 0)));
        assert_eq!(brain.state().active_target(), Some(BlockPos::new(6, 0, 0).center()));

        let empty = VoxelGrid::flat(8, -1);
        let near = AgentSnapshot::new(AgentId(1), Vec3::new(6.5, 0.0, 0.5));
        brain.tick(&env(&empty, &near, &config, Instant::now()));
        assert_eq!(brain.state().task, Task::Collecting);
        for _ in 0..=config.task.collect_grace {
            brain.tick(&env(&empty, &near, &config, Instant::now()));
        }
        assert_eq!(brain.state().task, Task::Idle);
    }
}
