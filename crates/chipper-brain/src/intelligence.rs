//! Failure memory of one agent.
//!
//! [`Intelligence`] remembers which targets failed and why, watches the
//! agent's position history for stagnation and detects repetitive patterns
//! (leaf clearing and target upgrade loops) so the task state machine can
//! break out of them.

use chipper_core::BlockPos;
use chipper_core::config::IntelligenceConfig;
use log::info;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

/// A switch from one log of a tree to a better one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Upgrade {
    pub at: Instant,
    pub target: BlockPos,
}

fn within(now: Instant, then: Instant, window: Duration) -> bool {
    now.saturating_duration_since(then) < window
}

#[derive(Debug, Clone)]
pub struct Intelligence {
    config: IntelligenceConfig,
    blacklist: HashMap<BlockPos, String>,
    first_attempted: HashMap<BlockPos, Instant>,
    attempts: HashMap<BlockPos, u32>,
    last_repositioned: HashMap<BlockPos, Instant>,
    alternatives_tried: HashMap<BlockPos, Instant>,
    problematic: HashSet<BlockPos>,
    positions: VecDeque<BlockPos>,
    last_sample: Option<Instant>,
    leaf_attempts: HashMap<BlockPos, Vec<Instant>>,
    upgrades: HashMap<BlockPos, Vec<Upgrade>>,
    leaf_failures: HashMap<BlockPos, u32>,
    /// Search further out and prefer distant trees on the next search.
    pub forced_exploration: bool,
    failures: u32,
    successes: u32,
}

impl Intelligence {
    pub fn new(config: IntelligenceConfig) -> Self {
        Self {
            positions: VecDeque::with_capacity(config.history_capacity),
            config,
            blacklist: HashMap::new(),
            first_attempted: HashMap::new(),
            attempts: HashMap::new(),
            last_repositioned: HashMap::new(),
            alternatives_tried: HashMap::new(),
            problematic: HashSet::new(),
            last_sample: None,
            leaf_attempts: HashMap::new(),
            upgrades: HashMap::new(),
            leaf_failures: HashMap::new(),
            forced_exploration: false,
            failures: 0,
            successes: 0,
        }
    }

    // Position history

    /// Samples the agent's position at most once per sampling interval.
    pub fn sample_position(&mut self, pos: BlockPos, now: Instant) {
        let due = self
            .last_sample
            .is_none_or(|last| now.saturating_duration_since(last) > self.config.history_interval);
        if !due {
            return;
        }
        if self.positions.len() >= self.config.history_capacity {
            self.positions.pop_front();
        }
        self.positions.push_back(pos);
        self.last_sample = Some(now);
    }

    pub fn forget_positions(&mut self) {
        self.positions.clear();
        self.last_sample = None;
    }

    pub fn positions(&self) -> impl Iterator<Item = &BlockPos> {
        self.positions.iter()
    }

    /// Whether most of the newest samples sit in the same small area.
    pub fn is_completely_stuck(&self) -> bool {
        let window = self.config.stuck_window;
        let Some(&newest) = self.positions.back() else {
            return false;
        };
        if self.positions.len() < window {
            return false;
        }
        let radius_sq = self.config.stuck_radius * self.config.stuck_radius;
        let nearby = self
            .positions
            .iter()
            .skip(self.positions.len() - window)
            .filter(|p| p.squared_distance(newest) < radius_sq)
            .count();
        nearby >= self.config.stuck_majority
    }

    /// Whether the agent moved less than the minimum progress over the last samples.
    pub fn has_movement_stagnated(&self) -> bool {
        let lookback = self.config.stagnation_lookback;
        if lookback == 0 || self.positions.len() < lookback {
            return false;
        }
        let (Some(&newest), Some(&earlier)) = (
            self.positions.back(),
            self.positions.get(self.positions.len() - lookback),
        ) else {
            return false;
        };
        let progress = self.config.minimum_progress;
        newest.squared_distance(earlier) < progress * progress
    }

    // Blacklist

    /// Permanently rules out `target` until the next emergency reset.
    pub fn blacklist(&mut self, target: BlockPos, reason: &str) {
        info!("Blacklisted {} ({})", target, reason);
        self.blacklist.insert(target, reason.to_string());
    }

    pub fn is_blacklisted(&self, target: BlockPos) -> bool {
        self.blacklist.contains_key(&target)
    }

    pub fn blacklist_reason(&self, target: BlockPos) -> Option<&str> {
        self.blacklist.get(&target).map(String::as_str)
    }

    pub fn blacklist_len(&self) -> usize {
        self.blacklist.len()
    }

    pub fn mark_problematic(&mut self, pos: BlockPos) {
        self.problematic.insert(pos);
    }

    pub fn is_problematic(&self, pos: BlockPos) -> bool {
        self.problematic.contains(&pos)
    }

    // Attempts and outcomes

    pub fn record_attempt(&mut self, target: BlockPos, now: Instant) {
        self.first_attempted.entry(target).or_insert(now);
        *self.attempts.entry(target).or_insert(0) += 1;
    }

    pub fn attempts(&self, target: BlockPos) -> u32 {
        self.attempts.get(&target).copied().unwrap_or(0)
    }

    pub fn record_success(&mut self, what: &str) {
        self.successes += 1;
        info!("Success: {}", what);
    }

    /// Counts a failure, blacklisting targets that were attempted too often.
    pub fn record_failure(&mut self, target: Option<BlockPos>, reason: &str) {
        self.failures += 1;
        if let Some(target) = target
            && self.attempts(target) > self.config.failure_blacklist_attempts
        {
            self.blacklist(target, &format!("{} (too many attempts)", reason));
        }
    }

    pub fn failure_count(&self) -> u32 {
        self.failures
    }

    pub fn success_count(&self) -> u32 {
        self.successes
    }

    /// Whether `target` should be given up: blacklisted, attempted for too
    /// long, or attempted too many times.
    pub fn should_abandon(&self, target: BlockPos, now: Instant) -> bool {
        if self.is_blacklisted(target) {
            return true;
        }
        let too_old = self
            .first_attempted
            .get(&target)
            .is_some_and(|first| now.saturating_duration_since(*first) > self.config.abandon_age);
        too_old || self.attempts(target) > self.config.abandon_attempts
    }

    pub fn mark_repositioned(&mut self, target: BlockPos, now: Instant) {
        self.last_repositioned.insert(target, now);
    }

    pub fn has_recently_repositioned(&self, target: BlockPos, now: Instant) -> bool {
        self.last_repositioned
            .get(&target)
            .is_some_and(|then| within(now, *then, self.config.reposition_memory))
    }

    pub fn mark_alternatives_tried(&mut self, target: BlockPos, now: Instant) {
        self.alternatives_tried.insert(target, now);
    }

    pub fn has_recently_tried_alternatives(&self, target: BlockPos, now: Instant) -> bool {
        self.alternatives_tried
            .get(&target)
            .is_some_and(|then| within(now, *then, self.config.alternatives_memory))
    }

    // Loop detection

    pub fn record_leaf_clearing_attempt(&mut self, tree: BlockPos, now: Instant) {
        let retention = self.config.history_retention;
        let attempts = self.leaf_attempts.entry(tree).or_default();
        attempts.push(now);
        attempts.retain(|at| now.saturating_duration_since(*at) <= retention);
    }

    /// Whether leaves around `tree` were attempted too often within the loop window.
    pub fn is_in_leaf_clearing_loop(&self, tree: BlockPos, now: Instant) -> bool {
        let recent = self.leaf_attempts.get(&tree).map_or(0, |attempts| {
            attempts
                .iter()
                .filter(|at| within(now, **at, self.config.loop_window))
                .count()
        });
        recent >= self.config.pattern_threshold
    }

    /// Records that the agent switched from `from` to a better log `to`.
    pub fn record_upgrade(&mut self, from: BlockPos, to: BlockPos, now: Instant) {
        let retention = self.config.history_retention;
        let history = self.upgrades.entry(from).or_default();
        history.push(Upgrade { at: now, target: to });
        history.retain(|u| now.saturating_duration_since(u.at) <= retention);
    }

    /// Whether the newest upgrades away from `tree` all happened within the loop window.
    pub fn is_in_upgrade_loop(&self, tree: BlockPos, now: Instant) -> bool {
        let recent = self.upgrades.get(&tree).map_or(0, |history| {
            history
                .iter()
                .rev()
                .take_while(|u| within(now, u.at, self.config.loop_window))
                .take(self.config.pattern_threshold)
                .count()
        });
        recent >= self.config.pattern_threshold
    }

    pub fn record_leaf_clearing_failure(&mut self, tree: BlockPos) {
        *self.leaf_failures.entry(tree).or_insert(0) += 1;
    }

    pub fn has_recent_leaf_clearing_failures(&self, tree: BlockPos) -> bool {
        self.leaf_failures.get(&tree).copied().unwrap_or(0) >= self.config.leaf_failure_limit
    }

    // Recovery

    /// Forgets everything including the blacklist and the counters, and forces exploration.
    pub fn emergency_reset(&mut self) {
        self.blacklist.clear();
        self.problematic.clear();
        self.first_attempted.clear();
        self.attempts.clear();
        self.last_repositioned.clear();
        self.alternatives_tried.clear();
        self.forget_positions();
        self.leaf_attempts.clear();
        self.upgrades.clear();
        self.leaf_failures.clear();
        self.failures = 0;
        self.successes = 0;
        self.forced_exploration = true;
        info!("Intelligence cleared, forcing exploration");
    }

    pub fn stats(&self) -> String {
        format!(
            "Failures: {} | Blacklisted: {} | Successes: {}",
            self.failures,
            self.blacklist.len(),
            self.successes
        )
    }
}
