use chipper_core::sync::ThinkingState;
use chipper_core::{AgentSnapshot, BlockPos, Rotation, Ticks, Vec3};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::time::Instant;

/// What the agent is doing according to the authoritative side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Task {
    #[default]
    Idle,
    MovingToTree,
    Chopping,
    ClearingLeaves,
    Repositioning,
    Collecting,
    MovingToItem,
}

impl Task {
    pub fn as_str(&self) -> &'static str {
        match self {
            Task::Idle => "Idle",
            Task::MovingToTree => "MovingToTree",
            Task::Chopping => "Chopping",
            Task::ClearingLeaves => "ClearingLeaves",
            Task::Repositioning => "Repositioning",
            Task::Collecting => "Collecting",
            Task::MovingToItem => "MovingToItem",
        }
    }

    /// Tasks that require a tree target.
    pub fn works_on_tree(&self) -> bool {
        matches!(
            self,
            Task::MovingToTree | Task::Chopping | Task::ClearingLeaves
        )
    }

    /// Tasks during which the agent is expected to travel.
    pub fn is_travelling(&self) -> bool {
        matches!(
            self,
            Task::MovingToTree | Task::Repositioning | Task::MovingToItem
        )
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One decision taken while picking targets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub at: Instant,
    pub reason: &'static str,
    pub target: BlockPos,
}

/// Short term memory of the positions picked by target selection.
#[derive(Debug, Clone)]
pub struct DecisionTracker {
    attempts: HashMap<BlockPos, u32>,
    history: VecDeque<Decision>,
    capacity: usize,
}

impl DecisionTracker {
    pub fn new(capacity: usize) -> Self {
        Self {
            attempts: HashMap::new(),
            history: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Records that `target` was picked, keeping only the newest decisions.
    pub fn record(&mut self, target: BlockPos, reason: &'static str, at: Instant) {
        *self.attempts.entry(target).or_insert(0) += 1;
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(Decision { at, reason, target });
    }

    pub fn attempts(&self, target: BlockPos) -> u32 {
        self.attempts.get(&target).copied().unwrap_or(0)
    }

    /// Decisions from oldest to newest.
    pub fn history(&self) -> impl Iterator<Item = &Decision> {
        self.history.iter()
    }

    pub fn last(&self) -> Option<&Decision> {
        self.history.back()
    }

    pub fn clear(&mut self) {
        self.attempts.clear();
        self.history.clear();
    }
}

/// Long lived task state of one agent.
///
/// While the task works on a tree the tree target is set, and an idle agent
/// holds no target at all.
#[derive(Debug, Clone)]
pub struct TaskState {
    pub task: Task,
    pub target_tree: Option<BlockPos>,
    pub target_item: Option<BlockPos>,
    pub reposition_target: Option<BlockPos>,
    pub current_leaf: Option<BlockPos>,
    pub ticks_since_progress: Ticks,
    pub chop_cooldown: Ticks,
    pub collection_attempts: u32,
    pub los_failures: u32,
    pub rotation_target: Option<Rotation>,
    pub problematic_leaves: HashSet<BlockPos>,
    pub thinking: ThinkingState,
    pub decisions: DecisionTracker,
}

impl TaskState {
    pub fn new(decision_capacity: usize) -> Self {
        Self {
            task: Task::Idle,
            target_tree: None,
            target_item: None,
            reposition_target: None,
            current_leaf: None,
            ticks_since_progress: 0,
            chop_cooldown: 0,
            collection_attempts: 0,
            los_failures: 0,
            rotation_target: None,
            problematic_leaves: HashSet::new(),
            thinking: ThinkingState::Idle,
            decisions: DecisionTracker::new(decision_capacity),
        }
    }

    /// Drops every target and goes back to searching.
    pub fn go_idle(&mut self) {
        self.task = Task::Idle;
        self.target_tree = None;
        self.target_item = None;
        self.reposition_target = None;
        self.current_leaf = None;
        self.ticks_since_progress = 0;
    }

    /// Gives up on the tree and picks up whatever it dropped.
    pub fn degrade_to_collecting(&mut self) {
        self.task = Task::Collecting;
        self.target_tree = None;
        self.reposition_target = None;
        self.current_leaf = None;
        self.ticks_since_progress = 0;
        self.thinking = ThinkingState::Collecting;
    }

    pub fn move_to_tree(&mut self, tree: BlockPos) {
        self.task = Task::MovingToTree;
        self.target_tree = Some(tree);
        self.current_leaf = None;
        self.ticks_since_progress = 0;
    }

    /// Turns towards the center of `target`.
    pub fn look_at(&mut self, body: &AgentSnapshot, target: BlockPos) {
        self.rotation_target = Some(Rotation::looking_at(body.eye_position(), target.center()));
    }

    /// Where the agent should head for: reposition target, then tree, then item.
    pub fn active_target(&self) -> Option<Vec3> {
        match self.task {
            Task::Repositioning if self.reposition_target.is_some() => {
                self.reposition_target.map(BlockPos::center)
            }
            task if task.works_on_tree() && self.target_tree.is_some() => {
                self.target_tree.map(BlockPos::center)
            }
            Task::MovingToItem => self.target_item.map(BlockPos::center),
            _ => None,
        }
    }

    /// The block to break: the leaf while clearing leaves, the tree otherwise.
    pub fn mining_target(&self) -> Option<BlockPos> {
        match (self.task, self.current_leaf) {
            (Task::ClearingLeaves, Some(leaf)) => Some(leaf),
            _ => self.target_tree,
        }
    }
}
