use chipper_brain::{BrainChannel, BrainRegistry, Task, TaskLoop, notification_queue};
use chipper_core::clock::ManualClock;
use chipper_core::config::Config;
use chipper_core::grid::{Block, VoxelGrid};
use chipper_core::sync::{TaskChannel, ThinkingState};
use chipper_core::{AgentId, AgentSnapshot, BlockPos, Vec3};
use std::sync::Arc;
use std::time::Duration;

const AGENT: AgentId = AgentId(1);

struct Harness {
    task_loop: TaskLoop,
    channel: BrainChannel,
    clock: ManualClock,
    body: AgentSnapshot,
}

impl Harness {
    fn new() -> Self {
        let (sender, receiver) = notification_queue();
        let registry = BrainRegistry::new(Arc::new(Config::default()));
        let clock = ManualClock::new();
        let task_loop = TaskLoop::new(registry.clone(), receiver, Arc::new(clock.clone()));
        let channel = BrainChannel::new(registry, sender);
        channel.start(AGENT);
        Self {
            task_loop,
            channel,
            clock,
            body: AgentSnapshot::new(AGENT, Vec3::new(0.5, 0.0, 0.5)),
        }
    }

    fn tick(&mut self, world: &VoxelGrid) {
        self.clock.advance(Duration::from_millis(50));
        self.task_loop.tick(world, &[self.body]);
    }

    fn task(&self) -> Task {
        self.task_loop
            .registry()
            .read(AGENT, |brain| brain.state().task)
            .unwrap()
    }

    fn blacklist_reason(&self, pos: BlockPos) -> Option<String> {
        self.task_loop
            .registry()
            .read(AGENT, |brain| {
                brain.intelligence().blacklist_reason(pos).map(str::to_string)
            })
            .flatten()
    }
}

#[test]
fn test_leaf_in_front_of_the_trunk_is_cleared_before_chopping() {
    let mut grid = VoxelGrid::flat(8, -1);
    let log = BlockPos::new(3, 0, 0);
    let leaf = BlockPos::new(2, 0, 0);
    grid.set(log, Block::Log);
    grid.set(leaf, Block::Leaf);
    let mut harness = Harness::new();

    harness.tick(&grid);
    assert_eq!(harness.task(), Task::MovingToTree);
    assert_eq!(harness.channel.active_target(AGENT), Some(log.center()));

    harness.tick(&grid);
    assert_eq!(harness.task(), Task::ClearingLeaves);
    assert!(harness.channel.is_clearing_leaves(AGENT));

    harness.tick(&grid);
    assert_eq!(harness.channel.mining_target(AGENT), Some(leaf));
    assert_eq!(
        harness.channel.thinking_state(AGENT),
        ThinkingState::ClearingObstacles
    );

    grid.break_block(leaf);
    for _ in 0..3 {
        harness.tick(&grid);
    }
    assert_eq!(harness.task(), Task::Chopping);
    assert_eq!(harness.channel.mining_target(AGENT), Some(log));
}

#[test]
fn test_lost_sight_of_a_lone_log_gives_it_up() {
    let mut grid = VoxelGrid::flat(8, -1);
    let log = BlockPos::new(3, 0, 0);
    grid.set(log, Block::Log);
    grid.fill(BlockPos::new(2, 0, 0), BlockPos::new(2, 2, 0), Block::Stone);
    let mut harness = Harness::new();

    harness.tick(&grid);
    harness.tick(&grid);
    assert_eq!(harness.task(), Task::Chopping);

    for _ in 0..40 {
        harness.channel.notify_line_of_sight_failure(AGENT);
        harness.tick(&grid);
        if harness.task() == Task::Idle {
            break;
        }
    }
    assert_eq!(harness.task(), Task::Idle);
    assert_eq!(
        harness.blacklist_reason(log).as_deref(),
        Some("LOS failures, no alternatives")
    );

    harness.tick(&grid);
    assert_eq!(harness.task(), Task::Idle);
    assert!(harness.channel.active_target(AGENT).is_none());
}

#[test]
fn test_felled_log_is_picked_up() {
    let mut grid = VoxelGrid::flat(8, -1);
    let log = BlockPos::new(3, 0, 0);
    grid.set(log, Block::Log);
    let mut harness = Harness::new();

    harness.tick(&grid);
    harness.tick(&grid);
    assert_eq!(harness.task(), Task::Chopping);

    harness.channel.notify_mining_progress(AGENT);
    grid.break_block(log);
    harness.tick(&grid);
    assert_eq!(harness.task(), Task::Collecting);
    assert!(harness.channel.status(AGENT).contains("Successes: 2"));

    harness.tick(&grid);
    assert_eq!(harness.task(), Task::MovingToItem);
    assert_eq!(harness.channel.active_target(AGENT), Some(log.center()));
}

#[test]
fn test_stopped_agent_keeps_no_state() {
    let mut grid = VoxelGrid::flat(8, -1);
    grid.plant_tree(BlockPos::new(3, 0, 0), 4, true);
    let mut harness = Harness::new();

    harness.tick(&grid);
    assert!(harness.channel.active_target(AGENT).is_some());

    harness.channel.stop(AGENT);
    harness.tick(&grid);
    assert!(harness.channel.active_target(AGENT).is_none());
    assert_eq!(harness.channel.status(AGENT), "Inactive");

    harness.channel.start(AGENT);
    assert!(harness.channel.status(AGENT).starts_with("Active | Task: Idle"));
    assert!(!harness.channel.status(AGENT).contains("Last decision"));
}
