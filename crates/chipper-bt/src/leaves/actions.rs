use crate::context::TickContext;
use crate::node::Status;
use chipper_core::geometry::wrap_degrees;
use chipper_core::{BlockPos, Rotation, WorldQuery};
use cgmath::InnerSpace;
use log::{debug, info};

/// Backs off and jumps for a fixed number of evaluations after getting stuck.
pub fn resolve_stuck(ctx: &mut TickContext) -> Status {
    ctx.local.current_state = "Attempting to get unstuck";
    if ctx.local.resolve_ticks == 0 {
        info!("{} is stuck, backing off", ctx.agent.id);
        ctx.local.path.clear();
        ctx.intents.release();
        ctx.intents.back = true;
        ctx.intents.jump = true;
    }

    ctx.local.resolve_ticks += 1;
    if ctx.local.resolve_ticks > ctx.config.behavior.resolve_stuck_duration {
        ctx.release_all();
        ctx.local.ticks_stuck = 0;
        ctx.local.resolve_ticks = 0;
        ctx.local.last_position = ctx.agent.position;
        return Status::Success;
    }
    Status::Running
}

/// Adopts the authoritative target, or drops everything if there is none.
pub fn follow_server_intelligence(ctx: &mut TickContext) -> Status {
    let agent = ctx.agent.id;
    if !ctx.channel.is_active(agent) {
        ctx.local.current_state = "Server inactive, using local logic";
        return Status::Failure;
    }

    match ctx.channel.active_target(agent) {
        Some(target) => {
            ctx.local.tree_target = Some(BlockPos::containing(target));
            ctx.local.mining_target = None;
            ctx.local.path.clear();
            ctx.local.current_state = "Following server target";
        }
        None => {
            ctx.local.reset();
            ctx.local.current_state = "Server recommends idling";
        }
    }
    Status::Success
}

/// Breaks the mining target, giving up after the mining timeout.
pub fn mine_block(ctx: &mut TickContext) -> Status {
    let Some(target) = ctx.local.mining_target else {
        return Status::Failure;
    };
    ctx.local.current_state = "Mining block";
    ctx.intents.release();
    ctx.intents.look = Some(Rotation::looking_at(
        ctx.agent.eye_position(),
        target.center(),
    ));

    let started = match ctx.local.last_mine_time {
        Some(started) => started,
        None => {
            ctx.interaction.attack_block(target);
            ctx.local.last_mine_time = Some(ctx.now);
            ctx.now
        }
    };
    ctx.interaction.update_breaking_progress(target);

    let mining_for = ctx.now.saturating_duration_since(started);
    let agent = ctx.agent.id;
    if mining_for > ctx.config.behavior.progress_report_delay {
        ctx.channel.notify_mining_progress(agent);
    }

    if mining_for > ctx.config.behavior.mine_timeout {
        debug!("{} timed out mining {}", agent, target);
        ctx.local.current_state = "Mining timed out, requesting a new target";
        ctx.channel.force_new_target(agent);
        ctx.local.mining_target = None;
        ctx.local.last_mine_time = None;
        ctx.interaction.cancel_breaking();
        return Status::Failure;
    }

    if ctx.world.is_air(target) {
        ctx.local.current_state = "Block broken";
        ctx.local.mining_target = None;
        ctx.local.last_mine_time = None;
        return Status::Success;
    }
    Status::Running
}

/// Plans a path to a standable spot next to the tree.
///
/// A failed search degrades to a straight line, so this only fails without a target.
pub fn calculate_path(ctx: &mut TickContext) -> Status {
    let Some(tree) = ctx.local.tree_target else {
        return Status::Failure;
    };
    let start = ctx.agent.block_pos();
    let destination =
        find_standable_spot(ctx.world, tree, ctx.config.behavior.standable_search_radius)
            .unwrap_or(tree);

    let path = ctx.pathfinder.find_path_or_direct(
        ctx.world,
        start,
        destination,
        ctx.config.pathfinder.requested_budget,
        ctx.now,
    );
    ctx.local.path = path.into();
    ctx.local.current_state = "Path calculated, moving";
    Status::Success
}

/// Walks the path waypoint by waypoint.
pub fn follow_path(ctx: &mut TickContext) -> Status {
    let position = ctx.agent.position;
    let tolerance = ctx.config.behavior.waypoint_tolerance;
    if ctx
        .local
        .path
        .front()
        .is_some_and(|w| (w.center() - position).magnitude() < tolerance)
    {
        ctx.local.path.pop_front();
    }

    let Some(&waypoint) = ctx.local.path.front() else {
        ctx.local.current_state = "Path completed";
        ctx.release_all();
        return Status::Success;
    };
    ctx.local.current_state = "Following path";

    let direction = waypoint.center() - position;
    let target_yaw = direction.z.atan2(direction.x).to_degrees() as f32 - 90.0;
    let current = ctx.agent.rotation;
    let yaw_step = wrap_degrees(target_yaw - current.yaw) / ctx.config.behavior.turn_speed;
    ctx.intents.look = Some(Rotation::new(
        wrap_degrees(current.yaw + yaw_step),
        current.pitch,
    ));

    ctx.intents.forward = true;
    ctx.intents.sprint = ctx.local.tree_target.is_some_and(|tree| {
        (tree.center() - position).magnitude() > ctx.config.behavior.sprint_distance
    });
    ctx.intents.jump = waypoint.y > ctx.agent.block_pos().y && ctx.agent.on_ground;
    Status::Running
}

/// Drops the current target, rate limited so a flapping target is not dropped every evaluation.
pub fn invalidate_target(ctx: &mut TickContext) -> Status {
    if !ctx
        .local
        .cooldowns
        .invalidate
        .try_fire(ctx.now, ctx.config.behavior.invalidate_cooldown)
    {
        ctx.local.current_state = "Delaying target invalidation";
        return Status::Running;
    }
    debug!("{} invalidated its target", ctx.agent.id);
    ctx.local.current_state = "Target unreachable, finding a new one";
    ctx.local.reset();
    Status::Success
}

/// Acquires a tree: the authoritative target if it is a log, else the first
/// log found around the agent.
pub fn find_new_tree(ctx: &mut TickContext) -> Status {
    if !ctx
        .local
        .cooldowns
        .search
        .try_fire(ctx.now, ctx.config.behavior.search_cooldown)
    {
        ctx.local.current_state = "Waiting before the next tree search";
        return Status::Failure;
    }
    ctx.local.current_state = "Scanning for a tree";

    if let Some(target) = ctx.channel.active_target(ctx.agent.id) {
        let target = BlockPos::containing(target);
        if ctx.world.is_log(target) {
            ctx.local.tree_target = Some(target);
            ctx.local.current_state = "Using server target";
            return Status::Success;
        }
    }

    let radius = ctx.config.behavior.local_search_radius;
    let height = ctx.config.behavior.local_search_height;
    let origin = ctx.agent.block_pos();
    for x in -radius..=radius {
        for z in -radius..=radius {
            for y in -height..=height {
                let candidate = origin.offset(x, y, z);
                if ctx.world.is_log(candidate) {
                    ctx.local.tree_target = Some(candidate);
                    ctx.local.current_state = "Found local tree";
                    return Status::Success;
                }
            }
        }
    }

    ctx.local.current_state = "No trees in range";
    Status::Failure
}

/// Terminal fallback: stand still.
pub fn idle(ctx: &mut TickContext) -> Status {
    ctx.local.current_state = "Idle";
    ctx.release_all();
    Status::Running
}

/// First cell on growing square rings around `tree` where the agent could stand.
fn find_standable_spot(world: &dyn WorldQuery, tree: BlockPos, max_radius: i32) -> Option<BlockPos> {
    for r in 1..=max_radius {
        for dx in -r..=r {
            for dz in -r..=r {
                if dx.abs() != r && dz.abs() != r {
                    continue;
                }
                let candidate = tree.offset(dx, 0, dz);
                let found = [candidate, candidate.up(), candidate.down()]
                    .into_iter()
                    .find(|pos| is_standable(world, *pos));
                if found.is_some() {
                    return found;
                }
            }
        }
    }
    None
}

fn is_standable(world: &dyn WorldQuery, pos: BlockPos) -> bool {
    world.is_solid(pos.down()) && !world.is_solid(pos) && !world.is_solid(pos.up())
}
