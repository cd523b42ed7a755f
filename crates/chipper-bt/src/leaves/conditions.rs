use crate::context::TickContext;
use crate::node::Status;
use chipper_core::geometry::squared_distance_to_center;
use chipper_core::{BlockPos, WorldQuery};
use cgmath::InnerSpace;
use log::debug;

/// Succeeds once the agent stood still for too long while following a path,
/// and keeps succeeding until the stuck recovery finished.
pub fn is_stuck(ctx: &mut TickContext) -> Status {
    if ctx.local.resolve_ticks > 0 {
        return Status::Success;
    }
    if ctx.local.path.is_empty() {
        return Status::Failure;
    }

    let moved = (ctx.agent.position - ctx.local.last_position).magnitude();
    if moved < ctx.config.behavior.stuck_epsilon {
        ctx.local.ticks_stuck += 1;
    } else {
        ctx.local.ticks_stuck = 0;
        ctx.local.last_position = ctx.agent.position;
    }

    if ctx.local.ticks_stuck > ctx.config.behavior.stuck_threshold {
        debug!("{} stuck for {} evaluations", ctx.agent.id, ctx.local.ticks_stuck);
        Status::Success
    } else {
        Status::Failure
    }
}

/// Succeeds when the authoritative side disagrees with the local target:
/// it dropped the target while still active, or it points at a tree far away.
pub fn server_emergency(ctx: &mut TickContext) -> Status {
    let Some(local_target) = ctx.local.tree_target else {
        return Status::Failure;
    };
    let agent = ctx.agent.id;
    let server_target = ctx.channel.active_target(agent).map(BlockPos::containing);

    let emergency = match server_target {
        None => ctx.channel.is_active(agent),
        Some(server_target) => {
            server_target != local_target
                && local_target.squared_distance(server_target)
                    > ctx.config.behavior.target_divergence_sq
        }
    };
    if !emergency {
        return Status::Failure;
    }

    // Rate limited per agent, a suppressed emergency is re-checked after the cooldown
    if !ctx
        .local
        .cooldowns
        .emergency
        .try_fire(ctx.now, ctx.config.behavior.emergency_cooldown)
    {
        return Status::Failure;
    }

    ctx.local.current_state = if server_target.is_some() {
        "Server found a better target"
    } else {
        "Server abandoned the target"
    };
    Status::Success
}

pub fn has_target(ctx: &mut TickContext) -> Status {
    if ctx.local.tree_target.is_some() {
        Status::Success
    } else {
        Status::Failure
    }
}

/// Succeeds when the mining target, or the tree itself, is within mining range.
pub fn in_mining_range(ctx: &mut TickContext) -> Status {
    let Some(target) = ctx.local.mining_target.or(ctx.local.tree_target) else {
        return Status::Failure;
    };
    let range = ctx.config.behavior.mining_range;
    if squared_distance_to_center(ctx.agent.position, target) <= range * range {
        Status::Success
    } else {
        Status::Failure
    }
}

/// Picks the block to mine and checks it is visible from the agent's eyes.
///
/// The authoritative mining target wins. A failed raycast towards it is
/// reported back through the channel.
pub fn has_line_of_sight(ctx: &mut TickContext) -> Status {
    let agent = ctx.agent.id;
    if let Some(target) = ctx.channel.mining_target(agent) {
        retarget(ctx, target);
        if is_visible(ctx, target) {
            return Status::Success;
        }
        ctx.channel.notify_line_of_sight_failure(agent);
        return Status::Failure;
    }

    let Some(target) = ctx
        .local
        .tree_target
        .and_then(|base| lowest_log_above(ctx.world, base, ctx.config.behavior.fallback_log_height))
    else {
        ctx.local.tree_target = None;
        return Status::Failure;
    };
    retarget(ctx, target);
    if is_visible(ctx, target) {
        Status::Success
    } else {
        Status::Failure
    }
}

/// Switches the mining target, restarting the mining timer when it changes.
fn retarget(ctx: &mut TickContext, target: BlockPos) {
    if ctx.local.mining_target != Some(target) {
        ctx.local.last_mine_time = None;
    }
    ctx.local.mining_target = Some(target);
}

/// Visible when the ray from the eyes reaches the target, or reaches its
/// cell without hitting anything because the block is already gone.
fn is_visible(ctx: &TickContext, target: BlockPos) -> bool {
    ctx.world
        .raycast(ctx.agent.eye_position(), target.center())
        .is_none_or(|hit| hit == target)
}

/// The first log at or above `base`, looking at most `height` blocks up.
fn lowest_log_above(world: &dyn WorldQuery, base: BlockPos, height: i32) -> Option<BlockPos> {
    (0..height)
        .map(|dy| base.up_by(dy))
        .find(|pos| world.is_log(*pos))
}
