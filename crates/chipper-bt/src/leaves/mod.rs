//! Condition and action leaves of the chopping tree.

mod actions;
mod conditions;

use crate::context::TickContext;
use crate::node::{Behavior, Node, Status};

/// Every leaf the chopping tree is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Leaf {
    // Conditions
    IsStuck,
    ServerEmergency,
    HasTarget,
    InMiningRange,
    HasLineOfSight,

    // Actions
    ResolveStuck,
    FollowServerIntelligence,
    MineBlock,
    CalculatePath,
    FollowPath,
    InvalidateTarget,
    FindNewTree,
    Idle,
}

impl<'a> Behavior<TickContext<'a>> for Leaf {
    fn tick(&self, ctx: &mut TickContext<'a>) -> Status {
        match self {
            Leaf::IsStuck => conditions::is_stuck(ctx),
            Leaf::ServerEmergency => conditions::server_emergency(ctx),
            Leaf::HasTarget => conditions::has_target(ctx),
            Leaf::InMiningRange => conditions::in_mining_range(ctx),
            Leaf::HasLineOfSight => conditions::has_line_of_sight(ctx),
            Leaf::ResolveStuck => actions::resolve_stuck(ctx),
            Leaf::FollowServerIntelligence => actions::follow_server_intelligence(ctx),
            Leaf::MineBlock => actions::mine_block(ctx),
            Leaf::CalculatePath => actions::calculate_path(ctx),
            Leaf::FollowPath => actions::follow_path(ctx),
            Leaf::InvalidateTarget => actions::invalidate_target(ctx),
            Leaf::FindNewTree => actions::find_new_tree(ctx),
            Leaf::Idle => actions::idle(ctx),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Leaf::IsStuck => "is_stuck",
            Leaf::ServerEmergency => "server_emergency",
            Leaf::HasTarget => "has_target",
            Leaf::InMiningRange => "in_mining_range",
            Leaf::HasLineOfSight => "has_line_of_sight",
            Leaf::ResolveStuck => "resolve_stuck",
            Leaf::FollowServerIntelligence => "follow_server_intelligence",
            Leaf::MineBlock => "mine_block",
            Leaf::CalculatePath => "calculate_path",
            Leaf::FollowPath => "follow_path",
            Leaf::InvalidateTarget => "invalidate_target",
            Leaf::FindNewTree => "find_new_tree",
            Leaf::Idle => "idle",
        }
    }
}

/// Builds the chopping tree. Branches are tried top to bottom on every evaluation:
///
/// 1. stuck recovery
/// 2. authoritative override
/// 3. chop cycle: mine if in range and visible, else walk there, else drop the target
/// 4. acquire a new tree
/// 5. idle
pub fn chop_tree() -> Node<Leaf> {
    let leaf = Node::leaf;

    Node::selector([
        Node::sequence([leaf(Leaf::IsStuck), leaf(Leaf::ResolveStuck)]),
        Node::sequence([
            leaf(Leaf::ServerEmergency),
            leaf(Leaf::FollowServerIntelligence),
        ]),
        Node::sequence([
            leaf(Leaf::HasTarget),
            Node::selector([
                Node::sequence([
                    leaf(Leaf::InMiningRange),
                    leaf(Leaf::HasLineOfSight),
                    leaf(Leaf::MineBlock),
                ]),
                Node::selector([
                    Node::sequence([leaf(Leaf::CalculatePath), leaf(Leaf::FollowPath)]),
                    leaf(Leaf::InvalidateTarget),
                ]),
            ]),
        ]),
        leaf(Leaf::FindNewTree),
        leaf(Leaf::Idle),
    ])
}
