use crate::channel::NotificationReceiver;
use crate::machine::Surroundings;
use crate::registry::BrainRegistry;
use chipper_core::clock::Clock;
use chipper_core::{AgentId, AgentSnapshot, Rotation, WorldQuery};
use log::{debug, trace};
use std::sync::Arc;

/// The authoritative loop: applies queued notifications, then ticks every
/// active agent once.
#[derive(Debug)]
pub struct TaskLoop {
    registry: BrainRegistry,
    receiver: NotificationReceiver,
    clock: Arc<dyn Clock>,
    ticks: u64,
}

impl TaskLoop {
    /// Creates a new task loop.
    ///
    /// # Arguments
    ///
    /// * `registry` - Shared with the [`crate::BrainChannel`] the reactive loop holds.
    /// * `receiver` - Receiving end of the same channel's notification queue.
    /// * `clock` - Time source for every window the brains measure.
    ///
    /// # Returns
    ///
    /// The new [`TaskLoop`].
    pub fn new(
        registry: BrainRegistry,
        receiver: NotificationReceiver,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            receiver,
            clock,
            ticks: 0,
        }
    }

    pub fn registry(&self) -> &BrainRegistry {
        &self.registry
    }

    /// Number of completed ticks.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Runs one authoritative tick.
    ///
    /// Notifications for agents without a body in `bodies`, or for agents that
    /// were stopped since they were queued, are dropped.
    ///
    /// # Returns
    ///
    /// The view rotation each agent should apply this tick.
    pub fn tick(
        &mut self,
        world: &dyn WorldQuery,
        bodies: &[AgentSnapshot],
    ) -> Vec<(AgentId, Rotation)> {
        let now = self.clock.now();
        let config = Arc::clone(self.registry.config());

        for event in self.receiver.try_recv_all() {
            let Some(body) = bodies.iter().find(|body| body.id == event.agent) else {
                debug!("No body for {}, dropping {:?}", event.agent, event.notification);
                continue;
            };
            let env = Surroundings {
                world,
                body,
                config: &config,
                now,
            };
            if self
                .registry
                .update(event.agent, |brain| brain.handle(event.notification, &env))
                .is_none()
            {
                trace!("{} stopped before {:?} was applied", event.agent, event.notification);
            }
        }

        let mut rotations = Vec::new();
        for body in bodies {
            let env = Surroundings {
                world,
                body,
                config: &config,
                now,
            };
            if let Some(Some(rotation)) = self.registry.update(body.id, |brain| brain.tick(&env)) {
                rotations.push((body.id, rotation));
            }
        }

        self.ticks += 1;
        rotations
    }
}
