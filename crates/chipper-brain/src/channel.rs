//! Notification queue between the reactive loop and the task loop, and the
//! [`TaskChannel`] handle the reactive loop and the command surface use.

use crate::errors::{BrainError, BrainResult};
use crate::registry::BrainRegistry;
use crate::task::Task;
use chipper_core::event::{AgentEvent, Notification};
use chipper_core::sync::{TaskChannel, ThinkingState};
use chipper_core::{AgentId, BlockPos, Vec3};
use crossbeam::channel::{Receiver, Sender, unbounded};
use log::{debug, warn};
use std::sync::Arc;

/// Creates a connected sender and receiver pair.
pub fn notification_queue() -> (NotificationSender, NotificationReceiver) {
    let (sender, receiver) = unbounded();
    (
        NotificationSender::new(sender),
        NotificationReceiver::new(receiver),
    )
}

/// Sending half of the notification queue.
#[derive(Debug, Clone)]
pub struct NotificationSender {
    sender: Sender<AgentEvent>,
}

impl NotificationSender {
    pub fn new(sender: Sender<AgentEvent>) -> Self {
        Self { sender }
    }

    /// Queues `event` without blocking.
    ///
    /// # Returns
    ///
    /// [`BrainError::Disconnected`] if the receiving side is gone.
    pub fn send(&self, event: AgentEvent) -> BrainResult<()> {
        self.sender.send(event).map_err(|_| BrainError::Disconnected)
    }
}

/// Receiving half of the notification queue, drained by the task loop.
#[derive(Debug, Clone)]
pub struct NotificationReceiver {
    receiver: Arc<Receiver<AgentEvent>>,
}

impl NotificationReceiver {
    pub fn new(receiver: Receiver<AgentEvent>) -> Self {
        Self {
            receiver: Arc::new(receiver),
        }
    }

    /// Receives all pending events without blocking, oldest first.
    pub fn try_recv_all(&self) -> Vec<AgentEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

/// [`TaskChannel`] backed by the brain registry and the notification queue.
///
/// Queries read the registry directly. Notifications are queued and applied by
/// the task loop on its next tick, so an agent's task state is only ever
/// mutated from the task loop.
#[derive(Debug, Clone)]
pub struct BrainChannel {
    registry: BrainRegistry,
    sender: NotificationSender,
}

impl BrainChannel {
    pub fn new(registry: BrainRegistry, sender: NotificationSender) -> Self {
        Self { registry, sender }
    }

    pub fn registry(&self) -> &BrainRegistry {
        &self.registry
    }
}

impl TaskChannel for BrainChannel {
    fn start(&self, agent: AgentId) {
        self.registry.start(agent);
    }

    fn stop(&self, agent: AgentId) {
        self.registry.stop(agent);
    }

    fn is_active(&self, agent: AgentId) -> bool {
        self.registry.contains(agent)
    }

    fn status(&self, agent: AgentId) -> String {
        self.registry
            .status(agent)
            .unwrap_or_else(|_| String::from("Inactive"))
    }

    fn active_target(&self, agent: AgentId) -> Option<Vec3> {
        self.registry
            .read(agent, |brain| brain.state().active_target())
            .flatten()
    }

    fn mining_target(&self, agent: AgentId) -> Option<BlockPos> {
        self.registry
            .read(agent, |brain| brain.state().mining_target())
            .flatten()
    }

    fn is_repositioning(&self, agent: AgentId) -> bool {
        self.registry
            .read(agent, |brain| brain.state().task == Task::Repositioning)
            .unwrap_or(false)
    }

    fn is_clearing_leaves(&self, agent: AgentId) -> bool {
        self.registry
            .read(agent, |brain| brain.state().task == Task::ClearingLeaves)
            .unwrap_or(false)
    }

    fn thinking_state(&self, agent: AgentId) -> ThinkingState {
        self.registry
            .read(agent, |brain| brain.state().thinking)
            .unwrap_or_default()
    }

    fn notify(&self, agent: AgentId, notification: Notification) {
        if !self.registry.contains(agent) {
            debug!("Ignoring {:?} for inactive {}", notification, agent);
            return;
        }
        if let Err(e) = self.sender.send(AgentEvent::new(agent, notification)) {
            warn!("Dropped {:?} for {}: {}", notification, agent, e);
        }
    }
}
