//! Host wiring of the chipper agent.
//!
//! [`ChipperApp`] builds both control loops around one shared configuration
//! and one synchronization channel. The host drives them: the
//! [`ReactiveLoop`] once per tick for every controlled body, the
//! [`TaskLoop`] once per tick for all active agents. Both can be split apart
//! with [`ChipperApp::into_loops`] and run on separate tasks.

#![forbid(unsafe_code)]

pub mod command;
pub mod errors;

pub use command::Command;
pub use errors::{AppError, AppResult};

use chipper_brain::{BrainChannel, BrainRegistry, TaskLoop, notification_queue};
use chipper_bt::{Controller, Status};
use chipper_core::clock::{Clock, SystemClock};
use chipper_core::config::Config;
use chipper_core::{AgentId, AgentSnapshot, Interaction, Rotation, WorldQuery};
use log::info;
use std::collections::HashMap;
use std::sync::Arc;

/// Initialises `env_logger` with an `info` default, overridable via `RUST_LOG`.
///
/// Calling it more than once is harmless.
pub fn init_logging() {
    let env = env_logger::Env::default().default_filter_or("info");
    if env_logger::Builder::from_env(env).try_init().is_ok() {
        info!("Logging initialised");
    }
}

/// Both control loops of the chipper agent, wired to one channel.
pub struct ChipperApp {
    reactive: ReactiveLoop,
    task_loop: TaskLoop,
}

impl ChipperApp {
    /// Creates the app on the system clock.
    ///
    /// # Returns
    ///
    /// [`AppError::Core`] if the configuration does not validate.
    pub fn new(config: Config) -> AppResult<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates the app on a custom clock.
    ///
    /// # Arguments
    ///
    /// * `config` - Configuration shared by both loops.
    /// * `clock` - Time source of both loops.
    ///
    /// # Returns
    ///
    /// The created [`ChipperApp`], or [`AppError::Core`] if the configuration does not validate.
    pub fn with_clock(config: Config, clock: Arc<dyn Clock>) -> AppResult<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let (sender, receiver) = notification_queue();
        let registry = BrainRegistry::new(Arc::clone(&config));
        let task_loop = TaskLoop::new(registry.clone(), receiver, Arc::clone(&clock));
        let reactive = ReactiveLoop {
            config,
            channel: BrainChannel::new(registry, sender),
            clock,
            controllers: HashMap::new(),
        };
        Ok(Self {
            reactive,
            task_loop,
        })
    }

    pub fn reactive(&mut self) -> &mut ReactiveLoop {
        &mut self.reactive
    }

    pub fn task_loop(&mut self) -> &mut TaskLoop {
        &mut self.task_loop
    }

    pub fn channel(&self) -> &BrainChannel {
        &self.reactive.channel
    }

    /// Runs one authoritative tick.
    ///
    /// # Returns
    ///
    /// The rotations the host should apply to the bodies.
    pub fn tick_authoritative(
        &mut self,
        world: &dyn WorldQuery,
        bodies: &[AgentSnapshot],
    ) -> Vec<(AgentId, Rotation)> {
        self.task_loop.tick(world, bodies)
    }

    /// Splits the app so each loop can be driven on its own task.
    pub fn into_loops(self) -> (ReactiveLoop, TaskLoop) {
        (self.reactive, self.task_loop)
    }
}

/// The reactive side: one behavior tree controller per controlled agent.
pub struct ReactiveLoop {
    config: Arc<Config>,
    channel: BrainChannel,
    clock: Arc<dyn Clock>,
    controllers: HashMap<AgentId, Controller>,
}

impl ReactiveLoop {
    pub fn channel(&self) -> &BrainChannel {
        &self.channel
    }

    /// Adds an inactive controller for `agent`. Adding a controlled agent again is a no-op.
    pub fn add_agent(&mut self, agent: AgentId) {
        self.controllers
            .entry(agent)
            .or_insert_with(|| Controller::new(agent, Arc::clone(&self.config)));
    }

    pub fn controller(&self, agent: AgentId) -> Option<&Controller> {
        self.controllers.get(&agent)
    }

    /// Status line the authoritative side keeps for `agent`.
    ///
    /// # Returns
    ///
    /// [`AppError::Brain`] if the agent is not active.
    pub fn status(&self, agent: AgentId) -> AppResult<String> {
        Ok(self.channel.registry().status(agent)?)
    }

    fn controller_mut(&mut self, agent: AgentId) -> AppResult<&mut Controller> {
        self.controllers
            .get_mut(&agent)
            .ok_or(AppError::NoController(agent))
    }

    /// Flips activation of the body's agent, as the toggle key does.
    ///
    /// # Returns
    ///
    /// Whether the agent is active afterwards.
    pub fn toggle(
        &mut self,
        snapshot: &AgentSnapshot,
        interaction: &mut dyn Interaction,
    ) -> AppResult<bool> {
        let channel = self.channel.clone();
        let controller = self.controller_mut(snapshot.id)?;
        Ok(controller.toggle(snapshot, &channel, interaction))
    }

    /// Parses and runs a `chipper` command for the body's agent.
    ///
    /// # Returns
    ///
    /// The feedback line, [`AppError::UnknownCommand`] if `line` is not a `chipper` command.
    pub fn execute(
        &mut self,
        line: &str,
        snapshot: &AgentSnapshot,
        interaction: &mut dyn Interaction,
    ) -> AppResult<String> {
        let command: Command = line.parse()?;
        let channel = self.channel.clone();
        let controller = self.controller_mut(snapshot.id)?;
        info!("{} for {}", command, snapshot.id);
        Ok(command.execute(controller, snapshot, &channel, interaction))
    }

    /// Runs one reactive tick for the body's agent.
    ///
    /// # Returns
    ///
    /// The status of the tree if it was evaluated this tick.
    pub fn tick(
        &mut self,
        world: &dyn WorldQuery,
        snapshot: &AgentSnapshot,
        interaction: &mut dyn Interaction,
    ) -> AppResult<Option<Status>> {
        let now = self.clock.now();
        let channel = self.channel.clone();
        let controller = self.controller_mut(snapshot.id)?;
        Ok(controller.tick(world, snapshot, &channel, interaction, now))
    }
}
