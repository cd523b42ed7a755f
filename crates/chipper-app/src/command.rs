//! The `chipper` command and its feedback lines.

use crate::errors::{AppError, AppResult};
use chipper_bt::Controller;
use chipper_core::sync::TaskChannel;
use chipper_core::{AgentSnapshot, Interaction};
use std::fmt;
use std::str::FromStr;

const ROOT: &str = "chipper";
const ACTIVATED: &str = "Chipper Chopper AI activated!";
const DEACTIVATED: &str = "Chipper Chopper AI deactivated!";

/// A parsed `chipper` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// `chipper` or `chipper toggle`.
    Toggle,
    Start,
    Stop,
    Status,
}

impl Command {
    /// Runs the command for the controller's agent.
    ///
    /// Activation goes through the controller so the reactive loop and the
    /// authoritative task state are started and stopped together.
    ///
    /// # Returns
    ///
    /// The feedback line for whoever issued the command.
    pub fn execute(
        self,
        controller: &mut Controller,
        snapshot: &AgentSnapshot,
        channel: &dyn TaskChannel,
        interaction: &mut dyn Interaction,
    ) -> String {
        match self {
            Command::Toggle => {
                if controller.toggle(snapshot, channel, interaction) {
                    ACTIVATED.to_string()
                } else {
                    DEACTIVATED.to_string()
                }
            }
            Command::Start => {
                controller.activate(snapshot, channel);
                ACTIVATED.to_string()
            }
            Command::Stop => {
                controller.deactivate(channel, interaction);
                DEACTIVATED.to_string()
            }
            Command::Status => format!(
                "Chipper Chopper AI status: {}",
                channel.status(controller.agent())
            ),
        }
    }
}

impl FromStr for Command {
    type Err = AppError;

    fn from_str(line: &str) -> AppResult<Self> {
        let mut words = line.trim().trim_start_matches('/').split_whitespace();
        if words.next() != Some(ROOT) {
            return Err(AppError::UnknownCommand(line.trim().to_string()));
        }
        let command = match words.next() {
            None | Some("toggle") => Command::Toggle,
            Some("start") => Command::Start,
            Some("stop") => Command::Stop,
            Some("status") => Command::Status,
            Some(_) => return Err(AppError::UnknownCommand(line.trim().to_string())),
        };
        if words.next().is_some() {
            return Err(AppError::UnknownCommand(line.trim().to_string()));
        }
        Ok(command)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sub = match self {
            Command::Toggle => "toggle",
            Command::Start => "start",
            Command::Stop => "stop",
            Command::Status => "status",
        };
        write!(f, "{} {}", ROOT, sub)
    }
}
