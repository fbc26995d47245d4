//! Finite State Machine for deploy-level status

use crate::models::deploy::DeployStatus;

/// Deploy event
#[derive(Debug, Clone)]
pub enum DeployEvent {
    /// Build commands are about to run
    BeginCommands(String),

    /// Commands and artifact placement succeeded
    Succeed(String),

    /// Any failure, before or after commands started
    Fail(String),
}

impl DeployEvent {
    pub fn message(&self) -> &str {
        match self {
            DeployEvent::BeginCommands(msg) | DeployEvent::Succeed(msg) | DeployEvent::Fail(msg) => {
                msg
            }
        }
    }
}

/// Deploy FSM
///
/// `Started -> Running -> {Success, Failed}`, with `Started -> Failed` for
/// failures that happen before any command runs.
#[derive(Debug, Clone)]
pub struct DeployFsm {
    state: DeployStatus,
    message: Option<String>,
}

impl DeployFsm {
    /// Create a new FSM in started state
    pub fn new() -> Self {
        Self {
            state: DeployStatus::Started,
            message: None,
        }
    }

    /// Get current state
    pub fn state(&self) -> DeployStatus {
        self.state
    }

    /// Message attached to the last transition
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: DeployEvent) -> Result<DeployStatus, String> {
        let new_state = match (&self.state, &event) {
            (DeployStatus::Started, DeployEvent::BeginCommands(_)) => DeployStatus::Running,
            (DeployStatus::Started, DeployEvent::Fail(_)) => DeployStatus::Failed,

            (DeployStatus::Running, DeployEvent::Succeed(_)) => DeployStatus::Success,
            (DeployStatus::Running, DeployEvent::Fail(_)) => DeployStatus::Failed,

            (state, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", state, event));
            }
        };

        self.state = new_state;
        self.message = Some(event.message().to_string());
        Ok(new_state)
    }
}

impl Default for DeployFsm {
    fn default() -> Self {
        Self::new()
    }
}
