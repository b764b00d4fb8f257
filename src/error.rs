use crate::state::ComponentId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Deserialization error: {0}")]
    Deserialization(#[from] toml::de::Error),

    #[error("System not ready: {reason}")]
    SystemUnready { reason: String },

    #[error("Installation of {component} failed: {message}")]
    Install {
        component: ComponentId,
        message: String,
    },

    #[error("Service error in {component}: {message}")]
    Service {
        component: ComponentId,
        message: String,
    },

    #[error("Health check failed for {component}: {message}")]
    Health {
        component: ComponentId,
        message: String,
    },

    #[error("Startup interrupted by shutdown")]
    Interrupted,

    #[error("System error: {message}")]
    System { message: String },
}

impl SupervisorError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn service<S: Into<String>>(component: ComponentId, message: S) -> Self {
        Self::Service {
            component,
            message: message.into(),
        }
    }

    pub fn health<S: Into<String>>(component: ComponentId, message: S) -> Self {
        Self::Health {
            component,
            message: message.into(),
        }
    }

    pub fn install<S: Into<String>>(component: ComponentId, message: S) -> Self {
        Self::Install {
            component,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SupervisorError>;
