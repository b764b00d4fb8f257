use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Opaque health payload reported by a service
pub type HealthInfo = serde_json::Value;

/// Every component the supervisor tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ComponentId {
    #[serde(rename = "system")]
    System,
    #[serde(rename = "iri")]
    Iri,
    #[serde(rename = "nelson")]
    Nelson,
    #[serde(rename = "database")]
    Database,
    #[serde(rename = "iota-transaction-stream")]
    TransactionStream,
    #[serde(rename = "chatangle-backend")]
    ChatangleBackend,
    #[serde(rename = "chatangle")]
    Chatangle,
}

impl ComponentId {
    pub const ALL: [ComponentId; 7] = [
        ComponentId::System,
        ComponentId::Iri,
        ComponentId::Nelson,
        ComponentId::Database,
        ComponentId::TransactionStream,
        ComponentId::ChatangleBackend,
        ComponentId::Chatangle,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentId::System => "system",
            ComponentId::Iri => "iri",
            ComponentId::Nelson => "nelson",
            ComponentId::Database => "database",
            ComponentId::TransactionStream => "iota-transaction-stream",
            ComponentId::ChatangleBackend => "chatangle-backend",
            ComponentId::Chatangle => "chatangle",
        }
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Waiting,
    Checking,
    Downloading,
    Ready,
    Starting,
    Running,
    Error,
    Stopped,
}

impl Status {
    /// True while an installer owns the component
    pub fn is_installing(&self) -> bool {
        matches!(self, Status::Checking | Status::Downloading)
    }
}

/// Tracked record for a single component
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentState {
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<HealthInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
}

impl Default for ComponentState {
    fn default() -> Self {
        Self {
            status: Status::Waiting,
            error: None,
            info: None,
            progress: None,
        }
    }
}

impl ComponentState {
    /// Merge a partial update into this record.
    ///
    /// `error` only survives while the resulting status is `Error`.
    pub fn apply(&mut self, patch: StatePatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(error) = patch.error {
            self.error = Some(error);
        }
        if let Some(info) = patch.info {
            self.info = Some(info);
        }
        if let Some(progress) = patch.progress {
            self.progress = Some(progress.min(100));
        }
        if self.status != Status::Error {
            self.error = None;
        }
    }
}

/// Partial update to a [`ComponentState`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatePatch {
    pub status: Option<Status>,
    pub error: Option<String>,
    pub info: Option<HealthInfo>,
    pub progress: Option<u8>,
}

impl StatePatch {
    pub fn status(status: Status) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn error<S: Into<String>>(message: S) -> Self {
        Self {
            status: Some(Status::Error),
            error: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn running(info: Option<HealthInfo>) -> Self {
        Self {
            status: Some(Status::Running),
            info,
            ..Self::default()
        }
    }

    pub fn downloading(progress: u8) -> Self {
        Self {
            status: Some(Status::Downloading),
            progress: Some(progress),
            ..Self::default()
        }
    }

    pub fn info(info: HealthInfo) -> Self {
        Self {
            info: Some(info),
            ..Self::default()
        }
    }

    pub fn with_info(mut self, info: HealthInfo) -> Self {
        self.info = Some(info);
        self
    }
}

/// Snapshot of every component's state
pub type StateMap = BTreeMap<ComponentId, ComponentState>;
