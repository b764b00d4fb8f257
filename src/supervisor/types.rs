/// Why the supervisor runtime stopped
#[derive(Debug, Clone, PartialEq)]
pub enum ShutdownReason {
    Signal(String),
    StartupFailed(String),
}

impl ShutdownReason {
    /// Process exit code for this reason
    pub fn exit_code(&self) -> i32 {
        match self {
            ShutdownReason::Signal(_) => 0,
            ShutdownReason::StartupFailed(_) => 1,
        }
    }
}
