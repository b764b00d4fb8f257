use crate::config::ProbeConfig;
use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const NOT_ENOUGH_SPACE: &str = "not enough free space in home or temp directory";
pub const NOT_ENOUGH_MEMORY: &str = "not enough RAM";
pub const UNSUPPORTED_PLATFORM: &str = "operating system is not supported";

/// Host readiness questions asked before anything is installed
#[async_trait]
pub trait SystemProbe: Send + Sync {
    /// Whether there is room for the install; the requirement is lower once
    /// the database is already in place
    async fn has_enough_space(&self, database_installed: bool) -> bool;

    /// Whether the runtime the ledger node needs is available
    async fn has_required_runtime(&self) -> bool;

    fn is_supported_platform(&self) -> bool;

    fn has_enough_memory(&self) -> bool;

    /// Human readable name of the required runtime, used in error messages
    fn runtime_name(&self) -> String {
        "required runtime".to_string()
    }
}

/// Outcome of the four readiness checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Readiness {
    pub has_enough_space: bool,
    pub has_required_runtime: bool,
    pub is_supported_platform: bool,
    pub has_enough_memory: bool,
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        self.has_enough_space
            && self.has_required_runtime
            && self.is_supported_platform
            && self.has_enough_memory
    }

    /// Message for the highest-priority failing check.
    ///
    /// Priority is space, then runtime, then platform, then memory.
    pub fn failure_message(&self, runtime_name: &str) -> Option<String> {
        if !self.has_enough_space {
            Some(NOT_ENOUGH_SPACE.to_string())
        } else if !self.has_required_runtime {
            Some(format!("{} is not installed", runtime_name))
        } else if !self.is_supported_platform {
            Some(UNSUPPORTED_PLATFORM.to_string())
        } else if !self.has_enough_memory {
            Some(NOT_ENOUGH_MEMORY.to_string())
        } else {
            None
        }
    }
}

/// Probe backed by the local host
pub struct HostProbe {
    config: ProbeConfig,
    storage_directory: PathBuf,
}

impl HostProbe {
    pub fn new(config: ProbeConfig, storage_directory: impl Into<PathBuf>) -> Self {
        Self {
            config,
            storage_directory: storage_directory.into(),
        }
    }

    fn required_space_bytes(&self, database_installed: bool) -> u64 {
        let gb = if database_installed {
            self.config.min_free_space_installed_gb
        } else {
            self.config.min_free_space_gb
        };
        gb * 1024 * 1024 * 1024
    }
}

#[async_trait]
impl SystemProbe for HostProbe {
    async fn has_enough_space(&self, database_installed: bool) -> bool {
        let required = self.required_space_bytes(database_installed);
        let directory = self.storage_directory.clone();

        let free = tokio::task::spawn_blocking(move || free_space_bytes(&directory)).await;
        match free {
            Ok(Ok(free)) => {
                debug!("Free space: {} bytes, required: {} bytes", free, required);
                free >= required
            }
            Ok(Err(e)) => {
                warn!("Unable to determine free space: {}", e);
                false
            }
            Err(e) => {
                warn!("Free space probe panicked: {}", e);
                false
            }
        }
    }

    async fn has_required_runtime(&self) -> bool {
        let found = find_on_path(&self.config.runtime_binary);
        debug!("Runtime {} located at {:?}", self.config.runtime_binary, found);
        found.is_some()
    }

    fn is_supported_platform(&self) -> bool {
        cfg!(any(target_os = "linux", target_os = "macos")) && cfg!(target_pointer_width = "64")
    }

    fn has_enough_memory(&self) -> bool {
        match total_memory_bytes() {
            Some(total) => total / (1024 * 1024) >= self.config.min_memory_mb,
            None => {
                warn!("Unable to determine total memory");
                false
            }
        }
    }

    fn runtime_name(&self) -> String {
        self.config.runtime_binary.clone()
    }
}

/// Locate an executable by name, honouring absolute paths
pub fn find_on_path(binary: &str) -> Option<PathBuf> {
    let candidate = Path::new(binary);
    if candidate.components().count() > 1 {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }

    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(binary))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(unix)]
fn free_space_bytes(path: &Path) -> std::io::Result<u64> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes())?;
    // SAFETY: statvfs only writes into the zeroed struct we pass it
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
    if rc != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(stat.f_bavail as u64 * stat.f_frsize as u64)
}

#[cfg(not(unix))]
fn free_space_bytes(_path: &Path) -> std::io::Result<u64> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "free space probing is not supported on this platform",
    ))
}

#[cfg(unix)]
fn total_memory_bytes() -> Option<u64> {
    // SAFETY: sysconf has no preconditions
    let pages = unsafe { libc::sysconf(libc::_SC_PHYS_PAGES) };
    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if pages <= 0 || page_size <= 0 {
        return None;
    }
    Some(pages as u64 * page_size as u64)
}

#[cfg(not(unix))]
fn total_memory_bytes() -> Option<u64> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn readiness(space: bool, runtime: bool, platform: bool, memory: bool) -> Readiness {
        Readiness {
            has_enough_space: space,
            has_required_runtime: runtime,
            is_supported_platform: platform,
            has_enough_memory: memory,
        }
    }

    #[test]
    fn test_ready_when_all_checks_pass() {
        let ready = readiness(true, true, true, true);
        assert!(ready.is_ready());
        assert_eq!(ready.failure_message("java"), None);
    }

    #[test]
    fn test_failure_message_priority() {
        assert_eq!(
            readiness(false, false, false, false).failure_message("java"),
            Some(NOT_ENOUGH_SPACE.to_string())
        );
        assert_eq!(
            readiness(true, false, false, false).failure_message("java"),
            Some("java is not installed".to_string())
        );
        assert_eq!(
            readiness(true, true, false, false).failure_message("java"),
            Some(UNSUPPORTED_PLATFORM.to_string())
        );
        assert_eq!(
            readiness(true, true, true, false).failure_message("java"),
            Some(NOT_ENOUGH_MEMORY.to_string())
        );
    }

    #[test]
    fn test_required_space_depends_on_install() {
        let probe = HostProbe::new(ProbeConfig::default(), "/tmp");
        assert!(probe.required_space_bytes(false) > probe.required_space_bytes(true));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_host_probe_finds_shell() {
        let config = ProbeConfig {
            runtime_binary: "sh".to_string(),
            ..ProbeConfig::default()
        };
        let probe = HostProbe::new(config, std::env::temp_dir());
        assert!(probe.has_required_runtime().await);
        assert_eq!(probe.runtime_name(), "sh");
    }

    #[tokio::test]
    async fn test_host_probe_missing_runtime() {
        let config = ProbeConfig {
            runtime_binary: "definitely-not-a-real-binary-7f3a".to_string(),
            ..ProbeConfig::default()
        };
        let probe = HostProbe::new(config, std::env::temp_dir());
        assert!(!probe.has_required_runtime().await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_zero_requirements_pass_on_host() {
        let config = ProbeConfig {
            min_free_space_gb: 0,
            min_free_space_installed_gb: 0,
            min_memory_mb: 0,
            runtime_binary: "sh".to_string(),
        };
        let probe = HostProbe::new(config, std::env::temp_dir());
        assert!(probe.has_enough_space(false).await);
        assert!(probe.has_enough_memory());
    }
}
