use crate::config::ArtifactConfig;
use crate::error::{Result, SupervisorError};
use crate::state::ComponentId;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};

/// Progress callback, invoked with an install percentage in `0..=100`
pub type ProgressFn<'a> = &'a (dyn Fn(u8) + Send + Sync);

/// Places a component's runtime artifacts before first use
#[async_trait]
pub trait Installer: Send + Sync {
    fn is_installed(&self) -> bool;

    /// Install, reporting progress along the way
    async fn install(&self, on_progress: ProgressFn<'_>) -> Result<()>;

    /// Remove whatever a failed or partial install left behind
    async fn uninstall(&self) -> Result<()>;
}

const COPY_CHUNK: usize = 64 * 1024;

/// Installs a component by copying a local artifact into the storage directory
pub struct ArtifactInstaller {
    component: ComponentId,
    source: PathBuf,
    target: PathBuf,
}

impl ArtifactInstaller {
    pub fn new(component: ComponentId, config: &ArtifactConfig, storage_directory: &Path) -> Self {
        Self {
            component,
            source: config.source.clone(),
            target: storage_directory.join(&config.target),
        }
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    fn partial_path(&self) -> PathBuf {
        let mut name = self.target.as_os_str().to_owned();
        name.push(".partial");
        PathBuf::from(name)
    }

    async fn copy_with_progress(&self, on_progress: ProgressFn<'_>) -> Result<()> {
        let mut source = fs::File::open(&self.source).await.map_err(|e| {
            SupervisorError::install(
                self.component,
                format!("cannot open artifact {:?}: {}", self.source, e),
            )
        })?;
        let total = source.metadata().await?.len();

        if let Some(parent) = self.target.parent() {
            fs::create_dir_all(parent).await?;
        }
        let partial = self.partial_path();
        let mut target = fs::File::create(&partial).await?;

        let mut buffer = vec![0u8; COPY_CHUNK];
        let mut copied: u64 = 0;
        let mut last_reported = None;
        on_progress(0);

        loop {
            let read = source.read(&mut buffer).await?;
            if read == 0 {
                break;
            }
            target.write_all(&buffer[..read]).await?;
            copied += read as u64;

            let percent = if total == 0 {
                100
            } else {
                ((copied * 100) / total).min(100) as u8
            };
            if last_reported != Some(percent) {
                on_progress(percent);
                last_reported = Some(percent);
            }
        }

        target.flush().await?;
        drop(target);
        fs::rename(&partial, &self.target).await?;

        if last_reported != Some(100) {
            on_progress(100);
        }
        debug!("Copied {} bytes into {:?}", copied, self.target);
        Ok(())
    }
}

#[async_trait]
impl Installer for ArtifactInstaller {
    fn is_installed(&self) -> bool {
        self.target.exists()
    }

    async fn install(&self, on_progress: ProgressFn<'_>) -> Result<()> {
        info!("Installing {} from {:?}", self.component, self.source);
        self.copy_with_progress(on_progress).await?;
        info!("Installed {} at {:?}", self.component, self.target);
        Ok(())
    }

    async fn uninstall(&self) -> Result<()> {
        for path in [self.partial_path(), self.target.clone()] {
            match fs::remove_file(&path).await {
                Ok(()) => debug!("Removed {:?}", path),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!("Failed to remove {:?}: {}", path, e);
                    return Err(e.into());
                }
            }
        }
        info!("Uninstalled {}", self.component);
        Ok(())
    }
}
