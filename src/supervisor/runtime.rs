use super::{ShutdownReason, Supervisor};
use crate::error::{Result, SupervisorError};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

type ShutdownSender = Arc<Mutex<Option<oneshot::Sender<ShutdownReason>>>>;

fn send_shutdown(sender: &ShutdownSender, reason: ShutdownReason) {
    if let Some(sender) = sender.lock().take() {
        let _ = sender.send(reason);
    }
}

impl Supervisor {
    /// Start everything, then supervise until a shutdown signal arrives.
    ///
    /// SIGINT and SIGTERM stop the services; SIGHUP reloads the node
    /// settings from the settings store and applies them.
    pub async fn run(&self) -> Result<ShutdownReason> {
        info!("Node supervisor is running");

        let (shutdown_sender, shutdown_receiver) = oneshot::channel();
        let shutdown_sender: ShutdownSender = Arc::new(Mutex::new(Some(shutdown_sender)));
        let mut handlers = self.setup_signal_handlers(&shutdown_sender);

        let supervisor = self.clone();
        let startup_sender = Arc::clone(&shutdown_sender);
        handlers.push(tokio::spawn(async move {
            match supervisor.start().await {
                Ok(()) => {}
                Err(SupervisorError::Interrupted) => info!("Startup interrupted"),
                Err(e) => {
                    error!("Startup failed: {}", e);
                    send_shutdown(&startup_sender, ShutdownReason::StartupFailed(e.to_string()));
                }
            }
        }));

        let reason = shutdown_receiver
            .await
            .map_err(|_| SupervisorError::system("Shutdown channel closed unexpectedly"))?;
        info!("Shutdown initiated: {:?}", reason);

        self.stop().await;
        for handle in handlers {
            handle.abort();
        }

        info!("Node supervisor shutdown complete");
        Ok(reason)
    }

    fn setup_signal_handlers(&self, shutdown_sender: &ShutdownSender) -> Vec<JoinHandle<()>> {
        let mut handlers = Vec::new();

        // SIGINT (Ctrl+C)
        let sigint_sender = Arc::clone(shutdown_sender);
        handlers.push(tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                info!("Received SIGINT signal (Ctrl+C)");
                send_shutdown(&sigint_sender, ShutdownReason::Signal("SIGINT".to_string()));
            }
        }));

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            // SIGTERM (systemd stop)
            let sigterm_sender = Arc::clone(shutdown_sender);
            handlers.push(tokio::spawn(async move {
                let mut sigterm = match signal(SignalKind::terminate()) {
                    Ok(sigterm) => sigterm,
                    Err(e) => {
                        error!("Failed to register SIGTERM handler: {}", e);
                        return;
                    }
                };
                if sigterm.recv().await.is_some() {
                    info!("Received SIGTERM signal");
                    send_shutdown(&sigterm_sender, ShutdownReason::Signal("SIGTERM".to_string()));
                }
            }));

            // SIGHUP reloads settings
            let supervisor = self.clone();
            handlers.push(tokio::spawn(async move {
                let mut sighup = match signal(SignalKind::hangup()) {
                    Ok(sighup) => sighup,
                    Err(e) => {
                        error!("Failed to register SIGHUP handler: {}", e);
                        return;
                    }
                };
                while sighup.recv().await.is_some() {
                    info!("Received SIGHUP signal, reloading node settings");
                    supervisor.reload_settings();
                }
            }));
        }

        handlers
    }

    /// Re-read persisted settings and apply them in the background
    #[cfg(unix)]
    fn reload_settings(&self) {
        let settings = match self.inner.settings.reload() {
            Ok(settings) => settings,
            Err(e) => {
                error!("Failed to reload node settings: {}", e);
                return;
            }
        };

        let supervisor = self.clone();
        tokio::spawn(async move {
            match supervisor.update_settings(settings).await {
                Ok(()) => info!("Node settings applied"),
                Err(SupervisorError::Interrupted) => info!("Settings update interrupted"),
                Err(e) => warn!("Failed to apply node settings: {}", e),
            }
        });
    }
}
