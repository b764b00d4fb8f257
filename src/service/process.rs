use super::contract::{ManagedService, StopSignal};
use super::health::HealthProbe;
use crate::error::{Result, SupervisorError};
use crate::events::ServiceEvents;
use crate::state::{ComponentId, HealthInfo};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Fully rendered command line for one service
#[derive(Debug, Clone, PartialEq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub working_dir: Option<PathBuf>,
}

struct StopRequest {
    signal: StopSignal,
    done: oneshot::Sender<std::result::Result<(), String>>,
}

#[derive(Debug, Clone)]
struct ProcessInfo {
    pid: Option<u32>,
    started_at: DateTime<Utc>,
}

/// A service run as a child process
pub struct ProcessService {
    component: ComponentId,
    command: CommandSpec,
    health: HealthProbe,
    events: ServiceEvents,
    stop_grace: Duration,
    running: Arc<AtomicBool>,
    control: Mutex<Option<mpsc::Sender<StopRequest>>>,
    process: Mutex<Option<ProcessInfo>>,
}

impl ProcessService {
    pub fn new(
        command: CommandSpec,
        health: HealthProbe,
        events: ServiceEvents,
        stop_grace: Duration,
    ) -> Self {
        Self {
            component: events.component(),
            command,
            health,
            events,
            stop_grace,
            running: Arc::new(AtomicBool::new(false)),
            control: Mutex::new(None),
            process: Mutex::new(None),
        }
    }

    fn spawn_child(&self) -> std::io::Result<Child> {
        let mut command = Command::new(&self.command.program);
        command
            .args(&self.command.args)
            .envs(&self.command.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.command.working_dir {
            command.current_dir(dir);
        }
        command.spawn()
    }

    fn process_info(&self) -> Option<HealthInfo> {
        let process = self.process.lock().clone()?;
        let uptime = Utc::now().signed_duration_since(process.started_at);
        Some(json!({
            "pid": process.pid,
            "started_at": process.started_at.to_rfc3339(),
            "uptime_secs": uptime.num_seconds().max(0),
        }))
    }
}

#[async_trait]
impl ManagedService for ProcessService {
    fn component(&self) -> ComponentId {
        self.component
    }

    async fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            debug!("{} already running, ignoring start", self.component);
            return Ok(());
        }

        let mut child = match self.spawn_child() {
            Ok(child) => child,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(SupervisorError::service(
                    self.component,
                    format!("failed to spawn {}: {}", self.command.program, e),
                ));
            }
        };

        let pid = child.id();
        info!("Started {} (pid {:?})", self.component, pid);
        *self.process.lock() = Some(ProcessInfo {
            pid,
            started_at: Utc::now(),
        });

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, self.events.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(stderr, self.events.clone()));
        }

        let (control_tx, control_rx) = mpsc::channel(1);
        *self.control.lock() = Some(control_tx);
        tokio::spawn(watch_child(
            child,
            control_rx,
            Arc::clone(&self.running),
            self.events.clone(),
            self.stop_grace,
        ));

        self.events.message("started");
        Ok(())
    }

    async fn stop(&self, signal: StopSignal) -> Result<()> {
        if !self.running.load(Ordering::SeqCst) {
            debug!("{} not running, ignoring stop", self.component);
            return Ok(());
        }

        let control = self.control.lock().take();
        let Some(control) = control else {
            return Ok(());
        };

        let (done_tx, done_rx) = oneshot::channel();
        if control
            .send(StopRequest {
                signal,
                done: done_tx,
            })
            .await
            .is_err()
        {
            // Watcher already saw the process exit
            return Ok(());
        }

        let outcome = done_rx
            .await
            .map_err(|_| SupervisorError::service(self.component, "process watcher vanished"))?;
        *self.process.lock() = None;
        outcome.map_err(|e| SupervisorError::service(self.component, e))
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn health(&self) -> Result<Option<HealthInfo>> {
        if !self.is_running() {
            return Err(SupervisorError::health(self.component, "process is not running"));
        }
        match self.health.check(self.component).await? {
            Some(info) => Ok(Some(info)),
            None => Ok(self.process_info()),
        }
    }
}

async fn forward_lines<R>(reader: R, events: ServiceEvents)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if !line.trim().is_empty() {
                    events.message(line);
                }
            }
            Ok(None) => break,
            Err(e) => {
                debug!("Output stream for {} closed: {}", events.component(), e);
                break;
            }
        }
    }
}

async fn watch_child(
    mut child: Child,
    mut control: mpsc::Receiver<StopRequest>,
    running: Arc<AtomicBool>,
    events: ServiceEvents,
    grace: Duration,
) {
    let request = tokio::select! {
        status = child.wait() => {
            running.store(false, Ordering::SeqCst);
            match status {
                Ok(status) => events.failed(format!("process exited unexpectedly ({})", status)),
                Err(e) => events.failed(format!("failed waiting on process: {}", e)),
            }
            return;
        }
        request = control.recv() => request,
    };

    match request {
        Some(request) => {
            let outcome = terminate(&mut child, request.signal, grace).await;
            running.store(false, Ordering::SeqCst);
            if outcome.is_ok() {
                events.message("stopped");
            }
            let _ = request.done.send(outcome);
        }
        None => {
            // Adapter was replaced; leave the process alone until it exits
            let status = child.wait().await;
            running.store(false, Ordering::SeqCst);
            debug!("Detached {} process exited: {:?}", events.component(), status);
        }
    }
}

async fn terminate(
    child: &mut Child,
    signal: StopSignal,
    grace: Duration,
) -> std::result::Result<(), String> {
    if signal == StopSignal::Graceful && send_terminate(child) {
        match timeout(grace, child.wait()).await {
            Ok(Ok(_)) => return Ok(()),
            Ok(Err(e)) => return Err(e.to_string()),
            Err(_) => warn!("Process did not exit within {:?}, killing", grace),
        }
    }
    child.kill().await.map_err(|e| e.to_string())
}

#[cfg(unix)]
fn send_terminate(child: &Child) -> bool {
    let Some(pid) = child.id() else {
        return false;
    };
    // SAFETY: kill(2) with a pid we own and a valid signal number
    unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) == 0 }
}

#[cfg(not(unix))]
fn send_terminate(_child: &Child) -> bool {
    false
}
