//! Process-backed native bridge
//!
//! Spawns the native messaging bridge executable and exchanges
//! length-prefixed JSON frames over its stdin/stdout. When the bridge exits
//! it is respawned with exponential backoff.

use crate::client::message::Outbound;
use crate::client::transport::{read_frame, write_frame, FrameRead, NativeTransport, TransportEvent};
use crate::config::{ClientConfig, RestartPolicy};
use crate::error::TransportError;
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, Mutex, Notify};

/// Native bridge running as a supervised child process
pub struct ProcessBridge {
    /// Stdin of the current bridge process; `None` while it is down
    stdin: Arc<Mutex<Option<ChildStdin>>>,

    /// Stops the supervisor
    shutdown: Arc<Notify>,
}

impl ProcessBridge {
    /// Start supervising the bridge executable
    ///
    /// Returns the transport and the receiver of inbound events. Every
    /// successful (re)spawn is announced with [`TransportEvent::Opened`] and
    /// every exit with [`TransportEvent::Closed`].
    pub fn spawn(
        config: ClientConfig,
        policy: RestartPolicy,
    ) -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (event_sender, event_receiver) = mpsc::unbounded_channel();
        let stdin = Arc::new(Mutex::new(None));
        let shutdown = Arc::new(Notify::new());

        tokio::spawn(Self::supervise(
            config,
            policy,
            Arc::clone(&stdin),
            Arc::clone(&shutdown),
            event_sender,
        ));

        (Self { stdin, shutdown }, event_receiver)
    }

    fn spawn_process(config: &ClientConfig) -> Result<Child, TransportError> {
        let mut cmd = Command::new(&config.bridge_path);
        cmd.args(&config.bridge_args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                TransportError::NotInstalled {
                    path: config.bridge_path.display().to_string(),
                }
            }
            _ => TransportError::SpawnFailed {
                reason: format!("Failed to spawn {}: {}", config.bridge_path.display(), e),
            },
        })
    }

    #[tracing::instrument(skip_all, fields(bridge = %config.bridge_path.display()))]
    async fn supervise(
        config: ClientConfig,
        policy: RestartPolicy,
        stdin_slot: Arc<Mutex<Option<ChildStdin>>>,
        shutdown: Arc<Notify>,
        event_sender: mpsc::UnboundedSender<TransportEvent>,
    ) {
        let mut attempt = 0u32;

        loop {
            match Self::spawn_process(&config) {
                Ok(mut child) => {
                    attempt = 0;
                    tracing::info!("Native bridge spawned with PID: {:?}", child.id());

                    *stdin_slot.lock().await = child.stdin.take();
                    if let Some(stderr) = child.stderr.take() {
                        tokio::spawn(Self::monitor_stderr(stderr));
                    }
                    if event_sender.send(TransportEvent::Opened).is_err() {
                        return;
                    }

                    let stopped = match child.stdout.take() {
                        Some(stdout) => tokio::select! {
                            _ = Self::monitor_stdout(stdout, &event_sender) => false,
                            _ = shutdown.notified() => true,
                        },
                        None => {
                            tracing::error!("Failed to capture bridge stdout");
                            false
                        }
                    };

                    stdin_slot.lock().await.take();
                    if let Err(e) = child.kill().await {
                        tracing::debug!("Native bridge already exited: {}", e);
                    }
                    if stopped {
                        return;
                    }
                    if event_sender.send(TransportEvent::Closed).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    tracing::warn!("Native bridge unavailable: {}", e);
                    if event_sender.send(TransportEvent::Closed).is_err() {
                        return;
                    }
                }
            }

            attempt += 1;
            if policy.max_attempts.is_some_and(|max| attempt > max) {
                tracing::error!(
                    "Giving up on the native bridge after {} restart attempts",
                    attempt - 1
                );
                return;
            }

            let backoff = policy.backoff(attempt);
            tracing::info!("Restarting native bridge in {:?} (attempt {})", backoff, attempt);
            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                _ = shutdown.notified() => return,
            }
        }
    }

    /// Forward frames from the bridge until it closes stdout
    async fn monitor_stdout(stdout: ChildStdout, event_sender: &mpsc::UnboundedSender<TransportEvent>) {
        let mut reader = BufReader::new(stdout);

        loop {
            match read_frame(&mut reader).await {
                FrameRead::Frame(value) => {
                    tracing::debug!("Bridge frame: {}", value);
                    if event_sender.send(TransportEvent::Frame(value)).is_err() {
                        tracing::warn!("Failed to send event, receiver dropped");
                        return;
                    }
                }
                FrameRead::Garbled(reason) => {
                    tracing::warn!("Dropping frame that is not valid JSON: {}", reason);
                }
                FrameRead::Eof => {
                    tracing::info!("Native bridge closed its output");
                    return;
                }
            }
        }
    }

    /// Relay bridge diagnostics into our log
    async fn monitor_stderr(stderr: tokio::process::ChildStderr) {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::debug!("Bridge stderr: {}", line);
        }
    }

    /// Stop the bridge process and its supervisor
    pub async fn shutdown(&self) {
        self.stdin.lock().await.take();
        self.shutdown.notify_one();
    }
}

#[async_trait]
impl NativeTransport for ProcessBridge {
    async fn send(&self, message: Outbound) -> Result<(), TransportError> {
        let mut guard = self.stdin.lock().await;
        let stdin = guard.as_mut().ok_or(TransportError::ChannelClosed)?;

        let result = write_frame(stdin, &message).await;
        if result == Err(TransportError::ChannelClosed) {
            // Pipe is gone; later sends fail fast until the next respawn
            guard.take();
        }
        result
    }
}
