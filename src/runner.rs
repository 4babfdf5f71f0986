//! Runs the configured shell commands and pumps their output into an
//! [`AutoFlushWriter`].

use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::Notify;
use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::metrics;
use crate::stream::{AutoFlushWriter, FlushSink};

/// Environment variable carrying the project name to commands.
pub const ENV_PROJECT: &str = "DEPLOYBOARD_PROJECT";
/// Environment variable carrying the environment name to commands.
pub const ENV_ENVIRONMENT: &str = "DEPLOYBOARD_ENVIRONMENT";

const READ_BUFFER: usize = 8 * 1024;

/// What a streamed endpoint asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::IntoStaticStr, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Action {
    /// Project status.
    Status,
    /// Container listing.
    Containers,
    /// Deployment of a project to an environment.
    Deploy,
}

impl Action {
    /// Whether the command is left to finish once the client disconnects.
    ///
    /// Reads are stopped; a deployment runs to completion so it never ends
    /// half-applied.
    pub fn survives_disconnect(self) -> bool {
        matches!(self, Action::Deploy)
    }
}

/// Spawns the shell command configured for each [`Action`].
#[derive(Debug, Clone)]
pub struct CommandRunner {
    status: String,
    containers: String,
    deploy: String,
}

impl CommandRunner {
    /// Take the command lines from config.
    pub fn new(config: &Config) -> Self {
        Self {
            status: config.status_command.clone(),
            containers: config.containers_command.clone(),
            deploy: config.deploy_command.clone(),
        }
    }

    /// Shell command line for `action`.
    pub fn command_line(&self, action: Action) -> &str {
        match action {
            Action::Status => &self.status,
            Action::Containers => &self.containers,
            Action::Deploy => &self.deploy,
        }
    }

    /// Start the command for `action` with stdout and stderr piped.
    ///
    /// Names are passed through the environment, never interpolated into the
    /// command line.
    pub fn spawn(&self, action: Action, project: &str, environment: &str) -> std::io::Result<Child> {
        let command_line = self.command_line(action);
        debug!(%action, project, environment, command_line, "spawning command");

        Command::new("sh")
            .arg("-c")
            .arg(command_line)
            .env(ENV_PROJECT, project)
            .env(ENV_ENVIRONMENT, environment)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
    }
}

/// Copy a child's stdout and stderr into `writer`, then report its exit
/// status and close the writer.
///
/// When the client goes away, status and container commands are killed. A
/// deployment keeps running and its output keeps being drained so it never
/// blocks on a full pipe.
#[instrument(skip_all, fields(%action))]
pub async fn stream_output<S: FlushSink>(
    action: Action,
    mut child: Child,
    writer: AutoFlushWriter<S>,
) -> std::io::Result<ExitStatus> {
    let start = Instant::now();
    let disconnected = Notify::new();
    let out_bytes = AtomicU64::new(0);
    let err_bytes = AtomicU64::new(0);

    {
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let pumps = async {
            tokio::join!(
                copy_into(stdout, &writer, "stdout", &disconnected, &out_bytes),
                copy_into(stderr, &writer, "stderr", &disconnected, &err_bytes),
            )
        };
        tokio::pin!(pumps);

        tokio::select! {
            _ = &mut pumps => {}
            _ = disconnected.notified(), if !action.survives_disconnect() => {
                info!("client disconnected, stopping command");
                if let Err(e) = child.start_kill() {
                    warn!(error = %e, "failed to kill command");
                }
            }
        }
        // Dropping the pumps closes the read ends, so anything the shell left
        // behind gets SIGPIPE instead of blocking.
    }

    let status = child.wait().await;
    let trailer = match &status {
        Ok(status) => match status.code() {
            Some(code) => format!("exit status: {}\n", code),
            None => format!("exit status: {}\n", status),
        },
        Err(e) => format!("exit status: unknown ({})\n", e),
    };
    if let Err(e) = writer.write_all_paced(trailer.as_bytes()).await {
        debug!(error = %e, "could not write exit status");
    }
    writer.close().await;

    metrics::record_command_duration(start, action.into());
    info!(
        stdout_bytes = out_bytes.load(Ordering::Relaxed),
        stderr_bytes = err_bytes.load(Ordering::Relaxed),
        elapsed_ms = start.elapsed().as_millis() as u64,
        flush_failures = writer.flush_failures(),
        "command finished"
    );

    status
}

async fn copy_into<R, S>(
    reader: Option<R>,
    writer: &AutoFlushWriter<S>,
    pipe: &'static str,
    disconnected: &Notify,
    total: &AtomicU64,
) where
    R: AsyncRead + Unpin,
    S: FlushSink,
{
    let Some(mut reader) = reader else {
        return;
    };

    let mut buf = vec![0u8; READ_BUFFER];
    let mut forwarding = true;

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, pipe, "reading command output failed");
                break;
            }
        };
        total.fetch_add(n as u64, Ordering::Relaxed);

        if forwarding {
            if let Err(e) = writer.write_all_paced(&buf[..n]).await {
                warn!(error = %e, pipe, "client stopped accepting output");
                forwarding = false;
                disconnected.notify_one();
            }
        }
    }
}
