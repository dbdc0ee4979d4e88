//! Server management - spawning the content server and polling it until ready

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use sitecheck_common::config::{ReadinessConfig, ServerConfig};
use sitecheck_common::BIN_ENV;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::{E2eError, E2eResult};
use crate::retry::{poll_until, Poll, RetryPolicy};

/// Program used when neither `[server] command` nor `SITECHECK_BIN` is set
const FALLBACK_PROGRAM: &str = "sitecheck";

/// Handle to a running content server process
pub struct ServerHandle {
    child: Option<Child>,
    /// Process group the server leads; outlives the child for grandchildren
    pgid: Option<u32>,
    base_url: String,
    ready: bool,
    grace: Duration,
}

impl ServerHandle {
    /// Spawn the server in its own process group without waiting for it
    pub fn spawn(config: &ServerConfig) -> E2eResult<Self> {
        let self_exe = std::env::var_os(BIN_ENV).map(std::path::PathBuf::from);
        let argv = server_command(config, self_exe.as_deref());
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| E2eError::ServerStartup("server command is empty".to_string()))?;

        info!("Spawning content server on port {}", config.port);
        debug!("Server command: {}", argv.join(" "));

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        {
            cmd.process_group(0);
        }

        let mut child = cmd.spawn().map_err(|e| {
            E2eError::ServerStartup(format!("Failed to spawn {}: {}", program, e))
        })?;

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_output(stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_output(stderr));
        }

        let pgid = child.id();
        Ok(Self {
            child: Some(child),
            pgid,
            base_url: config.base_url(),
            ready: false,
            grace: Duration::from_millis(config.shutdown_grace_ms),
        })
    }

    /// Spawn and wait for readiness; the server is stopped if it never gets there
    pub async fn start(config: &ServerConfig) -> E2eResult<Self> {
        let mut handle = Self::spawn(config)?;
        if let Err(e) = handle.wait_until_ready(&config.readiness).await {
            handle.stop().await;
            return Err(e);
        }
        Ok(handle)
    }

    /// Poll the server until it answers with a success status.
    ///
    /// Returns the attempt that succeeded. Fails fast when the server process
    /// exits while being polled.
    pub async fn wait_until_ready(&mut self, readiness: &ReadinessConfig) -> E2eResult<u32> {
        if self.ready {
            return Ok(0);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(readiness.request_timeout_ms))
            .build()?;
        let url = format!("{}{}", self.base_url, readiness.path);
        let policy = RetryPolicy::from(readiness);

        let mut exited: Option<ExitStatus> = None;
        let exited_slot = &mut exited;
        let child = &mut self.child;
        let (client, target) = (&client, url.as_str());

        let outcome = poll_until(policy, move |attempt| {
            if exited_slot.is_none() {
                if let Some(Ok(Some(status))) = child.as_mut().map(|c| c.try_wait()) {
                    *exited_slot = Some(status);
                }
            }
            let request = exited_slot
                .is_none()
                .then(|| probe(client, target, attempt));
            async move {
                match request {
                    Some(request) => request.await,
                    None => true,
                }
            }
        })
        .await;

        if let Some(status) = exited {
            return Err(E2eError::ServerStartup(format!(
                "server exited before becoming ready ({})",
                status
            )));
        }

        match outcome {
            Poll::Ready { attempt } => {
                self.ready = true;
                info!("Server ready at {} (attempt {})", self.base_url, attempt);
                Ok(attempt)
            }
            Poll::Exhausted { attempts } => Err(E2eError::ReadinessTimeout { url, attempts }),
        }
    }

    /// Base URL dependents navigate to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Pid of the server process, which is also its process group id
    pub fn pid(&self) -> Option<u32> {
        self.pgid
    }

    /// Stop the server: SIGTERM to its group, a grace period, then SIGKILL.
    ///
    /// Safe to call more than once. Never fails; problems are logged.
    pub async fn stop(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        self.ready = false;
        info!("Stopping server (pid: {})", self.pgid.unwrap_or_default());

        #[cfg(unix)]
        {
            if let Some(pgid) = self.pgid {
                signal_group(pgid, nix::sys::signal::Signal::SIGTERM);
                let exited = timeout(self.grace, child.wait()).await.is_ok();
                // Sweep anything left in the group, leader or not
                signal_group(pgid, nix::sys::signal::Signal::SIGKILL);
                if exited {
                    return;
                }
            }
        }

        if let Err(e) = child.kill().await {
            warn!("Failed to kill server: {}", e);
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            #[cfg(unix)]
            {
                if let Some(pgid) = self.pgid {
                    signal_group(pgid, nix::sys::signal::Signal::SIGKILL);
                }
            }
            let _ = child.start_kill();
        }
    }
}

/// Build the server argv: the configured command with `{port}` and `{root}`
/// substituted, or `<self_exe> serve --dir <root> --port <port> --host <host>`.
pub fn server_command(config: &ServerConfig, self_exe: Option<&Path>) -> Vec<String> {
    let port = config.port.to_string();
    let root = config.root.display().to_string();

    if !config.command.is_empty() {
        return config
            .command
            .iter()
            .map(|arg| arg.replace("{port}", &port).replace("{root}", &root))
            .collect();
    }

    let program = self_exe
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| FALLBACK_PROGRAM.to_string());
    vec![
        program,
        "serve".to_string(),
        "--dir".to_string(),
        root,
        "--port".to_string(),
        port,
        "--host".to_string(),
        config.host.clone(),
    ]
}

/// One readiness probe: true on a success status
pub async fn probe(client: &reqwest::Client, url: &str, attempt: u32) -> bool {
    match client.get(url).send().await {
        Ok(resp) if resp.status().is_success() => true,
        Ok(resp) => {
            debug!("Readiness probe {} returned {}", attempt, resp.status());
            false
        }
        Err(e) => {
            if attempt == 1 {
                info!("Waiting for server to start...");
            }
            // Connection refused is expected while the server is starting
            if !e.is_connect() {
                debug!("Readiness probe {} failed: {}", attempt, e);
            }
            false
        }
    }
}

async fn forward_output<R: AsyncRead + Unpin>(stream: R) {
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!("[server] {}", line);
    }
}

#[cfg(unix)]
fn signal_group(pgid: u32, signal: nix::sys::signal::Signal) {
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;

    if let Err(e) = killpg(Pid::from_raw(pgid as i32), signal) {
        if e != nix::errno::Errno::ESRCH {
            warn!("Failed to send {} to server group {}: {}", signal, pgid, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn default_command_runs_the_builtin_server() {
        let config = ServerConfig {
            port: 4100,
            root: PathBuf::from("site"),
            ..Default::default()
        };

        let argv = server_command(&config, Some(Path::new("/opt/sitecheck")));
        assert_eq!(
            argv,
            vec![
                "/opt/sitecheck",
                "serve",
                "--dir",
                "site",
                "--port",
                "4100",
                "--host",
                "localhost"
            ]
        );

        assert_eq!(server_command(&config, None)[0], FALLBACK_PROGRAM);
    }

    #[test]
    fn configured_command_substitutes_tokens() {
        let config = ServerConfig {
            port: 5173,
            root: PathBuf::from("dist"),
            command: vec![
                "npx".to_string(),
                "serve".to_string(),
                "{root}".to_string(),
                "-l".to_string(),
                "{port}".to_string(),
            ],
            ..Default::default()
        };

        assert_eq!(
            server_command(&config, Some(Path::new("/ignored"))),
            vec!["npx", "serve", "dist", "-l", "5173"]
        );
    }

    #[tokio::test]
    async fn spawn_failure_is_a_startup_error() {
        let config = ServerConfig {
            command: vec!["/nonexistent/sitecheck-server".to_string()],
            ..Default::default()
        };

        let err = ServerHandle::spawn(&config).err().unwrap();
        assert!(matches!(err, E2eError::ServerStartup(_)));
    }
}
