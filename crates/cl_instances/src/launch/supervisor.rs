//! Spawns and supervises the game process: tees its streams into
//! `latest.log`, archives the log on exit, tracks the pid and performs
//! graceful-then-forceful termination.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

use cl_core::event::Event;
use cl_core::{info, no_window, EventBus, IntoIoError};

use super::arguments::LaunchCommand;
use super::GameLaunchError;

/// Returned by [`LaunchSupervisor::inspect_logs`] when `latest.log`
/// does not exist or is empty.
pub const NO_LOGS_SENTINEL: &str = "No logs available yet";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Idle,
    Spawning,
    Running,
    Terminating,
    Exited,
}

pub struct SpawnSpec {
    pub command: LaunchCommand,
    pub cwd: PathBuf,
    pub env: HashMap<String, String>,
    /// Suppresses `data` events (the log file is always written).
    pub quiet: bool,
}

/// Safe wrappers around libc signal operations.
#[cfg(unix)]
mod signal {
    /// Send SIGTERM for graceful termination.
    pub fn send_sigterm(pid: u32) {
        // SAFETY: SIGTERM requests graceful termination; the process
        // may catch it and clean up.
        unsafe {
            libc::kill(pid as i32, libc::SIGTERM);
        }
    }
}

#[derive(Clone)]
pub struct LaunchSupervisor {
    bus: EventBus,
    state: Arc<Mutex<SupervisorState>>,
    pid: Arc<Mutex<Option<u32>>>,
    kill_tx: Arc<Mutex<Option<mpsc::UnboundedSender<Duration>>>>,
}

impl LaunchSupervisor {
    #[must_use]
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            state: Arc::new(Mutex::new(SupervisorState::Idle)),
            pid: Arc::new(Mutex::new(None)),
            kill_tx: Arc::new(Mutex::new(None)),
        }
    }

    #[must_use]
    pub fn state(&self) -> SupervisorState {
        *self.state.lock().unwrap()
    }

    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        *self.pid.lock().unwrap()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(
            self.state(),
            SupervisorState::Spawning | SupervisorState::Running | SupervisorState::Terminating
        )
    }

    /// Spawns the child and begins supervision. Refused unless the
    /// supervisor is idle (or a previous launch has exited).
    pub async fn launch(&self, spec: SpawnSpec) -> Result<u32, GameLaunchError> {
        {
            let mut state = self.state.lock().unwrap();
            if matches!(
                *state,
                SupervisorState::Spawning
                    | SupervisorState::Running
                    | SupervisorState::Terminating
            ) {
                return Err(GameLaunchError::AlreadyRunning);
            }
            *state = SupervisorState::Spawning;
        }

        let logs_dir = spec.cwd.join("logs");
        tokio::fs::create_dir_all(&logs_dir).await.path(&logs_dir)?;
        let latest_log = logs_dir.join("latest.log");
        // Truncate the previous run's log.
        let log_file = tokio::fs::File::create(&latest_log)
            .await
            .path(&latest_log)?;
        let log_file = Arc::new(tokio::sync::Mutex::new(log_file));

        let mut command = Command::new(&spec.command.program);
        no_window!(command);
        command
            .args(&spec.command.args)
            .current_dir(&spec.cwd)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(error) => {
                *self.state.lock().unwrap() = SupervisorState::Idle;
                return Err(GameLaunchError::Spawn {
                    program: spec.command.program.clone(),
                    error,
                });
            }
        };

        let pid = child.id().unwrap_or_default();
        *self.pid.lock().unwrap() = Some(pid);
        *self.state.lock().unwrap() = SupervisorState::Running;
        info!("Launched! PID: {pid}");

        let mut pumps = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            pumps.push(spawn_pump(
                stdout,
                Arc::clone(&log_file),
                self.bus.clone(),
                spec.quiet,
            ));
        }
        if let Some(stderr) = child.stderr.take() {
            pumps.push(spawn_pump(
                stderr,
                Arc::clone(&log_file),
                self.bus.clone(),
                spec.quiet,
            ));
        }

        let (kill_tx, kill_rx) = mpsc::unbounded_channel();
        *self.kill_tx.lock().unwrap() = Some(kill_tx);

        tokio::spawn(supervise(
            child,
            kill_rx,
            pumps,
            latest_log,
            Arc::clone(&self.state),
            Arc::clone(&self.pid),
            self.bus.clone(),
        ));

        Ok(pid)
    }

    /// Requests termination: a polite signal first, a forceful kill
    /// once `grace` elapses. Returns whether a live process was
    /// signalled; calling with nothing live is a no-op.
    pub async fn kill(&self, grace: Duration) -> bool {
        if !self.is_running() {
            return false;
        }
        let sender = self.kill_tx.lock().unwrap().clone();
        let Some(sender) = sender else {
            return false;
        };
        if sender.send(grace).is_err() {
            // The supervise task already finished; the exit path owns
            // the state from here.
            return false;
        }
        let mut state = self.state.lock().unwrap();
        if matches!(
            *state,
            SupervisorState::Spawning | SupervisorState::Running
        ) {
            *state = SupervisorState::Terminating;
        }
        true
    }

    /// Current contents of the instance's `latest.log`, or a stable
    /// sentinel when there is nothing to show.
    pub async fn inspect_logs(instance_dir: &Path) -> String {
        let latest = instance_dir.join("logs").join("latest.log");
        match tokio::fs::read_to_string(&latest).await {
            Ok(content) if !content.is_empty() => content,
            _ => NO_LOGS_SENTINEL.to_owned(),
        }
    }
}

fn spawn_pump<R>(
    stream: R,
    log_file: Arc<tokio::sync::Mutex<tokio::fs::File>>,
    bus: EventBus,
    quiet: bool,
) -> tokio::task::JoinHandle<()>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            {
                let mut file = log_file.lock().await;
                _ = file.write_all(line.as_bytes()).await;
                _ = file.write_all(b"\n").await;
                _ = file.flush().await;
            }
            if !quiet {
                bus.emit(Event::Data { chunk: line });
            }
        }
    })
}

async fn supervise(
    mut child: Child,
    mut kill_rx: mpsc::UnboundedReceiver<Duration>,
    pumps: Vec<tokio::task::JoinHandle<()>>,
    latest_log: PathBuf,
    state: Arc<Mutex<SupervisorState>>,
    pid: Arc<Mutex<Option<u32>>>,
    bus: EventBus,
) {
    let status = loop {
        tokio::select! {
            status = child.wait() => break status,
            Some(grace) = kill_rx.recv() => {
                #[cfg(unix)]
                {
                    if let Some(id) = child.id() {
                        signal::send_sigterm(id);
                    }
                }
                #[cfg(not(unix))]
                {
                    _ = child.start_kill();
                }

                match tokio::time::timeout(grace, child.wait()).await {
                    Ok(status) => break status,
                    Err(_) => {
                        // Still alive after the grace window.
                        _ = child.start_kill();
                        break child.wait().await;
                    }
                }
            }
        }
    };

    // Let the pumps drain the final output before archiving.
    for pump in pumps {
        _ = pump.await;
    }

    if latest_log.is_file() {
        let stamp = chrono::Local::now().format("%Y-%m-%d_%H-%M-%S");
        let archive = latest_log.with_file_name(format!("{stamp}.log"));
        _ = tokio::fs::copy(&latest_log, &archive).await;
    }

    *pid.lock().unwrap() = None;
    *state.lock().unwrap() = SupervisorState::Exited;

    let code = status.ok().and_then(|s| s.code());
    info!("Game exited with code {code:?}");
    bus.emit(Event::Close { code });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_instance(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("cl_supervisor_tests").join(name);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn kill_with_nothing_live_is_a_no_op() {
        let supervisor = LaunchSupervisor::new(EventBus::new());
        assert!(!supervisor.kill(Duration::from_millis(10)).await);
        assert_eq!(supervisor.state(), SupervisorState::Idle);
        assert_eq!(supervisor.pid(), None);
    }

    #[tokio::test]
    async fn missing_log_yields_the_sentinel() {
        let dir = temp_instance("no-logs");
        _ = tokio::fs::remove_dir_all(dir.join("logs")).await;
        assert_eq!(
            LaunchSupervisor::inspect_logs(&dir).await,
            NO_LOGS_SENTINEL
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn spawn_tee_and_natural_exit() {
        let dir = temp_instance("echo-run");
        let bus = EventBus::new();
        let mut events = bus.subscribe();
        let supervisor = LaunchSupervisor::new(bus);

        let pid = supervisor
            .launch(SpawnSpec {
                command: LaunchCommand {
                    program: PathBuf::from("/bin/sh"),
                    args: vec!["-c".to_owned(), "echo started".to_owned()],
                },
                cwd: dir.clone(),
                env: HashMap::new(),
                quiet: false,
            })
            .await
            .unwrap();
        assert!(pid > 0);

        // Wait for the close event.
        let mut closed = false;
        for _ in 0..200 {
            match tokio::time::timeout(Duration::from_millis(100), events.recv()).await {
                Ok(Ok(Event::Close { code })) => {
                    assert_eq!(code, Some(0));
                    closed = true;
                    break;
                }
                Ok(Ok(_)) => {}
                _ => {}
            }
        }
        assert!(closed, "no close event arrived");
        assert_eq!(supervisor.pid(), None);
        assert_eq!(supervisor.state(), SupervisorState::Exited);

        let logs = LaunchSupervisor::inspect_logs(&dir).await;
        assert!(logs.contains("started"));

        // A timestamped archive sits next to latest.log.
        let archived = std::fs::read_dir(dir.join("logs"))
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name() != "latest.log")
            .count();
        assert!(archived >= 1);

        // The supervisor accepts a new launch after exit.
        supervisor
            .launch(SpawnSpec {
                command: LaunchCommand {
                    program: PathBuf::from("/bin/sh"),
                    args: vec!["-c".to_owned(), "true".to_owned()],
                },
                cwd: dir,
                env: HashMap::new(),
                quiet: true,
            })
            .await
            .unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn second_launch_while_running_is_refused_and_kill_works() {
        let dir = temp_instance("sleeper");
        let supervisor = LaunchSupervisor::new(EventBus::new());

        supervisor
            .launch(SpawnSpec {
                command: LaunchCommand {
                    program: PathBuf::from("/bin/sh"),
                    args: vec!["-c".to_owned(), "sleep 30".to_owned()],
                },
                cwd: dir.clone(),
                env: HashMap::new(),
                quiet: true,
            })
            .await
            .unwrap();

        let again = supervisor
            .launch(SpawnSpec {
                command: LaunchCommand {
                    program: PathBuf::from("/bin/sh"),
                    args: vec!["-c".to_owned(), "true".to_owned()],
                },
                cwd: dir,
                env: HashMap::new(),
                quiet: true,
            })
            .await;
        assert!(matches!(again, Err(GameLaunchError::AlreadyRunning)));

        assert!(supervisor.kill(Duration::from_secs(2)).await);
        // Within the grace window plus a second, the pid clears and a
        // new launch is accepted.
        for _ in 0..30 {
            if supervisor.pid().is_none() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(supervisor.pid(), None);
        assert!(!supervisor.is_running());
    }
}
