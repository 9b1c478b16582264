//! Process supervisor - owns the spawn/timeout/kill lifecycle of one child process
//!
//! Features:
//! - Incremental stdout/stderr streaming through callbacks or a bounded channel
//! - Wall-clock timeout with SIGTERM -> SIGKILL escalation
//! - Process group signalling on Unix
//! - Bounded output retention (truncation with a single warning) and bounded line length
//!
//! A supervisor is single-use: it runs exactly one process and is then discarded.

use parking_lot::Mutex;
use relay_foundation::{Error, Result, SandboxProfile, SupervisorConfig};
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::Child;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Sleep;
use tracing::{debug, info, warn};

/// Capacity of the line channel between reader tasks and the supervision loop
pub const LINE_CHANNEL_CAPACITY: usize = 1024;

/// Termination signals understood by the supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    /// SIGINT
    Interrupt,
    /// SIGTERM
    Terminate,
    /// SIGKILL
    Kill,
}

impl Signal {
    /// Raw signal number
    pub fn as_raw(&self) -> i32 {
        #[cfg(unix)]
        {
            match self {
                Signal::Interrupt => libc::SIGINT,
                Signal::Terminate => libc::SIGTERM,
                Signal::Kill => libc::SIGKILL,
            }
        }
        #[cfg(not(unix))]
        {
            match self {
                Signal::Interrupt => 2,
                Signal::Terminate => 15,
                Signal::Kill => 9,
            }
        }
    }
}

/// Which pipe a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// One line of child output, tagged with its pipe
pub type OutputLine = (OutputStream, String);

/// Result of a process that exited on its own
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code (-1 if the platform reported none)
    pub exit_code: i32,
    /// Retained stdout text (newline separated)
    pub stdout: String,
    /// Retained stderr text (newline separated)
    pub stderr: String,
    /// Wall-clock duration from spawn to exit
    pub duration: Duration,
    /// At least one stream exceeded the retention cap
    pub truncated: bool,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration.as_millis() as u64
    }
}

/// Accumulates one stream's text up to a byte cap
struct OutputBuffer {
    name: &'static str,
    text: String,
    limit: usize,
    truncated: bool,
}

impl OutputBuffer {
    fn new(name: &'static str, limit: usize) -> Self {
        Self {
            name,
            text: String::new(),
            limit,
            truncated: false,
        }
    }

    fn push_line(&mut self, line: &str) {
        if self.truncated {
            return;
        }

        if self.text.len() + line.len() + 1 <= self.limit {
            self.text.push_str(line);
            self.text.push('\n');
            return;
        }

        let mut cut = self.limit.saturating_sub(self.text.len()).min(line.len());
        while !line.is_char_boundary(cut) {
            cut -= 1;
        }
        self.text.push_str(&line[..cut]);
        self.truncated = true;
        warn!(
            "{} exceeded {} bytes; further output is streamed but not retained",
            self.name, self.limit
        );
    }
}

/// Resets the running flag and pid when a run ends, however it ends
struct RunningGuard<'a> {
    supervisor: &'a ProcessSupervisor,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.supervisor.running.store(false, Ordering::SeqCst);
        self.supervisor.pid.store(0, Ordering::SeqCst);
    }
}

/// Supervises exactly one external process
pub struct ProcessSupervisor {
    config: SupervisorConfig,
    /// 0 while no process is attached
    pid: AtomicU32,
    running: AtomicBool,
    kill_tx: mpsc::UnboundedSender<Signal>,
    kill_rx: Mutex<Option<mpsc::UnboundedReceiver<Signal>>>,
}

impl ProcessSupervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        let (kill_tx, kill_rx) = mpsc::unbounded_channel();
        Self {
            config,
            pid: AtomicU32::new(0),
            running: AtomicBool::new(false),
            kill_tx,
            kill_rx: Mutex::new(Some(kill_rx)),
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Whether a child process is currently attached
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Whether `run` has been called (the supervisor is single-use)
    pub fn has_started(&self) -> bool {
        self.kill_rx.lock().is_none()
    }

    /// Pid of the attached child
    pub fn pid(&self) -> Option<u32> {
        match self.pid.load(Ordering::SeqCst) {
            0 => None,
            pid => Some(pid),
        }
    }

    /// Request termination of the attached process.
    ///
    /// Returns `false` (and does nothing) when no process is attached. A
    /// `Terminate`/`Interrupt` request escalates to `Kill` after the grace period.
    pub fn kill(&self, signal: Signal) -> bool {
        if !self.is_running() {
            debug!("Kill({:?}) ignored: no process attached", signal);
            return false;
        }
        self.kill_tx.send(signal).is_ok()
    }

    /// Spawn `program` and supervise it until it exits, delivering lines to callbacks.
    ///
    /// `Ok` means the process exited on its own (any exit code). A timeout
    /// yields `Error::Timeout`, a requested or external signal `Error::Killed`,
    /// and a failed spawn `Error::Spawn`.
    pub async fn run<O, E>(
        &self,
        program: &str,
        args: &[String],
        profile: &SandboxProfile,
        cwd: Option<&Path>,
        mut on_stdout: O,
        mut on_stderr: E,
    ) -> Result<ProcessOutput>
    where
        O: FnMut(&str) + Send,
        E: FnMut(&str) + Send,
    {
        let (tx, mut rx) = mpsc::channel::<OutputLine>(LINE_CHANNEL_CAPACITY);
        let forward = async {
            while let Some((stream, line)) = rx.recv().await {
                match stream {
                    OutputStream::Stdout => on_stdout(&line),
                    OutputStream::Stderr => on_stderr(&line),
                }
            }
        };
        let run = self.run_streaming(program, args, profile, cwd, tx);
        let (result, ()) = tokio::join!(run, forward);
        result
    }

    /// Same as [`run`](Self::run), but lines go to a bounded channel.
    ///
    /// A slow consumer back-pressures the child through its pipes; timeout,
    /// kill requests and escalation still fire while the sink is full. Lines
    /// that cannot be delivered before the drain timeout are dropped. A closed
    /// receiver stops delivery but not supervision.
    pub async fn run_streaming(
        &self,
        program: &str,
        args: &[String],
        profile: &SandboxProfile,
        cwd: Option<&Path>,
        sink: mpsc::Sender<OutputLine>,
    ) -> Result<ProcessOutput> {
        let Some(mut kill_rx) = self.kill_rx.lock().take() else {
            return Err(Error::AlreadyStarted);
        };

        let timeout = if profile.timeout_ms > 0 {
            Duration::from_millis(profile.timeout_ms)
        } else {
            self.config.default_timeout
        };

        let mut std_cmd = std::process::Command::new(program);
        std_cmd.args(args).envs(&profile.env);
        if let Some(dir) = cwd.or(profile.cwd.as_deref()) {
            std_cmd.current_dir(dir);
        }
        #[cfg(unix)]
        if self.config.kill_process_group {
            use std::os::unix::process::CommandExt;
            std_cmd.process_group(0);
        }

        let mut cmd = tokio::process::Command::from(std_cmd);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let started = Instant::now();
        let mut child = cmd.spawn().map_err(|e| Error::spawn(program, e))?;
        let pid = child.id();

        self.pid.store(pid.unwrap_or(0), Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);
        let _guard = RunningGuard { supervisor: self };

        info!(
            "Spawned {} (pid {:?}, timeout {:.1}s)",
            program,
            pid,
            timeout.as_secs_f64()
        );

        // 한 줄은 보존 한도를 넘지 않도록 잘라서 읽음
        let max_line = self.config.max_output_bytes.max(1) as u64;
        let (line_tx, mut line_rx) = mpsc::channel(LINE_CHANNEL_CAPACITY);
        let mut readers: Vec<JoinHandle<()>> = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_reader(stdout, OutputStream::Stdout, max_line, line_tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_reader(stderr, OutputStream::Stderr, max_line, line_tx.clone()));
        }
        drop(line_tx);

        let mut stdout_buf = OutputBuffer::new("stdout", self.config.max_output_bytes);
        let mut stderr_buf = OutputBuffer::new("stderr", self.config.max_output_bytes);

        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);
        let mut deadline_armed = true;
        let mut escalation: Option<Pin<Box<Sleep>>> = None;
        let mut drain: Option<Pin<Box<Sleep>>> = None;

        let mut sink_open = true;
        let mut pending: Option<OutputLine> = None;
        let mut exit_status: Option<ExitStatus> = None;
        let mut lines_open = true;
        let mut timed_out = false;
        let mut requested: Option<Signal> = None;

        loop {
            if exit_status.is_some() && !lines_open && pending.is_none() {
                break;
            }

            // 제어 분기가 라인 분기보다 먼저 (출력 폭주 중에도 timeout/kill 관찰)
            tokio::select! {
                biased;

                _ = &mut deadline, if deadline_armed && exit_status.is_none() => {
                    deadline_armed = false;
                    timed_out = true;
                    warn!(
                        "{} timed out after {:.1}s, sending SIGTERM",
                        program,
                        timeout.as_secs_f64()
                    );
                    self.deliver(&mut child, pid, Signal::Terminate);
                    if escalation.is_none() {
                        escalation = Some(Box::pin(tokio::time::sleep(self.config.kill_grace)));
                    }
                }

                Some(signal) = kill_rx.recv(), if exit_status.is_none() => {
                    info!("Kill requested for {} ({:?})", program, signal);
                    requested = Some(signal);
                    self.deliver(&mut child, pid, signal);
                    if signal != Signal::Kill && escalation.is_none() {
                        escalation = Some(Box::pin(tokio::time::sleep(self.config.kill_grace)));
                    }
                }

                _ = sleep_opt(&mut escalation), if exit_status.is_none() => {
                    escalation = None;
                    warn!(
                        "{} still alive {:.1}s after SIGTERM, sending SIGKILL",
                        program,
                        self.config.kill_grace.as_secs_f64()
                    );
                    self.deliver(&mut child, pid, Signal::Kill);
                }

                status = child.wait(), if exit_status.is_none() => {
                    let status = status?;
                    debug!("{} exited with {}", program, status);
                    exit_status = Some(status);
                    escalation = None;
                    drain = Some(Box::pin(tokio::time::sleep(self.config.drain_timeout)));
                }

                _ = sleep_opt(&mut drain) => {
                    warn!("Output drain for {} timed out; remaining output discarded", program);
                    break;
                }

                permit = sink.reserve(), if sink_open && pending.is_some() => match permit {
                    Ok(permit) => {
                        if let Some(line) = pending.take() {
                            permit.send(line);
                        }
                    }
                    Err(_) => {
                        debug!("Line receiver for {} closed; output is retained only", program);
                        sink_open = false;
                        pending = None;
                    }
                },

                line = line_rx.recv(), if lines_open && pending.is_none() => match line {
                    Some((stream, line)) => {
                        match stream {
                            OutputStream::Stdout => stdout_buf.push_line(&line),
                            OutputStream::Stderr => stderr_buf.push_line(&line),
                        }
                        if sink_open {
                            pending = Some((stream, line));
                        }
                    }
                    None => lines_open = false,
                },
            }
        }

        for reader in &readers {
            reader.abort();
        }

        let duration = started.elapsed();
        let Some(status) = exit_status else {
            return Err(Error::Internal(format!(
                "supervision of {} ended without an exit status",
                program
            )));
        };

        if timed_out {
            return Err(Error::Timeout {
                after_ms: timeout.as_millis() as u64,
            });
        }
        if let Some(signal) = requested {
            return Err(Error::Killed {
                signal: signal.as_raw(),
            });
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                warn!("{} terminated by external signal {}", program, signal);
                return Err(Error::Killed { signal });
            }
        }

        Ok(ProcessOutput {
            exit_code: status.code().unwrap_or(-1),
            truncated: stdout_buf.truncated || stderr_buf.truncated,
            stdout: stdout_buf.text,
            stderr: stderr_buf.text,
            duration,
        })
    }

    fn deliver(&self, child: &mut Child, pid: Option<u32>, signal: Signal) {
        #[cfg(unix)]
        if let Some(pid) = pid {
            let pid = pid as libc::pid_t;
            let target = if self.config.kill_process_group { -pid } else { pid };
            // SAFETY: kill(2) has no memory-safety preconditions
            let rc = unsafe { libc::kill(target, signal.as_raw()) };
            if rc == 0 {
                return;
            }
            debug!(
                "kill({}, {}) failed: {}",
                target,
                signal.as_raw(),
                std::io::Error::last_os_error()
            );
        }

        #[cfg(not(unix))]
        let _ = (pid, signal);

        if let Err(e) = child.start_kill() {
            debug!("start_kill failed: {}", e);
        }
    }
}

impl Default for ProcessSupervisor {
    fn default() -> Self {
        Self::new(SupervisorConfig::default())
    }
}

/// Reads `stream` line by line; a line longer than `max_line` bytes is split
/// into several lines.
fn spawn_reader<R>(
    reader: R,
    stream: OutputStream,
    max_line: u64,
    tx: mpsc::Sender<OutputLine>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        let mut split_reported = false;
        loop {
            buf.clear();
            match (&mut reader).take(max_line).read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    if n as u64 == max_line && buf.last() != Some(&b'\n') && !split_reported {
                        split_reported = true;
                        debug!("{:?} line longer than {} bytes; splitting", stream, max_line);
                    }
                    let text = String::from_utf8_lossy(&buf);
                    let line = text.trim_end_matches(['\r', '\n']).to_string();
                    if tx.send((stream, line)).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    debug!("{:?} reader stopped: {}", stream, e);
                    break;
                }
            }
        }
    })
}

fn sleep_opt(sleep: &mut Option<Pin<Box<Sleep>>>) -> impl Future<Output = ()> + '_ {
    async move {
        match sleep {
            Some(sleep) => sleep.as_mut().await,
            None => std::future::pending::<()>().await,
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    fn fast_config() -> SupervisorConfig {
        SupervisorConfig {
            kill_grace: Duration::from_millis(200),
            drain_timeout: Duration::from_millis(200),
            ..SupervisorConfig::default()
        }
    }

    #[tokio::test]
    async fn test_streams_and_accumulates_output() {
        let supervisor = ProcessSupervisor::default();
        let mut out_lines = Vec::new();
        let mut err_lines = Vec::new();

        let output = supervisor
            .run(
                "sh",
                &sh("echo one; echo two; echo oops >&2"),
                &SandboxProfile::default(),
                None,
                |l| out_lines.push(l.to_string()),
                |l| err_lines.push(l.to_string()),
            )
            .await
            .unwrap();

        assert_eq!(output.exit_code, 0);
        assert_eq!(output.stdout, "one\ntwo\n");
        assert_eq!(output.stderr, "oops\n");
        assert!(!output.truncated);
        assert_eq!(out_lines, vec!["one", "two"]);
        assert_eq!(err_lines, vec!["oops"]);
        assert!(!supervisor.is_running());
        assert_eq!(supervisor.pid(), None);
    }

    #[tokio::test]
    async fn test_profile_env_and_cwd() {
        let dir = tempfile::tempdir().unwrap();
        let profile = SandboxProfile::default().with_env("RELAY_TEST_VALUE", "42");
        let output = ProcessSupervisor::default()
            .run(
                "sh",
                &sh("echo $RELAY_TEST_VALUE; pwd"),
                &profile,
                Some(dir.path()),
                |_| {},
                |_| {},
            )
            .await
            .unwrap();

        let mut lines = output.stdout.lines();
        assert_eq!(lines.next(), Some("42"));
        let cwd = std::fs::canonicalize(lines.next().unwrap()).unwrap();
        assert_eq!(cwd, std::fs::canonicalize(dir.path()).unwrap());
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_ok() {
        let output = ProcessSupervisor::default()
            .run("sh", &sh("exit 3"), &SandboxProfile::default(), None, |_| {}, |_| {})
            .await
            .unwrap();
        assert_eq!(output.exit_code, 3);
        assert!(!output.success());
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let err = ProcessSupervisor::default()
            .run(
                "relay-definitely-missing-binary",
                &[],
                &SandboxProfile::default(),
                None,
                |_| {},
                |_| {},
            )
            .await
            .unwrap_err();
        assert!(err.is_spawn_failure());
    }

    #[tokio::test]
    async fn test_timeout_terminates_process() {
        let supervisor = ProcessSupervisor::new(fast_config());
        let profile = SandboxProfile::default().with_timeout_ms(200);
        let started = Instant::now();

        let err = supervisor
            .run("sh", &sh("sleep 10"), &profile, None, |_| {}, |_| {})
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Timeout { after_ms: 200 }));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_timeout_escalates_to_sigkill() {
        let supervisor = ProcessSupervisor::new(fast_config());
        let profile = SandboxProfile::default().with_timeout_ms(200);
        let started = Instant::now();

        let err = supervisor
            .run("sh", &sh("trap '' TERM; sleep 10"), &profile, None, |_| {}, |_| {})
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_external_kill() {
        let supervisor = Arc::new(ProcessSupervisor::new(fast_config()));
        assert!(!supervisor.kill(Signal::Terminate));

        let runner = Arc::clone(&supervisor);
        let handle = tokio::spawn(async move {
            runner
                .run("sh", &sh("sleep 10"), &SandboxProfile::default(), None, |_| {}, |_| {})
                .await
        });

        while !supervisor.is_running() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(supervisor.pid().is_some());
        assert!(supervisor.kill(Signal::Terminate));

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::Killed { signal } if signal == libc::SIGTERM));
        assert!(!supervisor.kill(Signal::Kill));
    }

    #[tokio::test]
    async fn test_output_cap_truncates_but_streams_everything() {
        let supervisor = ProcessSupervisor::new(SupervisorConfig {
            max_output_bytes: 16,
            ..fast_config()
        });
        let mut streamed = 0;

        let output = supervisor
            .run(
                "sh",
                &sh("for i in 1 2 3 4 5 6 7 8 9 10; do echo line-$i; done"),
                &SandboxProfile::default(),
                None,
                |_| streamed += 1,
                |_| {},
            )
            .await
            .unwrap();

        assert_eq!(streamed, 10);
        assert!(output.truncated);
        assert!(output.stdout.len() <= 16);
        assert!(output.stdout.starts_with("line-1\n"));
    }

    #[tokio::test]
    async fn test_line_without_newline_is_split_at_output_cap() {
        let supervisor = ProcessSupervisor::new(SupervisorConfig {
            max_output_bytes: 1024,
            ..fast_config()
        });
        let mut lines = Vec::new();

        let output = supervisor
            .run(
                "sh",
                &sh("head -c 100000 /dev/zero | tr '\\0' a"),
                &SandboxProfile::default(),
                None,
                |l| lines.push(l.len()),
                |_| {},
            )
            .await
            .unwrap();

        assert!(lines.len() >= 98, "{} pieces", lines.len());
        assert!(lines.iter().all(|len| *len <= 1024));
        assert_eq!(lines.iter().sum::<usize>(), 100_000);
        assert!(output.truncated);
        assert!(output.stdout.len() <= 1024);
    }

    #[tokio::test]
    async fn test_stalled_receiver_does_not_delay_timeout() {
        let supervisor = ProcessSupervisor::new(fast_config());
        let profile = SandboxProfile::default().with_timeout_ms(300);
        // 아무도 읽지 않는 채널
        let (tx, _rx) = mpsc::channel(1);

        let started = Instant::now();
        let err = supervisor
            .run_streaming("yes", &[], &profile, None, tx)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Timeout { after_ms: 300 }));
        assert!(started.elapsed() < Duration::from_secs(1), "{:?}", started.elapsed());
        assert!(!supervisor.is_running());
    }

    #[tokio::test]
    async fn test_closed_receiver_keeps_supervising() {
        let supervisor = ProcessSupervisor::new(fast_config());
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        let output = supervisor
            .run_streaming(
                "sh",
                &sh("for i in 1 2 3 4 5; do echo line-$i; done"),
                &SandboxProfile::default(),
                None,
                tx,
            )
            .await
            .unwrap();

        assert!(output.success());
        assert_eq!(output.stdout.lines().count(), 5);
    }

    #[tokio::test]
    async fn test_supervisor_is_single_use() {
        let supervisor = ProcessSupervisor::default();
        assert!(!supervisor.has_started());
        supervisor
            .run("sh", &sh("true"), &SandboxProfile::default(), None, |_| {}, |_| {})
            .await
            .unwrap();
        assert!(supervisor.has_started());

        let err = supervisor
            .run("sh", &sh("true"), &SandboxProfile::default(), None, |_| {}, |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyStarted));
    }

    #[test]
    fn test_output_buffer_respects_char_boundaries() {
        let mut buf = OutputBuffer::new("stdout", 5);
        buf.push_line("héllo");
        assert!(buf.truncated);
        assert!(buf.text.len() <= 5);
        assert!(buf.text.is_char_boundary(buf.text.len()));

        buf.push_line("more");
        assert!(!buf.text.contains("more"));
    }
}
