//! The isolated execution context: one child process plus the tasks that pump
//! its pipes.
//!
//! - stdout is read line by line. Protocol frames are forwarded as-is; any
//!   other line goes through the output interceptor.
//! - stderr is read in chunks so carriage-return progress bars show up while
//!   they are being drawn, not only once a newline arrives.
//! - stdin carries the task request followed by control messages.
//!
//! Both readers share one unbounded channel. When both have finished the
//! channel reports `Disconnected`, which tells the executor the child can no
//! longer produce events.
//!
//! Frames and ambient text can arrive on different pipes, so a terminal event
//! is held back until both pipes have closed (or a grace period has passed).
//! Log lines the child wrote just before reporting its result are not lost.

use super::types::{OperationSpec, Termination};
use crate::error::ExecutorError;
use crate::interceptor::{EventSink, OutputInterceptor};
use ostk_common::{ControlMessage, Event, TaskRequest};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, error::TryRecvError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const STDERR_CHUNK_SIZE: usize = 4096;

pub(crate) struct IsolatedProcess {
    child: Child,
    pid: Option<u32>,
    control: Option<UnboundedSender<String>>,
    events: UnboundedReceiver<Event>,
    readers: Vec<JoinHandle<()>>,
    held: Option<(Event, Instant)>,
    exited: Option<(ExitStatus, Instant)>,
}

impl IsolatedProcess {
    /// Spawn the child and hand it `request`. Must run inside a Tokio runtime.
    pub(crate) fn spawn(spec: &OperationSpec, request: &TaskRequest) -> Result<Self, ExecutorError> {
        let request_line = request.to_line()?;
        let launch_error = |source: std::io::Error| ExecutorError::Launch {
            program: spec.program().display().to_string(),
            source,
        };

        let mut command = Command::new(spec.program());
        command
            .args(spec.program_args())
            .envs(spec.envs())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(launch_error)?;
        let pid = child.id();

        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            return Err(launch_error(std::io::Error::other(
                "child pipes were not captured",
            )));
        };

        let (event_tx, events) = mpsc::unbounded_channel();
        let readers = vec![
            tokio::spawn(forward_stdout(stdout, event_tx.clone())),
            tokio::spawn(forward_stderr(stderr, event_tx)),
        ];

        let (control_tx, control_rx) = mpsc::unbounded_channel();
        tokio::spawn(write_control(stdin, control_rx));
        let _ = control_tx.send(request_line);

        debug!(
            "Spawned {} for operation '{}' (pid {:?})",
            spec.program().display(),
            request.operation,
            pid
        );
        Ok(Self {
            child,
            pid,
            control: Some(control_tx),
            events,
            readers,
            held: None,
            exited: None,
        })
    }

    pub(crate) fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub(crate) fn try_next(&mut self) -> Result<Event, TryRecvError> {
        self.events.try_recv()
    }

    /// Whether the child's stdout and stderr have both reached end of file.
    /// Everything they carried is already in the channel once this is true.
    pub(crate) fn output_closed(&self) -> bool {
        self.readers.iter().all(JoinHandle::is_finished)
    }

    /// Keep the first terminal event until the rest of the output is in.
    pub(crate) fn hold(&mut self, event: Event) {
        if self.held.is_none() {
            self.held = Some((event, Instant::now()));
        }
    }

    /// How long a terminal event has been held, if there is one.
    pub(crate) fn held_for(&self) -> Option<Duration> {
        self.held.as_ref().map(|(_, at)| at.elapsed())
    }

    pub(crate) fn take_held(&mut self) -> Option<Event> {
        self.held.take().map(|(event, _)| event)
    }

    /// Make sure a child that already reported its result goes away.
    ///
    /// Closes stdin, kills the child if it is still running and stops
    /// reading its pipes. Never waits.
    pub(crate) fn stop(&mut self) {
        self.control = None;
        if self.poll_exit().is_none() {
            debug!("Child {:?} still running after its result, killing it", self.pid);
            if let Err(err) = self.child.start_kill() {
                warn!("Failed to kill child {:?}: {}", self.pid, err);
            }
        }
        for reader in &self.readers {
            reader.abort();
        }
    }

    /// Exit status and time since exit, if the child has exited. Never waits.
    pub(crate) fn poll_exit(&mut self) -> Option<(ExitStatus, Duration)> {
        if self.exited.is_none() {
            match self.child.try_wait() {
                Ok(Some(status)) => self.exited = Some((status, Instant::now())),
                Ok(None) => {}
                Err(err) => warn!("Failed to query child {:?}: {}", self.pid, err),
            }
        }
        self.exited
            .map(|(status, at)| (status, at.elapsed()))
    }

    pub(crate) fn send_control(&self, message: ControlMessage) {
        let Some(control) = &self.control else {
            return;
        };
        match message.to_line() {
            Ok(line) => {
                let _ = control.send(line);
            }
            Err(err) => warn!("Failed to encode control message {:?}: {}", message, err),
        }
    }

    /// Ask the child to exit, wait up to `grace`, then kill it.
    ///
    /// The request goes out as a `Terminate` control line followed by closing
    /// stdin, and on unix also as `SIGTERM`.
    pub(crate) async fn terminate(&mut self, grace: Duration) -> Termination {
        if let Some((status, _)) = self.poll_exit() {
            self.control = None;
            return Termination::AlreadyExited {
                code: status.code(),
            };
        }

        self.send_control(ControlMessage::Terminate);
        // Dropping the sender closes stdin once the queue is flushed.
        self.control = None;
        self.signal_terminate();

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                self.exited = Some((status, Instant::now()));
                Termination::Exited {
                    code: status.code(),
                }
            }
            Ok(Err(err)) => {
                warn!("Waiting for child {:?} failed: {}", self.pid, err);
                self.kill().await
            }
            Err(_) => {
                warn!(
                    "Child {:?} did not exit within {:?}, killing it",
                    self.pid, grace
                );
                self.kill().await
            }
        }
    }

    #[cfg(unix)]
    fn signal_terminate(&self) {
        let Some(pid) = self.pid.and_then(|pid| libc::pid_t::try_from(pid).ok()) else {
            return;
        };
        // SAFETY: `pid` is our own unreaped child, so it cannot have been recycled.
        if unsafe { libc::kill(pid, libc::SIGTERM) } < 0 {
            debug!(
                "SIGTERM to child {}: {}",
                pid,
                std::io::Error::last_os_error()
            );
        }
    }

    #[cfg(not(unix))]
    fn signal_terminate(&self) {}

    async fn kill(&mut self) -> Termination {
        if let Err(err) = self.child.kill().await {
            warn!("Failed to kill child {:?}: {}", self.pid, err);
        }
        if let Ok(Some(status)) = self.child.try_wait() {
            self.exited = Some((status, Instant::now()));
        }
        Termination::Killed
    }
}

impl Drop for IsolatedProcess {
    fn drop(&mut self) {
        for reader in &self.readers {
            reader.abort();
        }
    }
}

async fn forward_stdout<R>(stdout: R, events: UnboundedSender<Event>)
where
    R: AsyncRead + Unpin,
{
    let interceptor = OutputInterceptor::new(events.clone());
    let mut reader = BufReader::new(stdout);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&buf);
                let line = text.trim_end_matches(['\r', '\n']);
                match Event::from_frame(line) {
                    Some(event) => events.emit(event),
                    None => interceptor.intercept(line),
                }
            }
            Err(err) => {
                debug!("stdout reader stopped: {}", err);
                break;
            }
        }
    }
}

async fn forward_stderr<R>(stderr: R, events: UnboundedSender<Event>)
where
    R: AsyncRead + Unpin,
{
    let interceptor = OutputInterceptor::new(events);
    let mut stderr = stderr;
    let mut chunk = vec![0u8; STDERR_CHUNK_SIZE];
    let mut pending = String::new();
    loop {
        match stderr.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                pending.push_str(&String::from_utf8_lossy(&chunk[..n]));
                drain_complete(&mut pending, &interceptor);
            }
            Err(err) => {
                debug!("stderr reader stopped: {}", err);
                break;
            }
        }
    }
    if !pending.is_empty() {
        interceptor.intercept(&pending);
    }
}

/// Emit every complete line in `pending`. A trailing partial line is kept
/// unless it is a carriage-return redraw, which is emitted right away.
fn drain_complete<S: EventSink>(pending: &mut String, interceptor: &OutputInterceptor<S>) {
    while let Some(pos) = pending.find('\n') {
        let line: String = pending.drain(..=pos).collect();
        interceptor.intercept(line.trim_end_matches(['\r', '\n']));
    }
    if pending.contains('\r') {
        interceptor.intercept(pending);
        pending.clear();
    }
}

async fn write_control(mut stdin: ChildStdin, mut lines: UnboundedReceiver<String>) {
    while let Some(line) = lines.recv().await {
        if let Err(err) = stdin.write_all(line.as_bytes()).await {
            debug!("control channel closed: {}", err);
            return;
        }
        if stdin.flush().await.is_err() {
            return;
        }
    }
}
