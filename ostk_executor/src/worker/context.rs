use crate::correlator::QueryIdCorrelator;
use crate::interceptor::{EventSink, OutputInterceptor};
use ostk_common::Event;
use std::io::Write;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Writes events as protocol frames, one line per event.
///
/// Each frame is written and flushed under a lock, so frames from different
/// threads never interleave.
#[derive(Clone)]
pub struct FrameWriter {
    out: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl FrameWriter {
    pub fn new(out: impl Write + Send + 'static) -> Self {
        Self {
            out: Arc::new(Mutex::new(Box::new(out))),
        }
    }

    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }

    /// Frames on the process's original stdout, out of reach of operation code.
    ///
    /// The stdout pipe is duplicated for frames and fd 1 is pointed at stderr,
    /// so `print!` from operations and libraries arrives as ambient output
    /// instead of splicing into a frame.
    #[cfg(unix)]
    pub fn private_stdout() -> std::io::Result<Self> {
        use std::os::fd::AsFd;

        std::io::stdout().flush()?;
        let frames = std::io::stdout().as_fd().try_clone_to_owned()?;
        // SAFETY: both descriptors stay open for the life of the process.
        if unsafe { libc::dup2(libc::STDERR_FILENO, libc::STDOUT_FILENO) } < 0 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(Self::new(std::fs::File::from(frames)))
    }

    /// Frames share stdout with operation output on this platform.
    #[cfg(not(unix))]
    pub fn private_stdout() -> std::io::Result<Self> {
        Ok(Self::stdout())
    }
}

impl EventSink for FrameWriter {
    fn emit(&self, event: Event) {
        let Ok(mut frame) = event.to_frame() else {
            return;
        };
        frame.push('\n');
        let mut out = match self.out.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let _ = out.write_all(frame.as_bytes());
        let _ = out.flush();
    }
}

/// Everything an operation may use to talk back to the executor.
pub struct TaskContext {
    sink: FrameWriter,
    correlator: QueryIdCorrelator,
    cancellation: CancellationToken,
}

impl TaskContext {
    pub fn new(sink: FrameWriter, cancellation: CancellationToken) -> Self {
        let capture_sink = sink.clone();
        let correlator = QueryIdCorrelator::new(move |id| {
            capture_sink.emit(Event::QueryIdCaptured { id: id.to_string() })
        });
        Self {
            sink,
            correlator,
            cancellation,
        }
    }

    /// Writer for ambient text output. `\r` redraws become progress updates,
    /// other lines become log lines.
    pub fn output(&self) -> OutputInterceptor<FrameWriter> {
        OutputInterceptor::new(self.sink.clone())
    }

    pub fn progress(&self, text: impl Into<String>) {
        self.sink.emit(Event::progress(text));
    }

    /// Correlator to put in front of remote response processing.
    pub fn correlator(&self) -> &QueryIdCorrelator {
        &self.correlator
    }

    /// Set once the executor asked for cancellation (or went away).
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }
}
