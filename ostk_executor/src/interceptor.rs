//! # Output Interceptor
//!
//! Turns free-form text written by an operation into discrete events:
//!
//! - text containing a carriage return is a progress redraw; only the segment
//!   after the last `\r` matters and it becomes a [`Event::ProgressUpdate`]
//!   when non-blank.
//! - any other text is split on `\n`, and each non-blank line becomes a
//!   [`Event::LogLine`].
//! - structured log records become `"<source>: <message>"` log lines.
//!
//! The interceptor is handed to operations as a writer; nothing global is
//! redirected in the calling process.

use ostk_common::Event;
use std::fmt;
use std::io;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

/// Destination of intercepted events.
pub trait EventSink: Send + Sync {
    /// Deliver one event. Delivery failures are dropped; the reader may be gone.
    fn emit(&self, event: Event);
}

impl EventSink for UnboundedSender<Event> {
    fn emit(&self, event: Event) {
        let _ = self.send(event);
    }
}

impl<S: EventSink + ?Sized> EventSink for Arc<S> {
    fn emit(&self, event: Event) {
        (**self).emit(event)
    }
}

/// Writer that classifies text into progress and log events.
#[derive(Clone)]
pub struct OutputInterceptor<S> {
    sink: S,
}

impl<S: EventSink> OutputInterceptor<S> {
    pub fn new(sink: S) -> Self {
        Self { sink }
    }

    /// Classify one chunk of text.
    pub fn intercept(&self, text: &str) {
        if text.contains('\r') {
            if let Some(last) = text.rsplit('\r').next()
                && !last.trim().is_empty()
            {
                self.sink.emit(Event::progress(last));
            }
            return;
        }

        for line in text.split('\n') {
            if !line.trim().is_empty() {
                self.sink.emit(Event::log(line));
            }
        }
    }

    /// Forward a structured log record from `source`.
    pub fn record(&self, source: &str, message: &str) {
        self.sink.emit(Event::log(format!("{source}: {message}")));
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}

impl<S: EventSink> io::Write for OutputInterceptor<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.intercept(&String::from_utf8_lossy(buf));
        Ok(buf.len())
    }

    /// One formatted write is one interception unit, so `writeln!(out, "{n} rows")`
    /// produces a single line rather than one per formatting piece.
    fn write_fmt(&mut self, args: fmt::Arguments<'_>) -> io::Result<()> {
        match args.as_str() {
            Some(text) => self.intercept(text),
            None => self.intercept(&args.to_string()),
        }
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Collect(Mutex<Vec<Event>>);

    impl EventSink for Collect {
        fn emit(&self, event: Event) {
            self.0.lock().unwrap().push(event);
        }
    }

    fn interceptor() -> (OutputInterceptor<Arc<Collect>>, Arc<Collect>) {
        let collect = Arc::new(Collect::default());
        (OutputInterceptor::new(collect.clone()), collect)
    }

    fn events(collect: &Collect) -> Vec<Event> {
        collect.0.lock().unwrap().clone()
    }

    #[test]
    fn carriage_return_emits_final_segment_as_progress() {
        let (out, collect) = interceptor();
        out.intercept("\r 10%|#    |\r 50%|###  |");
        assert_eq!(events(&collect), vec![Event::progress(" 50%|###  |")]);
    }

    #[test]
    fn blank_final_segment_is_dropped() {
        let (out, collect) = interceptor();
        out.intercept(" 90%\r   ");
        out.intercept("\r");
        assert!(events(&collect).is_empty());
    }

    #[test]
    fn newline_text_emits_each_non_blank_line() {
        let (out, collect) = interceptor();
        out.intercept("A\n\n  \nB\nC\n");
        assert_eq!(
            events(&collect),
            vec![Event::log("A"), Event::log("B"), Event::log("C")]
        );
    }

    #[test]
    fn record_prefixes_source() {
        let (out, collect) = interceptor();
        out.record("pyopensky.trino", "Retrieved 42 rows");
        assert_eq!(
            events(&collect),
            vec![Event::log("pyopensky.trino: Retrieved 42 rows")]
        );
    }

    #[test]
    fn formatted_write_is_a_single_line() {
        let (mut out, collect) = interceptor();
        let rows = 1234;
        writeln!(out, "Retrieved {rows} rows").unwrap();
        write!(out, "\r{}% done", 40).unwrap();
        assert_eq!(
            events(&collect),
            vec![
                Event::log("Retrieved 1234 rows"),
                Event::progress("40% done")
            ]
        );
    }

    #[test]
    fn channel_sink_survives_closed_receiver() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        drop(rx);
        let out = OutputInterceptor::new(tx);
        out.intercept("nobody is listening\n");
    }
}
