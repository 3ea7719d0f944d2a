use crate::interceptor::{EventSink, OutputInterceptor};
use std::fmt::{self, Write as _};
use tracing::field::{Field, Visit};
use tracing::{Event as TracingEvent, Subscriber};
use tracing_subscriber::layer::{Context as LayerContext, Layer};

/// Forwards `tracing` events to the executor as `"<target>: <message>"` log lines.
pub struct InterceptLayer<S> {
    output: OutputInterceptor<S>,
}

impl<S: EventSink> InterceptLayer<S> {
    pub fn new(output: OutputInterceptor<S>) -> Self {
        Self { output }
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn push_field(&mut self, name: &str, value: fmt::Arguments<'_>) {
        let _ = write!(self.fields, " {name}={value}");
    }

    fn finish(self) -> String {
        let mut line = self.message;
        line.push_str(&self.fields);
        line.trim().to_string()
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.push_field(field.name(), format_args!("{value}"));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.push_field(field.name(), format_args!("{value:?}"));
        }
    }
}

impl<S, Sub> Layer<Sub> for InterceptLayer<S>
where
    S: EventSink + 'static,
    Sub: Subscriber,
{
    fn on_event(&self, event: &TracingEvent<'_>, _ctx: LayerContext<'_, Sub>) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        self.output
            .record(event.metadata().target(), &visitor.finish());
    }
}
