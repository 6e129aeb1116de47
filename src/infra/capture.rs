//! # Output Capture Module / 输出捕获模块
//!
//! A `tracing_subscriber::Layer` that feeds every event emitted inside a run
//! into the run's `OutputAggregator`. The layer is attached to a dispatch that
//! only wraps the run future, so nothing outside the run is intercepted and
//! nothing global is patched.
//!
//! 一个 `tracing_subscriber::Layer`，将运行期间发出的每个事件送入该运行的
//! `OutputAggregator`。该层只附加在包裹运行 future 的 dispatch 上。

use std::cell::Cell;
use std::fmt::Write as _;
use std::sync::Arc;

use tracing::{Dispatch, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Layer};

use crate::core::models::Level;
use crate::core::output::OutputAggregator;

thread_local! {
    static SUPPRESSED: Cell<bool> = const { Cell::new(false) };
}

/// Runs `f` with capture suppressed on this thread.
///
/// The aggregator wraps its own console echo and fan-out in this so a line it
/// already recorded is not recorded a second time.
pub fn suppressed<R>(f: impl FnOnce() -> R) -> R {
    let previous = SUPPRESSED.with(|flag| flag.replace(true));
    let result = f();
    SUPPRESSED.with(|flag| flag.set(previous));
    result
}

pub fn is_suppressed() -> bool {
    SUPPRESSED.with(Cell::get)
}

/// Layer forwarding events to an `OutputAggregator`.
pub struct CaptureLayer {
    output: Arc<OutputAggregator>,
}

impl CaptureLayer {
    pub fn new(output: Arc<OutputAggregator>) -> Self {
        Self { output }
    }
}

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        if is_suppressed() || !self.output.is_installed() {
            return;
        }
        let metadata = event.metadata();
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        self.output
            .capture(Level::from(metadata.level()), metadata.target(), visitor.text());
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: String,
    fields: String,
}

impl FieldVisitor {
    fn text(self) -> String {
        match (self.message.is_empty(), self.fields.is_empty()) {
            (_, true) => self.message,
            (true, false) => self.fields,
            (false, false) => format!("{} {}", self.message, self.fields),
        }
    }

    fn push_field(&mut self, name: &str, value: &dyn std::fmt::Display) {
        if !self.fields.is_empty() {
            self.fields.push(' ');
        }
        let _ = write!(self.fields, "{name}={value}");
    }
}

impl tracing::field::Visit for FieldVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.push_field(field.name(), &format_args!("{value:?}"));
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.push_field(field.name(), &value);
        }
    }
}

/// Builds the dispatch a run executes under: the capture layer plus a console
/// `fmt` layer filtered by `RUST_LOG` (default `info`).
pub fn run_dispatch(output: Arc<OutputAggregator>) -> Dispatch {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::registry()
        .with(CaptureLayer::new(output))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .without_time()
                .with_filter(filter),
        );
    Dispatch::new(subscriber)
}
