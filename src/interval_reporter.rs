//! Report output for transfer workers.
//!
//! Workers never print directly. They send banners, samples and diagnostics
//! through an [`IntervalReporter`] to a single reporter task, which prints
//! each line whole. Lines from parallel connections interleave in arrival
//! order.

use crate::measurements::{RateSample, SampleKind};
use log::{debug, error};
use std::io::Write;
use tokio::sync::mpsc;

/// Message sent to the reporter task
///
/// # Examples
///
/// ```
/// use simpleperf::interval_reporter::IntervalMessage;
///
/// let msg = IntervalMessage::Complete;
///
/// match msg {
///     IntervalMessage::Complete => println!("Reporting finished"),
///     _ => println!("Report output"),
/// }
/// ```
#[derive(Debug, Clone)]
pub enum IntervalMessage {
    /// Free-form header line, suppressed in JSON mode
    Banner(String),
    /// One reporting window of a client transfer
    Interval(RateSample),
    /// Whole-connection result
    Summary(RateSample),
    /// Problem report for one connection
    Diagnostic(String),
    /// Stop the reporter task
    Complete,
}

/// Handle for sending report output
///
/// # Examples
///
/// ```
/// use simpleperf::interval_reporter::{IntervalMessage, IntervalReporter};
///
/// #[tokio::main]
/// async fn main() {
///     let (reporter, mut receiver) = IntervalReporter::new();
///
///     let worker = reporter.clone();
///     worker.banner("ID\tInterval\tTransferred\tRate");
///     worker.complete();
///
///     assert!(matches!(receiver.recv().await, Some(IntervalMessage::Banner(_))));
///     assert!(matches!(receiver.recv().await, Some(IntervalMessage::Complete)));
/// }
/// ```
#[derive(Clone, Debug)]
pub struct IntervalReporter {
    sender: mpsc::UnboundedSender<IntervalMessage>,
}

impl IntervalReporter {
    /// Creates a new interval reporter
    ///
    /// Returns a tuple of (reporter, receiver) where the receiver should be
    /// passed to [`run_reporter_task`], or read directly.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<IntervalMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    pub fn banner(&self, line: impl Into<String>) {
        self.send(IntervalMessage::Banner(line.into()));
    }

    pub fn interval(&self, sample: RateSample) {
        self.send(IntervalMessage::Interval(sample));
    }

    pub fn summary(&self, sample: RateSample) {
        self.send(IntervalMessage::Summary(sample));
    }

    pub fn diagnostic(&self, message: impl Into<String>) {
        self.send(IntervalMessage::Diagnostic(message.into()));
    }

    /// Signal that no more output follows
    pub fn complete(&self) {
        self.send(IntervalMessage::Complete);
    }

    fn send(&self, msg: IntervalMessage) {
        if self.sender.send(msg).is_err() {
            debug!("Reporter task has stopped, dropping output");
        }
    }
}

/// Renders one message as the line the reporter prints.
///
/// Returns `None` for messages with no output, such as banners in JSON mode.
pub fn render(msg: &IntervalMessage, json_mode: bool) -> Option<String> {
    match msg {
        IntervalMessage::Banner(line) => (!json_mode).then(|| line.clone()),
        IntervalMessage::Interval(sample) => Some(render_sample(sample, SampleKind::Interval, json_mode)),
        IntervalMessage::Summary(sample) => Some(render_sample(sample, SampleKind::Summary, json_mode)),
        IntervalMessage::Diagnostic(message) => {
            if json_mode {
                Some(serde_json::json!({ "kind": "diagnostic", "message": message }).to_string())
            } else {
                Some(message.clone())
            }
        }
        IntervalMessage::Complete => None,
    }
}

fn render_sample(sample: &RateSample, kind: SampleKind, json_mode: bool) -> String {
    if json_mode {
        match serde_json::to_string(&sample.record(kind)) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize report for {}: {}", sample.id, e);
                String::new()
            }
        }
    } else {
        match sample.report_line() {
            Ok(line) => line,
            Err(e) => e.to_string(),
        }
    }
}

/// Runs the reporter task
///
/// Prints every message until [`IntervalMessage::Complete`] arrives or all
/// reporter handles are dropped.
pub async fn run_reporter_task(receiver: mpsc::UnboundedReceiver<IntervalMessage>, json_mode: bool) {
    write_reports(receiver, json_mode, std::io::stdout()).await;
}

/// Writes every rendered message to `out`, one per line, and hands the
/// writer back once reporting completes.
pub async fn write_reports<W: Write>(
    mut receiver: mpsc::UnboundedReceiver<IntervalMessage>,
    json_mode: bool,
    mut out: W,
) -> W {
    while let Some(msg) = receiver.recv().await {
        if let IntervalMessage::Complete = msg {
            break;
        }
        if let Some(line) = render(&msg, json_mode) {
            if let Err(e) = writeln!(out, "{}", line) {
                error!("Failed to write report line: {}", e);
            }
        }
    }
    if let Err(e) = out.flush() {
        error!("Failed to flush report output: {}", e);
    }
    out
}
