use crate::config::Unit;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Rounds to two decimal places, the precision of every reported number.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// A contiguous slice of a transfer and the bytes moved within it.
///
/// Offsets are measured from the start of the transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferWindow {
    pub start: Duration,
    pub end: Duration,
    pub bytes: u64,
}

impl TransferWindow {
    pub fn new(start: Duration, end: Duration, bytes: u64) -> Self {
        Self { start, end, bytes }
    }

    /// Window covering a whole transfer of `elapsed` length.
    pub fn whole(elapsed: Duration, bytes: u64) -> Self {
        Self::new(Duration::ZERO, elapsed, bytes)
    }

    pub fn length(&self) -> Duration {
        self.end.saturating_sub(self.start)
    }
}

/// Splits `duration` into `count` equal reporting windows.
///
/// Returns `(start, end)` offsets. The last window always ends exactly at
/// `duration`, absorbing any rounding left over by the division. A `count`
/// of zero is treated as one.
///
/// # Examples
///
/// ```
/// use simpleperf::measurements::window_schedule;
/// use std::time::Duration;
///
/// let windows = window_schedule(Duration::from_secs(10), 4);
/// assert_eq!(windows.len(), 4);
/// assert_eq!(windows[0], (Duration::ZERO, Duration::from_millis(2500)));
/// assert_eq!(windows[3].1, Duration::from_secs(10));
/// ```
pub fn window_schedule(duration: Duration, count: u32) -> Vec<(Duration, Duration)> {
    let count = count.max(1);
    let length = duration / count;

    (0..count)
        .map(|i| {
            let start = length * i;
            let end = if i + 1 == count {
                duration
            } else {
                length * (i + 1)
            };
            (start, end)
        })
        .collect()
}

/// Throughput measured over one window of one connection.
///
/// The identifier is the address that names the connection in report
/// lines: the peer address on the server, the local address on the client.
///
/// # Examples
///
/// ```
/// use simpleperf::{RateSample, TransferWindow, Unit};
/// use std::time::Duration;
///
/// let sample = RateSample::new(
///     "127.0.0.1:40000".to_string(),
///     TransferWindow::whole(Duration::from_secs(2), 10_000_000),
///     Unit::MB,
/// );
/// assert_eq!(sample.amount(), 10.0);
/// assert_eq!(sample.rate().unwrap(), 40.0);
/// assert_eq!(
///     sample.report_line().unwrap(),
///     "127.0.0.1:40000\t[0.00 - 2.00]\t10.00\t40.00 MBps"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateSample {
    pub id: String,
    pub window: TransferWindow,
    pub unit: Unit,
}

impl RateSample {
    pub fn new(id: String, window: TransferWindow, unit: Unit) -> Self {
        Self { id, window, unit }
    }

    pub fn bytes(&self) -> u64 {
        self.window.bytes
    }

    /// Transferred amount in the display unit, rounded to two decimals.
    pub fn amount(&self) -> f64 {
        round2(self.window.bytes as f64 / self.unit.factor() as f64)
    }

    /// Window start in seconds, rounded to two decimals.
    pub fn start_secs(&self) -> f64 {
        round2(self.window.start.as_secs_f64())
    }

    /// Window end in seconds, rounded to two decimals.
    pub fn end_secs(&self) -> f64 {
        round2(self.window.end.as_secs_f64())
    }

    /// Rate in bits of the display unit per second, rounded to two decimals.
    ///
    /// The rate is taken over the printed span `end_secs() - start_secs()`,
    /// so it matches the interval shown next to it. A positive window too
    /// short to show up at two decimals falls back to its exact length.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ZeroTransferTime`] when the window has no length.
    pub fn rate(&self) -> Result<f64> {
        let exact = self.window.length().as_secs_f64();
        if exact <= 0.0 {
            return Err(Error::ZeroTransferTime);
        }
        let printed = round2(self.end_secs() - self.start_secs());
        let seconds = if printed > 0.0 { printed } else { exact };
        Ok(round2(
            self.window.bytes as f64 * 8.0 / (seconds * self.unit.factor() as f64),
        ))
    }

    /// Formats the tab-separated report line for this sample.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ZeroTransferTime`] instead of a line with an
    /// infinite rate.
    pub fn report_line(&self) -> Result<String> {
        let rate = self.rate()?;
        Ok(format!(
            "{}\t[{:.2} - {:.2}]\t{:.2}\t{:.2} {}ps",
            self.id,
            self.start_secs(),
            self.end_secs(),
            self.amount(),
            rate,
            self.unit
        ))
    }

    /// Flattened record used for JSON output.
    pub fn record(&self, kind: SampleKind) -> RateRecord {
        RateRecord {
            kind,
            id: self.id.clone(),
            start: self.start_secs(),
            end: self.end_secs(),
            bytes: self.window.bytes,
            amount: self.amount(),
            rate: self.rate().ok(),
            unit: self.unit,
        }
    }
}

/// Whether a sample covers one window or a whole connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleKind {
    Interval,
    Summary,
}

/// JSON shape of a report line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateRecord {
    pub kind: SampleKind,
    pub id: String,
    pub start: f64,
    pub end: f64,
    pub bytes: u64,
    pub amount: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate: Option<f64>,
    pub unit: Unit,
}
