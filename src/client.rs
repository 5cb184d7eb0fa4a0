use crate::config::{Config, Mode, TransferLimit};
use crate::interval_reporter::{run_reporter_task, IntervalReporter};
use crate::measurements::{window_schedule, RateSample, TransferWindow};
use crate::protocol::{await_acknowledgement, send_sentinel};
use crate::{Error, Result};
use log::{debug, error, info};
use std::io::ErrorKind;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

/// Bytes written and time taken by one send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferSummary {
    pub bytes: u64,
    pub elapsed: Duration,
}

/// Throughput test client.
///
/// Opens `parallel` connections to the server, pushes data on each one
/// concurrently and reports per-window and per-connection throughput. Every
/// connection uses the same stop condition; targets are not split between
/// connections.
///
/// # Examples
///
/// ```no_run
/// use simpleperf::{Client, Config};
/// use std::time::Duration;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Config::client("127.0.0.1".to_string(), 12000)
///     .with_duration(Duration::from_secs(10))
///     .with_intervals(5)
///     .with_parallel(2);
///
/// let client = Client::new(config)?;
/// let summaries = client.run().await?;
/// println!("{} connections finished cleanly", summaries.len());
/// # Ok(())
/// # }
/// ```
pub struct Client {
    config: Config,
    reporter: Option<IntervalReporter>,
}

impl Client {
    /// Creates a new client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration is invalid or is not a
    /// client configuration.
    pub fn new(config: Config) -> Result<Self> {
        if config.mode != Mode::Client {
            return Err(Error::Config("Client requires a client mode configuration".to_string()));
        }
        config.validate()?;
        Ok(Self {
            config,
            reporter: None,
        })
    }

    /// Sends report output to `reporter` instead of printing it.
    pub fn with_reporter(mut self, reporter: IntervalReporter) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Runs all connections and waits for every one of them to finish.
    ///
    /// Returns the summaries of the connections that completed the
    /// termination handshake. Transport and handshake failures are reported
    /// for their own connection and do not affect the others.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionRefused`] or [`Error::Connection`] if any
    /// connection could not be established.
    pub async fn run(&self) -> Result<Vec<RateSample>> {
        let (reporter, printer) = match &self.reporter {
            Some(reporter) => (reporter.clone(), None),
            None => {
                let (reporter, receiver) = IntervalReporter::new();
                let task = tokio::spawn(run_reporter_task(receiver, self.config.json));
                (reporter, Some(task))
            }
        };

        info!(
            "Starting {} connection(s) to {}:{}",
            self.config.parallel, self.config.server_addr, self.config.port
        );

        let handles: Vec<_> = (0..self.config.parallel)
            .map(|index| {
                let config = self.config.clone();
                let reporter = reporter.clone();
                tokio::spawn(async move { run_stream(index, &config, &reporter).await })
            })
            .collect();

        let mut summaries = Vec::with_capacity(handles.len());
        let mut fatal = None;

        for (index, handle) in handles.into_iter().enumerate() {
            match handle.await {
                Ok(Ok(sample)) => summaries.push(sample),
                Ok(Err(e @ (Error::ConnectionRefused(_) | Error::Connection(_)))) => {
                    debug!("Connection {} could not start: {}", index, e);
                    if fatal.is_none() {
                        fatal = Some(e);
                    }
                }
                Ok(Err(e)) => {
                    error!("Connection {} failed: {}", index, e);
                }
                Err(e) => {
                    error!("Connection {} task panicked: {}", index, e);
                }
            }
        }

        if let Some(task) = printer {
            reporter.complete();
            if let Err(e) = task.await {
                error!("Reporter task failed: {}", e);
            }
        }

        match fatal {
            Some(e) => Err(e),
            None => Ok(summaries),
        }
    }
}

async fn run_stream(index: usize, config: &Config, reporter: &IntervalReporter) -> Result<RateSample> {
    let addr = format!("{}:{}", config.server_addr, config.port);

    let mut stream = match TcpStream::connect(&addr).await {
        Ok(stream) => stream,
        Err(e) if e.kind() == ErrorKind::ConnectionRefused => return Err(Error::ConnectionRefused(addr)),
        Err(e) => return Err(Error::Connection(format!("{}: {}", addr, e))),
    };

    let local_addr = stream.local_addr()?;
    let id = local_addr.to_string();
    info!("Connection {} established from {} to {}", index, id, addr);

    reporter.banner("---------------------------------------------");
    reporter.banner(format!(
        "A simpleperf client connecting to server {}, port {}",
        config.server_addr, config.port
    ));
    reporter.banner("---------------------------------------------");
    reporter.banner("ID\tInterval\tTransferred\tRate");

    let summary = match transfer(&mut stream, &id, config, reporter).await {
        Ok(summary) => summary,
        Err(e @ Error::Handshake(_)) => {
            reporter.diagnostic(format!("Error: {}", e));
            return Err(e);
        }
        Err(e) => {
            reporter.diagnostic(format!("Error: transfer from {} abandoned: {}", id, e));
            return Err(e);
        }
    };

    if config.intervals > 1 {
        reporter.banner("---------------------------------------------");
    }

    let sample = RateSample::new(id, TransferWindow::whole(summary.elapsed, summary.bytes), config.unit);
    reporter.summary(sample.clone());
    Ok(sample)
}

/// Runs the client side of one connection: sends data until the configured
/// stop condition, then performs the termination handshake.
///
/// # Errors
///
/// Returns [`Error::Io`] if a write fails and [`Error::Handshake`] if the
/// server does not acknowledge the sentinel.
pub async fn transfer<S>(
    stream: &mut S,
    id: &str,
    config: &Config,
    reporter: &IntervalReporter,
) -> Result<TransferSummary>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let summary = send_data(stream, id, config, reporter).await?;
    send_sentinel(stream).await?;
    await_acknowledgement(stream).await?;
    Ok(summary)
}

/// Writes constant chunks to `stream` until the stop condition is met.
///
/// In duration mode the run is split into `config.intervals` windows and,
/// when there is more than one, a sample is reported as each window closes.
/// In size mode the loop stops once at least the target has been written;
/// the last chunk is written whole.
///
/// # Errors
///
/// Returns [`Error::Io`] on the first failed write. Writes are not retried.
pub async fn send_data<S>(
    stream: &mut S,
    id: &str,
    config: &Config,
    reporter: &IntervalReporter,
) -> Result<TransferSummary>
where
    S: AsyncWrite + Unpin,
{
    let buffer = vec![0u8; config.buffer_size];
    let chunk = buffer.len() as u64;
    let mut total_bytes = 0u64;

    let start = Instant::now();

    match config.limit {
        TransferLimit::Size(size) => {
            let target = size.bytes();
            debug!("{}: sending {} bytes", id, target);

            while total_bytes < target {
                stream.write_all(&buffer).await?;
                total_bytes += chunk;
            }
        }
        TransferLimit::Duration(duration) => {
            if duration.is_zero() {
                debug!("{}: zero duration, nothing to send", id);
                return Ok(TransferSummary {
                    bytes: 0,
                    elapsed: Duration::ZERO,
                });
            }
            debug!("{}: sending for {:?} in {} window(s)", id, duration, config.intervals);

            for (window_start, window_end) in window_schedule(duration, config.intervals) {
                let mut window_bytes = 0u64;

                while start.elapsed() < window_end {
                    stream.write_all(&buffer).await?;
                    total_bytes += chunk;
                    window_bytes += chunk;
                }

                if config.intervals > 1 {
                    reporter.interval(RateSample::new(
                        id.to_string(),
                        TransferWindow::new(window_start, window_end, window_bytes),
                        config.unit,
                    ));
                }
            }
        }
    }

    stream.flush().await?;
    let elapsed = start.elapsed();
    debug!("{}: sent {} bytes in {:?}", id, total_bytes, elapsed);

    Ok(TransferSummary {
        bytes: total_bytes,
        elapsed,
    })
}
