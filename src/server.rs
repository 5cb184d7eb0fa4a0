use crate::config::{Config, Mode};
use crate::interval_reporter::{run_reporter_task, IntervalReporter};
use crate::measurements::{RateSample, TransferWindow};
use crate::protocol::{acknowledge, SentinelScanner};
use crate::{Error, Result};
use log::{debug, error, info};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::net::{TcpListener, TcpSocket, TcpStream};

/// Bytes received and time taken on one server connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiveSummary {
    /// Payload bytes, excluding the sentinel and anything after it
    pub bytes: u64,
    /// Time from the first read to the sentinel or to the peer closing
    pub elapsed: Duration,
    /// Whether the peer ended the stream with the sentinel
    pub sentinel_seen: bool,
}

/// Throughput test server.
///
/// Listens for connections and measures the inbound byte rate of each one
/// in its own task, so a stalled client never blocks the accept loop or
/// other transfers. Each connection gets one summary line.
///
/// # Examples
///
/// ```no_run
/// use simpleperf::{Config, Server};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Config::server(12000);
/// let server = Server::new(config);
///
/// server.run().await?;
/// # Ok(())
/// # }
/// ```
pub struct Server {
    config: Config,
    reporter: Option<IntervalReporter>,
}

impl Server {
    /// Creates a new server with the given configuration.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            reporter: None,
        }
    }

    /// Sends report output to `reporter` instead of printing it.
    pub fn with_reporter(mut self, reporter: IntervalReporter) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Binds the listening socket with the configured backlog.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, is not a server
    /// configuration, or the address cannot be bound.
    pub async fn bind(&self) -> Result<TcpListener> {
        if self.config.mode != Mode::Server {
            return Err(Error::Config("Server requires a server mode configuration".to_string()));
        }
        self.config.validate()?;

        let addr = SocketAddr::new(self.config.bind_addr, self.config.port);
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;
        let listener = socket.listen(self.config.backlog)?;

        info!("TCP server listening on {}", listener.local_addr()?);
        Ok(listener)
    }

    /// Binds and serves until the process is terminated.
    ///
    /// # Errors
    ///
    /// Returns an error only if binding fails.
    pub async fn run(&self) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Accepts connections on `listener` forever, one task per connection.
    ///
    /// Accept failures are logged and the loop carries on.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let reporter = match &self.reporter {
            Some(reporter) => reporter.clone(),
            None => {
                let (reporter, receiver) = IntervalReporter::new();
                tokio::spawn(run_reporter_task(receiver, self.config.json));
                reporter
            }
        };

        let port = listener.local_addr()?.port();
        reporter.banner("---------------------------------------------");
        reporter.banner(format!("A simpleperf server is listening on port {}", port));
        reporter.banner("---------------------------------------------");

        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    info!("New connection from {}", addr);
                    let config = self.config.clone();
                    let reporter = reporter.clone();

                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, addr, &config, &reporter).await {
                            error!("Error handling client {}: {}", addr, e);
                            reporter.diagnostic(format!("Error: transfer from {} abandoned: {}", addr, e));
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                }
            }
        }
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    addr: SocketAddr,
    config: &Config,
    reporter: &IntervalReporter,
) -> Result<()> {
    reporter.banner("---------------------------------------------");
    reporter.banner(format!(
        "A simpleperf client with {} is connected with {}:{}",
        addr, config.bind_addr, config.port
    ));
    reporter.banner("---------------------------------------------");

    let summary = receive_data(&mut stream, config.buffer_size).await?;

    if !summary.sentinel_seen {
        info!("Client {} closed the connection without the sentinel", addr);
    }

    reporter.banner("ID\tInterval\tReceived\tRate");
    reporter.summary(RateSample::new(
        addr.to_string(),
        TransferWindow::whole(summary.elapsed, summary.bytes),
        config.unit,
    ));

    Ok(())
}

/// Reads from `stream` until the sentinel arrives or the peer closes.
///
/// Time is measured from the first read. On the sentinel the
/// acknowledgement is sent and the write side is shut down. A peer that
/// closes without the sentinel is not an error; whatever arrived is
/// reported.
///
/// # Errors
///
/// Returns [`crate::Error::Io`] on a transport failure such as a reset.
pub async fn receive_data<S>(stream: &mut S, buffer_size: usize) -> Result<ReceiveSummary>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buffer = vec![0u8; buffer_size.max(1)];
    let mut scanner = SentinelScanner::new();
    let mut start: Option<Instant> = None;
    let mut total_bytes = 0u64;
    let mut sentinel_seen = false;

    loop {
        let n = stream.read(&mut buffer).await?;
        if n == 0 {
            debug!("Peer closed after {} bytes", total_bytes);
            break;
        }
        if start.is_none() {
            start = Some(Instant::now());
        }

        if let Some(offset) = scanner.feed(&buffer[..n]) {
            total_bytes = offset;
            sentinel_seen = true;
            break;
        }
        total_bytes = scanner.consumed();
    }

    let elapsed = start.map(|s| s.elapsed()).unwrap_or(Duration::ZERO);

    if sentinel_seen {
        acknowledge(stream).await?;
    }

    Ok(ReceiveSummary {
        bytes: total_bytes,
        elapsed,
        sentinel_seen,
    })
}
