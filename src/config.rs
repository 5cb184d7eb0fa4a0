use crate::protocol::BUFFER_SIZE;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;
use std::time::Duration;

/// Default port shared by client and server.
pub const DEFAULT_PORT: u16 = 12000;

/// Default listen backlog for the server socket.
pub const DEFAULT_BACKLOG: u32 = 10;

/// Display unit for amounts and rates.
///
/// Units are decimal: one kilobyte is 1000 bytes.
///
/// # Examples
///
/// ```
/// use simpleperf::Unit;
///
/// let unit: Unit = "KB".parse().unwrap();
/// assert_eq!(unit.factor(), 1000);
/// assert_eq!(unit.to_string(), "KB");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Unit {
    /// Bytes
    B,
    /// Kilobytes (1000 bytes)
    KB,
    /// Megabytes (1 000 000 bytes)
    MB,
}

impl Unit {
    /// Number of bytes in one of this unit.
    pub fn factor(self) -> u64 {
        match self {
            Unit::B => 1,
            Unit::KB => 1_000,
            Unit::MB => 1_000_000,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Unit::B => "B",
            Unit::KB => "KB",
            Unit::MB => "MB",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Unit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "B" => Ok(Unit::B),
            "KB" => Ok(Unit::KB),
            "MB" => Ok(Unit::MB),
            other => Err(Error::InvalidUnit(other.to_string())),
        }
    }
}

/// A byte quantity with its unit, as given on the command line.
///
/// Parsed from strings such as `10MB`, `10M`, `500k` or `42B`: one or more
/// ASCII digits followed by a case-insensitive suffix. `K` and `M` are
/// accepted as shorthands for `KB` and `MB`.
///
/// # Examples
///
/// ```
/// use simpleperf::{ByteSize, Unit};
///
/// let size: ByteSize = "10MB".parse().unwrap();
/// assert_eq!(size.quantity, 10);
/// assert_eq!(size.unit, Unit::MB);
/// assert_eq!(size.bytes(), 10_000_000);
///
/// assert!("MB".parse::<ByteSize>().is_err());
/// assert!("10XB".parse::<ByteSize>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteSize {
    pub quantity: u64,
    pub unit: Unit,
}

impl ByteSize {
    pub fn new(quantity: u64, unit: Unit) -> Self {
        Self { quantity, unit }
    }

    /// Total number of bytes this size stands for.
    pub fn bytes(&self) -> u64 {
        self.quantity.saturating_mul(self.unit.factor())
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.quantity, self.unit)
    }
}

impl FromStr for ByteSize {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let split = s
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| Error::InvalidSize(s.to_string()))?;
        let (digits, suffix) = s.split_at(split);

        if digits.is_empty() {
            return Err(Error::InvalidSize(s.to_string()));
        }

        let unit = match suffix.to_ascii_uppercase().as_str() {
            "B" => Unit::B,
            "K" | "KB" => Unit::KB,
            "M" | "MB" => Unit::MB,
            _ => return Err(Error::InvalidSize(s.to_string())),
        };

        let quantity: u64 = digits
            .parse()
            .map_err(|_| Error::InvalidSize(s.to_string()))?;

        if quantity.checked_mul(unit.factor()).is_none() {
            return Err(Error::InvalidSize(s.to_string()));
        }

        Ok(Self { quantity, unit })
    }
}

/// Stop condition for a client transfer.
///
/// A client runs either for a fixed time or until a fixed number of bytes
/// has been written, never both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferLimit {
    /// Send for this long, split into reporting windows
    Duration(Duration),
    /// Send until at least this many bytes have been written
    Size(ByteSize),
}

/// Test mode: client or server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    /// Server mode - accepts connections and measures inbound rate
    Server,
    /// Client mode - connects to a server and pushes data
    Client,
}

/// Configuration for a simpleperf client or server.
///
/// Created once at startup and only read afterwards. Each worker task gets
/// its own clone.
///
/// # Examples
///
/// ```
/// use simpleperf::{ByteSize, Config, TransferLimit, Unit};
/// use std::time::Duration;
///
/// let config = Config::client("127.0.0.1".to_string(), 12000)
///     .with_duration(Duration::from_secs(10))
///     .with_intervals(5)
///     .with_unit(Unit::KB)
///     .with_parallel(2);
/// assert!(config.validate().is_ok());
///
/// let config = Config::client("127.0.0.1".to_string(), 12000)
///     .with_size(ByteSize::new(10, Unit::MB));
/// assert!(matches!(config.limit, TransferLimit::Size(_)));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server mode or client mode
    pub mode: Mode,

    /// Address the server binds to
    pub bind_addr: IpAddr,

    /// Address the client connects to
    pub server_addr: String,

    /// Port number to use
    pub port: u16,

    /// Client stop condition
    pub limit: TransferLimit,

    /// Number of reporting windows the duration is split into
    pub intervals: u32,

    /// Unit used in report lines
    pub unit: Unit,

    /// Number of parallel client connections
    pub parallel: usize,

    /// Size of each payload write and each read
    pub buffer_size: usize,

    /// Listen backlog for the server socket
    pub backlog: u32,

    /// Emit report lines as JSON
    pub json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: Mode::Client,
            bind_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            server_addr: Ipv4Addr::LOCALHOST.to_string(),
            port: DEFAULT_PORT,
            limit: TransferLimit::Duration(Duration::from_secs(25)),
            intervals: 1,
            unit: Unit::MB,
            parallel: 1,
            buffer_size: BUFFER_SIZE,
            backlog: DEFAULT_BACKLOG,
            json: false,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a server configuration listening on `port`.
    pub fn server(port: u16) -> Self {
        Self {
            mode: Mode::Server,
            port,
            ..Default::default()
        }
    }

    /// Creates a client configuration connecting to `server_addr:port`.
    pub fn client(server_addr: String, port: u16) -> Self {
        Self {
            mode: Mode::Client,
            server_addr,
            port,
            ..Default::default()
        }
    }

    pub fn with_bind_addr(mut self, bind_addr: IpAddr) -> Self {
        self.bind_addr = bind_addr;
        self
    }

    /// Switches the client to duration mode.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.limit = TransferLimit::Duration(duration);
        self
    }

    /// Switches the client to size mode.
    pub fn with_size(mut self, size: ByteSize) -> Self {
        self.limit = TransferLimit::Size(size);
        self
    }

    pub fn with_intervals(mut self, intervals: u32) -> Self {
        self.intervals = intervals;
        self
    }

    pub fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = unit;
        self
    }

    pub fn with_parallel(mut self, parallel: usize) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    pub fn with_backlog(mut self, backlog: u32) -> Self {
        self.backlog = backlog;
        self
    }

    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    /// Checks the invariants the transfer code relies on.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the interval count, parallelism, buffer
    /// size or backlog is zero.
    pub fn validate(&self) -> Result<()> {
        if self.intervals == 0 {
            return Err(Error::Config("Interval has a wrong value: must be at least 1".to_string()));
        }
        if self.parallel == 0 {
            return Err(Error::Config("Parallel connections must be at least 1".to_string()));
        }
        if self.buffer_size == 0 {
            return Err(Error::Config("Buffer size must be at least 1 byte".to_string()));
        }
        if self.backlog == 0 {
            return Err(Error::Config("Listen backlog must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_factor() {
        assert_eq!(Unit::B.factor(), 1);
        assert_eq!(Unit::KB.factor(), 1000);
        assert_eq!(Unit::MB.factor(), 1_000_000);
    }

    #[test]
    fn test_unit_parse() {
        assert_eq!("B".parse::<Unit>().unwrap(), Unit::B);
        assert_eq!("MB".parse::<Unit>().unwrap(), Unit::MB);
        assert!(matches!("GB".parse::<Unit>(), Err(Error::InvalidUnit(_))));
        assert!(matches!("kb".parse::<Unit>(), Err(Error::InvalidUnit(_))));
    }

    #[test]
    fn test_byte_size_suffixes() {
        assert_eq!("10MB".parse::<ByteSize>().unwrap().bytes(), 10_000_000);
        assert_eq!("10m".parse::<ByteSize>().unwrap().bytes(), 10_000_000);
        assert_eq!("500K".parse::<ByteSize>().unwrap().bytes(), 500_000);
        assert_eq!("500kb".parse::<ByteSize>().unwrap().bytes(), 500_000);
        assert_eq!("42B".parse::<ByteSize>().unwrap().bytes(), 42);
    }

    #[test]
    fn test_byte_size_rejects_malformed() {
        for input in ["", "10", "MB", "10XB", "1.5MB", "10 MB", "M10", "-5MB"] {
            assert!(
                matches!(input.parse::<ByteSize>(), Err(Error::InvalidSize(_))),
                "expected {input:?} to be rejected"
            );
        }
    }

    #[test]
    fn test_byte_size_overflow_rejected() {
        let input = format!("{}MB", u64::MAX);
        assert!(matches!(input.parse::<ByteSize>(), Err(Error::InvalidSize(_))));
    }

    #[test]
    fn test_byte_size_display() {
        assert_eq!(ByteSize::new(10, Unit::MB).to_string(), "10MB");
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.port, 12000);
        assert_eq!(config.unit, Unit::MB);
        assert_eq!(config.intervals, 1);
        assert_eq!(config.parallel, 1);
        assert_eq!(config.buffer_size, 1000);
        assert_eq!(config.backlog, 10);
        assert_eq!(config.limit, TransferLimit::Duration(Duration::from_secs(25)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_server_config() {
        let config = Config::server(5000);
        assert_eq!(config.mode, Mode::Server);
        assert_eq!(config.port, 5000);
    }

    #[test]
    fn test_size_replaces_duration() {
        let config = Config::client("127.0.0.1".to_string(), 12000)
            .with_duration(Duration::from_secs(3))
            .with_size(ByteSize::new(1, Unit::KB));
        assert_eq!(config.limit, TransferLimit::Size(ByteSize::new(1, Unit::KB)));
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let base = Config::client("127.0.0.1".to_string(), 12000);
        assert!(matches!(base.clone().with_intervals(0).validate(), Err(Error::Config(_))));
        assert!(matches!(base.clone().with_parallel(0).validate(), Err(Error::Config(_))));
        assert!(matches!(base.clone().with_buffer_size(0).validate(), Err(Error::Config(_))));
        assert!(matches!(base.with_backlog(0).validate(), Err(Error::Config(_))));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn suffix_strategy() -> impl Strategy<Value = (&'static str, Unit)> {
            prop_oneof![
                Just(("B", Unit::B)),
                Just(("b", Unit::B)),
                Just(("K", Unit::KB)),
                Just(("kb", Unit::KB)),
                Just(("M", Unit::MB)),
                Just(("Mb", Unit::MB)),
            ]
        }

        proptest! {
            #[test]
            fn prop_byte_size_parses_digits_and_suffix(
                quantity in 0u64..1_000_000,
                (suffix, unit) in suffix_strategy(),
            ) {
                let parsed: ByteSize = format!("{quantity}{suffix}").parse().unwrap();
                prop_assert_eq!(parsed.quantity, quantity);
                prop_assert_eq!(parsed.unit, unit);
                prop_assert_eq!(parsed.bytes(), quantity * unit.factor());
            }
        }
    }
}
