//! Server configuration
//!
//! Every option can be given as a flag or through a `KELLY_*`
//! environment variable.

use std::time::Duration;

use clap::Parser;

/// Line-oriented TCP chat server
#[derive(Parser, Clone, Debug)]
#[command(name = "kelly_chat", version, about = "Line-oriented TCP chat server")]
pub struct Config {
    /// Bind address
    #[arg(long, env = "KELLY_BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: String,

    /// Port to listen on
    #[arg(long, env = "KELLY_PORT", default_value = "6969")]
    pub port: u16,

    /// Longest accepted request line in bytes, newline excluded
    #[arg(long, env = "KELLY_MAX_LINE_LENGTH", default_value = "4096")]
    pub max_line_length: usize,

    /// Close connections that send no complete line for this many seconds (0 disables)
    #[arg(long, env = "KELLY_IDLE_TIMEOUT_SECS", default_value = "0")]
    pub idle_timeout_secs: u64,

    /// Seconds a closing connection may spend flushing pending replies
    #[arg(long, env = "KELLY_WRITE_DRAIN_SECS", default_value = "5")]
    pub write_drain_secs: u64,

    /// Per-connection outbound queue capacity
    #[arg(long, env = "KELLY_OUTBOUND_BUFFER", default_value = "64")]
    pub outbound_buffer: usize,

    /// Capacity of each hub inbound queue
    #[arg(long, env = "KELLY_HUB_BUFFER", default_value = "256")]
    pub hub_buffer: usize,
}

impl Config {
    /// Address string passed to the listener
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    /// Settings handed to each connection actor
    pub fn connection(&self) -> ConnectionConfig {
        ConnectionConfig {
            max_line_length: self.max_line_length,
            idle_timeout: (self.idle_timeout_secs > 0)
                .then(|| Duration::from_secs(self.idle_timeout_secs)),
            outbound_buffer: self.outbound_buffer.max(1),
            write_drain_timeout: Duration::from_secs(self.write_drain_secs),
        }
    }
}

/// Per-connection limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub max_line_length: usize,
    pub idle_timeout: Option<Duration>,
    pub outbound_buffer: usize,
    pub write_drain_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_line_length: 4096,
            idle_timeout: None,
            outbound_buffer: 64,
            write_drain_timeout: Duration::from_secs(5),
        }
    }
}
