//! Command line argument parsing for RelayGate.
//!
//! This module defines the CLI interface using [`clap`] for argument parsing.
//! Proxy behaviour is configured through environment variables; the CLI only
//! covers the listener and output verbosity.
//!
//! # Example
//!
//! ```no_run
//! use relaygate::args::Args;
//! use clap::Parser;
//!
//! let args = Args::parse();
//! if let Err(e) = args.validate() {
//!     eprintln!("Configuration error: {}", e);
//!     std::process::exit(1);
//! }
//! ```

use clap::Parser;

/// Command line arguments for RelayGate.
///
/// # Fields
///
/// * `bind` - Address to listen on (default: "0.0.0.0")
/// * `listen` - Port to listen on for incoming requests
/// * `verbose` - Enable detailed configuration output
/// * `quiet` - Suppress non-essential output (conflicts with verbose)
/// * `json_logs` - Output logs in JSON format for structured logging
#[derive(Parser, Debug)]
#[command(name = env!("CARGO_PKG_NAME"))]
#[command(about = env!("CARGO_PKG_DESCRIPTION"))]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(author = env!("CARGO_PKG_AUTHORS"))]
#[command(
    long_about = "An edge forward proxy: callers request /{secret}/{target-url} and RelayGate fetches the target on their behalf\n\nExample usage:\n  relaygate --listen 8080\n  relaygate -b 127.0.0.1 -l 8080 --verbose"
)]
#[command(
    after_help = "Environment variables:\n  PROXY_SECRETS          Comma-separated accepted secrets (plain, sha1 or bcrypt)\n  CREDENTIAL_MODE        path, query or header (default: path)\n  TRUSTED_IP_HEADER      Platform header carrying the client address\n  TRUSTED_PROXY_IPS      Peers allowed to set that header, or * for any (unset: header ignored)\n  RATE_LIMIT_REQUESTS    Max requests per client window (default: 60)\n  ALLOWLIST_HOSTNAME     Only the address this name resolves to may call\n  ENABLE_DIAGNOSTICS     Serve /_debug_ip and /_stats\n\nRun with --verbose to print every recognised variable."
)]
pub struct Args {
    /// Address to bind the listener to
    #[arg(
        long,
        short = 'b',
        help = "Bind address for the listener",
        value_name = "ADDRESS",
        default_value = "0.0.0.0"
    )]
    pub bind: String,

    /// Port to listen on for incoming requests
    #[arg(
        long,
        short = 'l',
        help = "Listen port for incoming connections",
        value_name = "PORT"
    )]
    pub listen: u16,

    /// Enable verbose output
    #[arg(
        long,
        short = 'v',
        help = "Show detailed configuration and startup information"
    )]
    pub verbose: bool,

    /// Enable quiet mode (minimal output)
    #[arg(
        long,
        short = 'q',
        help = "Suppress configuration output, show only essential messages",
        conflicts_with = "verbose"
    )]
    pub quiet: bool,

    /// Output logs in JSON format (for structured logging)
    #[arg(long, help = "Output logs in JSON format for structured logging")]
    pub json_logs: bool,
}

impl Args {
    /// Validates the parsed command line arguments.
    ///
    /// - The listen port must be greater than 0
    /// - The bind address must be a valid IP address
    ///
    /// # Example
    ///
    /// ```
    /// use relaygate::args::Args;
    /// use clap::Parser;
    ///
    /// let args = Args::try_parse_from(["relaygate", "-l", "0"]).unwrap();
    /// assert!(args.validate().is_err());
    ///
    /// let args = Args::try_parse_from(["relaygate", "-l", "8080"]).unwrap();
    /// assert!(args.validate().is_ok());
    /// ```
    pub fn validate(&self) -> Result<(), String> {
        if self.listen == 0 {
            return Err("Listen port must be greater than 0".to_string());
        }

        if self.bind.parse::<std::net::IpAddr>().is_err() {
            return Err(format!("Invalid bind address: '{}'", self.bind));
        }

        Ok(())
    }

    /// Socket address string for the listener.
    pub fn listen_addr(&self) -> String {
        match self.bind.parse::<std::net::IpAddr>() {
            Ok(std::net::IpAddr::V6(ip)) => format!("[{}]:{}", ip, self.listen),
            _ => format!("{}:{}", self.bind, self.listen),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["relaygate", "-l", "8080"]).unwrap();
        assert_eq!(args.bind, "0.0.0.0");
        assert_eq!(args.listen, 8080);
        assert!(!args.verbose && !args.quiet && !args.json_logs);
        assert_eq!(args.listen_addr(), "0.0.0.0:8080");
    }

    #[test]
    fn test_invalid_bind_address() {
        let args = Args::try_parse_from(["relaygate", "-b", "localhost", "-l", "8080"]).unwrap();
        assert!(args.validate().unwrap_err().contains("localhost"));
    }

    #[test]
    fn test_ipv6_listen_addr() {
        let args = Args::try_parse_from(["relaygate", "-b", "::1", "-l", "8080"]).unwrap();
        assert!(args.validate().is_ok());
        assert_eq!(args.listen_addr(), "[::1]:8080");
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        assert!(Args::try_parse_from(["relaygate", "-l", "8080", "-v", "-q"]).is_err());
    }

    #[test]
    fn test_listen_required() {
        assert!(Args::try_parse_from(["relaygate"]).is_err());
    }
}
