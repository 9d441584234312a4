//! Submission server settings.

use std::time::Duration;

/// Transport security.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Security {
    /// Plaintext (port 25).
    None,
    /// Plaintext greeting, then STARTTLS (port 587).
    #[default]
    StartTls,
    /// TLS from the first byte (port 465).
    Implicit,
}

impl Security {
    /// Conventional port for this mode.
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::None => 25,
            Self::StartTls => 587,
            Self::Implicit => 465,
        }
    }
}

/// Where and how to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Server hostname.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Security mode.
    pub security: Security,
    /// Name sent with EHLO.
    pub client_name: String,
    /// Limit for TCP connect, TLS handshake and greeting.
    pub connect_timeout: Duration,
    /// Limit for each command round trip.
    pub io_timeout: Duration,
}

impl Config {
    /// STARTTLS on port 587 with 30 second timeouts.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: Security::StartTls.default_port(),
            security: Security::StartTls,
            client_name: "localhost".to_string(),
            connect_timeout: Duration::from_secs(30),
            io_timeout: Duration::from_secs(30),
        }
    }

    /// Sets the port.
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the security mode.
    #[must_use]
    pub const fn with_security(mut self, security: Security) -> Self {
        self.security = security;
        self
    }

    /// Sets the EHLO name.
    #[must_use]
    pub fn with_client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = name.into();
        self
    }

    /// Sets both timeouts.
    #[must_use]
    pub const fn with_timeouts(mut self, connect: Duration, io: Duration) -> Self {
        self.connect_timeout = connect;
        self.io_timeout = io;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::new("smtp.gmail.com");
        assert_eq!(config.port, 587);
        assert_eq!(config.security, Security::StartTls);
        assert_eq!(config.client_name, "localhost");
        assert_eq!(Security::Implicit.default_port(), 465);
        assert_eq!(Security::None.default_port(), 25);
    }

    #[test]
    fn test_builder() {
        let config = Config::new("mail.example.com")
            .with_port(2525)
            .with_security(Security::None)
            .with_client_name("laptop.example.com")
            .with_timeouts(Duration::from_secs(3), Duration::from_secs(4));
        assert_eq!(config.port, 2525);
        assert_eq!(config.security, Security::None);
        assert_eq!(config.client_name, "laptop.example.com");
        assert_eq!(config.io_timeout, Duration::from_secs(4));
    }
}
