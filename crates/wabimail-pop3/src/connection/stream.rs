//! Plaintext or TLS transport.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tracing::debug;

use super::Security;
use crate::error::{Error, Result};

/// POP3 transport (TCP or TLS).
#[derive(Debug)]
pub enum Pop3Stream {
    /// Plain TCP connection.
    Plain(TcpStream),
    /// TLS-encrypted connection.
    Tls(Box<TlsStream<TcpStream>>),
}

impl Pop3Stream {
    /// Opens a TCP connection and, for [`Security::Implicit`], performs the
    /// TLS handshake.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or handshake fails or does not
    /// finish within `timeout`.
    pub async fn connect(host: &str, port: u16, security: Security, timeout: Duration) -> Result<Self> {
        let connecting = async {
            debug!(host, port, ?security, "connecting");
            let tcp = TcpStream::connect((host, port)).await?;
            match security {
                Security::Implicit => Self::Plain(tcp).upgrade_to_tls(host).await,
                Security::StartTls | Security::None => Ok(Self::Plain(tcp)),
            }
        };
        tokio::time::timeout(timeout, connecting)
            .await
            .map_err(|_| Error::Timeout(timeout))?
    }

    /// Upgrades a TCP stream to TLS.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream is already TLS or the handshake fails.
    pub async fn upgrade_to_tls(self, host: &str) -> Result<Self> {
        let Self::Plain(tcp) = self else {
            return Err(Error::Protocol("already using TLS".into()));
        };
        let server_name = ServerName::try_from(host.to_string())?;
        let tls = tls_connector().connect(server_name, tcp).await?;
        debug!(host, "TLS established");
        Ok(Self::Tls(Box::new(tls)))
    }

    /// Returns true once TLS is active.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }
}

/// TLS connector trusting the Mozilla root set.
fn tls_connector() -> TlsConnector {
    let roots = rustls::RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };
    let config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    TlsConnector::from(Arc::new(config))
}

impl AsyncRead for Pop3Stream {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).poll_read(cx, buf),
            Self::Tls(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Pop3Stream {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).poll_write(cx, buf),
            Self::Tls(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).poll_flush(cx),
            Self::Tls(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).poll_shutdown(cx),
            Self::Tls(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_refused_is_io_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = Pop3Stream::connect("127.0.0.1", port, Security::None, Duration::from_secs(5)).await;
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
