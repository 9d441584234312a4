//! Loopback HTTP listener that receives the authorization redirect.

use crate::error::{Error, Result};
use std::ops::RangeInclusive;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

/// Ports tried, in order, when no explicit range is configured.
pub const DEFAULT_PORT_RANGE: RangeInclusive<u16> = 8080..=8090;

const MAX_REQUEST_LINE: u64 = 8 * 1024;

/// How long one connection may take to send its request line.
const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(10);

const SUCCESS_PAGE: &str = "<html><head><title>WabiMail</title></head>\
<body style=\"font-family: sans-serif; text-align: center; padding: 50px;\">\
<h1>Authorization complete</h1><p>You can close this window and return to WabiMail.</p>\
</body></html>";

const FAILURE_PAGE: &str = "<html><head><title>WabiMail</title></head>\
<body style=\"font-family: sans-serif; text-align: center; padding: 50px;\">\
<h1>Authorization failed</h1><p>Close this window and try again from WabiMail.</p>\
</body></html>";

/// A single-use listener for one authorization attempt.
///
/// The socket is owned by the listener and released when
/// [`CallbackListener::wait_for_code`] returns, whatever the outcome.
#[derive(Debug)]
pub struct CallbackListener {
    listener: TcpListener,
    port: u16,
}

/// What a single callback request carried.
enum Callback {
    Code { code: String, state: Option<String> },
    Denied { error: String, description: String },
    Unrelated,
}

impl CallbackListener {
    /// Binds `127.0.0.1` on the first free port of `ports`.
    ///
    /// A range of `0..=0` lets the OS pick a port.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoFreePort`] if every port is taken.
    pub async fn bind(ports: RangeInclusive<u16>) -> Result<Self> {
        let (start, end) = (*ports.start(), *ports.end());
        for port in ports {
            match TcpListener::bind(("127.0.0.1", port)).await {
                Ok(listener) => {
                    let port = listener.local_addr()?.port();
                    debug!(port, "OAuth2 callback listener bound");
                    return Ok(Self { listener, port });
                }
                Err(e) => debug!(port, error = %e, "callback port unavailable"),
            }
        }
        Err(Error::NoFreePort { start, end })
    }

    /// Returns the bound port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Returns the redirect URI to register with the authorization request.
    #[must_use]
    pub fn redirect_uri(&self) -> String {
        format!("http://localhost:{}/", self.port)
    }

    /// Waits for the provider to redirect the browser back with a code.
    ///
    /// Requests carrying neither `code` nor `error` (favicon probes and the
    /// like) are answered with 404 and ignored.
    ///
    /// # Errors
    ///
    /// - [`Error::Timeout`] if nothing arrives within `timeout`
    /// - [`Error::Cancelled`] if `cancel` fires first
    /// - [`Error::AccessDenied`] / [`Error::OAuth`] if the provider reports an error
    /// - [`Error::StateMismatch`] if the echoed state is not `expected_state`
    pub async fn wait_for_code(
        self,
        expected_state: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let port = self.port;
        let outcome = tokio::select! {
            () = cancel.cancelled() => Err(Error::Cancelled),
            result = tokio::time::timeout(timeout, self.accept_loop(expected_state)) => {
                result.unwrap_or(Err(Error::Timeout(timeout.as_secs())))
            }
        };
        debug!(port, ok = outcome.is_ok(), "OAuth2 callback listener closed");
        outcome
    }

    /// Connections are read concurrently so that a browser's idle
    /// preconnect socket cannot hold up the real redirect.
    async fn accept_loop(&self, expected_state: &str) -> Result<String> {
        let mut pending = JoinSet::new();
        loop {
            let (mut stream, peer, read) = tokio::select! {
                accepted = self.listener.accept() => {
                    let (mut stream, peer) = accepted?;
                    pending.spawn(async move {
                        let read = tokio::time::timeout(REQUEST_READ_TIMEOUT, read_callback(&mut stream))
                            .await
                            .unwrap_or(Err(Error::Timeout(REQUEST_READ_TIMEOUT.as_secs())));
                        (stream, peer, read)
                    });
                    continue;
                }
                Some(joined) = pending.join_next() => match joined {
                    Ok(read) => read,
                    Err(e) => {
                        debug!(error = %e, "callback reader stopped");
                        continue;
                    }
                },
            };

            let callback = match read {
                Ok(callback) => callback,
                Err(e) => {
                    debug!(%peer, error = %e, "unreadable callback request");
                    continue;
                }
            };

            match callback {
                Callback::Unrelated => {
                    respond(&mut stream, "404 Not Found", "").await;
                }
                Callback::Denied { error, description } => {
                    warn!(%error, "authorization server reported an error");
                    respond(&mut stream, "400 Bad Request", FAILURE_PAGE).await;
                    return Err(if error == "access_denied" {
                        Error::AccessDenied
                    } else {
                        Error::oauth_error(error, description)
                    });
                }
                Callback::Code { code, state } => {
                    if state.as_deref() != Some(expected_state) {
                        warn!("callback state did not match the authorization request");
                        respond(&mut stream, "400 Bad Request", FAILURE_PAGE).await;
                        return Err(Error::StateMismatch);
                    }
                    respond(&mut stream, "200 OK", SUCCESS_PAGE).await;
                    return Ok(code);
                }
            }
        }
    }
}

async fn read_callback(stream: &mut TcpStream) -> Result<Callback> {
    let mut request_line = String::new();
    let mut reader = BufReader::new(stream).take(MAX_REQUEST_LINE);
    reader.read_line(&mut request_line).await?;
    Ok(parse_request_line(&request_line))
}

fn parse_request_line(line: &str) -> Callback {
    let mut parts = line.split_whitespace();
    let (Some("GET"), Some(target)) = (parts.next(), parts.next()) else {
        return Callback::Unrelated;
    };
    let Ok(url) = Url::parse(&format!("http://localhost{target}")) else {
        return Callback::Unrelated;
    };

    let mut code = None;
    let mut state = None;
    let mut error = None;
    let mut description = String::new();
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            "error_description" => description = value.into_owned(),
            _ => {}
        }
    }

    match (code, error) {
        (_, Some(error)) => Callback::Denied { error, description },
        (Some(code), None) => Callback::Code { code, state },
        (None, None) => Callback::Unrelated,
    }
}

async fn respond(stream: &mut TcpStream, status: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    if let Err(e) = stream.write_all(response.as_bytes()).await {
        debug!(error = %e, "failed to answer callback request");
    }
    let _ = stream.shutdown().await;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    async fn send(port: u16, request_line: &str) -> String {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        stream
            .write_all(format!("{request_line}\r\nHost: localhost\r\n\r\n").as_bytes())
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[test]
    fn test_parse_request_line() {
        assert!(matches!(
            parse_request_line("GET /?code=4%2F0Ab&state=xyz HTTP/1.1\r\n"),
            Callback::Code { code, state: Some(state) } if code == "4/0Ab" && state == "xyz"
        ));
        assert!(matches!(
            parse_request_line("GET /?error=access_denied&state=xyz HTTP/1.1"),
            Callback::Denied { error, .. } if error == "access_denied"
        ));
        assert!(matches!(
            parse_request_line("GET /favicon.ico HTTP/1.1"),
            Callback::Unrelated
        ));
        assert!(matches!(
            parse_request_line("POST /?code=a HTTP/1.1"),
            Callback::Unrelated
        ));
        assert!(matches!(parse_request_line(""), Callback::Unrelated));
    }

    #[tokio::test]
    async fn test_receives_code() {
        let listener = CallbackListener::bind(0..=0).await.unwrap();
        let port = listener.port();
        assert_eq!(listener.redirect_uri(), format!("http://localhost:{port}/"));

        let cancel = CancellationToken::new();
        let waiter = tokio::spawn(async move {
            listener
                .wait_for_code("state-1", Duration::from_secs(5), &cancel)
                .await
        });

        let probe = send(port, "GET /favicon.ico HTTP/1.1").await;
        assert!(probe.starts_with("HTTP/1.1 404"));

        let page = send(port, "GET /?code=abc&state=state-1 HTTP/1.1").await;
        assert!(page.starts_with("HTTP/1.1 200 OK"));

        assert_eq!(waiter.await.unwrap().unwrap(), "abc");
        assert!(TcpListener::bind(("127.0.0.1", port)).await.is_ok());
    }

    #[tokio::test]
    async fn test_idle_connection_does_not_block_redirect() {
        let listener = CallbackListener::bind(0..=0).await.unwrap();
        let port = listener.port();
        let cancel = CancellationToken::new();
        let waiter = tokio::spawn(async move {
            listener
                .wait_for_code("s", Duration::from_secs(3), &cancel)
                .await
        });

        let _idle = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let page = send(port, "GET /?code=abc&state=s HTTP/1.1").await;
        assert!(page.starts_with("HTTP/1.1 200 OK"));
        assert_eq!(waiter.await.unwrap().unwrap(), "abc");
    }

    #[tokio::test]
    async fn test_state_mismatch() {
        let listener = CallbackListener::bind(0..=0).await.unwrap();
        let port = listener.port();
        let cancel = CancellationToken::new();
        let waiter = tokio::spawn(async move {
            listener
                .wait_for_code("expected", Duration::from_secs(5), &cancel)
                .await
        });

        let page = send(port, "GET /?code=abc&state=forged HTTP/1.1").await;
        assert!(page.starts_with("HTTP/1.1 400"));
        assert!(matches!(waiter.await.unwrap(), Err(Error::StateMismatch)));
    }

    #[tokio::test]
    async fn test_access_denied() {
        let listener = CallbackListener::bind(0..=0).await.unwrap();
        let port = listener.port();
        let cancel = CancellationToken::new();
        let waiter = tokio::spawn(async move {
            listener
                .wait_for_code("s", Duration::from_secs(5), &cancel)
                .await
        });

        send(port, "GET /?error=access_denied&state=s HTTP/1.1").await;
        assert!(matches!(waiter.await.unwrap(), Err(Error::AccessDenied)));
    }

    #[tokio::test]
    async fn test_timeout_releases_port() {
        let listener = CallbackListener::bind(0..=0).await.unwrap();
        let port = listener.port();
        let cancel = CancellationToken::new();

        let result = listener
            .wait_for_code("s", Duration::from_millis(50), &cancel)
            .await;
        assert!(matches!(result, Err(Error::Timeout(_))));
        assert!(TcpListener::bind(("127.0.0.1", port)).await.is_ok());
    }

    #[tokio::test]
    async fn test_cancellation() {
        let listener = CallbackListener::bind(0..=0).await.unwrap();
        let port = listener.port();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();

        let waiter = tokio::spawn(async move {
            listener
                .wait_for_code("s", Duration::from_secs(30), &cancel)
                .await
        });
        trigger.cancel();

        assert!(matches!(waiter.await.unwrap(), Err(Error::Cancelled)));
        assert!(TcpListener::bind(("127.0.0.1", port)).await.is_ok());
    }

    #[tokio::test]
    async fn test_bind_skips_taken_port() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let busy = taken.local_addr().unwrap().port();
        assert!(matches!(
            CallbackListener::bind(busy..=busy).await,
            Err(Error::NoFreePort { .. })
        ));
    }
}
