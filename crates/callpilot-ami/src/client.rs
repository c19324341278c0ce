//! The manager connection: connect, authenticate, send actions, reconnect.

use crate::protocol::{Action, AmiResponse};
use crate::AmiError;
use serde::Deserialize;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

/// Connection settings for the manager interface.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AmiConfig {
    /// Manager host. Empty disables the client.
    pub host: String,
    /// Manager port (conventionally 5038).
    pub port: u16,
    /// Manager account name.
    pub username: String,
    /// Manager account secret.
    pub secret: String,
    /// Connect and per-response read deadline, in milliseconds.
    pub io_timeout_ms: u64,
}

impl Default for AmiConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 5038,
            username: String::new(),
            secret: String::new(),
            io_timeout_ms: 10_000,
        }
    }
}

struct AmiConnection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

/// A manager client holding at most one live connection.
///
/// Actions are serialized through an async mutex: one in-flight action at a
/// time, which matches how the service uses AMI (short, rare control
/// sequences). A connection that errors is dropped and rebuilt on the next
/// action.
pub struct AmiClient {
    config: AmiConfig,
    conn: Mutex<Option<AmiConnection>>,
    action_seq: std::sync::atomic::AtomicU64,
}

impl AmiClient {
    pub fn new(config: AmiConfig) -> Self {
        Self {
            config,
            conn: Mutex::new(None),
            action_seq: std::sync::atomic::AtomicU64::new(1),
        }
    }

    /// Whether the manager interface is configured.
    pub fn is_enabled(&self) -> bool {
        !self.config.host.is_empty()
    }

    fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.config.io_timeout_ms)
    }

    fn next_action_id(&self) -> String {
        let seq = self
            .action_seq
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        format!("cp-{seq}")
    }

    /// Sends one action and returns the matching response frame.
    ///
    /// Establishes and authenticates the connection first if none is live.
    /// Unsolicited event frames received while waiting are skipped.
    ///
    /// # Errors
    ///
    /// `AmiError::ActionFailed` when the manager answers `Response: Error`;
    /// `Io`/`Timeout` on transport problems (the connection is dropped so
    /// the next action reconnects).
    pub async fn send_action(&self, action: Action) -> Result<AmiResponse, AmiError> {
        if !self.is_enabled() {
            return Err(AmiError::Disabled);
        }

        let mut guard = self.conn.lock().await;
        if guard.is_none() {
            *guard = Some(self.connect_and_login().await?);
        }

        let action_name = action.name().to_string();
        let action_id = self.next_action_id();
        let frame = action.serialize(&action_id);

        let result = self.exchange(guard.as_mut(), &frame, &action_id).await;

        match result {
            Ok(response) => {
                if response.is_success() {
                    Ok(response)
                } else {
                    Err(AmiError::ActionFailed {
                        action: action_name,
                        message: response.message().to_string(),
                    })
                }
            }
            Err(e) => {
                // Drop the broken connection; the next action reconnects.
                *guard = None;
                tracing::warn!(action = %action_name, error = %e, "ami exchange failed, dropping connection");
                Err(e)
            }
        }
    }

    async fn exchange(
        &self,
        conn: Option<&mut AmiConnection>,
        frame: &str,
        action_id: &str,
    ) -> Result<AmiResponse, AmiError> {
        let conn = conn.ok_or_else(|| AmiError::Protocol("connection missing".to_string()))?;

        conn.writer.write_all(frame.as_bytes()).await?;
        conn.writer.flush().await?;

        // Read frames until the one correlated to our action shows up.
        // Anything else on the wire at this point is an unsolicited event.
        loop {
            let block = tokio::time::timeout(self.io_timeout(), read_frame(&mut conn.reader))
                .await
                .map_err(|_| AmiError::Timeout)??;
            let response = AmiResponse::parse(&block);

            if response.action_id() == Some(action_id) {
                return Ok(response);
            }
            if response.is_event() {
                tracing::trace!(event = ?response.get("event"), "skipping unsolicited ami event");
                continue;
            }
            // A response frame with a foreign or missing ActionID means the
            // stream is out of step with us.
            return Err(AmiError::Protocol(format!(
                "unexpected frame while waiting for ActionID {action_id}"
            )));
        }
    }

    async fn connect_and_login(&self) -> Result<AmiConnection, AmiError> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let stream = tokio::time::timeout(self.io_timeout(), TcpStream::connect(&addr))
            .await
            .map_err(|_| AmiError::Timeout)??;

        let (read_half, write_half) = stream.into_split();
        let mut conn = AmiConnection {
            reader: BufReader::new(read_half),
            writer: write_half,
        };

        // Banner line, e.g. "Asterisk Call Manager/5.0".
        let mut banner = String::new();
        tokio::time::timeout(self.io_timeout(), conn.reader.read_line(&mut banner))
            .await
            .map_err(|_| AmiError::Timeout)??;
        tracing::debug!(banner = %banner.trim_end(), "connected to manager");

        let login = Action::new("Login")
            .field("Username", &self.config.username)
            .field("Secret", &self.config.secret)
            .field("Events", "off");
        let action_id = self.next_action_id();
        conn.writer
            .write_all(login.serialize(&action_id).as_bytes())
            .await?;
        conn.writer.flush().await?;

        let block = tokio::time::timeout(self.io_timeout(), read_frame(&mut conn.reader))
            .await
            .map_err(|_| AmiError::Timeout)??;
        let response = AmiResponse::parse(&block);
        if !response.is_success() {
            return Err(AmiError::LoginFailed(response.message().to_string()));
        }

        tracing::info!(host = %self.config.host, "manager login accepted");
        Ok(conn)
    }
}

/// Reads one frame: lines up to (and excluding) the blank separator line.
async fn read_frame(reader: &mut BufReader<OwnedReadHalf>) -> Result<Vec<String>, AmiError> {
    let mut lines = Vec::new();
    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            return Err(AmiError::Protocol("connection closed mid-frame".to_string()));
        }
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            if lines.is_empty() {
                // Tolerate stray blank lines between frames.
                continue;
            }
            return Ok(lines);
        }
        lines.push(trimmed.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[test]
    fn disabled_client_refuses_actions() {
        let client = AmiClient::new(AmiConfig::default());
        assert!(!client.is_enabled());

        let err = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(client.send_action(Action::new("Ping")))
            .unwrap_err();
        assert!(matches!(err, AmiError::Disabled));
    }

    #[tokio::test]
    async fn logs_in_and_correlates_response() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");

        // Scripted manager: banner, accept login, answer one Redirect,
        // with an unsolicited event injected before the real response.
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            socket
                .write_all(b"Asterisk Call Manager/5.0\r\n")
                .await
                .expect("banner");

            let mut buf = vec![0u8; 4096];
            let n = socket.read(&mut buf).await.expect("read login");
            let login = String::from_utf8_lossy(&buf[..n]).to_string();
            assert!(login.contains("Action: Login"));
            assert!(login.contains("Username: admin"));
            let login_id = extract_action_id(&login);
            socket
                .write_all(
                    format!("Response: Success\r\nActionID: {login_id}\r\nMessage: Authentication accepted\r\n\r\n")
                        .as_bytes(),
                )
                .await
                .expect("login ok");

            let n = socket.read(&mut buf).await.expect("read action");
            let redirect = String::from_utf8_lossy(&buf[..n]).to_string();
            assert!(redirect.contains("Action: Redirect"));
            assert!(redirect.contains("Exten: 8300"));
            let redirect_id = extract_action_id(&redirect);
            socket
                .write_all(
                    format!(
                        "Event: Newstate\r\nChannel: SIP/x\r\n\r\n\
                         Response: Success\r\nActionID: {redirect_id}\r\nMessage: Redirect successful\r\n\r\n"
                    )
                    .as_bytes(),
                )
                .await
                .expect("redirect ok");
        });

        let client = AmiClient::new(AmiConfig {
            host: addr.ip().to_string(),
            port: addr.port(),
            username: "admin".to_string(),
            secret: "secret".to_string(),
            io_timeout_ms: 2_000,
        });

        let response = client
            .send_action(
                Action::new("Redirect")
                    .field("Channel", "SIP/telecast-00013813")
                    .field("Context", "default")
                    .field("Exten", "8300")
                    .field("Priority", "1"),
            )
            .await
            .expect("redirect should succeed");

        assert_eq!(response.message(), "Redirect successful");
        server.await.expect("server task");
    }

    #[tokio::test]
    async fn error_response_maps_to_action_failed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            socket
                .write_all(b"Asterisk Call Manager/5.0\r\n")
                .await
                .expect("banner");

            let mut buf = vec![0u8; 4096];
            let n = socket.read(&mut buf).await.expect("read login");
            let login_id = extract_action_id(&String::from_utf8_lossy(&buf[..n]));
            socket
                .write_all(
                    format!("Response: Success\r\nActionID: {login_id}\r\n\r\n").as_bytes(),
                )
                .await
                .expect("login ok");

            let n = socket.read(&mut buf).await.expect("read action");
            let id = extract_action_id(&String::from_utf8_lossy(&buf[..n]));
            socket
                .write_all(
                    format!(
                        "Response: Error\r\nActionID: {id}\r\nMessage: Channel not found\r\n\r\n"
                    )
                    .as_bytes(),
                )
                .await
                .expect("error reply");
        });

        let client = AmiClient::new(AmiConfig {
            host: addr.ip().to_string(),
            port: addr.port(),
            username: "admin".to_string(),
            secret: "secret".to_string(),
            io_timeout_ms: 2_000,
        });

        let err = client
            .send_action(Action::new("Hangup").field("Channel", "SIP/ghost"))
            .await
            .unwrap_err();

        match err {
            AmiError::ActionFailed { action, message } => {
                assert_eq!(action, "Hangup");
                assert_eq!(message, "Channel not found");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        server.await.expect("server task");
    }

    fn extract_action_id(frame: &str) -> String {
        frame
            .lines()
            .find_map(|l| l.strip_prefix("ActionID: "))
            .expect("frame should carry an ActionID")
            .trim()
            .to_string()
    }
}
