// ELM327 over TCP (WiFi OBD dongles)
// reason: tokio for async socket I/O with per-command deadlines
use async_trait::async_trait;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use obd_gateway_core::port::{ObdConnection, ObdConnector, TransportError};

/// The adapter is ready for the next command once it prints this
const PROMPT: u8 = b'>';

/// Upper bound for a single response; anything longer is a stuck adapter
const MAX_RESPONSE_BYTES: usize = 4096;

/// Opens TCP sessions to a WiFi ELM327 adapter
#[derive(Debug, Clone)]
pub struct TcpElm327Connector {
    addr: SocketAddr,
    timeout: Duration,
}

impl TcpElm327Connector {
    /// # Arguments
    /// * `addr` - Adapter address (most dongles listen on 192.168.0.10:35000)
    /// * `timeout` - Applied to connect and to each command round trip
    pub fn new(addr: SocketAddr, timeout: Duration) -> Self {
        Self { addr, timeout }
    }
}

#[async_trait]
impl ObdConnector for TcpElm327Connector {
    async fn connect(&self) -> Result<Box<dyn ObdConnection>, TransportError> {
        info!(
            addr = %self.addr,
            timeout_ms = self.timeout.as_millis() as u64,
            "Connecting to ELM327 adapter"
        );

        let stream = timeout(self.timeout, TcpStream::connect(self.addr))
            .await
            .map_err(|_| TransportError::Timeout(self.timeout.as_millis() as u64))?
            .map_err(|e| TransportError::Connect(format!("{}: {}", self.addr, e)))?;

        if let Err(e) = stream.set_nodelay(true) {
            warn!(error = %e, "Failed to set TCP_NODELAY");
        }

        Ok(Box::new(Elm327Connection::new(stream, self.timeout)))
    }
}

/// ELM327 command/response framing over any byte stream
struct Elm327Connection<S> {
    stream: S,
    timeout: Duration,
    /// False while an answer may still be owed for an abandoned command
    in_sync: bool,
}

impl<S> Elm327Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    fn new(stream: S, timeout: Duration) -> Self {
        Self {
            stream,
            timeout,
            in_sync: true,
        }
    }

    /// Discard what the adapter still owes for an abandoned command
    async fn resync(&mut self) -> Result<(), TransportError> {
        let deadline = self.timeout;
        let stale = timeout(deadline, self.read_until_prompt())
            .await
            .map_err(|_| TransportError::Timeout(deadline.as_millis() as u64))??;
        debug!(stale = ?stale, "Discarded late adapter response");
        self.in_sync = true;
        Ok(())
    }

    async fn read_until_prompt(&mut self) -> Result<String, TransportError> {
        let mut buffer = [0u8; 256];
        let mut response = Vec::new();

        loop {
            let n = self
                .stream
                .read(&mut buffer)
                .await
                .map_err(|e| TransportError::Io(e.to_string()))?;
            if n == 0 {
                return Err(TransportError::Disconnected);
            }

            response.extend_from_slice(&buffer[..n]);
            if response.contains(&PROMPT) {
                break;
            }
            if response.len() > MAX_RESPONSE_BYTES {
                return Err(TransportError::Io(format!(
                    "response exceeded {} bytes without prompt",
                    MAX_RESPONSE_BYTES
                )));
            }
        }

        Ok(String::from_utf8_lossy(&response).into_owned())
    }
}

#[async_trait]
impl<S> ObdConnection for Elm327Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, command: &str) -> Result<String, TransportError> {
        let mut line = command.trim_end_matches('\r').to_string();
        line.push('\r');
        debug!(command = %command, "Sending to adapter");

        if !self.in_sync {
            self.resync().await?;
        }

        self.in_sync = false;
        let deadline = self.timeout;
        let round_trip = async {
            self.stream
                .write_all(line.as_bytes())
                .await
                .map_err(|e| TransportError::Io(e.to_string()))?;
            self.read_until_prompt().await
        };

        let response = timeout(deadline, round_trip)
            .await
            .map_err(|_| TransportError::Timeout(deadline.as_millis() as u64))??;

        self.in_sync = true;
        debug!(response = ?response, "Adapter response");
        Ok(response)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.stream
            .shutdown()
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncBufReadExt;
    use tokio::net::TcpListener;

    /// Fake adapter: answers each `\r` terminated line via `reply`
    async fn fake_adapter<F>(reply: F) -> SocketAddr
    where
        F: Fn(&str) -> Option<String> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = socket.into_split();
            let mut reader = tokio::io::BufReader::new(read_half);
            loop {
                let mut line = Vec::new();
                if reader.read_until(b'\r', &mut line).await.unwrap_or(0) == 0 {
                    break;
                }
                let command = String::from_utf8_lossy(&line).trim().to_string();
                match reply(&command) {
                    Some(answer) => write_half.write_all(answer.as_bytes()).await.unwrap(),
                    None => break,
                }
            }
        });

        addr
    }

    #[tokio::test]
    async fn test_send_reads_until_prompt() {
        let addr = fake_adapter(|cmd| match cmd {
            "01 0C" => Some("41 0C 1A F8\r\r>".to_string()),
            _ => Some("OK\r\r>".to_string()),
        })
        .await;

        let connector = TcpElm327Connector::new(addr, Duration::from_secs(2));
        let mut conn = connector.connect().await.unwrap();

        assert_eq!(conn.send("AT E0").await.unwrap(), "OK\r\r>");
        assert_eq!(conn.send("01 0C").await.unwrap(), "41 0C 1A F8\r\r>");
        conn.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_prompt_times_out() {
        let addr = fake_adapter(|_| Some("SEARCHING...".to_string())).await;

        let connector = TcpElm327Connector::new(addr, Duration::from_millis(100));
        let mut conn = connector.connect().await.unwrap();

        let err = conn.send("01 0D").await.unwrap_err();
        assert!(matches!(err, TransportError::Timeout(100)));
    }

    #[tokio::test]
    async fn test_late_answer_is_not_taken_for_next_reply() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = socket.into_split();
            let mut reader = tokio::io::BufReader::new(read_half);
            let mut first = true;
            loop {
                let mut line = Vec::new();
                if reader.read_until(b'\r', &mut line).await.unwrap_or(0) == 0 {
                    break;
                }
                let answer = match String::from_utf8_lossy(&line).trim() {
                    "01 0D" => "41 0D 32\r\r>",
                    "01 0C" => "41 0C 1A F8\r\r>",
                    _ => "?\r\r>",
                };
                if first {
                    first = false;
                    tokio::time::sleep(Duration::from_millis(300)).await;
                }
                write_half.write_all(answer.as_bytes()).await.unwrap();
            }
        });

        let connector = TcpElm327Connector::new(addr, Duration::from_millis(100));
        let mut conn = connector.connect().await.unwrap();

        let err = conn.send("01 0D").await.unwrap_err();
        assert!(matches!(err, TransportError::Timeout(100)));

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(conn.send("01 0C").await.unwrap(), "41 0C 1A F8\r\r>");
    }

    #[tokio::test]
    async fn test_adapter_hangup_is_disconnect() {
        let addr = fake_adapter(|_| None).await;

        let connector = TcpElm327Connector::new(addr, Duration::from_secs(2));
        let mut conn = connector.connect().await.unwrap();

        let err = conn.send("AT Z").await.unwrap_err();
        assert!(matches!(err, TransportError::Disconnected));
    }

    #[tokio::test]
    async fn test_response_split_across_reads() {
        let stream = tokio_test::io::Builder::new()
            .write(b"01 0C\r")
            .read(b"41 0C ")
            .read(b"1A F8\r")
            .read(b"\r>")
            .build();
        let mut conn = Elm327Connection::new(stream, Duration::from_secs(1));

        assert_eq!(conn.send("01 0C").await.unwrap(), "41 0C 1A F8\r\r>");
    }

    #[tokio::test]
    async fn test_oversized_response_is_rejected() {
        let noise = vec![b'0'; MAX_RESPONSE_BYTES + 1];
        let stream = tokio_test::io::Builder::new()
            .write(b"01 00\r")
            .read(&noise)
            .build();
        let mut conn = Elm327Connection::new(stream, Duration::from_secs(1));

        let err = conn.send("01 00").await.unwrap_err();
        assert!(matches!(err, TransportError::Io(_)));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let connector = TcpElm327Connector::new(addr, Duration::from_secs(2));
        let err = connector.connect().await.err().unwrap();
        assert!(matches!(err, TransportError::Connect(_)));
    }
}
