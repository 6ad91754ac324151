//! TCP debug server

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

use crate::protocol::{DebugCommand, DebugResponse};

/// Trait that the application implements to answer debug commands
pub trait DebugHandler: Send + Sync + 'static {
    fn handle_command(&mut self, cmd: DebugCommand) -> DebugResponse;
}

/// Debug server handle - keep this alive to keep the server running
pub struct DebugServer {
    local_addr: Option<SocketAddr>,
    _handle: tokio::task::JoinHandle<()>,
}

impl DebugServer {
    /// Start the debug server on the given localhost port.
    /// Returns immediately; binding and serving happen in the background
    /// and a bind failure is only logged.
    pub fn start(handler: Arc<Mutex<dyn DebugHandler>>, port: u16) -> Self {
        let handle = tokio::spawn(async move {
            let addr = format!("127.0.0.1:{}", port);
            match TcpListener::bind(&addr).await {
                Ok(listener) => {
                    log::info!("Debug server listening on {}", addr);
                    serve(listener, handler).await;
                }
                Err(e) => log::error!("Failed to bind debug server on {}: {}", addr, e),
            }
        });

        Self {
            local_addr: None,
            _handle: handle,
        }
    }

    /// Bind first, then serve in the background. Port 0 picks a free port.
    pub async fn bind(handler: Arc<Mutex<dyn DebugHandler>>, port: u16) -> std::io::Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", port)).await?;
        let local_addr = listener.local_addr()?;
        log::info!("Debug server listening on {}", local_addr);
        let handle = tokio::spawn(serve(listener, handler));
        Ok(Self {
            local_addr: Some(local_addr),
            _handle: handle,
        })
    }

    /// Bound address, known only for servers created with [`DebugServer::bind`]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }
}

async fn serve(listener: TcpListener, handler: Arc<Mutex<dyn DebugHandler>>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                log::info!("Debug client connected from {}", peer);
                let handler = handler.clone();
                tokio::spawn(async move {
                    handle_connection(stream, handler).await;
                    log::info!("Debug client disconnected: {}", peer);
                });
            }
            Err(e) => {
                log::error!("Debug server accept error: {}", e);
            }
        }
    }
}

/// Answer one request line with one response line (newline included)
pub async fn respond(handler: &Arc<Mutex<dyn DebugHandler>>, line: &str) -> String {
    let response = match serde_json::from_str::<DebugCommand>(line) {
        Ok(cmd) => {
            log::debug!("Debug command: {:?}", cmd);
            let mut h = handler.lock().await;
            h.handle_command(cmd)
        }
        Err(e) => DebugResponse::error(format!("Invalid command JSON: {}", e)),
    };

    let mut json = serde_json::to_string(&response).unwrap_or_else(|e| {
        format!(
            "{{\"status\":\"error\",\"message\":\"Serialize error: {}\"}}",
            e
        )
    });
    json.push('\n');
    json
}

async fn handle_connection(stream: TcpStream, handler: Arc<Mutex<dyn DebugHandler>>) {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break, // Connection closed
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let reply = respond(&handler, trimmed).await;
                if let Err(e) = writer.write_all(reply.as_bytes()).await {
                    log::error!("Debug server write error: {}", e);
                    break;
                }
                if let Err(e) = writer.flush().await {
                    log::error!("Debug server flush error: {}", e);
                    break;
                }
            }
            Err(e) => {
                log::error!("Debug server read error: {}", e);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ResponseData;

    struct Counter {
        pings: u32,
    }

    impl DebugHandler for Counter {
        fn handle_command(&mut self, cmd: DebugCommand) -> DebugResponse {
            match cmd {
                DebugCommand::Ping => {
                    self.pings += 1;
                    DebugResponse::pong()
                }
                DebugCommand::GetImageSize => DebugResponse::ok(ResponseData::ImageSize { width: 4, height: 3 }),
                _ => DebugResponse::error("unsupported"),
            }
        }
    }

    fn handler() -> Arc<Mutex<dyn DebugHandler>> {
        Arc::new(Mutex::new(Counter { pings: 0 }))
    }

    #[tokio::test]
    async fn test_respond_reports_bad_json() {
        let h = handler();
        let reply = respond(&h, "{not json").await;
        assert!(reply.ends_with('\n'));
        assert!(reply.starts_with(r#"{"status":"error","message":"Invalid command JSON"#));
    }

    #[tokio::test]
    async fn test_round_trip_over_tcp() {
        let server = DebugServer::bind(handler(), 0).await.unwrap();
        let addr = server.local_addr().unwrap();
        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);

        writer.write_all(b"{\"cmd\":\"Ping\"}\n\n{\"cmd\":\"GetImageSize\"}\n").await.unwrap();
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        assert_eq!(line, "{\"status\":\"ok\",\"data\":{\"message\":\"pong\"}}\n");
        line.clear();
        reader.read_line(&mut line).await.unwrap();
        assert_eq!(line, "{\"status\":\"ok\",\"data\":{\"width\":4,\"height\":3}}\n");
    }
}
