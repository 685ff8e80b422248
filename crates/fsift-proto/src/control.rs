//! Line-delimited TCP control server.
//!
//! Each connection carries newline-delimited JSON requests and gets one
//! JSON reply line per request. Handlers run on blocking threads since
//! they may join pipeline threads.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::command::{CommandHandler, CommandRequest, CommandResponse, ResponseCode};
use crate::error::ProtoResult;

/// Request/reply control server shared by the recorder and analyzer
/// processes.
pub struct ControlServer {
    listener: TcpListener,
}

impl ControlServer {
    /// Bind the control socket.
    pub async fn bind(addr: &str) -> ProtoResult<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "Control server listening");
        Ok(Self { listener })
    }

    /// Address actually bound (useful with port 0).
    pub fn local_addr(&self) -> ProtoResult<std::net::SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept and serve connections until `shutdown` flips to true.
    pub async fn serve(
        self,
        handler: Arc<dyn CommandHandler>,
        mut shutdown: watch::Receiver<bool>,
    ) -> ProtoResult<()> {
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, peer) = accepted?;
                    debug!(%peer, "Control connection accepted");
                    let handler = Arc::clone(&handler);
                    let shutdown = shutdown.clone();
                    tokio::spawn(async move {
                        if let Err(error) = serve_connection(stream, handler, shutdown).await {
                            warn!(%peer, %error, "Control connection ended with error");
                        }
                    });
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Control server shutting down");
                        return Ok(());
                    }
                }
            }
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    handler: Arc<dyn CommandHandler>,
    mut shutdown: watch::Receiver<bool>,
) -> ProtoResult<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    return Ok(());
                }
                continue;
            }
        };

        let Some(line) = line else {
            return Ok(()); // peer closed
        };
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<CommandRequest>(&line) {
            Ok(request) => {
                let handler = Arc::clone(&handler);
                tokio::task::spawn_blocking(move || handler.handle(request))
                    .await
                    .unwrap_or_else(|_| {
                        CommandResponse::error(ResponseCode::Internal, "handler panicked")
                    })
            }
            Err(error) => CommandResponse::error(
                ResponseCode::InvalidCommand,
                format!("invalid request: {error}"),
            ),
        };

        let mut payload = serde_json::to_string(&response)?;
        payload.push('\n');
        writer.write_all(payload.as_bytes()).await?;
    }
}
