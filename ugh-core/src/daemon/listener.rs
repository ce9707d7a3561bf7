//! Status listener for `daemon run --listen <addr>`
//!
//! Every TCP connection receives the current [`DaemonStatus`] as one JSON
//! line and is then closed.

use std::net::SocketAddr;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

use super::{DaemonHandle, DaemonStatus};

/// Bind the status listener.
pub async fn bind_status_listener(addr: &str) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Config(format!("cannot listen on {}: {}", addr, e)))
}

/// Answer status requests until `cancel` fires.
pub async fn serve_status(listener: TcpListener, handle: DaemonHandle, cancel: CancellationToken) {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "Status listener started");
    }

    loop {
        let accepted = tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => accepted,
        };
        match accepted {
            Ok((socket, peer)) => {
                let status = handle.status();
                tokio::spawn(async move {
                    if let Err(e) = write_status(socket, &status).await {
                        tracing::debug!(%peer, error = %e, "Failed to write status");
                    }
                });
            }
            Err(e) => tracing::warn!(error = %e, "Status listener accept failed"),
        }
    }

    tracing::debug!("Status listener stopped");
}

async fn write_status(mut socket: TcpStream, status: &DaemonStatus) -> Result<()> {
    let mut line = serde_json::to_vec(status)?;
    line.push(b'\n');
    socket.write_all(&line).await?;
    socket.shutdown().await?;
    Ok(())
}

/// Read one status line from a running daemon's listener.
pub async fn query_status(addr: SocketAddr) -> Result<DaemonStatus> {
    let socket = TcpStream::connect(addr).await?;
    let mut reader = BufReader::new(socket);
    let mut line = String::new();
    reader.read_line(&mut line).await?;
    Ok(serde_json::from_str(line.trim_end())?)
}
