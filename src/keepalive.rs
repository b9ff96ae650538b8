use anyhow::{Context, Result};
use log::{info, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

const RESPONSE: &[u8] = b"HTTP/1.1 200 OK\r\n\
Content-Type: text/plain\r\n\
Content-Length: 13\r\n\
Connection: close\r\n\
\r\n\
Bot is alive!";

/// Minimal HTTP 200 responder so hosting platforms see the process as
/// healthy. Answers every request the same way and never inspects it beyond
/// draining the request head.
pub async fn serve(port: u16) -> Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("Failed to bind keep-alive port {}", port))?;
    info!("keep-alive endpoint listening on port {}", port);

    loop {
        let (mut socket, _) = listener.accept().await?;
        tokio::spawn(async move {
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            if let Err(e) = socket.write_all(RESPONSE).await {
                warn!("keep-alive reply failed: {}", e);
            }
        });
    }
}
