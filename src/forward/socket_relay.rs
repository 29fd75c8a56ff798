// src/forward/socket_relay.rs
//! Live relay of raw client traffic
//!
//! Every forward opens a fresh connection: write the request, half-close the
//! write side, read the response to EOF. A destination that resets or closes
//! the connection is not an error — the client observes an empty response
//! and the originating request stays recorded.

use crate::traffic::{ResponseSink, TrafficRecord};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, warn};

/// Forward raw client text to the bound destination, wrapping the reply as
/// server traffic
pub async fn forward(text: &str, destination: &str, sink: &ResponseSink) -> Vec<TrafficRecord> {
    match exchange(text, destination).await {
        Ok(response) => vec![TrafficRecord::server_response(response, sink.clone())],
        Err(e) => {
            warn!(
                "Server at {} dropped the connection while forwarding client traffic: {}",
                destination, e
            );
            Vec::new()
        }
    }
}

/// One request/response exchange against a live endpoint
pub(crate) async fn exchange(text: &str, destination: &str) -> std::io::Result<String> {
    debug!("Connecting to destination {}", destination);
    let mut stream = TcpStream::connect(destination).await?;
    stream.write_all(text.as_bytes()).await?;
    stream.shutdown().await?;
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await?;
    Ok(String::from_utf8_lossy(&response).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traffic::TrafficKind;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn echo_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut request = Vec::new();
                    stream.read_to_end(&mut request).await.unwrap();
                    let reply = format!("echo:{}", String::from_utf8_lossy(&request));
                    stream.write_all(reply.as_bytes()).await.unwrap();
                });
            }
        });
        address
    }

    #[tokio::test]
    async fn test_forward_wraps_reply_as_server_traffic() {
        let address = echo_server().await;
        let responses = forward("ping", &address, &ResponseSink::none()).await;

        assert_eq!(responses.len(), 1);
        assert!(matches!(responses[0].kind, TrafficKind::ServerResponse));
        assert_eq!(responses[0].text, "echo:ping");
    }

    #[tokio::test]
    async fn test_forward_tolerates_unreachable_destination() {
        // Bind-then-drop guarantees a dead port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let responses = forward("ping", &address, &ResponseSink::none()).await;
        assert!(responses.is_empty());
    }
}
