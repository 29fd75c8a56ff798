// src/forward/mod.rs
//! Live forwarding
//!
//! The forwarding executor performs the live side of an exchange, one
//! behavior per traffic variant:
//!
//! - **Socket Relay**: raw client traffic to the bound destination
//! - **RPC Client**: remote-procedure calls with fault decoding
//! - **Command Executor**: subprocess execution with shim-safe resolution
//!
//! Response-side variants deliver their payload back through the response
//! sink instead of traveling further.

pub mod command_executor;
pub mod rpc_client;
pub mod socket_relay;

pub use command_executor::CommandExecutor;

use crate::traffic::{wire, TrafficKind, TrafficRecord};
use tracing::debug;

/// Snapshot of everything live forwarding needs for one processing step
#[derive(Clone)]
pub struct Executor {
    /// Bound destination (`host:port`), if discovery has happened
    pub destination: Option<String>,

    /// Shared per-session command resolution cache
    pub commands: CommandExecutor,
}

impl Executor {
    /// Perform the live behavior of a record, returning any downstream
    /// traffic it produced
    pub async fn forward(&self, record: &TrafficRecord) -> Vec<TrafficRecord> {
        match &record.kind {
            TrafficKind::ClientCall => match &self.destination {
                Some(destination) => {
                    socket_relay::forward(&record.text, destination, &record.sink).await
                }
                None => {
                    debug!("Client is alone, nowhere to forward");
                    Vec::new()
                }
            },
            TrafficKind::RpcCall(call) => match &self.destination {
                Some(destination) => rpc_client::invoke(call, destination, &record.sink).await,
                None => {
                    debug!("No RPC destination bound");
                    Vec::new()
                }
            },
            TrafficKind::Command(details) => {
                self.commands.execute(details, &record.sink).await
            }
            // Consumed by destination discovery; nothing travels further
            TrafficKind::ServerLocation => Vec::new(),
            TrafficKind::Stdout | TrafficKind::Stderr => {
                record
                    .sink
                    .send(&format!("{}{}", record.text, wire::COMMAND_RESPONSE_SEP))
                    .await;
                Vec::new()
            }
            TrafficKind::ServerResponse
            | TrafficKind::RpcFault(_)
            | TrafficKind::ExitStatus(_) => {
                record.sink.finish(&record.text).await;
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traffic::ResponseSink;
    use tokio::io::AsyncReadExt;

    fn executor() -> Executor {
        Executor {
            destination: None,
            commands: CommandExecutor::new(),
        }
    }

    #[tokio::test]
    async fn test_client_without_destination_forwards_nowhere() {
        let record = TrafficRecord::client_call("ping", ResponseSink::none());
        assert!(executor().forward(&record).await.is_empty());
    }

    #[tokio::test]
    async fn test_stdout_delivery_keeps_sink_open() {
        let (mut reader, writer) = tokio::io::duplex(1024);
        let sink = ResponseSink::new(writer);

        let out = TrafficRecord::stdout("hello\n", sink.clone());
        let err = TrafficRecord::stderr("", sink.clone());
        let exit = TrafficRecord::exit_status(0, sink.clone());

        let exec = executor();
        assert!(exec.forward(&out).await.is_empty());
        assert!(exec.forward(&err).await.is_empty());
        assert!(exec.forward(&exit).await.is_empty());

        let mut delivered = String::new();
        reader.read_to_string(&mut delivered).await.unwrap();
        assert_eq!(
            delivered,
            format!(
                "hello\n{sep}{sep}0",
                sep = wire::COMMAND_RESPONSE_SEP
            )
        );
    }

    #[tokio::test]
    async fn test_server_response_finishes_sink() {
        let (mut reader, writer) = tokio::io::duplex(1024);
        let sink = ResponseSink::new(writer);
        let record = TrafficRecord::server_response("welcome", sink);

        executor().forward(&record).await;

        let mut delivered = String::new();
        reader.read_to_string(&mut delivered).await.unwrap();
        assert_eq!(delivered, "welcome");
    }

    #[tokio::test]
    async fn test_server_location_travels_nowhere() {
        let record = TrafficRecord::server_location("ready at x:1", ResponseSink::none());
        assert!(executor().forward(&record).await.is_empty());
    }
}
