// src/interception/server.rs
//! Traffic interception server
//!
//! Owns the TCP listener and the session state. Each accepted connection
//! carries exactly one request: the client writes, half-closes, reads the
//! full response and closes. Requests are recorded, answered from the replay
//! index or by live forwarding, and every record produced on the way is
//! itself re-submitted for processing until a step yields nothing new.

use crate::forward::{CommandExecutor, Executor};
use crate::interception::session::SessionState;
use crate::recording::TraceWriter;
use crate::replay::ReplayIndex;
use crate::traffic::{wire, ResponseSink, TrafficKind, TrafficRecord};
use crate::utils::config::{CaptureConfig, EnvFilter, SessionMode, WireProtocol};
use crate::utils::errors::{EngineError, Result};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// The interception server: listener, accept loop and session state
pub struct TrafficServer {
    address: SocketAddr,
    protocol: WireProtocol,
    state: Mutex<SessionState>,
    commands: CommandExecutor,
    shutdown: Notify,
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

impl TrafficServer {
    /// Bind an ephemeral port and start the accept loop. Failure to bind is
    /// fatal: no session can start without a listener.
    pub async fn bind(config: &CaptureConfig) -> Result<Arc<Self>> {
        let listener = TcpListener::bind((config.server.host.as_str(), 0))
            .await
            .map_err(|e| {
                EngineError::InterceptionFailed(format!("Failed to bind listener: {}", e))
            })?;
        let address = listener.local_addr().map_err(|e| {
            EngineError::InterceptionFailed(format!("Listener has no address: {}", e))
        })?;
        info!("Traffic server listening on {}", address);

        let server = Arc::new(Self {
            address,
            protocol: config.protocol,
            state: Mutex::new(SessionState::new(config.env_filter())),
            commands: CommandExecutor::new(),
            shutdown: Notify::new(),
            accept_task: Mutex::new(None),
        });

        let task = tokio::spawn(accept_loop(Arc::clone(&server), listener));
        *server.accept_task.lock() = Some(task);
        Ok(server)
    }

    /// The listening address
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Publish the listening address for shim and client processes
    pub fn publish_address(&self) {
        info!("Publishing server address {}", self.address);
        std::env::set_var(wire::ADDRESS_VARIABLE, self.address.to_string());
    }

    /// Start a recording session: forward live, persist every exchange
    pub fn start_recording(&self, trace_path: impl AsRef<Path>) -> Result<()> {
        let writer = TraceWriter::create(trace_path)?;
        {
            let mut state = self.state.lock();
            state.reset();
            state.mode = SessionMode::Record;
            state.writer = Some(writer);
        }
        self.commands.clear();
        self.publish_address();
        Ok(())
    }

    /// Start a replay session: satisfy requests from a captured trace
    pub fn start_replaying(
        &self,
        replay_path: impl AsRef<Path>,
        env_filter: EnvFilter,
    ) -> Result<()> {
        let replay = ReplayIndex::from_file(&replay_path)?;
        info!(
            "Replaying {} request keys from {}",
            replay.len(),
            replay_path.as_ref().display()
        );
        {
            let mut state = self.state.lock();
            state.reset();
            state.mode = SessionMode::Replay;
            state.replay = replay;
            state.env_filter = env_filter;
        }
        self.commands.clear();
        self.publish_address();
        Ok(())
    }

    /// End the session; the published address is emptied, which disables
    /// interception in shim and client processes
    pub fn stop(&self) {
        self.state.lock().reset();
        std::env::set_var(wire::ADDRESS_VARIABLE, "");
        info!("Traffic interception stopped");
    }

    /// Pre-seed executable resolution for a command the harness already
    /// replaced with a shim before the session started
    pub fn set_real_command(&self, command: impl Into<String>, real_path: impl Into<PathBuf>) {
        self.commands.preset(command, real_path);
    }

    /// Stop the accept loop; exchanges already in flight finish on their own
    pub async fn shutdown(&self) {
        self.shutdown.notify_one();
        let task = self.accept_task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                debug!("Accept loop ended abruptly: {}", e);
            }
        }
    }

    /// Handle one accepted connection end to end
    async fn handle_connection(&self, mut stream: TcpStream) -> Result<()> {
        let mut payload = Vec::new();
        stream.read_to_end(&mut payload).await.map_err(|e| {
            EngineError::InterceptionFailed(format!("Failed to read request: {}", e))
        })?;
        let text = String::from_utf8_lossy(&payload).into_owned();
        let (_, write_half) = stream.into_split();
        let sink = ResponseSink::new(write_half);

        let record = {
            let state = self.state.lock();
            wire::parse_request(&text, sink, self.protocol, &state.env_filter)?
        };
        self.process(record).await;
        Ok(())
    }

    /// Process one record: drive destination discovery, record it, obtain
    /// its responses, record and forward those, and re-submit whatever the
    /// forwarding produced
    pub fn process<'a>(&'a self, record: TrafficRecord) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            debug!("Processing {} traffic", record.tag());
            if let TrafficKind::ServerLocation = record.kind {
                self.state.lock().destination.announce(&record.text);
            }
            self.record_traffic(&record);

            let responses = self.responses_for(&record).await;
            for response in responses {
                self.record_traffic(&response);
                let chained = self.executor().forward(&response).await;
                for next in chained {
                    self.process(next).await;
                }
                debug!("Completed {} response", response.tag());
            }
        })
    }

    /// Append a record to the trace if the session records and the record
    /// carries content. Serialization and the direction convention are read
    /// under the same lock that orders all trace writes.
    fn record_traffic(&self, record: &TrafficRecord) {
        if !record.has_info() {
            return;
        }
        let mut state = self.state.lock();
        if state.mode != SessionMode::Record {
            return;
        }
        let line = wire::trace_line(record, state.destination.flipped());
        debug!("Recording {} traffic {:?}", record.tag(), line);
        if let Some(writer) = state.writer.as_mut() {
            if let Err(e) = writer.append(&line) {
                error!("{}", e);
            }
        }
    }

    /// Obtain the responses to a request: replay lookup in replay mode,
    /// live forwarding otherwise
    async fn responses_for(&self, record: &TrafficRecord) -> Vec<TrafficRecord> {
        let mode = self.state.lock().mode;
        match mode {
            SessionMode::Replay => self.replayed_responses(record),
            SessionMode::Record | SessionMode::Off => {
                self.executor().forward(record).await
            }
        }
    }

    /// Look the request up in the replay index and reconstruct its group,
    /// canonicalized for the request kind
    fn replayed_responses(&self, record: &TrafficRecord) -> Vec<TrafficRecord> {
        if !record.has_info() {
            return Vec::new();
        }
        let entries = {
            let mut state = self.state.lock();
            let description = record.description(state.destination.flipped());
            state.replay.lookup(&description)
        };
        let responses = entries
            .iter()
            .filter_map(|entry| {
                wire::parse_trace_entry(entry, record.sink.clone(), self.protocol)
            })
            .collect();
        record.filter_replay(responses)
    }

    /// Snapshot of the live-forwarding context
    fn executor(&self) -> Executor {
        let state = self.state.lock();
        Executor {
            destination: state.destination.destination().map(str::to_string),
            commands: self.commands.clone(),
        }
    }
}

/// Accept connections until shutdown; a failed accept is logged, not fatal
async fn accept_loop(server: Arc<TrafficServer>, listener: TcpListener) {
    loop {
        tokio::select! {
            _ = server.shutdown.notified() => {
                info!("Accept loop stopped");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!("Accepted connection from {}", peer);
                    let server = Arc::clone(&server);
                    tokio::spawn(async move {
                        if let Err(e) = server.handle_connection(stream).await {
                            warn!("Exchange failed: {}", e);
                        }
                    });
                }
                Err(e) => error!("Failed to accept connection: {}", e),
            }
        }
    }
}
