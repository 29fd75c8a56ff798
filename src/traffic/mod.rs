// src/traffic/mod.rs
//! Traffic model
//!
//! Every intercepted exchange is represented as a [`TrafficRecord`]: a
//! tagged variant, its payload text, and an optional response sink leading
//! back to the process that initiated the exchange. Records are created on
//! receipt or synthesis, serialized into the trace when they carry content,
//! and dropped once the exchange completes.
//!
//! - **wire**: record framing and the shim wire contract
//! - **command**: command-invocation payloads and their description text
//! - **literal**: the restricted literal codec

pub mod command;
pub mod literal;
pub mod wire;

use crate::utils::errors::{EngineError, Result};
use command::CommandDetails;
use literal::Value;
use std::fmt;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

/// Direction of a record relative to the interception server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// A request flowing into the server (`<-`)
    Incoming,

    /// A response flowing back out (`->`)
    Outgoing,
}

impl Direction {
    /// The two-character marker that starts a serialized record
    pub fn marker(self) -> &'static str {
        match self {
            Direction::Incoming => "<-",
            Direction::Outgoing => "->",
        }
    }
}

/// A decoded remote-procedure call
#[derive(Debug, Clone)]
pub struct RpcCallDetails {
    pub method: String,
    pub args: Vec<Value>,
}

impl RpcCallDetails {
    /// Decode `method(arg, ...)` text
    pub fn decode(text: &str) -> Result<Self> {
        let (method, rest) = text
            .split_once('(')
            .ok_or_else(|| EngineError::PayloadError(format!("not a call: {:?}", text)))?;
        let method = method.trim();
        if method.is_empty() || method.chars().any(char::is_whitespace) {
            return Err(EngineError::PayloadError(format!(
                "invalid method name: {:?}",
                method
            )));
        }
        let args = literal::parse_sequence(&format!("({}", rest.trim_end()))?;
        Ok(Self {
            method: method.to_string(),
            args,
        })
    }

    /// Canonical `method(arg, ...)` text
    pub fn encode(&self) -> String {
        format!("{}{}", self.method, literal::encode_sequence(&self.args))
    }
}

/// A declared remote-procedure fault
#[derive(Debug, Clone)]
pub struct RpcFaultDetails {
    pub code: i64,
    pub message: String,
}

impl RpcFaultDetails {
    /// Decode the `(code, "message")` part of a fault payload
    pub fn decode(text: &str) -> Result<Self> {
        match literal::parse_sequence(text)?.as_slice() {
            [Value::Int(code), Value::Str(message)] => Ok(Self {
                code: *code,
                message: message.clone(),
            }),
            other => Err(EngineError::PayloadError(format!(
                "not a fault payload: {:?}",
                other
            ))),
        }
    }

    /// Canonical fault payload, including the `raise ` prefix
    pub fn encode(&self) -> String {
        format!(
            "{}{}",
            wire::RPC_FAULT_PREFIX,
            literal::encode_sequence(&[Value::Int(self.code), Value::str(self.message.clone())])
        )
    }
}

/// The exchange kinds the engine understands
#[derive(Debug)]
pub enum TrafficKind {
    /// Raw client request toward the intercepted service
    ClientCall,

    /// Raw response from the intercepted service
    ServerResponse,

    /// Server announcing its listening address
    ServerLocation,

    /// Intercepted command-line invocation
    Command(CommandDetails),

    /// Captured standard output of a command
    Stdout,

    /// Captured standard error of a command
    Stderr,

    /// Exit status of a command
    ExitStatus(i32),

    /// Remote-procedure call toward the intercepted service
    RpcCall(RpcCallDetails),

    /// Declared remote-procedure fault
    RpcFault(RpcFaultDetails),
}

/// One logical exchange unit
#[derive(Debug)]
pub struct TrafficRecord {
    pub kind: TrafficKind,
    pub text: String,
    pub sink: ResponseSink,
}

impl TrafficRecord {
    pub fn client_call(text: impl Into<String>, sink: ResponseSink) -> Self {
        Self {
            kind: TrafficKind::ClientCall,
            text: text.into(),
            sink,
        }
    }

    pub fn server_response(text: impl Into<String>, sink: ResponseSink) -> Self {
        Self {
            kind: TrafficKind::ServerResponse,
            text: text.into(),
            sink,
        }
    }

    pub fn server_location(text: impl Into<String>, sink: ResponseSink) -> Self {
        Self {
            kind: TrafficKind::ServerLocation,
            text: text.into(),
            sink,
        }
    }

    pub fn stdout(text: impl Into<String>, sink: ResponseSink) -> Self {
        Self {
            kind: TrafficKind::Stdout,
            text: text.into(),
            sink,
        }
    }

    pub fn stderr(text: impl Into<String>, sink: ResponseSink) -> Self {
        Self {
            kind: TrafficKind::Stderr,
            text: text.into(),
            sink,
        }
    }

    pub fn exit_status(status: i32, sink: ResponseSink) -> Self {
        Self {
            kind: TrafficKind::ExitStatus(status),
            text: status.to_string(),
            sink,
        }
    }

    /// Canonical call record, used when synthesizing live RPC traffic
    pub fn rpc_call(details: RpcCallDetails, sink: ResponseSink) -> Self {
        let text = details.encode();
        Self {
            kind: TrafficKind::RpcCall(details),
            text,
            sink,
        }
    }

    /// Canonical fault record, used when a live target declares a fault
    pub fn rpc_fault(details: RpcFaultDetails, sink: ResponseSink) -> Self {
        let text = details.encode();
        Self {
            kind: TrafficKind::RpcFault(details),
            text,
            sink,
        }
    }

    /// The 3-char wire tag of this record
    pub fn tag(&self) -> &'static str {
        match self.kind {
            TrafficKind::ClientCall | TrafficKind::RpcCall(_) => "CLI",
            TrafficKind::ServerResponse
            | TrafficKind::ServerLocation
            | TrafficKind::RpcFault(_) => "SRV",
            TrafficKind::Command(_) => "CMD",
            TrafficKind::Stdout => "OUT",
            TrafficKind::Stderr => "ERR",
            TrafficKind::ExitStatus(_) => "EXC",
        }
    }

    /// Direction under the session convention. Client/server sides swap when
    /// the destination discovery flips the convention; command traffic and
    /// its responses never do.
    pub fn direction(&self, flipped: bool) -> Direction {
        match self.kind {
            TrafficKind::ClientCall | TrafficKind::RpcCall(_) => {
                if flipped {
                    Direction::Outgoing
                } else {
                    Direction::Incoming
                }
            }
            TrafficKind::ServerResponse
            | TrafficKind::ServerLocation
            | TrafficKind::RpcFault(_) => {
                if flipped {
                    Direction::Incoming
                } else {
                    Direction::Outgoing
                }
            }
            TrafficKind::Command(_) => Direction::Incoming,
            TrafficKind::Stdout | TrafficKind::Stderr | TrafficKind::ExitStatus(_) => {
                Direction::Outgoing
            }
        }
    }

    /// Whether this record carries anything worth persisting. Exit statuses
    /// always do, even zero; everything else needs non-empty text.
    pub fn has_info(&self) -> bool {
        !self.text.is_empty()
    }

    /// Serialized description: `<direction><tag>:<payload>`
    pub fn description(&self, flipped: bool) -> String {
        format!("{}{}:{}", self.direction(flipped).marker(), self.tag(), self.text)
    }

    /// Canonicalize a replayed response group for this request.
    ///
    /// Command invocations always observe exactly (stdout, stderr, exit) in
    /// that order; missing records are synthesized empty/zero, and anything
    /// beyond the three loses its response sink. Other requests pass their
    /// groups through untouched.
    pub fn filter_replay(&self, mut responses: Vec<TrafficRecord>) -> Vec<TrafficRecord> {
        if !matches!(self.kind, TrafficKind::Command(_)) {
            return responses;
        }
        if responses
            .first()
            .map_or(true, |r| !matches!(r.kind, TrafficKind::Stdout))
        {
            responses.insert(0, TrafficRecord::stdout("", self.sink.clone()));
        }
        if responses
            .get(1)
            .map_or(true, |r| !matches!(r.kind, TrafficKind::Stderr))
        {
            responses.insert(1, TrafficRecord::stderr("", self.sink.clone()));
        }
        if responses
            .get(2)
            .map_or(true, |r| !matches!(r.kind, TrafficKind::ExitStatus(_)))
        {
            responses.insert(2, TrafficRecord::exit_status(0, self.sink.clone()));
        }
        for extra in responses.iter_mut().skip(3) {
            extra.sink = ResponseSink::none();
        }
        responses
    }
}

/// Write side of the connection an exchange arrived on.
///
/// All records of one response group share the sink; partial writes leave it
/// open, `finish` half-closes it, and later writes on a finished sink are
/// silently dropped. Write failures are non-fatal: the intercepted process
/// went away, but the exchange was already recorded.
#[derive(Clone, Default)]
pub struct ResponseSink {
    inner: Option<Arc<tokio::sync::Mutex<Option<Box<dyn AsyncWrite + Send + Unpin>>>>>,
}

impl ResponseSink {
    /// A sink backed by a connection write half
    pub fn new(writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        Self {
            inner: Some(Arc::new(tokio::sync::Mutex::new(Some(Box::new(writer))))),
        }
    }

    /// A detached sink; all writes are dropped
    pub fn none() -> Self {
        Self { inner: None }
    }

    /// Write text, leaving the sink open
    pub async fn send(&self, text: &str) {
        let Some(inner) = &self.inner else { return };
        let mut guard = inner.lock().await;
        let Some(writer) = guard.as_mut() else {
            debug!("Dropping write to finished response sink");
            return;
        };
        if let Err(e) = writer.write_all(text.as_bytes()).await {
            warn!("Response sink write failed: {}", e);
        }
    }

    /// Write text, then shut the sink down
    pub async fn finish(&self, text: &str) {
        let Some(inner) = &self.inner else { return };
        let mut guard = inner.lock().await;
        let Some(mut writer) = guard.take() else {
            debug!("Response sink already finished");
            return;
        };
        if let Err(e) = writer.write_all(text.as_bytes()).await {
            warn!("Response sink write failed: {}", e);
        }
        if let Err(e) = writer.shutdown().await {
            debug!("Response sink shutdown failed: {}", e);
        }
    }
}

impl fmt::Debug for ResponseSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            Some(_) => f.write_str("ResponseSink(attached)"),
            None => f.write_str("ResponseSink(detached)"),
        }
    }
}
