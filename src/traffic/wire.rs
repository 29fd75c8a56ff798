// src/traffic/wire.rs
//! Record framing and the shim wire contract
//!
//! A serialized record is one or more lines of
//! `<direction><3-char-tag>:<payload>`; lines that do not start with a
//! direction marker extend the previous payload. The same framing is used in
//! trace files and, prefix-tagged, on the interception socket.

use crate::traffic::command::CommandDetails;
use crate::traffic::{ResponseSink, RpcCallDetails, RpcFaultDetails, TrafficKind, TrafficRecord};
use crate::utils::config::{EnvFilter, WireProtocol};
use crate::utils::errors::Result;
use tracing::{debug, warn};

/// Marker of records flowing into the server
pub const INCOMING_MARKER: &str = "<-";

/// Marker of records flowing back out
pub const OUTGOING_MARKER: &str = "->";

/// Socket prefix announcing a server's listening address
pub const SERVER_LOCATION_PREFIX: &str = "SUT_SERVER:";

/// Socket prefix carrying an intercepted command invocation
pub const COMMAND_LINE_PREFIX: &str = "SUT_COMMAND_LINE:";

/// Separator between the argv, environment and cwd fields of a command payload
pub const COMMAND_FIELD_SEP: &str = ":SUT_SEP:";

/// Separator between the stdout, stderr and exit fields relayed back to a shim
pub const COMMAND_RESPONSE_SEP: &str = "|MIM_CMD_SEP|";

/// Prefix marking a declared remote-procedure fault payload
pub const RPC_FAULT_PREFIX: &str = "raise ";

/// Environment variable publishing the server's listening address;
/// unset or empty disables interception in shim/client processes
pub const ADDRESS_VARIABLE: &str = "MIMIC_SERVER";

/// Does this line open a new record?
pub fn starts_record(line: &str) -> bool {
    line.starts_with(INCOMING_MARKER) || line.starts_with(OUTGOING_MARKER)
}

/// Serialize a record into its trace form, guaranteeing the trailing newline
pub fn trace_line(record: &TrafficRecord, flipped: bool) -> String {
    let mut line = record.description(flipped);
    if !line.ends_with('\n') {
        line.push('\n');
    }
    line
}

/// Parse a payload read from the interception socket into a request record.
///
/// The socket prefixes select announcements and command invocations; any
/// other payload is client traffic — a remote-procedure call when the
/// session protocol says so, opaque text otherwise.
pub fn parse_request(
    payload: &str,
    sink: ResponseSink,
    protocol: WireProtocol,
    filter: &EnvFilter,
) -> Result<TrafficRecord> {
    if let Some(rest) = payload.strip_prefix(SERVER_LOCATION_PREFIX) {
        return Ok(TrafficRecord::server_location(rest, sink));
    }
    if let Some(rest) = payload.strip_prefix(COMMAND_LINE_PREFIX) {
        let (details, text) = CommandDetails::decode(rest, filter)?;
        return Ok(TrafficRecord {
            kind: TrafficKind::Command(details),
            text,
            sink,
        });
    }
    Ok(client_record(payload.to_string(), sink, protocol))
}

/// Reconstruct a response record from a raw trace entry (direction marker,
/// tag, payload, possible continuation lines). Entries that cannot answer a
/// request, like command invocations, reconstruct to nothing.
pub fn parse_trace_entry(
    entry: &str,
    sink: ResponseSink,
    protocol: WireProtocol,
) -> Option<TrafficRecord> {
    let tag = entry.as_bytes().get(2..5)?;
    if entry.as_bytes().get(5) != Some(&b':') {
        warn!("Ignoring unframed trace entry {:?}", entry);
        return None;
    }
    let text = entry[6..].to_string();
    match tag {
        b"CLI" => Some(client_record(text, sink, protocol)),
        b"SRV" => Some(server_record(text, sink, protocol)),
        b"OUT" => Some(TrafficRecord::stdout(text, sink)),
        b"ERR" => Some(TrafficRecord::stderr(text, sink)),
        b"EXC" => Some(exit_record(text, sink)),
        b"CMD" => {
            debug!("Command invocations replay through their responses only");
            None
        }
        _ => {
            warn!("Ignoring trace entry with unknown tag {:?}", entry);
            None
        }
    }
}

fn client_record(text: String, sink: ResponseSink, protocol: WireProtocol) -> TrafficRecord {
    if protocol == WireProtocol::Rpc {
        match RpcCallDetails::decode(text.trim_end()) {
            Ok(details) => {
                return TrafficRecord {
                    kind: TrafficKind::RpcCall(details),
                    text,
                    sink,
                }
            }
            Err(e) => debug!("Client payload is not a call ({}); treating as raw", e),
        }
    }
    TrafficRecord::client_call(text, sink)
}

fn server_record(text: String, sink: ResponseSink, protocol: WireProtocol) -> TrafficRecord {
    if protocol == WireProtocol::Rpc {
        if let Some(rest) = text.trim_end().strip_prefix(RPC_FAULT_PREFIX) {
            match RpcFaultDetails::decode(rest) {
                Ok(details) => {
                    return TrafficRecord {
                        kind: TrafficKind::RpcFault(details),
                        text,
                        sink,
                    }
                }
                Err(e) => debug!("Fault-like payload did not decode ({}); treating as raw", e),
            }
        }
    }
    TrafficRecord::server_response(text, sink)
}

fn exit_record(text: String, sink: ResponseSink) -> TrafficRecord {
    let status = match text.trim().parse::<i32>() {
        Ok(status) => status,
        Err(_) => {
            warn!("Unparseable exit status {:?}, assuming 0", text);
            0
        }
    };
    TrafficRecord {
        kind: TrafficKind::ExitStatus(status),
        text,
        sink,
    }
}
