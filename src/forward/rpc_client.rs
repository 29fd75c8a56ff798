// src/forward/rpc_client.rs
//! Live invocation of remote-procedure calls
//!
//! The call travels as its canonical `method(args...)` text over the same
//! connect/write/half-close/read exchange as raw client traffic. A reply
//! prefixed `raise ` decodes as a declared fault; any other reply that
//! parses as a literal value is re-encoded canonically, so recorded traffic
//! is identical whether it came from live forwarding or replay.

use crate::forward::socket_relay;
use crate::traffic::wire::RPC_FAULT_PREFIX;
use crate::traffic::{literal, ResponseSink, RpcCallDetails, RpcFaultDetails, TrafficRecord};
use tracing::{debug, warn};

/// Invoke the named procedure against the live target
pub async fn invoke(
    call: &RpcCallDetails,
    destination: &str,
    sink: &ResponseSink,
) -> Vec<TrafficRecord> {
    let request = call.encode();
    match socket_relay::exchange(&request, destination).await {
        Ok(reply) => vec![decode_reply(reply, sink)],
        Err(e) => {
            warn!(
                "RPC target at {} dropped the connection during {}: {}",
                destination, call.method, e
            );
            Vec::new()
        }
    }
}

fn decode_reply(reply: String, sink: &ResponseSink) -> TrafficRecord {
    let trimmed = reply.trim_end();
    if let Some(rest) = trimmed.strip_prefix(RPC_FAULT_PREFIX) {
        match RpcFaultDetails::decode(rest) {
            Ok(details) => return TrafficRecord::rpc_fault(details, sink.clone()),
            Err(e) => debug!("Fault-like reply did not decode ({}); passing through", e),
        }
    }
    match literal::parse_value(trimmed) {
        Ok(value) => TrafficRecord::server_response(value.to_string(), sink.clone()),
        Err(_) => TrafficRecord::server_response(reply, sink.clone()),
    }
}
