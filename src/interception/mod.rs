// src/interception/mod.rs
//! Traffic interception layer
//!
//! A TCP listener stands between the test harness and the system under
//! test. Shim executables and redirected clients send each exchange here;
//! the server records it and answers from the replay index or by forwarding
//! live, depending on the session mode.
//!
//! - **Server**: listener, accept loop, exchange processing, control surface
//! - **Session**: per-session state, destination discovery state machine

pub mod server;
pub mod session;

pub use server::TrafficServer;
pub use session::{DestinationState, SessionState};
