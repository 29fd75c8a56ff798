// src/recording/mod.rs
//! Traffic recording
//!
//! Every exchange the server handles, request and responses alike, is
//! appended to the session trace as soon as it is observed. The trace is an
//! ordered plain-text log that later builds the replay index.

pub mod trace_writer;

pub use trace_writer::TraceWriter;
