//! JSON-RPC 2.0 over stdio
//!
//! One request per line on stdin, one response per line on stdout.

pub mod stdio;
pub mod types;
