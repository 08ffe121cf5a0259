//! # netmux Demos
//!
//! Demo binaries for the netmux ecosystem.
//!
//! ## Running Demos
//!
//! Run a demo with:
//!
//! ```bash
//! cargo run --example echo_server_tcp -- --debug
//! cargo run --example echo_client_tcp -- --port 8080
//! ```

#![warn(rust_2018_idioms)]
#![allow(dead_code)]

// Helper module that demos can use
pub mod helpers;
