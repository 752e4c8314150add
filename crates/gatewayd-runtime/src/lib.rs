//! # gatewayd-runtime
//!
//! Core runtime for gatewayd: a protocol gateway that aggregates multiple
//! stdio-JSON-RPC backend processes (the Model Context Protocol) behind a
//! single authenticated HTTPS+SSE endpoint.
//!
//! Four subsystems do the interesting work:
//!
//! - [`backend`] — Backend Adapter (stdio framing, request/response
//!   correlation) and Backend Registry (supervision, restart policy,
//!   catalog publication).
//! - [`catalog`] and [`router`] — the union catalog merge and dispatch to
//!   the owning backend.
//! - [`session`] — per-client SSE session state and fan-out.
//! - [`auth`] — OAuth2 grant processing, static bearer fallback, and token
//!   stores.
//!
//! [`gateway`] implements the MCP handshake the gateway owns locally;
//! [`server`] wires all of the above onto the HTTP surface described in the
//! spec's External Interfaces section.

pub mod auth;
pub mod backend;
pub mod backoff;
pub mod catalog;
pub mod error;
pub mod gateway;
pub mod jsonrpc;
pub mod ratelimit;
pub mod router;
pub mod server;
pub mod session;
pub mod state;
pub mod telemetry;

pub use error::{Error, Result};
pub use gateway::Gateway;
pub use server::GatewayServer;
pub use state::AppState;
