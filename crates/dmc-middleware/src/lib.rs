//! `dmc-middleware` – transport plumbing for the robot control node.
//!
//! Routes raw byte payloads between the node's loops and any remote peers
//! without caring about what the bytes mean.
//!
//! # Modules
//!
//! - [`session`] – the [`Session`] contract, the in-process broadcast
//!   [`BusSession`] and the [`DryRunSession`] logging wrapper.
//! - [`ws_bridge`] – WebSocket bridge exposing a [`BusSession`] to remote
//!   peers as JSON text frames.

pub mod session;
pub mod ws_bridge;

pub use session::{BusSession, Callback, DryRunSession, Sample, Session, Subscription};
pub use ws_bridge::{BridgeFrame, WsBridge};
