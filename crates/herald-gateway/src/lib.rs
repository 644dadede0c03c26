//! The realtime side of Herald: who is connected, and pushing events at
//! them.
//!
//! [`registry`] tracks live connections, [`fanout`] turns actions into
//! durable notifications plus best-effort live events, and [`connection`]
//! drives an individual WebSocket.

pub mod connection;
pub mod fanout;
pub mod registry;
