//! User-mode bridge between the FireShock driver and controller sinks
//!
//! ```text
//! Enumerator ──new path──► open + handshake ──► Registry ──► engine
//!                                                  ▲            │
//!                                        sink ◄────┴── reports / disconnect
//! ```
//!
//! Layers, leaves first: [`protocol`] and [`codec`] describe the wire,
//! [`io`] owns OS handles, [`device`] runs one engine per controller,
//! [`registry`] and [`enumerator`] manage the set of engines and
//! [`service`] ties them together.

pub mod codec;
pub mod config;
pub mod device;
pub mod enumerator;
pub mod io;
pub mod protocol;
pub mod registry;
pub mod service;
pub mod sink;
