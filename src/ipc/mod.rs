//! Remote control surface
//!
//! Lets one client at a time query the protocol version and the active
//! mode, or switch modes.

mod protocol;
mod server;

pub use server::Server;
