//! Minimal IRC client: just enough of the protocol to register, join
//! channels, and shuttle PRIVMSGs between the server and the router.

pub mod client;
pub mod codec;
pub mod message;
