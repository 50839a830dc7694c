//! This module exports a minimal message-passing API, which is encapsulated
//! by a `Communicator` trait. Implementors only need to write `send` and
//! `recv` operations for a given transport layer. The trait then provides
//! default implementations for broadcast, reduce, and reduce-all operations.
//! Two transports are included: `SingleRank` for serial programs, and
//! `ChannelCommunicator`, which runs ranks as threads connected by crossbeam
//! channels.
//!

pub mod channel;
pub mod comm;
pub mod util;

pub use channel::ChannelCommunicator;
pub use comm::{Communicator, SingleRank};
