//! Client-side invocation engine for RPC middleware.
//!
//! An [`invocation::Invocation`] tracks one outstanding logical remote call
//! end-to-end: request envelope encoding, handoff to a transport capability,
//! retry orchestration, invocation deadlines, batch aggregation, and
//! exactly-once completion through blocking waits or registered callbacks.
//!
//! The transport itself (connections, sockets, collocated dispatch) is
//! consumed through the narrow trait seams in [`transport`].

pub mod batch;
pub mod constants;
pub mod invocation;
pub mod proto;
pub mod transport;
pub mod utils;
