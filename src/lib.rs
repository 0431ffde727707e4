//! Replicated consensus core: a leader-based replicated log (Raft family)
//! ordering client commands across a fixed set of peers, with two
//! non-standard extensions toggled by [`config::RaftConfig`]: dynamic-quorum
//! election/commit and last-write-wins reconciliation of truncated entries.
//!
//! Applications integrate by implementing [`apply::StateMachine`] and driving
//! a [`node::Node`], calling [`node::Node::propose`] for each client command.

#[macro_use]
extern crate serde_derive;
#[macro_use]
extern crate error_chain;

pub mod apply;
pub mod config;
pub mod consensus;
pub mod errors;
pub mod log;
pub mod node;
pub mod protos;
mod state;
pub mod store;
pub mod timer;
pub mod transport;
