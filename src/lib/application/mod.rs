//! # Application Module
//!
//! Core logic: talking to capability servers, routing operations across them,
//! and the agent loop that uses both.
//!
//! ## Submodules
//!
//! - [`capability`] - One client per remote capability server
//! - [`router`] - Flat operation namespace across all servers
//! - [`agent`] - Bounded model/tool loop with streamed progress
//! - [`retrieval`] - Optional context retrieval before a run
//! - [`service`] - What the stdio and REST front ends share
//! - [`stdio`] - Interactive command-line session

pub mod agent;
pub mod capability;
pub mod retrieval;
pub mod router;
pub mod service;
pub mod stdio;
