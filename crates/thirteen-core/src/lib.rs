//! Core logic for the Three Thirteen card game server.
//!
//! This crate is transport-agnostic — it knows nothing about WebSockets,
//! channels, or rooms.  The `thirteen-server` crate wires it up to a
//! concrete transport.

pub mod cards;
pub mod game;
pub mod meld;
pub mod protocol;
