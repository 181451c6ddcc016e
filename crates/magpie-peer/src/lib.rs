//! Magpie Peer Library
//!
//! This library provides the dispatcher, reliable file-transfer engine, and
//! feature handlers for a Magpie peer.

pub mod config;
pub mod context;
pub mod dispatcher;
pub mod display;
pub mod handlers;
pub mod prompt;
pub mod transfer;
