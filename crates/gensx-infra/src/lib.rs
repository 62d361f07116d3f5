//! Infrastructure layer for GenSX.
//!
//! Contains implementations of the ports defined in `gensx-core`: the SQLite
//! checkpoint store, the hosted checkpoint API client, configuration
//! loading, and the sink factory that picks between them.

pub mod config;
pub mod http;
pub mod sink;
pub mod sqlite;
