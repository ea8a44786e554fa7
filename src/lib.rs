// lib.rs
//! Document question answering driven by agents that only talk through a
//! trace-correlated message bus.
//!
//! The [`coordinator::Coordinator`] starts a trace per job, publishes the first
//! request and turns the resulting scatter of messages into one outcome. The
//! agents (ingestion, retrieval, response) each react to their own message types.

pub mod agent;
pub mod bus;
pub mod chunking;
pub mod config;
pub mod coordinator;
pub mod document;
pub mod error;
pub mod ingestion_agent;
pub mod message;
pub mod prompt;
pub mod provider;
pub mod ranking;
pub mod response_agent;
pub mod retrieval_agent;
pub mod service;
pub mod state;
pub mod trace;
pub mod ui;

pub use bus::MessageBus;
pub use config::Config;
pub use coordinator::Coordinator;
pub use error::RagError;
pub use service::RagService;
