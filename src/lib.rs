//! Core request-execution pipeline, order book, and streaming engine for a
//! cryptocurrency exchange REST/WebSocket client.
//!
//! Out of scope: the exchange's wire-format OpenAPI document itself,
//! configuration loading from the environment or a secret store, CLIs and
//! sample strategies, and telemetry exporters. This crate exposes counters
//! a caller wires to one.

pub mod aggregator;
pub mod cache;
pub mod clock;
pub mod config;
pub mod credential;
pub mod decimal;
pub mod error;
pub mod facade;
pub mod middleware;
pub mod models;
pub mod order_tracker;
pub mod orderbook;
pub mod pagination;
pub mod rate_limit;
pub mod rest;
pub mod telemetry;
pub mod token;
pub mod websocket;

pub use config::ClientConfig;
pub use credential::{Credential, CredentialProvider, NoCredentialProvider, StaticCredentialProvider};
pub use error::{Error, Result};
pub use facade::Client;
pub use orderbook::{BookEvent, Level, OrderBook, Side, UpdateKind};
pub use websocket::{Channel, ConnectionState, StreamEvent, SubscriptionKey};
