// ledgerlink-api: Async transport for the Ledgerlink banking API (REST + STOMP)

pub mod error;
pub mod realtime;
pub mod rest;
pub mod stomp;
pub mod transport;

pub use error::Error;
pub use realtime::{RealtimeConnector, RealtimeSession, StompConnector};
pub use rest::{RestClient, RestRequest, RestResponse};
pub use transport::{TlsMode, TransportConfig};

// Re-exported so downstream crates build requests without a direct reqwest dependency.
pub use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
pub use reqwest::{Method, StatusCode};
