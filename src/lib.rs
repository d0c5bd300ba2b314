//! # leaseclient
//!
//! A lease client for a text-framed, DHCP-style protocol carried over UDP
//! broadcast.
//!
//! ## Features
//!
//! - DISCOVER / OFFER / REQUEST / ACK acquisition with a shared retry budget
//! - Lease monitoring with T1 (unicast) renewal and T2 (broadcast) rebinding
//! - Full rediscovery when a lease expires
//! - RELEASE on cancellation while bound
//! - Many independent clients in one process for load simulation
//! - Async/await with Tokio
//!
//! ## Quick Start
//!
//! ```no_run
//! use leaseclient::{Config, Orchestrator};
//! use tokio::sync::watch;
//!
//! #[tokio::main]
//! async fn main() -> leaseclient::Result<()> {
//!     let config = Config::load_or_create("config.json")?;
//!     let (_cancel_tx, cancel_rx) = watch::channel(false);
//!     let outcome = Orchestrator::new(config).run_single(cancel_rx).await?;
//!     println!("{:?}", outcome);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`ClientIdentity`] - MAC-like identifier, one per client instance
//! - [`ProtocolMessage`] - Text message encoding and decoding
//! - [`Transport`] / [`UdpTransport`] - Broadcast-capable datagram endpoint
//! - [`LeaseClient`] - The lease state machine
//! - [`Orchestrator`] - Runs one client, or many concurrently

pub mod client;
pub mod config;
pub mod error;
pub mod identity;
pub mod lease;
pub mod message;
pub mod orchestrator;
pub mod transport;

pub use client::{LeaseClient, Outcome};
pub use config::Config;
pub use error::{Error, Result};
pub use identity::ClientIdentity;
pub use lease::{Binding, LeaseState, LeaseWindow, Phase};
pub use message::{LeaseOffer, MessageKind, ProtocolMessage};
pub use orchestrator::{InstanceReport, Orchestrator};
pub use transport::{Datagram, Transport, UdpTransport};
