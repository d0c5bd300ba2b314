//! Runs lease clients.
//!
//! Every client instance gets its own identity, its own socket, and its own
//! lease state. Nothing is shared between instances, so they run as
//! independent tokio tasks without locks.

use std::net::Ipv4Addr;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::client::{LeaseClient, Outcome};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::identity::ClientIdentity;
use crate::message::LeaseOffer;
use crate::transport::UdpTransport;

/// Result of one simulated client.
#[derive(Debug)]
pub struct InstanceReport {
    pub instance: usize,
    pub identity: ClientIdentity,
    pub result: Result<LeaseOffer>,
}

impl InstanceReport {
    pub fn assigned_ip(&self) -> Option<Ipv4Addr> {
        self.result.as_ref().ok().map(|lease| lease.assigned_ip)
    }
}

pub struct Orchestrator {
    config: Arc<Config>,
}

impl Orchestrator {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Runs one client that keeps its lease until `cancel` fires.
    ///
    /// Binds the well-known client port unless `bind_client_port` is off.
    /// Socket setup errors are returned before any message is sent.
    pub async fn run_single(&self, cancel: watch::Receiver<bool>) -> Result<Outcome> {
        let identity = ClientIdentity::generate(0);
        info!("Client identity: {}", identity);

        let port = if self.config.bind_client_port {
            self.config.client_port
        } else {
            0
        };
        let transport = UdpTransport::bind(port)?;
        info!(
            "Client socket ready on port {}",
            transport.local_addr().map(|addr| addr.port()).unwrap_or(port)
        );

        let mut client = LeaseClient::new(Arc::clone(&self.config), identity, transport, cancel);
        client.run().await
    }

    /// Starts `clients` instances at once, each acquiring a single lease on
    /// an ephemeral port, and waits for all of them.
    ///
    /// Instances do not monitor or renew their leases. A failing instance
    /// does not affect the others; its error is part of its report.
    pub async fn run_simulation(&self, clients: usize) -> Result<Vec<InstanceReport>> {
        let mut tasks = JoinSet::new();

        for instance in 0..clients {
            let config = Arc::clone(&self.config);
            tasks.spawn(simulate_instance(config, instance));
        }

        let mut reports = Vec::with_capacity(clients);
        while let Some(joined) = tasks.join_next().await {
            reports.push(joined?);
        }
        reports.sort_by_key(|report| report.instance);

        let acquired = reports.iter().filter(|report| report.result.is_ok()).count();
        info!("{} of {} simulated clients acquired a lease", acquired, clients);

        Ok(reports)
    }
}

async fn simulate_instance(config: Arc<Config>, instance: usize) -> InstanceReport {
    let identity = ClientIdentity::generate(instance as u64);
    info!("Client {} identity: {}", instance, identity);

    // Simulated clients cannot be cancelled; the sender is dropped right away.
    let (_, cancel) = watch::channel(false);
    let result = acquire_once(config, identity, cancel).await;
    match &result {
        Ok(lease) => info!("Client {} bound to {}", instance, lease.assigned_ip),
        Err(error @ Error::AcquisitionFailed { .. }) => warn!("Client {}: {}", instance, error),
        Err(error) => error!("Client {} failed: {}", instance, error),
    }

    InstanceReport {
        instance,
        identity,
        result,
    }
}

async fn acquire_once(
    config: Arc<Config>,
    identity: ClientIdentity,
    cancel: watch::Receiver<bool>,
) -> Result<LeaseOffer> {
    let transport = UdpTransport::bind(0)?;
    let mut client = LeaseClient::new(config, identity, transport, cancel);

    client.run_acquisition().await?.ok_or(Error::Cancelled)
}
