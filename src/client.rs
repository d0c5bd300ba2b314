//! The lease state machine.
//!
//! A [`LeaseClient`] drives one client instance through acquisition
//! (SELECTING and REQUESTING), monitors the bound lease at a fixed tick, and
//! renews it at T1 (unicast) and T2 (broadcast). When the lease runs out the
//! client starts over from INIT with the same identity.
//!
//! Acquisition failures share one attempt budget. Renewal failures are never
//! fatal; the attempt is repeated on the next evaluation for as long as the
//! lease remains in that window.
//!
//! Cancellation is only observed between protocol exchanges: before each
//! acquisition attempt and at every monitoring tick. A RELEASE is sent only
//! if the lease is bound at that moment.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::identity::ClientIdentity;
use crate::lease::{LeaseState, LeaseWindow, Phase};
use crate::message::{LeaseOffer, MessageKind, ProtocolMessage};
use crate::transport::Transport;

/// How a client run ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The bound lease was given back after cancellation.
    Released { ip: Ipv4Addr },
    /// Cancellation arrived while no lease was bound; nothing was released.
    Cancelled,
}

enum MonitorExit {
    Expired,
    Finished(Outcome),
}

pub struct LeaseClient<T: Transport> {
    config: Arc<Config>,
    transport: T,
    state: LeaseState,
    cancel: watch::Receiver<bool>,
}

impl<T: Transport> LeaseClient<T> {
    /// Creates a client in INIT.
    ///
    /// Sending `true` on the sender side of `cancel` asks the client to
    /// release its lease and stop.
    pub fn new(
        config: Arc<Config>,
        identity: ClientIdentity,
        transport: T,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        let state = LeaseState::new(identity, config.server_broadcast());
        Self {
            config,
            transport,
            state,
            cancel,
        }
    }

    pub fn state(&self) -> &LeaseState {
        &self.state
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn identity(&self) -> ClientIdentity {
        self.state.identity()
    }

    /// Acquires a lease and keeps it until cancellation or a fatal error.
    ///
    /// The transport is closed on every exit path.
    pub async fn run(&mut self) -> Result<Outcome> {
        let result = self.acquire_and_monitor().await;
        self.transport.close();
        result
    }

    /// Acquires a lease once, without monitoring it, then closes the
    /// transport.
    ///
    /// Returns `None` if cancellation arrived first.
    pub async fn run_acquisition(&mut self) -> Result<Option<LeaseOffer>> {
        let result = self.acquire().await;
        self.transport.close();
        result
    }

    async fn acquire_and_monitor(&mut self) -> Result<Outcome> {
        loop {
            if self.acquire().await?.is_none() {
                return Ok(Outcome::Cancelled);
            }

            match self.monitor().await? {
                MonitorExit::Expired => continue,
                MonitorExit::Finished(outcome) => return Ok(outcome),
            }
        }
    }

    /// Runs DISCOVER/OFFER/REQUEST/ACK until a lease is bound.
    ///
    /// Timeouts, malformed replies, and replies of the wrong kind each use
    /// up one attempt; after `max_attempts` of them the client enters FAILED.
    /// Transport errors end acquisition immediately. Returns `None` if
    /// cancellation is observed between attempts.
    pub async fn acquire(&mut self) -> Result<Option<LeaseOffer>> {
        let identity = self.identity();
        let max_attempts = self.config.max_attempts;
        let mut failures = 0;

        self.state.set_phase(Phase::Init);

        while failures < max_attempts {
            if self.is_cancelled() {
                info!("{}: cancelled before a lease was bound", identity);
                return Ok(None);
            }

            self.state.set_phase(Phase::Selecting);
            let (offer, server) = match self.select().await {
                Ok(found) => found,
                Err(error) if error.is_retryable() => {
                    failures += 1;
                    warn!(
                        "{}: no usable OFFER ({}), attempt {}/{}",
                        identity, error, failures, max_attempts
                    );
                    continue;
                }
                Err(error) => {
                    self.state.fail();
                    return Err(error);
                }
            };

            info!(
                "{}: OFFER {} from {} (lease {}s)",
                identity, offer.assigned_ip, server, offer.lease_seconds
            );
            self.state.set_server_address(server);
            self.state.set_phase(Phase::Requesting);

            match self.request(offer.assigned_ip).await {
                Ok((lease, source)) => {
                    self.state.bind(lease, source, Instant::now());
                    self.log_lease("Lease acquired", &lease);
                    return Ok(Some(lease));
                }
                Err(error) if error.is_retryable() => {
                    failures += 1;
                    warn!(
                        "{}: no usable ACK ({}), attempt {}/{}",
                        identity, error, failures, max_attempts
                    );
                }
                Err(error) => {
                    self.state.fail();
                    return Err(error);
                }
            }
        }

        self.state.fail();
        error!(
            "{}: no lease obtained after {} attempts",
            identity, max_attempts
        );
        Err(Error::AcquisitionFailed {
            attempts: failures,
        })
    }

    async fn select(&mut self) -> Result<(LeaseOffer, SocketAddr)> {
        let discover = ProtocolMessage::Discover {
            identity: self.identity(),
        };
        self.exchange(self.config.server_broadcast(), &discover, MessageKind::Offer)
            .await
    }

    async fn request(&mut self, ip: Ipv4Addr) -> Result<(LeaseOffer, SocketAddr)> {
        let request = ProtocolMessage::Request {
            identity: self.identity(),
            ip,
        };
        self.exchange(self.state.server_address(), &request, MessageKind::Ack)
            .await
    }

    /// Sends one message and waits for one reply of the expected kind.
    async fn exchange(
        &self,
        destination: SocketAddr,
        message: &ProtocolMessage,
        expected: MessageKind,
    ) -> Result<(LeaseOffer, SocketAddr)> {
        self.transport
            .send_to(destination, &message.encode())
            .await?;
        debug!("{}: {} sent to {}", self.identity(), message.kind(), destination);

        let datagram = self.transport.recv(self.config.receive_timeout()).await?;
        match (ProtocolMessage::decode(&datagram.payload)?, expected) {
            (ProtocolMessage::Offer(lease), MessageKind::Offer)
            | (ProtocolMessage::Ack(lease), MessageKind::Ack) => Ok((lease, datagram.source)),
            (other, _) => Err(Error::InvalidMessage(format!(
                "expected {}, received {} from {}",
                expected,
                other.kind(),
                datagram.source
            ))),
        }
    }

    async fn monitor(&mut self) -> Result<MonitorExit> {
        loop {
            if self.is_cancelled() {
                return Ok(MonitorExit::Finished(self.release().await));
            }

            let Some(binding) = self.state.binding().copied() else {
                return Ok(MonitorExit::Expired);
            };

            match binding.window(Instant::now()) {
                LeaseWindow::Expired => {
                    warn!(
                        "{}: lease on {} expired, restarting discovery",
                        self.identity(),
                        binding.lease.assigned_ip
                    );
                    self.state.expire();
                    return Ok(MonitorExit::Expired);
                }
                LeaseWindow::Rebinding => self.rebind(binding.lease.assigned_ip).await,
                LeaseWindow::Renewal => self.renew(binding.lease.assigned_ip).await,
                LeaseWindow::Valid => self.idle().await,
            }
        }
    }

    /// T1: ask the server that granted the lease to extend it.
    async fn renew(&mut self, ip: Ipv4Addr) {
        self.state.set_phase(Phase::Renewing);
        let server = self.state.server_address();
        info!("{}: T1 reached, renewing {} with {}", self.identity(), ip, server);

        let result = self.request(ip).await;
        match result {
            Ok((lease, source)) => {
                self.state.bind(lease, source, Instant::now());
                self.log_lease("Lease renewed", &lease);
            }
            Err(error) => {
                self.state.set_phase(Phase::Bound);
                warn!(
                    "{}: renewal with {} failed: {} ({}s left)",
                    self.identity(),
                    server,
                    error,
                    self.seconds_left()
                );
                self.pause_after(&error).await;
            }
        }
    }

    /// T2: ask any server to extend the lease.
    ///
    /// The server address points at the broadcast destination only for the
    /// duration of the exchange; the known server is restored afterwards.
    async fn rebind(&mut self, ip: Ipv4Addr) {
        self.state.set_phase(Phase::Rebinding);
        let known_server = self.state.server_address();
        info!("{}: T2 reached, rebinding {} by broadcast", self.identity(), ip);

        self.state.set_server_address(self.config.server_broadcast());
        let result = self.request(ip).await;
        match result {
            Ok((lease, source)) => {
                debug!("{}: rebinding answered by {}", self.identity(), source);
                self.state.bind(lease, known_server, Instant::now());
                self.log_lease("Lease rebound", &lease);
            }
            Err(error) => {
                self.state.set_server_address(known_server);
                self.state.set_phase(Phase::Bound);
                warn!(
                    "{}: rebinding failed: {} ({}s left)",
                    self.identity(),
                    error,
                    self.seconds_left()
                );
                self.pause_after(&error).await;
            }
        }
    }

    async fn release(&mut self) -> Outcome {
        let Some(ip) = self.state.bound_ip() else {
            return Outcome::Cancelled;
        };

        let release = ProtocolMessage::Release {
            identity: self.identity(),
            ip,
        };
        let server = self.state.server_address();
        match self.transport.send_to(server, &release.encode()).await {
            Ok(()) => info!("{}: RELEASE {} sent to {}", self.identity(), ip, server),
            Err(error) => error!("{}: failed to send RELEASE for {}: {}", self.identity(), ip, error),
        }

        self.state.release();
        Outcome::Released { ip }
    }

    /// Waits one tick, waking early on cancellation.
    async fn idle(&mut self) {
        let tick = self.config.tick();
        let cancel = &mut self.cancel;
        tokio::select! {
            _ = tokio::time::sleep(tick) => {}
            _ = wait_for_cancel(cancel) => {}
        }
    }

    /// A timed-out attempt has already waited; anything else waits a tick
    /// so a failing socket or a chatty server is not hammered.
    async fn pause_after(&mut self, error: &Error) {
        if !matches!(error, Error::Timeout(_)) {
            self.idle().await;
        }
    }

    fn seconds_left(&self) -> u64 {
        self.state
            .binding()
            .map(|binding| binding.remaining_seconds(Instant::now()))
            .unwrap_or(0)
    }

    fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    fn log_lease(&self, event: &str, lease: &LeaseOffer) {
        let expires_at = self
            .state
            .binding()
            .map(|binding| binding.expires_at().format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_default();
        info!(
            "{}: {} {} mask {} gateway {} dns {} ({}s, T1 {}s, T2 {}s, expires {})",
            self.identity(),
            event,
            lease.assigned_ip,
            lease.subnet_mask,
            lease.gateway,
            lease.dns_server,
            lease.lease_seconds,
            lease.renewal_seconds(),
            lease.rebinding_seconds(),
            expires_at
        );
    }
}

/// Resolves once cancellation is requested. Never resolves if the sender is
/// gone, since nobody can cancel any more.
async fn wait_for_cancel(cancel: &mut watch::Receiver<bool>) {
    if cancel.wait_for(|cancelled| *cancelled).await.is_err() {
        std::future::pending::<()>().await;
    }
}
