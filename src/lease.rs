//! Client-side lease state.
//!
//! [`LeaseState`] is owned by exactly one client instance. A lease is either
//! fully bound (the granted parameters together with the time they were
//! granted, see [`Binding`]) or absent; there is no partially bound state.
//! An offer that is still waiting for its ACK is held by the acquisition
//! loop, not here.
//!
//! T1 and T2 are derived from the bound lease duration on every evaluation
//! and never stored.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::time::Instant;
use tracing::debug;

use crate::identity::ClientIdentity;
use crate::message::LeaseOffer;

/// Phases of the lease state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Selecting,
    Requesting,
    Bound,
    Renewing,
    Rebinding,
    /// Terminal: acquisition attempts exhausted.
    Failed,
    /// Terminal: lease given back after cancellation.
    Released,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Init => "INIT",
            Phase::Selecting => "SELECTING",
            Phase::Requesting => "REQUESTING",
            Phase::Bound => "BOUND",
            Phase::Renewing => "RENEWING",
            Phase::Rebinding => "REBINDING",
            Phase::Failed => "FAILED",
            Phase::Released => "RELEASED",
        };
        f.write_str(name)
    }
}

/// Where a bound lease stands relative to its timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseWindow {
    /// Before T1.
    Valid,
    /// Between T1 and T2: renew with the known server.
    Renewal,
    /// Between T2 and expiry: renew with any server.
    Rebinding,
    Expired,
}

/// A lease adopted from an ACK.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    pub lease: LeaseOffer,
    /// Monotonic start used for all timer decisions.
    pub started_at: Instant,
    /// Wall-clock start, for display.
    pub granted_at: DateTime<Utc>,
}

impl Binding {
    pub fn new(lease: LeaseOffer, started_at: Instant) -> Self {
        Self {
            lease,
            started_at,
            granted_at: Utc::now(),
        }
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started_at)
    }

    pub fn window(&self, now: Instant) -> LeaseWindow {
        let elapsed = self.elapsed(now);
        if elapsed >= self.lease.lease_duration() {
            LeaseWindow::Expired
        } else if elapsed >= self.lease.rebinding_time() {
            LeaseWindow::Rebinding
        } else if elapsed >= self.lease.renewal_time() {
            LeaseWindow::Renewal
        } else {
            LeaseWindow::Valid
        }
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.granted_at + TimeDelta::seconds(i64::from(self.lease.lease_seconds))
    }

    /// Whole seconds left before the lease runs out, saturating at zero.
    pub fn remaining_seconds(&self, now: Instant) -> u64 {
        self.lease
            .lease_duration()
            .saturating_sub(self.elapsed(now))
            .as_secs()
    }
}

/// Everything one client instance knows about its lease.
#[derive(Debug, Clone)]
pub struct LeaseState {
    identity: ClientIdentity,
    server_address: SocketAddr,
    binding: Option<Binding>,
    phase: Phase,
}

impl LeaseState {
    /// Creates an unbound state. Until a server answers, the server address
    /// is the broadcast destination.
    pub fn new(identity: ClientIdentity, broadcast: SocketAddr) -> Self {
        Self {
            identity,
            server_address: broadcast,
            binding: None,
            phase: Phase::Init,
        }
    }

    pub fn identity(&self) -> ClientIdentity {
        self.identity
    }

    pub fn server_address(&self) -> SocketAddr {
        self.server_address
    }

    pub fn binding(&self) -> Option<&Binding> {
        self.binding.as_ref()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn bound_ip(&self) -> Option<Ipv4Addr> {
        self.binding.map(|binding| binding.lease.assigned_ip)
    }

    pub fn set_phase(&mut self, phase: Phase) {
        if self.phase != phase {
            debug!("{}: {} -> {}", self.identity, self.phase, phase);
            self.phase = phase;
        }
    }

    pub fn set_server_address(&mut self, address: SocketAddr) {
        self.server_address = address;
    }

    /// Adopts an acknowledged lease and enters BOUND.
    ///
    /// Used for the initial ACK as well as for successful renewals, which
    /// restart the lease clock.
    pub fn bind(&mut self, lease: LeaseOffer, server: SocketAddr, now: Instant) {
        self.binding = Some(Binding::new(lease, now));
        self.server_address = server;
        self.set_phase(Phase::Bound);
    }

    /// Discards the expired lease. Identity and server address survive.
    pub fn expire(&mut self) {
        self.binding = None;
        self.set_phase(Phase::Init);
    }

    pub fn release(&mut self) {
        self.binding = None;
        self.set_phase(Phase::Released);
    }

    pub fn fail(&mut self) {
        self.binding = None;
        self.set_phase(Phase::Failed);
    }
}
