//
// Copyright (c) The Route Control Plane Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Mutex;

use ipnetwork::IpNetwork;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::error::Error;
use crate::neighbor::{self, NbrCommand};
use crate::packet::attribute::{Nlri, NextHop, PathAttrs};
use crate::rib::{HandleAllocator, PathHandle, Rib, RibEntry};

/// Static configuration for the local router: its BGP identifier, the
/// (shared, since this is an iBGP-only speaker) local/remote ASN, and the
/// next hop to use for IPv6 NLRI, which BGP cannot carry in NEXT_HOP
/// itself (see SPEC_FULL.md §9).
#[derive(Clone, Debug)]
pub struct RouterConfig {
    pub router_id: Ipv4Addr,
    pub asn: u32,
    pub ipv6_next_hop: Option<Ipv6Addr>,
}

/// One configured upstream neighbor. `asn` must equal the local router's
/// ASN: this speaker only ever runs iBGP sessions.
#[derive(Clone, Copy, Debug)]
pub struct PeerConfig {
    pub addr: IpAddr,
    pub port: u16,
    pub asn: u32,
}

impl PeerConfig {
    /// A peer reached on the standard BGP port (179).
    pub fn new(addr: IpAddr, asn: u32) -> PeerConfig {
        PeerConfig {
            addr,
            port: crate::packet::consts::BGP_PORT,
            asn,
        }
    }
}

struct PeerHandle {
    tx: mpsc::UnboundedSender<NbrCommand>,
    task: JoinHandle<()>,
}

/// The embedded BGP speaker. Owns the RIB and every peer session; the
/// only way anything outside this crate can affect either is through
/// [`Speaker::advertise`], [`Speaker::withdraw`], and [`Speaker::shutdown`].
pub struct Speaker {
    config: RouterConfig,
    peers: Vec<PeerHandle>,
    rib: Mutex<Rib>,
    handles: HandleAllocator,
}

impl Speaker {
    /// Starts the speaker: spawns one session task per configured peer.
    /// Sessions connect and negotiate independently and in the
    /// background; this returns as soon as the tasks are spawned, not
    /// once any session reaches the Established state (§4.1: the control
    /// plane never observes session state).
    pub fn new(config: RouterConfig, peers: Vec<PeerConfig>) -> Result<Speaker, Error> {
        let mut seen = std::collections::HashSet::new();
        for peer in &peers {
            if peer.asn != config.asn {
                tracing::warn!(
                    peer = %peer.addr,
                    peer_asn = peer.asn,
                    local_asn = config.asn,
                    "peer ASN differs from local ASN; this speaker only supports iBGP"
                );
            }
            if !seen.insert(peer.addr) {
                return Err(Error::DuplicatePeer(peer.addr));
            }
        }

        let mut handles = Vec::with_capacity(peers.len());
        for peer in &peers {
            let (tx, rx) = mpsc::unbounded_channel();
            let sockaddr = std::net::SocketAddr::from((peer.addr, peer.port));
            let task = tokio::spawn(neighbor::run(sockaddr, config.router_id, config.asn, rx));
            handles.push(PeerHandle { tx, task });
        }

        info!(peers = handles.len(), router_id = %config.router_id, "speaker started");
        Ok(Speaker {
            config,
            peers: handles,
            rib: Mutex::new(Rib::default()),
            handles: HandleAllocator::default(),
        })
    }

    /// Advertises a host-route for `prefix` (expected to already be a
    /// /32 or /128 — callers, i.e. the Reconciler, are responsible for
    /// narrowing a container address down to a host prefix before
    /// calling this).
    pub async fn advertise(&self, prefix: IpNetwork) -> Result<PathHandle, Error> {
        let (nlri, next_hop) = match prefix {
            IpNetwork::V4(net) => (Nlri::Ipv4(net), NextHop::Ipv4(self.config.router_id)),
            IpNetwork::V6(net) => {
                let next_hop = self.config.ipv6_next_hop.unwrap_or_else(|| {
                    // Falls back to the IPv4 router-id mapped into the
                    // IPv4-mapped IPv6 range; not routable on its own but
                    // keeps the attribute well-formed when an operator
                    // never configured an explicit IPv6 next hop.
                    self.config.router_id.to_ipv6_mapped()
                });
                (Nlri::Ipv6(net), NextHop::Ipv6(next_hop))
            }
        };
        let attrs = PathAttrs::new(next_hop);
        let handle = self.handles.next();

        // Broadcast before committing to the RIB: if every peer session
        // task has already exited, `broadcast` fails and this handle must
        // never appear in the RIB at all — otherwise it would be an entry
        // with no corresponding container id in the Reconciler's index.
        self.broadcast(NbrCommand::Announce(vec![nlri], attrs.clone()))?;

        self.rib.lock().unwrap().insert(handle, RibEntry { nlri, attrs });
        Ok(handle)
    }

    /// Withdraws a previously advertised path. A handle this speaker
    /// never issued (or already withdrew) is a no-op, not an error.
    pub async fn withdraw(&self, handle: PathHandle) -> Result<(), Error> {
        let entry = self.rib.lock().unwrap().remove(handle);
        let Some(entry) = entry else {
            return Ok(());
        };
        let cmd = match entry.nlri {
            Nlri::Ipv4(net) => NbrCommand::WithdrawV4(vec![net]),
            Nlri::Ipv6(net) => NbrCommand::WithdrawV6(vec![net]),
        };
        self.broadcast(cmd)
    }

    /// Closes every peer session and stops the speaker's background
    /// tasks. Session-level shutdown errors (a send to an already-dead
    /// task) are logged, not propagated — by the time shutdown runs there
    /// is nothing left to roll back to.
    pub async fn shutdown(self) -> Result<(), Error> {
        for peer in &self.peers {
            let _ = peer.tx.send(NbrCommand::Shutdown);
        }
        for peer in self.peers {
            if let Err(error) = peer.task.await {
                tracing::warn!(%error, "neighbor task panicked during shutdown");
            }
        }
        Ok(())
    }

    /// Current RIB size, exposed for tests and diagnostics.
    pub fn rib_len(&self) -> usize {
        self.rib.lock().unwrap().len()
    }

    fn broadcast(&self, cmd: NbrCommand) -> Result<(), Error> {
        if self.peers.is_empty() {
            return Ok(());
        }
        let mut delivered = false;
        for peer in &self.peers {
            if peer.tx.send(cmd.clone()).is_ok() {
                delivered = true;
            }
        }
        if !delivered {
            return Err(Error::Gone);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    fn test_config() -> RouterConfig {
        RouterConfig {
            router_id: Ipv4Addr::new(10, 0, 0, 1),
            asn: 65000,
            ipv6_next_hop: None,
        }
    }

    #[tokio::test]
    async fn advertise_withdraw_round_trips_the_rib() {
        let speaker = Speaker::new(test_config(), Vec::new()).unwrap();
        let prefix: IpNetwork = "10.1.2.3/32".parse().unwrap();
        let handle = speaker.advertise(prefix).await.unwrap();
        assert_eq!(speaker.rib_len(), 1);
        speaker.withdraw(handle).await.unwrap();
        assert_eq!(speaker.rib_len(), 0);
    }

    #[tokio::test]
    async fn withdraw_of_unknown_handle_succeeds() {
        let speaker = Speaker::new(test_config(), Vec::new()).unwrap();
        let prefix: IpNetwork = "10.1.2.3/32".parse().unwrap();
        let handle = speaker.advertise(prefix).await.unwrap();
        speaker.withdraw(handle).await.unwrap();
        // Withdrawing again is still fine.
        speaker.withdraw(handle).await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_peer_is_rejected() {
        let peer = PeerConfig::new("10.0.0.2".parse().unwrap(), 65000);
        let result = Speaker::new(test_config(), vec![peer, peer]);
        assert!(matches!(result, Err(Error::DuplicatePeer(_))));
    }
}
