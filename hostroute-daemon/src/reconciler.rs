//
// Copyright (c) The Route Control Plane Contributors
//
// SPDX-License-Identifier: MIT
//

//! Maps container lifecycle events onto RIB mutations. Owns the
//! container-id -> advertised-path index; the speaker owns the RIB
//! itself and is never touched while the index lock is held.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use hostroute_bgp::{PathHandle, Speaker};
use hostroute_netns::Mutator;
use ipnetwork::IpNetwork;
use tokio::sync::RwLock;
use tracing::{debug, error};

use crate::container::{ContainerDetails, Source, INSPECT_TIMEOUT};

#[derive(Debug)]
pub enum Error {
    Speaker(hostroute_bgp::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Speaker(error) => write!(f, "route control plane error: {error}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<hostroute_bgp::Error> for Error {
    fn from(error: hostroute_bgp::Error) -> Error {
        Error::Speaker(error)
    }
}

#[derive(Clone, Debug)]
struct ContainerInfo {
    name: String,
    network: String,
    address: IpAddr,
    path_handle: PathHandle,
}

pub struct Reconciler {
    index: Arc<RwLock<HashMap<String, ContainerInfo>>>,
    speaker: Arc<Speaker>,
    mutator: Mutator,
    watched_networks: Vec<String>,
    default_gateway: Option<IpAddr>,
}

impl Reconciler {
    pub fn new(
        speaker: Arc<Speaker>,
        mutator: Mutator,
        watched_networks: Vec<String>,
        default_gateway: Option<IpAddr>,
    ) -> Reconciler {
        Reconciler {
            index: Arc::new(RwLock::new(HashMap::new())),
            speaker,
            mutator,
            watched_networks,
            default_gateway,
        }
    }

    /// Enumerates running containers and `add()`s each. A failure to list
    /// containers at all is fatal (propagated); per-container inspect or
    /// advertise failures are logged and skipped.
    pub async fn sync(&self, source: &Source) -> Result<(), bollard::errors::Error> {
        let ids = source.list_running().await?;
        for id in ids {
            let details = match tokio::time::timeout(INSPECT_TIMEOUT, source.inspect(&id)).await {
                Ok(Ok(details)) => details,
                Ok(Err(error)) => {
                    error!(container_id = %id, %error, "failed to inspect container");
                    continue;
                }
                Err(_elapsed) => {
                    error!(container_id = %id, "inspect timed out");
                    continue;
                }
            };
            if let Err(error) = self.add(&details).await {
                error!(
                    container_id = %details.id,
                    container_name = %details.name,
                    %error,
                    "failed to advertise host-route",
                );
            }
        }
        Ok(())
    }

    /// Advertises a host-route for the first watched network the
    /// container is attached to, withdrawing any route already held for
    /// this container id first. No-ops (logged at debug) when the
    /// container isn't attached to a watched network or has no usable
    /// address on it.
    pub async fn add(&self, container: &ContainerDetails) -> Result<(), Error> {
        let Some(attachment) = self
            .watched_networks
            .iter()
            .find_map(|name| container.networks.get(name))
        else {
            debug!(container_id = %container.id, "network not matched");
            return Ok(());
        };

        let Some(ip) = attachment.ip.filter(|_| attachment.prefix_len != 0) else {
            debug!(container_id = %container.id, "invalid address info");
            return Ok(());
        };

        let prefix = host_prefix(ip);
        let handle = self.speaker.advertise(prefix).await?;

        {
            let mut index = self.index.write().await;
            if let Some(previous) = index.remove(&container.id) {
                // `advertise` above already installed the new path; drop
                // the stale one now rather than leaving two live handles
                // for the same container (§4.2 step 4).
                if let Err(error) = self.speaker.withdraw(previous.path_handle).await {
                    error!(container_id = %container.id, %error, "failed to withdraw superseded route");
                }
            }
            index.insert(
                container.id.clone(),
                ContainerInfo {
                    name: container.name.clone(),
                    network: attachment.name.clone(),
                    address: ip,
                    path_handle: handle,
                },
            );
        }

        if let Some(gateway) = self.default_gateway {
            if let Some(pid) = container.pid {
                if let Err(error) = self.mutator.replace_default_route(pid, gateway).await {
                    error!(
                        container_id = %container.id,
                        container_name = %container.name,
                        %error,
                        "failed to replace container default route",
                    );
                }
            }
        }

        Ok(())
    }

    /// Withdraws the host-route for `container_id`, if one is held.
    /// Unknown ids are a no-op.
    pub async fn withdraw(&self, container_id: &str) -> Result<(), Error> {
        let info = {
            let index = self.index.read().await;
            match index.get(container_id) {
                Some(info) => info.clone(),
                None => return Ok(()),
            }
        };

        self.speaker.withdraw(info.path_handle).await?;

        let mut index = self.index.write().await;
        if let Some(current) = index.get(container_id) {
            if current.path_handle == info.path_handle {
                index.remove(container_id);
            }
        }

        Ok(())
    }
}

fn host_prefix(ip: IpAddr) -> IpNetwork {
    match ip {
        IpAddr::V4(ip) => IpNetwork::V4(ipnetwork::Ipv4Network::new(ip, 32).unwrap()),
        IpAddr::V6(ip) => IpNetwork::V6(ipnetwork::Ipv6Network::new(ip, 128).unwrap()),
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use hostroute_bgp::RouterConfig;

    use super::*;
    use crate::container::NetworkAttachment;

    #[test]
    fn host_prefix_is_always_a_single_address() {
        let v4 = host_prefix("10.0.0.5".parse().unwrap());
        assert_eq!(v4.prefix(), 32);
        let v6 = host_prefix("fe80::1".parse().unwrap());
        assert_eq!(v6.prefix(), 128);
    }

    fn test_reconciler(watched_networks: Vec<String>) -> (Reconciler, Arc<Speaker>) {
        let config = RouterConfig {
            router_id: Ipv4Addr::new(10, 0, 0, 1),
            asn: 65000,
            ipv6_next_hop: None,
        };
        let speaker = Arc::new(Speaker::new(config, Vec::new()).unwrap());
        let mutator = Mutator::new("/proc");
        let reconciler = Reconciler::new(speaker.clone(), mutator, watched_networks, None);
        (reconciler, speaker)
    }

    // A first-priority watched network with an invalid attachment must be a
    // no-op — not a fallthrough to a lower-priority watched network, even
    // when that one is valid.
    #[tokio::test]
    async fn invalid_first_priority_attachment_does_not_fall_through() {
        let (reconciler, speaker) =
            test_reconciler(vec!["primary".to_owned(), "secondary".to_owned()]);

        let mut networks = HashMap::new();
        networks.insert(
            "primary".to_owned(),
            NetworkAttachment {
                name: "primary".to_owned(),
                ip: None,
                prefix_len: 0,
            },
        );
        networks.insert(
            "secondary".to_owned(),
            NetworkAttachment {
                name: "secondary".to_owned(),
                ip: Some("10.2.0.5".parse().unwrap()),
                prefix_len: 24,
            },
        );

        let container = ContainerDetails {
            id: "c3".to_owned(),
            name: "c3".to_owned(),
            networks,
            pid: None,
        };

        reconciler.add(&container).await.unwrap();
        assert_eq!(speaker.rib_len(), 0);
    }
}
