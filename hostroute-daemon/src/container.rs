//
// Copyright (c) The Route Control Plane Contributors
//
// SPDX-License-Identifier: MIT
//

//! Adapter over `bollard`'s Docker Engine API client: lists running
//! containers, inspects one for its network attachments and PID, and
//! streams `start`/`die` lifecycle events. Everything else the engine's
//! events API emits (`stop`, `kill`, `pause`, non-container event types)
//! is read off the stream and dropped, since Docker offers no way to
//! subscribe to a narrower set of kinds once `type=container` is
//! selected.

use std::collections::HashMap;
use std::net::IpAddr;
use std::pin::Pin;
use std::time::Duration;

use bollard::container::ListContainersOptions;
use bollard::system::EventsOptions;
use bollard::Docker;
use futures::stream::Stream;
use futures::StreamExt;

pub use bollard::errors::Error;

/// Default bound on a single `inspect()` call (SPEC_FULL.md §5: a
/// configurable deadline per inspection, so a hung container-runtime call
/// doesn't stall the event loop or Sync indefinitely). Callers wrap
/// `inspect()` in `tokio::time::timeout(INSPECT_TIMEOUT, ...)` themselves —
/// this crate has no per-call override surface yet, only the shared
/// default.
pub const INSPECT_TIMEOUT: Duration = Duration::from_secs(5);

/// One container's network attachment. `ip`/`prefix_len` are carried even
/// when unusable (empty address, zero prefix length) — network *selection*
/// (picking the first configured name present in `networks`) must happen
/// before address *validation*, so an invalid attachment has to still be
/// reachable by name rather than silently missing from the map.
#[derive(Clone, Debug)]
pub struct NetworkAttachment {
    pub name: String,
    pub ip: Option<IpAddr>,
    pub prefix_len: u8,
}

/// Everything the reconciler needs out of `docker inspect`.
#[derive(Clone, Debug)]
pub struct ContainerDetails {
    pub id: String,
    pub name: String,
    pub networks: HashMap<String, NetworkAttachment>,
    pub pid: Option<i32>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LifecycleKind {
    Start,
    Die,
}

#[derive(Clone, Debug)]
pub struct LifecycleEvent {
    pub kind: LifecycleKind,
    pub container_id: String,
}

#[derive(Clone)]
pub struct Source {
    docker: Docker,
}

impl Source {
    /// Connects using `DOCKER_HOST` if set, falling back to the platform
    /// default socket (`unix:///var/run/docker.sock` on Unix).
    pub fn connect() -> Result<Source, Error> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Source { docker })
    }

    pub async fn list_running(&self) -> Result<Vec<String>, Error> {
        let options = ListContainersOptions::<String> {
            all: false,
            ..Default::default()
        };
        let containers = self.docker.list_containers(Some(options)).await?;
        Ok(containers.into_iter().filter_map(|c| c.id).collect())
    }

    pub async fn inspect(&self, container_id: &str) -> Result<ContainerDetails, Error> {
        let inspect = self.docker.inspect_container(container_id, None).await?;

        let id = inspect.id.unwrap_or_else(|| container_id.to_owned());
        let name = inspect
            .name
            .map(|n| n.trim_start_matches('/').to_owned())
            .unwrap_or_else(|| id.clone());
        let pid = inspect
            .state
            .and_then(|s| s.pid)
            .and_then(|pid| i32::try_from(pid).ok());

        let mut networks = HashMap::new();
        if let Some(settings) = inspect.network_settings {
            if let Some(endpoints) = settings.networks {
                for (network_name, endpoint) in endpoints {
                    let ip = endpoint
                        .ip_address
                        .as_deref()
                        .filter(|s| !s.is_empty())
                        .and_then(|s| s.parse::<IpAddr>().ok());
                    let prefix_len = endpoint
                        .ip_prefix_len
                        .and_then(|n| u8::try_from(n).ok())
                        .unwrap_or(0);
                    networks.insert(
                        network_name.clone(),
                        NetworkAttachment {
                            name: network_name,
                            ip,
                            prefix_len,
                        },
                    );
                }
            }
        }

        Ok(ContainerDetails {
            id,
            name,
            networks,
            pid,
        })
    }

    /// Subscribes to `start`/`die` container events. The returned stream
    /// runs until the underlying connection drops; the supervisor
    /// resubscribes on a stream error (§7 taxonomy 2).
    pub fn subscribe(&self) -> Pin<Box<dyn Stream<Item = Result<LifecycleEvent, Error>> + Send>> {
        let mut filters = HashMap::new();
        filters.insert("type".to_owned(), vec!["container".to_owned()]);
        filters.insert(
            "event".to_owned(),
            vec!["start".to_owned(), "die".to_owned()],
        );

        let options = EventsOptions::<String> {
            since: None,
            until: None,
            filters,
        };

        let stream = self.docker.events(Some(options)).filter_map(|item| async {
            match item {
                Ok(message) => lifecycle_event(&message).map(Ok),
                Err(error) => Some(Err(error)),
            }
        });

        Box::pin(stream)
    }
}

fn lifecycle_event(message: &bollard::system::EventMessage) -> Option<LifecycleEvent> {
    let container_id = message.actor.as_ref()?.id.clone()?;
    let kind = match message.action.as_deref()? {
        "start" => LifecycleKind::Start,
        "die" => LifecycleKind::Die,
        _ => return None,
    };
    Some(LifecycleEvent { kind, container_id })
}
