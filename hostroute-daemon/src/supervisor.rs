//
// Copyright (c) The Route Control Plane Contributors
//
// SPDX-License-Identifier: MIT
//

//! Wires the components together, runs the initial sync, and drives the
//! event loop until a termination signal arrives.

use std::sync::Arc;

use futures::StreamExt;
use hostroute_bgp::Speaker;
use hostroute_netns::Mutator;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};

use crate::config::Resolved;
use crate::container::{LifecycleKind, Source, INSPECT_TIMEOUT};
use crate::error::{Error, InfraError};
use crate::reconciler::Reconciler;

pub async fn run(config: Resolved) -> Result<(), Error> {
    let source =
        Source::connect().map_err(|e| Error::from(InfraError::ContainerRuntimeUnreachable(e)))?;

    let speaker = Speaker::new(config.router_config, config.peers)
        .map_err(|e| Error::from(InfraError::SpeakerStart(e)))?;
    let speaker = Arc::new(speaker);

    let mutator = Mutator::new(config.proc_root);
    let reconciler = Reconciler::new(
        speaker.clone(),
        mutator,
        config.watched_networks,
        config.default_gateway,
    );

    reconciler
        .sync(&source)
        .await
        .map_err(|e| Error::from(InfraError::ListContainers(e)))?;

    info!("initial sync complete, entering event loop");
    event_loop(&source, &reconciler).await;
    drop(reconciler);

    info!("shutting down");
    match Arc::try_unwrap(speaker) {
        Ok(speaker) => {
            if let Err(error) = speaker.shutdown().await {
                error!(%error, "error during route control plane shutdown");
            }
        }
        Err(_) => {
            warn!("route control plane still referenced at shutdown, skipping clean teardown");
        }
    }

    Ok(())
}

async fn event_loop(source: &Source, reconciler: &Reconciler) {
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
    let mut sigterm =
        signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let mut sighup = signal(SignalKind::hangup()).expect("failed to install SIGHUP handler");

    let mut events = source.subscribe();

    loop {
        tokio::select! {
            _ = sigint.recv() => {
                info!(signal = "SIGINT", "received termination signal");
                return;
            }
            _ = sigterm.recv() => {
                info!(signal = "SIGTERM", "received termination signal");
                return;
            }
            _ = sighup.recv() => {
                info!(signal = "SIGHUP", "received termination signal");
                return;
            }
            event = events.next() => {
                match event {
                    Some(Ok(event)) => {
                        match event.kind {
                            LifecycleKind::Start => {
                                match tokio::time::timeout(
                                    INSPECT_TIMEOUT,
                                    source.inspect(&event.container_id),
                                )
                                .await
                                {
                                    Ok(Ok(details)) => {
                                        if let Err(error) = reconciler.add(&details).await {
                                            error!(
                                                container_id = %details.id,
                                                container_name = %details.name,
                                                %error,
                                                "failed to advertise host-route",
                                            );
                                        }
                                    }
                                    Ok(Err(error)) => {
                                        error!(container_id = %event.container_id, %error, "failed to inspect container");
                                    }
                                    Err(_elapsed) => {
                                        error!(container_id = %event.container_id, "inspect timed out");
                                    }
                                }
                            }
                            LifecycleKind::Die => {
                                if let Err(error) = reconciler.withdraw(&event.container_id).await {
                                    error!(container_id = %event.container_id, %error, "failed to withdraw host-route");
                                }
                            }
                        }
                    }
                    Some(Err(error)) => {
                        InfraError::EventStreamClosed.log();
                        warn!(%error, "container event stream error, resubscribing");
                        events = source.subscribe();
                    }
                    None => {
                        InfraError::EventStreamClosed.log();
                        events = source.subscribe();
                    }
                }
            }
        }
    }
}
