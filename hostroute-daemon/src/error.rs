//
// Copyright (c) The Route Control Plane Contributors
//
// SPDX-License-Identifier: MIT
//

use tracing::{error, warn};

// Top-level errors. `Infra` is fatal during startup and logged-and-retried
// mid-loop; the per-container and decorative variants are logged with
// their own structured fields at the call site (reconciler.rs) rather
// than through `log()` here, since they carry container identity that
// this enum doesn't.
#[derive(Debug)]
pub enum Error {
    Infra(InfraError),
}

#[derive(Debug)]
pub enum InfraError {
    ContainerRuntimeUnreachable(bollard::errors::Error),
    ListContainers(bollard::errors::Error),
    SpeakerStart(hostroute_bgp::Error),
    EventStreamClosed,
}

impl Error {
    pub(crate) fn log(&self) {
        match self {
            Error::Infra(error) => error.log(),
        }
    }
}

impl InfraError {
    pub(crate) fn log(&self) {
        match self {
            InfraError::EventStreamClosed => {
                warn!("container event stream closed, resubscribing");
            }
            _ => {
                error!(error = %self, "infrastructure error");
            }
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Infra(error) => error.fmt(f),
        }
    }
}

impl std::fmt::Display for InfraError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InfraError::ContainerRuntimeUnreachable(error) => {
                write!(f, "container runtime unreachable: {error}")
            }
            InfraError::ListContainers(error) => {
                write!(f, "failed to list running containers: {error}")
            }
            InfraError::SpeakerStart(error) => {
                write!(f, "failed to start route control plane: {error}")
            }
            InfraError::EventStreamClosed => {
                write!(f, "container event stream closed")
            }
        }
    }
}

impl std::error::Error for Error {}
impl std::error::Error for InfraError {}

impl From<InfraError> for Error {
    fn from(error: InfraError) -> Error {
        Error::Infra(error)
    }
}
