//
// Copyright (c) The Route Control Plane Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::IpAddr;

use tracing::{error, warn_span};

use crate::packet::message::DecodeError;

// Speaker-level errors. These are the only errors `Speaker`'s public API
// surfaces; everything a peer session does internally to recover from a
// transient I/O error (reconnect, retry the handshake) never reaches the
// caller at all.
#[derive(Debug)]
pub enum Error {
    // The speaker's dispatch task is no longer running (it already shut
    // down or panicked).
    Gone,
    // A peer was configured more than once.
    DuplicatePeer(IpAddr),
}

#[derive(Debug)]
pub enum NbrError {
    IoError(std::io::Error),
    DecodeError(DecodeError),
    HoldTimerExpired,
    BadVersion(u8),
    BadAsn { received: u32, expected: u32 },
}

impl Error {
    pub fn log(&self) {
        match self {
            Error::Gone => error!("{}", self),
            Error::DuplicatePeer(addr) => error!(%addr, "{}", self),
        }
    }
}

impl NbrError {
    pub(crate) fn log(&self, addr: IpAddr) {
        warn_span!("neighbor", %addr).in_scope(|| {
            tracing::warn!("{}", self);
        });
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Gone => write!(f, "speaker is no longer running"),
            Error::DuplicatePeer(addr) => write!(f, "peer {addr} configured more than once"),
        }
    }
}

impl std::error::Error for Error {}

impl std::fmt::Display for NbrError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NbrError::IoError(e) => write!(f, "I/O error: {e}"),
            NbrError::DecodeError(e) => write!(f, "decode error: {e}"),
            NbrError::HoldTimerExpired => write!(f, "hold timer expired"),
            NbrError::BadVersion(v) => write!(f, "unsupported BGP version {v}"),
            NbrError::BadAsn { received, expected } => {
                write!(f, "unexpected remote ASN {received} (expected {expected})")
            }
        }
    }
}

impl std::error::Error for NbrError {}

impl From<std::io::Error> for NbrError {
    fn from(e: std::io::Error) -> NbrError {
        NbrError::IoError(e)
    }
}

impl From<DecodeError> for NbrError {
    fn from(e: DecodeError) -> NbrError {
        NbrError::DecodeError(e)
    }
}
