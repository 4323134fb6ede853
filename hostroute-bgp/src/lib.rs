//
// Copyright (c) The Route Control Plane Contributors
//
// SPDX-License-Identifier: MIT
//

//! Embedded BGP-4 speaker.
//!
//! This crate owns a local RIB and one outbound-only session per
//! configured peer. It never listens for inbound connections and never
//! runs a decision process or policy engine: every path it ever holds was
//! placed there by a single local caller via [`instance::Speaker::advertise`],
//! so there is nothing to select between.

pub mod error;
pub mod instance;
pub mod neighbor;
pub mod network;
pub mod packet;
pub mod rib;

pub use error::Error;
pub use instance::{PeerConfig, RouterConfig, Speaker};
pub use rib::PathHandle;
