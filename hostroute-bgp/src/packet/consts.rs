//
// Copyright (c) The Route Control Plane Contributors
//
// SPDX-License-Identifier: MIT
//

use num_derive::{FromPrimitive, ToPrimitive};

pub const BGP_VERSION: u8 = 4;
pub const BGP_PORT: u16 = 179;
pub const HEADER_LEN: usize = 19;
pub const MAX_MSG_LEN: usize = 4096;
pub const MARKER: [u8; 16] = [0xff; 16];

// Negotiated hold-time default (RFC 4271 §4.2 recommends 3 keepalives per
// hold interval).
pub const DEFAULT_HOLDTIME: u16 = 90;
pub const DEFAULT_KEEPALIVE: u16 = DEFAULT_HOLDTIME / 3;

// BGP Message Types.
//
// IANA registry:
// https://www.iana.org/assignments/bgp-parameters/bgp-parameters.xhtml#bgp-parameters-1
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(FromPrimitive, ToPrimitive)]
pub enum MessageType {
    Open = 1,
    Update = 2,
    Notification = 3,
    Keepalive = 4,
}

// Path Attribute Type Codes.
//
// IANA registry:
// https://www.iana.org/assignments/bgp-parameters/bgp-parameters.xhtml#bgp-parameters-2
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(FromPrimitive, ToPrimitive)]
pub enum AttrType {
    Origin = 1,
    AsPath = 2,
    NextHop = 3,
    MpReachNlri = 14,
    MpUnreachNlri = 15,
}

// ORIGIN attribute values (RFC 4271 §5.1.1). This speaker only ever
// originates routes locally, so it always sends `Igp`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(FromPrimitive, ToPrimitive)]
pub enum Origin {
    Igp = 0,
    Egp = 1,
    Incomplete = 2,
}

// Address Family Identifiers (RFC 4760).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(FromPrimitive, ToPrimitive)]
pub enum Afi {
    Ipv4 = 1,
    Ipv6 = 2,
}

// Subsequent Address Family Identifiers (RFC 4760).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(FromPrimitive, ToPrimitive)]
pub enum Safi {
    Unicast = 1,
}

// BGP NOTIFICATION error codes (RFC 4271 §4.5), trimmed to the subset this
// speaker can actually emit/decode.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(FromPrimitive, ToPrimitive)]
pub enum ErrorCode {
    MessageHeaderError = 1,
    OpenMessageError = 2,
    UpdateMessageError = 3,
    HoldTimerExpired = 4,
    FsmError = 5,
    Cease = 6,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(FromPrimitive, ToPrimitive)]
pub enum CeaseSubcode {
    AdministrativeShutdown = 2,
}
