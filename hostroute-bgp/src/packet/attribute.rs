//
// Copyright (c) The Route Control Plane Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::{Ipv4Addr, Ipv6Addr};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use ipnetwork::{Ipv4Network, Ipv6Network};
use num_traits::{FromPrimitive, ToPrimitive};

use crate::packet::consts::{Afi, AttrType, Origin, Safi};
use crate::packet::message::DecodeError;

// Attribute flags (RFC 4271 §4.3). This speaker only ever produces
// well-known mandatory (ORIGIN, AS_PATH, NEXT_HOP) and optional
// non-transitive (MP_REACH_NLRI/MP_UNREACH_NLRI) attributes, so the other
// combinations are never emitted and are accepted-but-ignored on decode.
const FLAG_OPTIONAL: u8 = 0x80;
const FLAG_TRANSITIVE: u8 = 0x40;
const FLAG_WELL_KNOWN: u8 = FLAG_TRANSITIVE;

// The next hop this speaker advertises to its peers. IPv4 unicast routes
// carry it in the mandatory NEXT_HOP attribute; IPv6 unicast routes carry
// it inside MP_REACH_NLRI instead (RFC 4760 §3), since BGP's base NLRI
// encoding is IPv4-only.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NextHop {
    Ipv4(Ipv4Addr),
    Ipv6(Ipv6Addr),
}

// One NLRI this speaker advertises or withdraws, paired with its address
// family. Always a host-route (/32 or /128) in this crate.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Nlri {
    Ipv4(Ipv4Network),
    Ipv6(Ipv6Network),
}

impl Nlri {
    pub fn afi(&self) -> Afi {
        match self {
            Nlri::Ipv4(_) => Afi::Ipv4,
            Nlri::Ipv6(_) => Afi::Ipv6,
        }
    }
}

// The attribute set attached to a single UPDATE. `nlri` and `next_hop`
// travel together because this speaker never de-aggregates a NEXT_HOP
// across families within one message.
#[derive(Clone, Debug)]
pub struct PathAttrs {
    pub origin: Origin,
    pub next_hop: NextHop,
}

impl PathAttrs {
    pub fn new(next_hop: NextHop) -> PathAttrs {
        PathAttrs {
            origin: Origin::Igp,
            next_hop,
        }
    }
}

// ===== encoding =====

fn encode_tlv(buf: &mut BytesMut, flags: u8, attr_type: AttrType, value: &[u8]) {
    buf.put_u8(flags);
    buf.put_u8(attr_type.to_u8().unwrap());
    // None of the attributes this speaker emits ever exceed 255 bytes, so
    // the extended-length flag (and its 2-byte length field) is never set.
    buf.put_u8(value.len() as u8);
    buf.put_slice(value);
}

/// Encodes the mandatory ORIGIN and AS_PATH attributes, plus either a
/// NEXT_HOP (IPv4 NLRI) or an MP_REACH_NLRI (IPv6 NLRI) carrying both the
/// next hop and the NLRI itself, per RFC 4760.
pub fn encode(buf: &mut BytesMut, attrs: &PathAttrs, nlri: &[Nlri]) {
    encode_tlv(buf, FLAG_WELL_KNOWN, AttrType::Origin, &[attrs.origin.to_u8().unwrap()]);
    // Empty AS_PATH: this speaker is the sole originator of every route it
    // holds and never forms an AS_SEQUENCE of its own (iBGP-only, §4.1).
    encode_tlv(buf, FLAG_WELL_KNOWN, AttrType::AsPath, &[]);

    match attrs.next_hop {
        NextHop::Ipv4(addr) => {
            encode_tlv(buf, FLAG_WELL_KNOWN, AttrType::NextHop, &addr.octets());
        }
        NextHop::Ipv6(addr) => {
            let mut value = BytesMut::new();
            value.put_u16(Afi::Ipv6.to_u16().unwrap());
            value.put_u8(Safi::Unicast.to_u8().unwrap());
            value.put_u8(16); // next hop length
            value.put_slice(&addr.octets());
            value.put_u8(0); // no SNPAs
            for n in nlri {
                if let Nlri::Ipv6(net) = n {
                    value.put_u8(net.prefix());
                    value.put_slice(&net.ip().octets()[..prefix_bytes(net.prefix())]);
                }
            }
            encode_tlv(
                buf,
                FLAG_OPTIONAL,
                AttrType::MpReachNlri,
                &value,
            );
        }
    }
}

/// Encodes an MP_UNREACH_NLRI withdrawing the given IPv6 prefixes. IPv4
/// withdrawals instead go in the UPDATE's Withdrawn Routes field, per
/// RFC 4271.
pub fn encode_mp_unreach(buf: &mut BytesMut, prefixes: &[Ipv6Network]) {
    let mut value = BytesMut::new();
    value.put_u16(Afi::Ipv6.to_u16().unwrap());
    value.put_u8(Safi::Unicast.to_u8().unwrap());
    for net in prefixes {
        value.put_u8(net.prefix());
        value.put_slice(&net.ip().octets()[..prefix_bytes(net.prefix())]);
    }
    encode_tlv(buf, FLAG_OPTIONAL, AttrType::MpUnreachNlri, &value);
}

fn prefix_bytes(prefix_len: u8) -> usize {
    (prefix_len as usize).div_ceil(8)
}

// ===== decoding =====

/// Parsed form of whatever this speaker received from a peer. Decoding is
/// deliberately lossy: attributes this speaker doesn't act on (anything
/// besides NEXT_HOP / MP_REACH_NLRI / MP_UNREACH_NLRI) are skipped rather
/// than rejected, since this speaker never runs a decision process over
/// received routes — it only needs enough of the wire format to keep a
/// session alive and log what it hears.
#[derive(Clone, Debug, Default)]
pub struct DecodedAttrs {
    pub next_hop: Option<NextHop>,
    pub mp_unreach: Vec<Ipv6Network>,
}

pub fn decode(mut buf: Bytes) -> Result<DecodedAttrs, DecodeError> {
    let mut attrs = DecodedAttrs::default();
    while buf.remaining() >= 3 {
        let flags = buf.get_u8();
        let attr_type = buf.get_u8();
        let extended = flags & 0x10 != 0;
        let len = if extended {
            if buf.remaining() < 2 {
                return Err(DecodeError::TruncatedAttribute);
            }
            buf.get_u16() as usize
        } else {
            if buf.remaining() < 1 {
                return Err(DecodeError::TruncatedAttribute);
            }
            buf.get_u8() as usize
        };
        if buf.remaining() < len {
            return Err(DecodeError::TruncatedAttribute);
        }
        let mut value = buf.split_to(len);
        match AttrType::from_u8(attr_type) {
            Some(AttrType::NextHop) if len == 4 => {
                attrs.next_hop = Some(NextHop::Ipv4(Ipv4Addr::from(value.get_u32())));
            }
            Some(AttrType::MpReachNlri) => {
                if value.remaining() < 5 {
                    continue;
                }
                let _afi = value.get_u16();
                let _safi = value.get_u8();
                let nh_len = value.get_u8() as usize;
                if value.remaining() < nh_len {
                    continue;
                }
                let nh_bytes = value.split_to(nh_len);
                if nh_len == 16 {
                    let mut octets = [0u8; 16];
                    octets.copy_from_slice(&nh_bytes);
                    attrs.next_hop = Some(NextHop::Ipv6(Ipv6Addr::from(octets)));
                }
            }
            Some(AttrType::MpUnreachNlri) => {
                if value.remaining() < 3 {
                    continue;
                }
                let _afi = value.get_u16();
                let _safi = value.get_u8();
                while value.has_remaining() {
                    let prefix_len = value.get_u8();
                    let nbytes = prefix_bytes(prefix_len);
                    if value.remaining() < nbytes || nbytes > 16 {
                        break;
                    }
                    let mut octets = [0u8; 16];
                    octets[..nbytes].copy_from_slice(&value.split_to(nbytes));
                    if let Ok(net) = Ipv6Network::new(Ipv6Addr::from(octets), prefix_len) {
                        attrs.mp_unreach.push(net);
                    }
                }
            }
            _ => {
                // ORIGIN, AS_PATH, and anything unrecognized: acknowledged
                // on the wire but not retained.
            }
        }
    }
    Ok(attrs)
}
