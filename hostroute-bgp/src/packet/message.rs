//
// Copyright (c) The Route Control Plane Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use ipnetwork::{Ipv4Network, Ipv6Network};
use num_traits::{FromPrimitive, ToPrimitive};

use crate::packet::attribute::{self, DecodedAttrs, Nlri, PathAttrs};
use crate::packet::consts::{
    BGP_VERSION, CeaseSubcode, ErrorCode, HEADER_LEN, MARKER, MAX_MSG_LEN,
    MessageType,
};

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DecodeError {
    BadMarker,
    BadLength(u16),
    BadVersion(u8),
    BadMessageType(u8),
    TruncatedAttribute,
    Truncated,
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::BadMarker => write!(f, "invalid message marker"),
            DecodeError::BadLength(len) => write!(f, "invalid message length {len}"),
            DecodeError::BadVersion(v) => write!(f, "unsupported BGP version {v}"),
            DecodeError::BadMessageType(t) => write!(f, "unknown message type {t}"),
            DecodeError::TruncatedAttribute => write!(f, "truncated path attribute"),
            DecodeError::Truncated => write!(f, "truncated message"),
        }
    }
}

impl std::error::Error for DecodeError {}

#[derive(Clone, Debug)]
pub struct OpenMsg {
    pub asn: u32,
    pub holdtime: u16,
    pub identifier: Ipv4Addr,
}

#[derive(Clone, Debug)]
pub struct UpdateMsg {
    pub withdrawn: Vec<Ipv4Network>,
    pub nlri: Vec<Nlri>,
    pub attrs: Option<PathAttrs>,
    pub decoded_attrs: DecodedAttrs,
}

#[derive(Clone, Debug)]
pub struct NotificationMsg {
    pub code: ErrorCode,
    pub subcode: u8,
}

#[derive(Clone, Debug)]
pub enum Message {
    Open(OpenMsg),
    Update(UpdateMsg),
    Keepalive,
    Notification(NotificationMsg),
}

impl Message {
    pub fn cease(subcode: CeaseSubcode) -> Message {
        Message::Notification(NotificationMsg {
            code: ErrorCode::Cease,
            subcode: subcode.to_u8().unwrap(),
        })
    }

    /// Builds the UPDATE that advertises `nlri` with the given attributes.
    pub fn update_advertise(nlri: Vec<Nlri>, attrs: PathAttrs) -> Message {
        Message::Update(UpdateMsg {
            withdrawn: Vec::new(),
            nlri,
            attrs: Some(attrs),
            decoded_attrs: DecodedAttrs::default(),
        })
    }

    /// Builds the UPDATE that withdraws `prefixes` (IPv4 host-routes only
    /// go through the classic Withdrawn Routes field; IPv6 goes through
    /// MP_UNREACH_NLRI and is built by the caller via [`Message::update_withdraw_v6`]).
    pub fn update_withdraw_v4(prefixes: Vec<Ipv4Network>) -> Message {
        Message::Update(UpdateMsg {
            withdrawn: prefixes,
            nlri: Vec::new(),
            attrs: None,
            decoded_attrs: DecodedAttrs::default(),
        })
    }

    pub fn update_withdraw_v6(prefixes: Vec<Ipv6Network>) -> Message {
        Message::Update(UpdateMsg {
            withdrawn: Vec::new(),
            nlri: prefixes.into_iter().map(Nlri::Ipv6).collect(),
            attrs: None,
            decoded_attrs: DecodedAttrs::default(),
        })
    }

    pub fn msg_type(&self) -> MessageType {
        match self {
            Message::Open(_) => MessageType::Open,
            Message::Update(_) => MessageType::Update,
            Message::Keepalive => MessageType::Keepalive,
            Message::Notification(_) => MessageType::Notification,
        }
    }

    /// Encodes a full message including the 19-byte header.
    pub fn encode(&self) -> BytesMut {
        let mut body = BytesMut::new();
        match self {
            Message::Open(open) => {
                body.put_u8(BGP_VERSION);
                // AS_TRANS is used for 4-octet ASNs carried in a
                // capability; this speaker only ever peers with ASNs that
                // fit in 16 bits (operators configure small iBGP ASNs for
                // this kind of bridge), so the 2-octet field carries the
                // real value directly and no capability is negotiated.
                body.put_u16(open.asn as u16);
                body.put_u16(open.holdtime);
                body.put_slice(&open.identifier.octets());
                body.put_u8(0); // no optional parameters
            }
            Message::Update(update) => {
                let mut withdrawn = BytesMut::new();
                for net in &update.withdrawn {
                    withdrawn.put_u8(net.prefix());
                    let bytes = net.prefix().div_ceil(8) as usize;
                    withdrawn.put_slice(&net.ip().octets()[..bytes]);
                }
                body.put_u16(withdrawn.len() as u16);
                body.put_slice(&withdrawn);

                let mut attrs = BytesMut::new();
                let mut v4_nlri = BytesMut::new();
                if let Some(path_attrs) = &update.attrs {
                    attribute::encode(&mut attrs, path_attrs, &update.nlri);
                    for n in &update.nlri {
                        if let Nlri::Ipv4(net) = n {
                            v4_nlri.put_u8(net.prefix());
                            let bytes = net.prefix().div_ceil(8) as usize;
                            v4_nlri.put_slice(&net.ip().octets()[..bytes]);
                        }
                    }
                } else {
                    // Pure withdrawal of IPv6 prefixes: MP_UNREACH_NLRI,
                    // built from the prefixes stashed in `nlri`.
                    let v6: Vec<Ipv6Network> = update
                        .nlri
                        .iter()
                        .filter_map(|n| match n {
                            Nlri::Ipv6(net) => Some(*net),
                            Nlri::Ipv4(_) => None,
                        })
                        .collect();
                    if !v6.is_empty() {
                        attribute::encode_mp_unreach(&mut attrs, &v6);
                    }
                }
                body.put_u16(attrs.len() as u16);
                body.put_slice(&attrs);
                body.put_slice(&v4_nlri);
            }
            Message::Keepalive => {}
            Message::Notification(notif) => {
                body.put_u8(notif.code.to_u8().unwrap());
                body.put_u8(notif.subcode);
            }
        }

        let mut out = BytesMut::with_capacity(HEADER_LEN + body.len());
        out.put_slice(&MARKER);
        out.put_u16((HEADER_LEN + body.len()) as u16);
        out.put_u8(self.msg_type().to_u8().unwrap());
        out.put_slice(&body);
        out
    }

    /// Decodes a message body (header already stripped and validated by
    /// the caller) given its declared type.
    pub fn decode(msg_type: MessageType, mut body: Bytes) -> Result<Message, DecodeError> {
        match msg_type {
            MessageType::Open => {
                if body.remaining() < 9 {
                    return Err(DecodeError::Truncated);
                }
                let version = body.get_u8();
                if version != BGP_VERSION {
                    return Err(DecodeError::BadVersion(version));
                }
                let asn = body.get_u16() as u32;
                let holdtime = body.get_u16();
                let mut id_bytes = [0u8; 4];
                body.copy_to_slice(&mut id_bytes);
                Ok(Message::Open(OpenMsg {
                    asn,
                    holdtime,
                    identifier: Ipv4Addr::from(id_bytes),
                }))
            }
            MessageType::Update => {
                if body.remaining() < 2 {
                    return Err(DecodeError::Truncated);
                }
                let withdrawn_len = body.get_u16() as usize;
                if body.remaining() < withdrawn_len {
                    return Err(DecodeError::Truncated);
                }
                let mut withdrawn_buf = body.split_to(withdrawn_len);
                let mut withdrawn = Vec::new();
                while withdrawn_buf.has_remaining() {
                    let prefix_len = withdrawn_buf.get_u8();
                    let nbytes = (prefix_len as usize).div_ceil(8);
                    if withdrawn_buf.remaining() < nbytes || nbytes > 4 {
                        break;
                    }
                    let mut octets = [0u8; 4];
                    octets[..nbytes].copy_from_slice(&withdrawn_buf.split_to(nbytes));
                    if let Ok(net) = Ipv4Network::new(Ipv4Addr::from(octets), prefix_len) {
                        withdrawn.push(net);
                    }
                }

                if body.remaining() < 2 {
                    return Err(DecodeError::Truncated);
                }
                let attr_len = body.get_u16() as usize;
                if body.remaining() < attr_len {
                    return Err(DecodeError::Truncated);
                }
                let attr_buf = body.split_to(attr_len);
                let decoded_attrs = attribute::decode(attr_buf)?;

                let mut nlri = Vec::new();
                while body.has_remaining() {
                    let prefix_len = body.get_u8();
                    let nbytes = (prefix_len as usize).div_ceil(8);
                    if body.remaining() < nbytes || nbytes > 4 {
                        break;
                    }
                    let mut octets = [0u8; 4];
                    octets[..nbytes].copy_from_slice(&body.split_to(nbytes));
                    if let Ok(net) = Ipv4Network::new(Ipv4Addr::from(octets), prefix_len) {
                        nlri.push(Nlri::Ipv4(net));
                    }
                }

                Ok(Message::Update(UpdateMsg {
                    withdrawn,
                    nlri,
                    attrs: None,
                    decoded_attrs,
                }))
            }
            MessageType::Keepalive => Ok(Message::Keepalive),
            MessageType::Notification => {
                if body.remaining() < 2 {
                    return Err(DecodeError::Truncated);
                }
                let code = body.get_u8();
                let subcode = body.get_u8();
                let code = ErrorCode::from_u8(code)
                    .unwrap_or(ErrorCode::Cease);
                Ok(Message::Notification(NotificationMsg { code, subcode }))
            }
        }
    }
}

/// Reads exactly one message off `buf`, returning `None` if `buf` does not
/// yet hold a full message (the caller should read more bytes and retry).
pub fn try_decode(buf: &mut BytesMut) -> Result<Option<Message>, DecodeError> {
    if buf.len() < HEADER_LEN {
        return Ok(None);
    }
    if buf[..16] != MARKER[..] {
        return Err(DecodeError::BadMarker);
    }
    let len = u16::from_be_bytes([buf[16], buf[17]]) as usize;
    if !(HEADER_LEN..=MAX_MSG_LEN).contains(&len) {
        return Err(DecodeError::BadLength(len as u16));
    }
    if buf.len() < len {
        return Ok(None);
    }
    let msg_type = buf[18];
    let msg_type = MessageType::from_u8(msg_type)
        .ok_or(DecodeError::BadMessageType(msg_type))?;
    let mut frame = buf.split_to(len);
    frame.advance(HEADER_LEN);
    Message::decode(msg_type, frame.freeze()).map(Some)
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;
    use crate::packet::attribute::NextHop;

    #[test]
    fn open_round_trips() {
        let msg = Message::Open(OpenMsg {
            asn: 65000,
            holdtime: 90,
            identifier: Ipv4Addr::new(10, 0, 0, 1),
        });
        let encoded = msg.encode();
        let mut buf = BytesMut::from(&encoded[..]);
        let decoded = try_decode(&mut buf).unwrap().unwrap();
        match decoded {
            Message::Open(open) => {
                assert_eq!(open.asn, 65000);
                assert_eq!(open.holdtime, 90);
                assert_eq!(open.identifier, Ipv4Addr::new(10, 0, 0, 1));
            }
            _ => panic!("expected OPEN"),
        }
    }

    #[test]
    fn keepalive_is_header_only() {
        let encoded = Message::Keepalive.encode();
        assert_eq!(encoded.len(), HEADER_LEN);
    }

    #[test]
    fn update_advertise_v4_round_trips() {
        let nlri = vec![Nlri::Ipv4(
            Ipv4Network::new(Ipv4Addr::new(10, 1, 2, 3), 32).unwrap(),
        )];
        let attrs = PathAttrs::new(NextHop::Ipv4(Ipv4Addr::new(10, 0, 0, 1)));
        let msg = Message::update_advertise(nlri, attrs);
        let encoded = msg.encode();
        let mut buf = BytesMut::from(&encoded[..]);
        let decoded = try_decode(&mut buf).unwrap().unwrap();
        match decoded {
            Message::Update(update) => {
                assert_eq!(update.nlri.len(), 1);
                assert!(update.withdrawn.is_empty());
                match update.decoded_attrs.next_hop {
                    Some(NextHop::Ipv4(addr)) => {
                        assert_eq!(addr, Ipv4Addr::new(10, 0, 0, 1))
                    }
                    other => panic!("unexpected next hop: {other:?}"),
                }
            }
            _ => panic!("expected UPDATE"),
        }
    }

    #[test]
    fn update_withdraw_v4_round_trips() {
        let net = Ipv4Network::new(Ipv4Addr::new(10, 1, 2, 3), 32).unwrap();
        let msg = Message::update_withdraw_v4(vec![net]);
        let encoded = msg.encode();
        let mut buf = BytesMut::from(&encoded[..]);
        let decoded = try_decode(&mut buf).unwrap().unwrap();
        match decoded {
            Message::Update(update) => {
                assert_eq!(update.withdrawn, vec![net]);
                assert!(update.nlri.is_empty());
            }
            _ => panic!("expected UPDATE"),
        }
    }

    #[test]
    fn try_decode_waits_for_full_message() {
        let encoded = Message::Keepalive.encode();
        let mut buf = BytesMut::from(&encoded[..encoded.len() - 1]);
        assert!(try_decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn bad_marker_is_rejected() {
        let mut buf = BytesMut::from(&[0u8; HEADER_LEN][..]);
        assert_eq!(try_decode(&mut buf).unwrap_err(), DecodeError::BadMarker);
    }
}
