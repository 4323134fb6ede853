//
// Copyright (c) The Route Control Plane Contributors
//
// SPDX-License-Identifier: MIT
//

//! Resolves the one `go-sockaddr`-style template the upstream configuration
//! surface ever used in practice (`{{ GetPrivateIP }}`) to a concrete IP
//! literal, so `--router-id` and `--default-route` can keep accepting
//! either an address or that template without depending on the full
//! `go-sockaddr` template language it was borrowed from.

use std::net::IpAddr;

use futures::TryStreamExt;

const PRIVATE_IP_TEMPLATE: &str = "{{ GetPrivateIP }}";

#[derive(Debug)]
pub enum Error {
    UnknownTemplate(String),
    NoPrivateAddress,
    Netlink(rtnetlink::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::UnknownTemplate(raw) => write!(f, "unrecognized address template: {raw:?}"),
            Error::NoPrivateAddress => {
                write!(f, "no private IPv4 address found on any host interface")
            }
            Error::Netlink(error) => write!(f, "failed to enumerate host addresses: {error}"),
        }
    }
}

impl std::error::Error for Error {}

/// Resolves `raw` to an IP address. A value that isn't a recognized
/// template is parsed as a literal address.
pub async fn resolve(raw: &str) -> Result<IpAddr, Error> {
    let trimmed = raw.trim();
    if !trimmed.starts_with("{{") {
        return trimmed
            .parse()
            .map_err(|_| Error::UnknownTemplate(raw.to_owned()));
    }

    if trimmed != PRIVATE_IP_TEMPLATE {
        return Err(Error::UnknownTemplate(raw.to_owned()));
    }

    get_private_ip().await
}

/// Finds the first non-loopback, private-range (RFC 1918) IPv4 address
/// configured on the host, mirroring `go-sockaddr`'s `GetPrivateIP`.
async fn get_private_ip() -> Result<IpAddr, Error> {
    let (connection, handle, _) = rtnetlink::new_connection().map_err(Error::Netlink)?;
    tokio::spawn(connection);

    let mut addresses = handle.address().get().execute();
    while let Some(msg) = addresses.try_next().await.map_err(Error::Netlink)? {
        for attr in &msg.attributes {
            if let netlink_packet_route::address::AddressAttribute::Address(
                std::net::IpAddr::V4(addr),
            ) = attr
            {
                if !addr.is_loopback() && is_private(*addr) {
                    return Ok(IpAddr::V4(*addr));
                }
            }
        }
    }

    Err(Error::NoPrivateAddress)
}

fn is_private(addr: std::net::Ipv4Addr) -> bool {
    addr.is_private() || addr.is_link_local()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn literal_address_round_trips() {
        let resolved = resolve("10.0.0.5").await.unwrap();
        assert_eq!(resolved, "10.0.0.5".parse::<IpAddr>().unwrap());
    }

    #[tokio::test]
    async fn unknown_template_is_rejected() {
        let result = resolve("{{ GetInterfaceIP \"eth0\" }}").await;
        assert!(matches!(result, Err(Error::UnknownTemplate(_))));
    }
}
