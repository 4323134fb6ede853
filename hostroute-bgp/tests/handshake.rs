//
// Copyright (c) The Route Control Plane Contributors
//
// SPDX-License-Identifier: MIT
//

//! Exercises one full OPEN -> KEEPALIVE handshake against a minimal
//! in-process peer stub, without a real upstream BGP router.

use std::net::Ipv4Addr;
use std::time::Duration;

use hostroute_bgp::instance::{PeerConfig, RouterConfig, Speaker};
use ipnetwork::IpNetwork;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

#[tokio::test]
async fn advertise_reaches_a_freshly_established_peer() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let peer_port = listener.local_addr().unwrap().port();

    let stub = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();

        // Read the speaker's OPEN, reply with our own, then exchange
        // KEEPALIVEs to complete the handshake.
        let mut buf = bytes::BytesMut::with_capacity(4096);
        let open = read_one(&mut socket, &mut buf).await;
        assert!(matches!(open, hostroute_bgp::packet::message::Message::Open(_)));

        let reply = hostroute_bgp::packet::message::Message::Open(
            hostroute_bgp::packet::message::OpenMsg {
                asn: 65000,
                holdtime: 90,
                identifier: Ipv4Addr::new(10, 0, 0, 2),
            },
        );
        socket.write_all(&reply.encode()).await.unwrap();
        socket
            .write_all(&hostroute_bgp::packet::message::Message::Keepalive.encode())
            .await
            .unwrap();

        let keepalive = read_one(&mut socket, &mut buf).await;
        assert!(matches!(
            keepalive,
            hostroute_bgp::packet::message::Message::Keepalive
        ));

        // Now wait for the UPDATE carrying the advertised host-route.
        let update = read_one(&mut socket, &mut buf).await;
        match update {
            hostroute_bgp::packet::message::Message::Update(update) => {
                assert_eq!(update.nlri.len(), 1);
            }
            other => panic!("expected UPDATE, got {other:?}"),
        }
    });

    let config = RouterConfig {
        router_id: Ipv4Addr::new(10, 0, 0, 1),
        asn: 65000,
        ipv6_next_hop: None,
    };
    let peer = PeerConfig {
        addr: "127.0.0.1".parse().unwrap(),
        port: peer_port,
        asn: 65000,
    };
    let speaker = Speaker::new(config, vec![peer]).unwrap();

    // Give the session task a moment to connect and finish the handshake
    // before advertising — `advertise` itself never blocks on session
    // state (§4.1), so without this the UPDATE would simply sit queued.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let prefix: IpNetwork = "10.1.2.3/32".parse().unwrap();
    speaker.advertise(prefix).await.unwrap();

    tokio::time::timeout(Duration::from_secs(5), stub)
        .await
        .expect("stub peer timed out")
        .unwrap();

    speaker.shutdown().await.unwrap();
}

async fn read_one(
    socket: &mut tokio::net::TcpStream,
    buf: &mut bytes::BytesMut,
) -> hostroute_bgp::packet::message::Message {
    loop {
        if let Some(msg) = hostroute_bgp::packet::message::try_decode(buf).unwrap() {
            return msg;
        }
        let mut tmp = [0u8; 4096];
        let n = socket.read(&mut tmp).await.unwrap();
        assert!(n > 0, "peer closed unexpectedly");
        buf.extend_from_slice(&tmp[..n]);
    }
}
