//
// Copyright (c) The Route Control Plane Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::SocketAddr;

use tokio::net::TcpStream;

/// Opens the outbound TCP connection to a peer. This speaker never binds
/// a listening socket (§4.1: "Listen port = disabled") — every session it
/// carries was initiated by this process.
pub(crate) async fn connect(peer: SocketAddr) -> std::io::Result<TcpStream> {
    TcpStream::connect(peer).await
}
