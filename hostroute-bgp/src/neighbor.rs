//
// Copyright (c) The Route Control Plane Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use tracing::{debug, info, instrument, warn};

use crate::error::NbrError;
use crate::network;
use crate::packet::attribute::{Nlri, PathAttrs};
use crate::packet::consts::{CeaseSubcode, DEFAULT_HOLDTIME, DEFAULT_KEEPALIVE};
use crate::packet::message::{self, Message, OpenMsg};

const RECONNECT_BACKOFF_MIN: Duration = Duration::from_secs(1);
const RECONNECT_BACKOFF_MAX: Duration = Duration::from_secs(60);

/// A pending UPDATE this session hasn't had a chance to send yet, queued
/// while the session isn't established. A session flap never drops a
/// queued update: `Advertise`/`Withdraw` commands survive reconnection
/// attempts because they live in this queue rather than the socket.
#[derive(Clone, Debug)]
pub enum NbrCommand {
    Announce(Vec<Nlri>, PathAttrs),
    WithdrawV4(Vec<ipnetwork::Ipv4Network>),
    WithdrawV6(Vec<ipnetwork::Ipv6Network>),
    Shutdown,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum State {
    Idle,
    Connect,
    Established,
}

/// Spawns the task that owns one peer's whole session lifetime: connect,
/// OPEN/KEEPALIVE handshake, steady-state keepalive/hold timers, and
/// reconnection with exponential backoff on any failure. Runs until it
/// receives [`NbrCommand::Shutdown`].
#[instrument(skip(peer, router_id, asn, rx), fields(%peer))]
pub async fn run(
    peer: SocketAddr,
    router_id: Ipv4Addr,
    asn: u32,
    mut rx: mpsc::UnboundedReceiver<NbrCommand>,
) {
    let mut backoff = RECONNECT_BACKOFF_MIN;
    let mut pending: Vec<NbrCommand> = Vec::new();

    'session: loop {
        let stream = tokio::select! {
            result = network::connect(peer) => result,
            cmd = rx.recv() => {
                match cmd {
                    Some(NbrCommand::Shutdown) | None => return,
                    Some(other) => {
                        pending.push(other);
                        continue 'session;
                    }
                }
            }
        };

        let mut stream = match stream {
            Ok(stream) => stream,
            Err(error) => {
                debug!(%error, "connect failed, retrying");
                if !sleep_or_shutdown(&mut rx, backoff, &mut pending).await {
                    return;
                }
                backoff = (backoff * 2).min(RECONNECT_BACKOFF_MAX);
                continue;
            }
        };

        match handshake(&mut stream, router_id, asn).await {
            Ok(holdtime) => {
                backoff = RECONNECT_BACKOFF_MIN;
                info!("session established");
                if !run_established(&mut stream, peer, holdtime, &mut rx, &mut pending).await {
                    return;
                }
            }
            Err(error) => {
                warn!(%error, "handshake failed, retrying");
                if !sleep_or_shutdown(&mut rx, backoff, &mut pending).await {
                    return;
                }
                backoff = (backoff * 2).min(RECONNECT_BACKOFF_MAX);
            }
        }
    }
}

/// Sleeps for `backoff`, but keeps draining `rx` into `pending` the whole
/// time so an `Advertise`/`Withdraw` issued while this session is down is
/// not lost. Returns `false` if a `Shutdown` arrived (or the channel
/// closed) during the sleep.
async fn sleep_or_shutdown(
    rx: &mut mpsc::UnboundedReceiver<NbrCommand>,
    backoff: Duration,
    pending: &mut Vec<NbrCommand>,
) -> bool {
    let deadline = Instant::now() + backoff;
    loop {
        tokio::select! {
            _ = time::sleep_until(deadline) => return true,
            cmd = rx.recv() => {
                match cmd {
                    Some(NbrCommand::Shutdown) | None => return false,
                    Some(other) => pending.push(other),
                }
            }
        }
    }
}

async fn handshake(
    stream: &mut TcpStream,
    router_id: Ipv4Addr,
    asn: u32,
) -> Result<u16, NbrError> {
    let open = Message::Open(OpenMsg {
        asn,
        holdtime: DEFAULT_HOLDTIME,
        identifier: router_id,
    });
    stream.write_all(&open.encode()).await?;

    let mut buf = BytesMut::with_capacity(4096);
    let remote_open = loop {
        if let Some(msg) = message::try_decode(&mut buf)? {
            match msg {
                Message::Open(open) => break open,
                other => {
                    debug!(?other, "unexpected message before OPEN");
                }
            }
        }
        read_more(stream, &mut buf).await?;
    };

    if remote_open.asn != asn {
        return Err(NbrError::BadAsn {
            received: remote_open.asn,
            expected: asn,
        });
    }

    let negotiated_holdtime = DEFAULT_HOLDTIME.min(remote_open.holdtime);
    stream.write_all(&Message::Keepalive.encode()).await?;

    // Wait for the peer's KEEPALIVE that confirms the session.
    loop {
        if let Some(msg) = message::try_decode(&mut buf)? {
            match msg {
                Message::Keepalive => break,
                other => debug!(?other, "unexpected message awaiting confirm"),
            }
        }
        read_more(stream, &mut buf).await?;
    }

    Ok(negotiated_holdtime)
}

async fn read_more(stream: &mut TcpStream, buf: &mut BytesMut) -> Result<(), NbrError> {
    let mut tmp = [0u8; 4096];
    let n = stream.read(&mut tmp).await?;
    if n == 0 {
        return Err(NbrError::IoError(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "peer closed connection",
        )));
    }
    buf.extend_from_slice(&tmp[..n]);
    Ok(())
}

/// Drives one established session until it drops (error, hold-timer
/// expiry, or a `Shutdown` command). Returns `false` if the whole task
/// should exit (shutdown), `true` if it should reconnect.
async fn run_established(
    stream: &mut TcpStream,
    peer: SocketAddr,
    holdtime: u16,
    rx: &mut mpsc::UnboundedReceiver<NbrCommand>,
    pending: &mut Vec<NbrCommand>,
) -> bool {
    let keepalive_interval = Duration::from_secs((holdtime / 3).max(1) as u64);
    let hold_duration = Duration::from_secs(holdtime as u64);
    let mut keepalive_timer = time::interval(keepalive_interval);
    let mut hold_deadline = Instant::now() + hold_duration;
    let mut buf = BytesMut::with_capacity(4096);

    // Flush anything queued while the session was down before accepting
    // new commands.
    for cmd in pending.drain(..) {
        if !send_command(stream, cmd).await {
            return true;
        }
    }

    loop {
        let mut read_buf = [0u8; 4096];
        tokio::select! {
            _ = keepalive_timer.tick() => {
                if stream.write_all(&Message::Keepalive.encode()).await.is_err() {
                    return true;
                }
            }
            _ = time::sleep_until(hold_deadline) => {
                NbrError::HoldTimerExpired.log(peer.ip());
                let _ = stream.write_all(&Message::cease(CeaseSubcode::AdministrativeShutdown).encode()).await;
                return true;
            }
            cmd = rx.recv() => {
                match cmd {
                    Some(NbrCommand::Shutdown) | None => {
                        let _ = stream.write_all(&Message::cease(CeaseSubcode::AdministrativeShutdown).encode()).await;
                        return false;
                    }
                    Some(cmd) => {
                        if !send_command(stream, cmd).await {
                            return true;
                        }
                    }
                }
            }
            result = stream.read(&mut read_buf) => {
                match result {
                    Ok(0) => {
                        warn!("peer closed connection");
                        return true;
                    }
                    Ok(n) => {
                        buf.extend_from_slice(&read_buf[..n]);
                        hold_deadline = Instant::now() + hold_duration;
                        loop {
                            match message::try_decode(&mut buf) {
                                Ok(Some(msg)) => log_received(&msg),
                                Ok(None) => break,
                                Err(error) => {
                                    warn!(%error, "decode error, dropping session");
                                    return true;
                                }
                            }
                        }
                    }
                    Err(error) => {
                        warn!(%error, "read error");
                        return true;
                    }
                }
            }
        }
    }
}

fn log_received(msg: &Message) {
    match msg {
        Message::Keepalive => {}
        Message::Update(update) => {
            debug!(
                withdrawn = update.withdrawn.len(),
                nlri = update.nlri.len(),
                "received UPDATE"
            );
        }
        Message::Notification(notif) => {
            info!(code = ?notif.code, subcode = notif.subcode, "received NOTIFICATION");
        }
        Message::Open(_) => {
            debug!("received unexpected OPEN in established state");
        }
    }
}

async fn send_command(stream: &mut TcpStream, cmd: NbrCommand) -> bool {
    let msg = match cmd {
        NbrCommand::Announce(nlri, attrs) => Message::update_advertise(nlri, attrs),
        NbrCommand::WithdrawV4(prefixes) => Message::update_withdraw_v4(prefixes),
        NbrCommand::WithdrawV6(prefixes) => Message::update_withdraw_v6(prefixes),
        NbrCommand::Shutdown => return true,
    };
    stream.write_all(&msg.encode()).await.is_ok()
}
