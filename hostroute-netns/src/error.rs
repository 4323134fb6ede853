//
// Copyright (c) The Route Control Plane Contributors
//
// SPDX-License-Identifier: MIT
//

use std::path::PathBuf;

// Default-route replacement errors. Every variant here is, by design,
// non-fatal to the caller (§4.2 step 5 / §7 taxonomy 4): a container that
// exited between the `start` event and this call, or a namespace the
// daemon can't reach, just means the rewrite doesn't happen. The BGP
// advertisement that triggered it is unaffected.
#[derive(Debug)]
pub enum Error {
    OpenNamespace(PathBuf, std::io::Error),
    SetNs(std::io::Error),
    NetlinkConnect(std::io::Error),
    RouteReplace(rtnetlink::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::OpenNamespace(path, e) => {
                write!(f, "failed to open namespace {}: {e}", path.display())
            }
            Error::SetNs(e) => write!(f, "setns failed: {e}"),
            Error::NetlinkConnect(e) => write!(f, "failed to open netlink socket: {e}"),
            Error::RouteReplace(e) => write!(f, "route replace failed: {e}"),
        }
    }
}

impl std::error::Error for Error {}
