//
// Copyright (c) The Route Control Plane Contributors
//
// SPDX-License-Identifier: MIT
//

//! Replaces a container's default route from outside the container,
//! without ever leaving the calling OS thread's network namespace in an
//! inconsistent state.
//!
//! Network namespace is a per-thread property on Linux, so switching it
//! to reach a container and switching it back is inherently unsafe to do
//! on a thread anything else depends on. This crate never leaves a
//! `setns`-switched thread in the caller's hands: every namespace
//! transition happens inside a single `spawn_blocking` closure, entirely
//! hidden behind [`Mutator::replace_default_route`], and the closure
//! restores the thread's original namespace before returning control to
//! the async runtime — including when it returns early on error.

mod error;

use std::net::IpAddr;
use std::os::fd::AsFd;
use std::path::{Path, PathBuf};

use nix::sched::{setns, CloneFlags};
use rtnetlink::Handle;
use tracing::error;

pub use error::Error;

/// Replaces the default route inside one container's network namespace
/// at a time. Holds no per-container state: each call opens, uses, and
/// discards its own namespace-scoped netlink socket.
#[derive(Clone, Debug)]
pub struct Mutator {
    proc_root: PathBuf,
}

impl Mutator {
    /// `proc_root` is the host proc filesystem root under which
    /// `{pid}/ns/net` is resolved (normally `/proc`; configurable because
    /// the system this crate is modeled on used a non-standard path —
    /// see SPEC_FULL.md §9).
    pub fn new(proc_root: impl Into<PathBuf>) -> Mutator {
        Mutator {
            proc_root: proc_root.into(),
        }
    }

    /// Installs or overwrites (`NLM_F_REPLACE`) the default route
    /// (`0.0.0.0/0` or `::/0`, matching `gateway`'s family) inside the
    /// network namespace of the process `container_pid`. Idempotent: safe
    /// to call repeatedly with the same gateway.
    pub async fn replace_default_route(
        &self,
        container_pid: i32,
        gateway: IpAddr,
    ) -> Result<(), Error> {
        let proc_root = self.proc_root.clone();

        // Every namespace transition lives inside this blocking closure.
        // The netlink socket `new_connection` creates here is bound to
        // whatever namespace the calling thread is in *at creation time*;
        // once created, it stays bound to that namespace even after the
        // thread's own namespace is restored by `NsGuard`'s `Drop`. This
        // is the "handle parameterized by namespace" pattern SPEC_FULL.md
        // §4.3 step 4 prefers over leaving the thread switched.
        let (connection, handle) = tokio::task::spawn_blocking(move || {
            let _guard = NsGuard::enter(&proc_root, container_pid)?;
            let (connection, handle, _) =
                rtnetlink::new_connection().map_err(Error::NetlinkConnect)?;
            Ok::<_, Error>((connection, handle))
        })
        .await
        .expect("namespace mutation task panicked")?;

        let driver = tokio::spawn(connection);
        let result = install_default_route(&handle, gateway).await;
        driver.abort();
        result
    }
}

async fn install_default_route(handle: &Handle, gateway: IpAddr) -> Result<(), Error> {
    match gateway {
        IpAddr::V4(gateway) => handle
            .route()
            .add()
            .v4()
            .replace()
            .gateway(gateway)
            .execute()
            .await
            .map_err(Error::RouteReplace),
        IpAddr::V6(gateway) => handle
            .route()
            .add()
            .v6()
            .replace()
            .gateway(gateway)
            .execute()
            .await
            .map_err(Error::RouteReplace),
    }
}

/// RAII guard covering exactly one namespace transition: captures the
/// calling thread's current namespace on construction, `setns`'s into the
/// target, and `setns`'s back on drop — on every exit path, including an
/// early `?` return from [`Mutator::replace_default_route`]'s closure.
struct NsGuard {
    origin: std::fs::File,
}

impl NsGuard {
    fn enter(proc_root: &Path, container_pid: i32) -> Result<NsGuard, Error> {
        let origin_path = proc_root.join("self").join("ns").join("net");
        let origin = std::fs::File::open(&origin_path)
            .map_err(|e| Error::OpenNamespace(origin_path, e))?;

        let target_path = proc_root
            .join(container_pid.to_string())
            .join("ns")
            .join("net");
        let target = std::fs::File::open(&target_path)
            .map_err(|e| Error::OpenNamespace(target_path, e))?;

        setns(target.as_fd(), CloneFlags::CLONE_NEWNET)
            .map_err(|e| Error::SetNs(std::io::Error::from(e)))?;

        Ok(NsGuard { origin })
    }
}

impl Drop for NsGuard {
    fn drop(&mut self) {
        if let Err(error) = setns(self.origin.as_fd(), CloneFlags::CLONE_NEWNET) {
            // There is no recovering from this inside the guard: the
            // calling blocking-pool thread's namespace identity is now
            // wrong for whatever `spawn_blocking` closure tokio schedules
            // onto it next. Logged loudly because it should never happen
            // outside of the origin namespace having been torn down
            // concurrently.
            error!(%error, "failed to restore original network namespace");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_container_namespace_is_a_clean_error() {
        let dir = std::env::temp_dir().join(format!(
            "hostroute-netns-test-{}",
            std::process::id()
        ));
        std::fs::create_dir_all(dir.join("self").join("ns")).unwrap();
        std::fs::write(dir.join("self").join("ns").join("net"), []).unwrap();

        let mutator = Mutator::new(&dir);
        // PID 999999999 has no `ns/net` entry under our fake proc root.
        let result = mutator
            .replace_default_route(999_999_999, "10.0.0.1".parse().unwrap())
            .await;
        assert!(matches!(result, Err(Error::OpenNamespace(_, _))));

        std::fs::remove_dir_all(&dir).ok();
    }
}
