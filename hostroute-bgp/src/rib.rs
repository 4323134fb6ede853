//
// Copyright (c) The Route Control Plane Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::packet::attribute::{Nlri, PathAttrs};

/// Opaque handle returned by [`crate::instance::Speaker::advertise`] and
/// required to later withdraw the path. Handles are never reused: a
/// `advertise`/`withdraw`/`advertise` sequence for the same prefix
/// produces two distinct handles.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct PathHandle(u64);

#[derive(Debug, Default)]
pub struct HandleAllocator(AtomicU64);

impl HandleAllocator {
    pub fn next(&self) -> PathHandle {
        PathHandle(self.0.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug)]
pub struct RibEntry {
    pub nlri: Nlri,
    pub attrs: PathAttrs,
}

/// The set of paths this speaker currently advertises, keyed by the
/// handle it returned to the caller at advertise-time. Owned exclusively
/// by [`crate::instance::Speaker`]; nothing outside this crate ever
/// touches it directly.
#[derive(Debug, Default)]
pub struct Rib {
    entries: HashMap<PathHandle, RibEntry>,
}

impl Rib {
    pub fn insert(&mut self, handle: PathHandle, entry: RibEntry) {
        self.entries.insert(handle, entry);
    }

    /// Removes and returns the entry for `handle`. A withdraw for a
    /// handle this RIB never held (or already withdrew) is a no-op,
    /// matching the idempotent withdraw contract.
    pub fn remove(&mut self, handle: PathHandle) -> Option<RibEntry> {
        self.entries.remove(&handle)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PathHandle, &RibEntry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use ipnetwork::Ipv4Network;

    use super::*;
    use crate::packet::attribute::NextHop;

    #[test]
    fn handles_are_never_reused() {
        let alloc = HandleAllocator::default();
        let a = alloc.next();
        let b = alloc.next();
        assert_ne!(a, b);
    }

    #[test]
    fn withdraw_of_unknown_handle_is_a_no_op() {
        let mut rib = Rib::default();
        let alloc = HandleAllocator::default();
        let handle = alloc.next();
        assert!(rib.remove(handle).is_none());

        rib.insert(
            handle,
            RibEntry {
                nlri: Nlri::Ipv4(Ipv4Network::new(Ipv4Addr::new(10, 0, 0, 1), 32).unwrap()),
                attrs: PathAttrs::new(NextHop::Ipv4(Ipv4Addr::new(10, 0, 0, 254))),
            },
        );
        assert_eq!(rib.len(), 1);
        assert!(rib.remove(handle).is_some());
        assert!(rib.is_empty());
        // Removing the same handle again is still a no-op.
        assert!(rib.remove(handle).is_none());
    }
}
