// Distributed under the MIT software license.

//! Fixed-range overlay-IPv4 allocator with stable MAC→IP binding.
//!
//! Grounded on `original_source/src/autod/vip_pool.cpp`. Two behaviors of
//! the original are preserved verbatim rather than "fixed":
//!
//! - The allocation cursor (`current`) sweeps forward from its last
//!   position and is never rewound on release, so released slots before
//!   `current` are not reused until `current` wraps past `last` and
//!   resets to the first slot.
//! - Pool addresses are stored and reported as raw octets in the order
//!   they print (`a.b.c.d`), sidestepping the original's incidental
//!   octet-reversal while reproducing the same printed addresses.

use crate::types::MacAddr;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("pool range invalid: begin {begin} > end {end}")]
    InvalidRange { begin: u8, end: u8 },
    #[error("pool exhausted: no free slot in range")]
    Exhausted,
}

/// One slot in the overlay-address pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolEntry {
    pub vpn_ip: Ipv4Addr,
    pub used: bool,
    pub index: usize,
}

pub struct AddressPool {
    /// Contiguous vector indexed `[0..slots.len())`; `slots[i].index == i`.
    slots: Vec<PoolEntry>,
    /// Sweep cursor into `slots`. Advances on every successful allocation,
    /// never rewinds on release.
    current: usize,
    bindings: HashMap<String, usize>,
}

impl AddressPool {
    /// `begin` and `end` must share the same /24 prefix; both ends are
    /// inclusive. One `PoolEntry` is created per address in the range.
    pub fn new(begin: Ipv4Addr, end: Ipv4Addr) -> Result<Self, PoolError> {
        let [b0, b1, b2, b3] = begin.octets();
        let [e0, e1, e2, _e3] = end.octets();
        let last_octet_end = end.octets()[3];

        if b3 > last_octet_end {
            return Err(PoolError::InvalidRange { begin: b3, end: last_octet_end });
        }
        debug_assert_eq!((b0, b1, b2), (e0, e1, e2), "begin/end must share a /24");

        let mut slots = Vec::with_capacity((last_octet_end - b3) as usize + 1);
        for (i, octet) in (b3..=last_octet_end).enumerate() {
            slots.push(PoolEntry {
                vpn_ip: Ipv4Addr::new(b0, b1, b2, octet),
                used: false,
                index: i,
            });
        }

        Ok(Self {
            slots,
            current: 0,
            bindings: HashMap::new(),
        })
    }

    /// Look up an existing binding for `mac`, without allocating.
    pub fn search(&self, mac: &MacAddr) -> Option<PoolEntry> {
        self.bindings.get(&mac.to_key()).map(|&i| self.slots[i])
    }

    /// Return the existing binding for `mac`, or sweep forward from
    /// `current` for the first free slot and bind it.
    pub fn allocate(&mut self, mac: &MacAddr) -> Result<PoolEntry, PoolError> {
        if let Some(entry) = self.search(mac) {
            return Ok(entry);
        }

        while self.current < self.slots.len() {
            if !self.slots[self.current].used {
                self.slots[self.current].used = true;
                let idx = self.current;
                self.bindings.insert(mac.to_key(), idx);
                self.current += 1;
                return Ok(self.slots[idx]);
            }
            self.current += 1;
        }

        // Original resets `current` to 0 on exhaustion but still reports
        // failure to the caller for this request.
        self.current = 0;
        Err(PoolError::Exhausted)
    }

    /// Clear the binding for `mac`, freeing its slot for reuse. Returns
    /// whether a binding existed. `current` is not moved.
    pub fn release(&mut self, mac: &MacAddr) -> bool {
        match self.bindings.remove(&mac.to_key()) {
            Some(idx) => {
                self.slots[idx].used = false;
                true
            }
            None => false,
        }
    }

    /// Refresh is a no-op beyond confirming the binding still exists —
    /// the pool tracks no per-binding attributes besides the IP itself.
    pub fn update(&self, mac: &MacAddr) -> bool {
        self.bindings.contains_key(&mac.to_key())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn used_count(&self) -> usize {
        self.bindings.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mac(last: u8) -> MacAddr {
        MacAddr([0x02, 0, 0, 0, 0, last])
    }

    fn small_pool() -> AddressPool {
        AddressPool::new(Ipv4Addr::new(10, 1, 0, 1), Ipv4Addr::new(10, 1, 0, 5)).unwrap()
    }

    #[test]
    fn s1_first_time_provisioning() {
        let mut pool = small_pool();
        let entry = pool.allocate(&mac(1)).unwrap();
        assert_eq!(entry.vpn_ip, Ipv4Addr::new(10, 1, 0, 1));
    }

    #[test]
    fn allocate_is_idempotent_until_release() {
        let mut pool = small_pool();
        let a = pool.allocate(&mac(1)).unwrap();
        let b = pool.allocate(&mac(1)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn s3_bye_releases_slot() {
        let mut pool = small_pool();
        pool.allocate(&mac(1)).unwrap();
        assert!(pool.release(&mac(1)));
        assert!(pool.search(&mac(1)).is_none());
    }

    #[test]
    fn s4_pool_exhaustion() {
        let mut pool = AddressPool::new(Ipv4Addr::new(10, 1, 0, 1), Ipv4Addr::new(10, 1, 0, 1)).unwrap();
        pool.allocate(&mac(1)).unwrap();
        assert_eq!(pool.allocate(&mac(2)), Err(PoolError::Exhausted));
    }

    #[test]
    fn s5_rebind_after_release_does_not_rewind_cursor() {
        let mut pool = small_pool();
        let first = pool.allocate(&mac(1)).unwrap();
        assert_eq!(first.vpn_ip, Ipv4Addr::new(10, 1, 0, 1));
        assert!(pool.release(&mac(1)));

        // Cursor has advanced past slot 0; next allocation for a
        // *different* MAC — or the same one reconnecting — gets the next
        // slot, not the freed one.
        let second = pool.allocate(&mac(1)).unwrap();
        assert_eq!(second.vpn_ip, Ipv4Addr::new(10, 1, 0, 2));
    }

    #[test]
    fn release_of_unknown_mac_returns_false() {
        let mut pool = small_pool();
        assert!(!pool.release(&mac(9)));
    }

    #[test]
    fn used_set_matches_binding_codomain() {
        let mut pool = small_pool();
        pool.allocate(&mac(1)).unwrap();
        pool.allocate(&mac(2)).unwrap();
        let used = pool.slots.iter().filter(|e| e.used).count();
        assert_eq!(used, pool.used_count());
    }
}
