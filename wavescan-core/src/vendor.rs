//! Vendor resolution from OUI address prefixes.
//!
//! The full manufacturer database lives outside this core; records are
//! constructed against a `VendorResolver` built once and passed in, so the
//! lookup is an explicit collaborator rather than hidden global state.

use std::collections::HashMap;

use crate::types::{is_locally_administered, Bssid};

/// Minimal built-in OUI prefixes for common access-point vendors (used when
/// no external database is supplied).
const BUILTIN_PREFIXES: &[([u8; 3], &str)] = &[
    ([0x00, 0x03, 0x93], "Apple"),
    ([0x00, 0x09, 0x5B], "Netgear"),
    ([0x00, 0x0B, 0x86], "Aruba Networks"),
    ([0x00, 0x0F, 0x66], "Cisco-Linksys"),
    ([0x00, 0x13, 0x10], "Cisco-Linksys"),
    ([0x00, 0x14, 0x6C], "Netgear"),
    ([0x00, 0x18, 0x4D], "Netgear"),
    ([0x00, 0x1B, 0x11], "D-Link"),
    ([0x00, 0x1F, 0xC6], "ASUSTek"),
    ([0x00, 0x40, 0x96], "Cisco"),
    ([0x00, 0xE0, 0xFC], "Huawei"),
    ([0x14, 0xCC, 0x20], "TP-Link"),
    ([0x38, 0x10, 0xD5], "AVM"),
    ([0xB0, 0xB2, 0xDC], "Zyxel"),
    ([0xC8, 0x0E, 0x14], "AVM"),
    ([0xDC, 0x9F, 0xDB], "Ubiquiti"),
    ([0xE0, 0x3F, 0x49], "TP-Link"),
    ([0xF0, 0x9F, 0xC2], "Ubiquiti"),
];

/// Constructed-once manufacturer lookup, keyed by the 3-byte OUI prefix.
#[derive(Debug, Clone)]
pub struct VendorResolver {
    prefixes: HashMap<[u8; 3], String>,
}

impl VendorResolver {
    /// Resolver backed by the small built-in table.
    pub fn builtin() -> Self {
        VendorResolver::from_entries(
            BUILTIN_PREFIXES
                .iter()
                .map(|(p, name)| (*p, name.to_string())),
        )
    }

    /// Resolver over caller-supplied (prefix, name) entries — the hook for
    /// a full external OUI database.
    pub fn from_entries(entries: impl IntoIterator<Item = ([u8; 3], String)>) -> Self {
        VendorResolver {
            prefixes: entries.into_iter().collect(),
        }
    }

    /// Manufacturer name for a hardware address, if the prefix is known.
    ///
    /// Locally-administered addresses often map to an underlying
    /// globally-administered OUI with the U/L bit cleared; when the direct
    /// lookup misses, retry with that bit cleared.
    pub fn manufacturer_for(&self, bssid: &Bssid) -> Option<String> {
        let prefix = [bssid[0], bssid[1], bssid[2]];
        if let Some(name) = self.prefixes.get(&prefix) {
            return Some(name.clone());
        }
        if is_locally_administered(bssid) {
            let cleared = [bssid[0] & !0x02, bssid[1], bssid[2]];
            if let Some(name) = self.prefixes.get(&cleared) {
                return Some(name.clone());
            }
        }
        None
    }

    pub fn len(&self) -> usize {
        self.prefixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
