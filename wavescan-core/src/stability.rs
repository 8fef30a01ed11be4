//! Temporal stabilization of the per-cycle record feed.
//!
//! Three independent policies, all keyed by hardware address, make a lossy
//! per-cycle feed usable:
//! - `StickyFields`: last-known-good values for fields that spuriously
//!   report zero/empty after a real value was seen
//! - `EnrichmentCache`: carries scan-dump enrichment across cycles the dump
//!   missed, up to a fixed miss ceiling
//! - `LingerCache`: keeps recently-vanished access points visible for a
//!   grace window before evicting them
//!
//! Each collaborator is pure state + an observe call; the cadence
//! controller composes them. Time is passed in explicitly so every policy
//! is testable without sleeping.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use crate::types::{AccessPoint, Bssid, Enrichment, LinkMetrics, ManufacturerSource};

// ---------------------------------------------------------------------------
// Sticky-nonzero fields
// ---------------------------------------------------------------------------

/// Last known-good values for the fields the upstream tools are known to
/// drop transiently (especially for 6 GHz entries).
#[derive(Debug, Clone, Default)]
struct StickyEntry {
    bandwidth_mhz: Option<u32>,
    rate_mbps: Option<f64>,
    wifi_gen: Option<String>,
    country: Option<String>,
    center_freq_mhz: Option<u32>,
}

/// Monotonic-within-session "last known good" per address: once a truthy
/// value has been seen for a field, the emitted record never regresses to
/// zero/empty for it.
#[derive(Debug, Default)]
pub struct StickyFields {
    cache: HashMap<Bssid, StickyEntry>,
}

impl StickyFields {
    pub fn new() -> Self {
        StickyFields::default()
    }

    /// Update the cache from truthy fields and restore cached values into
    /// falsy ones.
    pub fn observe(&mut self, ap: &mut AccessPoint) {
        let entry = self.cache.entry(ap.bssid).or_default();

        if ap.bandwidth_mhz != 0 {
            entry.bandwidth_mhz = Some(ap.bandwidth_mhz);
        } else if let Some(v) = entry.bandwidth_mhz {
            ap.bandwidth_mhz = v;
        }

        if ap.rate_mbps != 0.0 {
            entry.rate_mbps = Some(ap.rate_mbps);
        } else if let Some(v) = entry.rate_mbps {
            ap.rate_mbps = v;
        }

        if !ap.enrichment.wifi_gen.is_empty() {
            entry.wifi_gen = Some(ap.enrichment.wifi_gen.clone());
        } else if let Some(v) = &entry.wifi_gen {
            ap.enrichment.wifi_gen = v.clone();
        }

        if !ap.enrichment.country.is_empty() {
            entry.country = Some(ap.enrichment.country.clone());
        } else if let Some(v) = &entry.country {
            ap.enrichment.country = v.clone();
        }

        match ap.enrichment.center_freq_mhz {
            Some(v) if v != 0 => entry.center_freq_mhz = Some(v),
            _ => {
                if entry.center_freq_mhz.is_some() {
                    ap.enrichment.center_freq_mhz = entry.center_freq_mhz;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Enrichment persistence across missed cycles
// ---------------------------------------------------------------------------

/// The scan dump misses addresses whose driver-side cache entry aged out.
/// Restoration is capped so stale enrichment is never presented as current
/// indefinitely.
pub const ENRICH_MISS_CEILING: u32 = 5;

/// Everything the scan dump contributes to a record, snapshotted as a unit.
#[derive(Debug, Clone)]
struct EnrichmentSnapshot {
    enrichment: Enrichment,
    manufacturer: String,
    manufacturer_source: ManufacturerSource,
    link: Option<LinkMetrics>,
}

/// Persist enrichment across cycles the dump missed.
///
/// The PMF field is the liveness signal: the dump parser sets it to one of
/// three non-empty values for every address it covers, so an empty PMF
/// means "not covered this cycle".
#[derive(Debug, Default)]
pub struct EnrichmentCache {
    snapshots: HashMap<Bssid, EnrichmentSnapshot>,
    misses: HashMap<Bssid, u32>,
}

impl EnrichmentCache {
    pub fn new() -> Self {
        EnrichmentCache::default()
    }

    /// Snapshot covered addresses; restore the last snapshot into missed
    /// ones while the miss counter is below the ceiling.
    pub fn observe(&mut self, ap: &mut AccessPoint) {
        if !ap.enrichment.pmf.is_empty() {
            self.snapshots.insert(ap.bssid, snapshot_of(ap));
            self.misses.insert(ap.bssid, 0);
            return;
        }

        let misses = self.misses.get(&ap.bssid).copied().unwrap_or(0);
        if misses < ENRICH_MISS_CEILING {
            if let Some(snap) = self.snapshots.get(&ap.bssid) {
                ap.enrichment = snap.enrichment.clone();
                ap.manufacturer = snap.manufacturer.clone();
                ap.manufacturer_source = snap.manufacturer_source;
                ap.link = snap.link.clone();
                self.misses.insert(ap.bssid, misses + 1);
            }
        }
    }

    /// Re-snapshot an already-cached address after later passes (counter
    /// deltas) changed its fields, so restored cycles see the update too.
    pub fn refresh(&mut self, ap: &AccessPoint) {
        if self.snapshots.contains_key(&ap.bssid) {
            self.snapshots.insert(ap.bssid, snapshot_of(ap));
        }
    }
}

fn snapshot_of(ap: &AccessPoint) -> EnrichmentSnapshot {
    EnrichmentSnapshot {
        enrichment: ap.enrichment.clone(),
        manufacturer: ap.manufacturer.clone(),
        manufacturer_source: ap.manufacturer_source,
        link: ap.link.clone(),
    }
}

// ---------------------------------------------------------------------------
// Tx counter deltas
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct TxCounters {
    packets: u64,
    retries: u64,
    failed: u64,
}

/// Derive per-cycle retry/failure rates from the associated AP's lifetime
/// tx counters.
#[derive(Debug, Default)]
pub struct RetryRates {
    prev: HashMap<Bssid, TxCounters>,
}

impl RetryRates {
    pub fn new() -> Self {
        RetryRates::default()
    }

    pub fn observe(&mut self, ap: &mut AccessPoint) {
        if !ap.in_use {
            return;
        }
        let link = match ap.link.as_mut() {
            Some(l) => l,
            None => return,
        };
        let (packets, retries, failed) =
            match (link.tx_packets, link.tx_retries, link.tx_failed) {
                (Some(p), Some(r), Some(f)) => (p, r, f),
                _ => return,
            };

        if let Some(prev) = self.prev.get(&ap.bssid) {
            let d_pkts = packets as i64 - prev.packets as i64;
            let d_retry = retries as i64 - prev.retries as i64;
            let d_fail = failed as i64 - prev.failed as i64;
            // Counters reset on reassociation; skip the cycle where any
            // delta runs backwards.
            if d_pkts > 0 && d_retry >= 0 && d_fail >= 0 {
                link.tx_retry_rate_pct = Some(d_retry as f64 / d_pkts as f64 * 100.0);
                link.tx_fail_rate_pct = Some(d_fail as f64 / d_pkts as f64 * 100.0);
            }
        }
        self.prev.insert(
            ap.bssid,
            TxCounters {
                packets,
                retries,
                failed,
            },
        );
    }
}

// ---------------------------------------------------------------------------
// Linger
// ---------------------------------------------------------------------------

/// Grace-period visibility for recently-vanished access points.
///
/// The primary source's per-cycle result is the ground truth for which
/// addresses exist; this cache only smooths single-poll visibility flaps.
#[derive(Debug)]
pub struct LingerCache {
    window: Duration,
    cache: HashMap<Bssid, (AccessPoint, Instant)>,
}

impl LingerCache {
    pub fn new(window: Duration) -> Self {
        LingerCache {
            window,
            cache: HashMap::new(),
        }
    }

    pub fn set_window(&mut self, window: Duration) {
        self.window = window;
    }

    /// Mark this cycle's records fresh, re-append cached records still
    /// inside the grace window with the lingering flag set, and evict
    /// entries whose window elapsed. A zero window disables lingering.
    pub fn merge(&mut self, aps: &mut Vec<AccessPoint>, now: Instant) {
        let mut fresh: HashSet<Bssid> = HashSet::new();
        for ap in aps.iter_mut() {
            ap.lingering = false;
            self.cache.insert(ap.bssid, (ap.clone(), now));
            fresh.insert(ap.bssid);
        }

        if self.window.is_zero() {
            self.cache.retain(|key, _| fresh.contains(key));
            return;
        }

        let mut expired = Vec::new();
        for (key, (cached, last_seen)) in self.cache.iter_mut() {
            if fresh.contains(key) {
                continue;
            }
            if now.duration_since(*last_seen) <= self.window {
                cached.lingering = true;
                aps.push(cached.clone());
            } else {
                expired.push(*key);
            }
        }
        for key in expired {
            self.cache.remove(&key);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vendor::VendorResolver;

    const A: Bssid = [0xAA, 0, 0, 0, 0, 1];
    const B: Bssid = [0xAA, 0, 0, 0, 0, 2];

    fn make_ap(bssid: Bssid, bw: u32, rate: f64) -> AccessPoint {
        AccessPoint::new(
            "Net".into(),
            bssid,
            "Infra".into(),
            33,
            6115,
            rate,
            50,
            "WPA2".into(),
            String::new(),
            String::new(),
            bw,
            false,
            &VendorResolver::builtin(),
        )
    }

    fn enriched_ap(bssid: Bssid) -> AccessPoint {
        let mut ap = make_ap(bssid, 160, 2402.0);
        ap.enrichment.pmf = "Required".into();
        ap.enrichment.wifi_gen = "WiFi 6E".into();
        ap.enrichment.country = "DE".into();
        ap.enrichment.station_count = Some(7);
        ap
    }

    #[test]
    fn test_sticky_restores_zeroed_fields() {
        let mut sticky = StickyFields::new();

        let mut ap = make_ap(A, 160, 2402.0);
        ap.enrichment.wifi_gen = "WiFi 6E".into();
        ap.enrichment.country = "DE".into();
        ap.enrichment.center_freq_mhz = Some(6105);
        sticky.observe(&mut ap);

        let mut ap = make_ap(A, 0, 0.0);
        sticky.observe(&mut ap);
        assert_eq!(ap.bandwidth_mhz, 160);
        assert_eq!(ap.rate_mbps, 2402.0);
        assert_eq!(ap.enrichment.wifi_gen, "WiFi 6E");
        assert_eq!(ap.enrichment.country, "DE");
        assert_eq!(ap.enrichment.center_freq_mhz, Some(6105));
    }

    #[test]
    fn test_sticky_monotonic_across_many_cycles() {
        let mut sticky = StickyFields::new();
        let mut ap = make_ap(A, 80, 866.0);
        sticky.observe(&mut ap);

        // Once truthy, no later cycle may observe the field falsy
        for _ in 0..10 {
            let mut ap = make_ap(A, 0, 0.0);
            sticky.observe(&mut ap);
            assert_eq!(ap.bandwidth_mhz, 80);
            assert_eq!(ap.rate_mbps, 866.0);
        }
    }

    #[test]
    fn test_sticky_tracks_newer_values() {
        let mut sticky = StickyFields::new();
        let mut ap = make_ap(A, 80, 866.0);
        sticky.observe(&mut ap);
        let mut ap = make_ap(A, 160, 2402.0);
        sticky.observe(&mut ap);
        let mut ap = make_ap(A, 0, 0.0);
        sticky.observe(&mut ap);
        assert_eq!(ap.bandwidth_mhz, 160);
        assert_eq!(ap.rate_mbps, 2402.0);
    }

    #[test]
    fn test_sticky_per_address() {
        let mut sticky = StickyFields::new();
        let mut ap = make_ap(A, 160, 2402.0);
        sticky.observe(&mut ap);

        // A different address gets no restoration
        let mut other = make_ap(B, 0, 0.0);
        sticky.observe(&mut other);
        assert_eq!(other.bandwidth_mhz, 0);
    }

    #[test]
    fn test_enrichment_restored_while_below_ceiling() {
        let mut cache = EnrichmentCache::new();
        let mut ap = enriched_ap(A);
        cache.observe(&mut ap);

        for _ in 0..ENRICH_MISS_CEILING {
            let mut ap = make_ap(A, 160, 2402.0);
            assert!(ap.enrichment.pmf.is_empty());
            cache.observe(&mut ap);
            assert_eq!(ap.enrichment.pmf, "Required");
            assert_eq!(ap.enrichment.station_count, Some(7));
        }

        // Ceiling reached: the address is truly unenriched now
        let mut ap = make_ap(A, 160, 2402.0);
        cache.observe(&mut ap);
        assert!(ap.enrichment.pmf.is_empty());
        assert_eq!(ap.enrichment.station_count, None);
    }

    #[test]
    fn test_enrichment_coverage_resets_miss_counter() {
        let mut cache = EnrichmentCache::new();
        let mut ap = enriched_ap(A);
        cache.observe(&mut ap);

        for _ in 0..3 {
            let mut ap = make_ap(A, 160, 2402.0);
            cache.observe(&mut ap);
        }

        // Covered again → counter back to zero → full window available
        let mut ap = enriched_ap(A);
        cache.observe(&mut ap);
        for _ in 0..ENRICH_MISS_CEILING {
            let mut ap = make_ap(A, 160, 2402.0);
            cache.observe(&mut ap);
            assert_eq!(ap.enrichment.pmf, "Required");
        }
    }

    #[test]
    fn test_enrichment_restores_manufacturer() {
        let mut cache = EnrichmentCache::new();
        let mut ap = enriched_ap(A);
        ap.manufacturer = "AVM".into();
        ap.manufacturer_source = ManufacturerSource::WpsHint;
        cache.observe(&mut ap);

        let mut ap = make_ap(A, 160, 2402.0);
        ap.manufacturer.clear();
        ap.manufacturer_source = ManufacturerSource::Unknown;
        cache.observe(&mut ap);
        assert_eq!(ap.manufacturer, "AVM");
        assert_eq!(ap.manufacturer_source, ManufacturerSource::WpsHint);
    }

    #[test]
    fn test_enrichment_refresh_updates_snapshot() {
        let mut cache = EnrichmentCache::new();
        let mut ap = enriched_ap(A);
        cache.observe(&mut ap);

        ap.enrichment.station_count = Some(9);
        cache.refresh(&ap);

        let mut missed = make_ap(A, 160, 2402.0);
        cache.observe(&mut missed);
        assert_eq!(missed.enrichment.station_count, Some(9));
    }

    #[test]
    fn test_retry_rates_from_deltas() {
        let mut rates = RetryRates::new();

        let mut ap = make_ap(A, 160, 2402.0);
        ap.in_use = true;
        ap.link = Some(LinkMetrics {
            tx_packets: Some(1000),
            tx_retries: Some(100),
            tx_failed: Some(10),
            ..LinkMetrics::default()
        });
        rates.observe(&mut ap);
        assert_eq!(ap.link.as_ref().unwrap().tx_retry_rate_pct, None);

        let mut ap = make_ap(A, 160, 2402.0);
        ap.in_use = true;
        ap.link = Some(LinkMetrics {
            tx_packets: Some(1200),
            tx_retries: Some(150),
            tx_failed: Some(12),
            ..LinkMetrics::default()
        });
        rates.observe(&mut ap);
        let link = ap.link.as_ref().unwrap();
        assert_eq!(link.tx_retry_rate_pct, Some(25.0)); // 50 / 200
        assert_eq!(link.tx_fail_rate_pct, Some(1.0)); // 2 / 200
    }

    #[test]
    fn test_retry_rates_skip_counter_reset() {
        let mut rates = RetryRates::new();
        for (pkts, retries) in [(1000u64, 100u64), (50, 5)] {
            let mut ap = make_ap(A, 160, 2402.0);
            ap.in_use = true;
            ap.link = Some(LinkMetrics {
                tx_packets: Some(pkts),
                tx_retries: Some(retries),
                tx_failed: Some(0),
                ..LinkMetrics::default()
            });
            rates.observe(&mut ap);
            assert_eq!(ap.link.as_ref().unwrap().tx_retry_rate_pct, None);
        }
    }

    #[test]
    fn test_linger_window_boundary() {
        let window = Duration::from_secs(30);
        let mut linger = LingerCache::new(window);
        let t0 = Instant::now();

        let mut aps = vec![make_ap(A, 40, 270.0)];
        linger.merge(&mut aps, t0);
        assert_eq!(aps.len(), 1);

        // Absent for exactly the window: still present, flagged
        let mut aps = Vec::new();
        linger.merge(&mut aps, t0 + window);
        assert_eq!(aps.len(), 1);
        assert!(aps[0].lingering);

        // Strictly greater: evicted
        let mut aps = Vec::new();
        linger.merge(&mut aps, t0 + window + Duration::from_millis(1));
        assert!(aps.is_empty());

        // And the eviction is permanent
        let mut aps = Vec::new();
        linger.merge(&mut aps, t0 + window + Duration::from_secs(1));
        assert!(aps.is_empty());
    }

    #[test]
    fn test_linger_reappearance_clears_flag() {
        let mut linger = LingerCache::new(Duration::from_secs(30));
        let t0 = Instant::now();

        let mut aps = vec![make_ap(A, 40, 270.0)];
        linger.merge(&mut aps, t0);

        let mut aps = Vec::new();
        linger.merge(&mut aps, t0 + Duration::from_secs(10));
        assert!(aps[0].lingering);

        // Seen again: fresh, flag cleared, timestamp reset
        let mut aps = vec![make_ap(A, 40, 270.0)];
        linger.merge(&mut aps, t0 + Duration::from_secs(20));
        assert!(!aps[0].lingering);

        let mut aps = Vec::new();
        linger.merge(&mut aps, t0 + Duration::from_secs(45));
        assert_eq!(aps.len(), 1, "window measured from the latest sighting");
    }

    #[test]
    fn test_linger_zero_window_disables() {
        let mut linger = LingerCache::new(Duration::ZERO);
        let t0 = Instant::now();

        let mut aps = vec![make_ap(A, 40, 270.0)];
        linger.merge(&mut aps, t0);

        let mut aps = Vec::new();
        linger.merge(&mut aps, t0 + Duration::from_millis(1));
        assert!(aps.is_empty());
    }

    #[test]
    fn test_linger_only_missing_addresses_appended() {
        let mut linger = LingerCache::new(Duration::from_secs(30));
        let t0 = Instant::now();

        let mut aps = vec![make_ap(A, 40, 270.0), make_ap(B, 80, 866.0)];
        linger.merge(&mut aps, t0);

        let mut aps = vec![make_ap(A, 40, 270.0)];
        linger.merge(&mut aps, t0 + Duration::from_secs(5));
        assert_eq!(aps.len(), 2);
        assert!(!aps[0].lingering);
        assert!(aps.iter().any(|ap| ap.bssid == B && ap.lingering));
    }
}
