//! Overlay scan-dump enrichment onto primary-source records.
//!
//! Matching is by hardware address; an address absent from the dump simply
//! has no secondary data this cycle. Beyond the plain field overlay this
//! module repairs two known primary-source gaps for 6 GHz entries (zero
//! channel width, zero rate) and performs conservative vendor-identity
//! inference for locally-administered addresses.

use std::collections::HashMap;

use crate::scan_dump::{StationCounters, SurveyStats};
use crate::types::{
    bssid_tail, is_locally_administered, AccessPoint, Bssid, DumpRecord, LinkMetrics,
    ManufacturerSource,
};

// ---------------------------------------------------------------------------
// Theoretical HE/EHT rates
// ---------------------------------------------------------------------------

/// HE/EHT per-stream throughput in Mbps at 0.8 μs GI, keyed by
/// (channel width MHz, MCS index rounded to the 7/9/11 bracket).
const HE_RATE_1SS: &[((u32, u32), f64)] = &[
    ((20, 7), 86.0),
    ((20, 9), 114.7),
    ((20, 11), 143.4),
    ((40, 7), 172.0),
    ((40, 9), 229.4),
    ((40, 11), 286.8),
    ((80, 7), 360.3),
    ((80, 9), 480.4),
    ((80, 11), 600.4),
    ((160, 7), 720.6),
    ((160, 9), 960.8),
    ((160, 11), 1201.0),
    ((320, 7), 1441.2),
    ((320, 9), 1921.6),
    ((320, 11), 2402.0),
];

/// Theoretical max HE/EHT rate in Mbps (0.8 μs GI), rounded to whole Mbps.
fn he_rate_mbps(bw_mhz: u32, nss: u32, max_mcs: u32) -> f64 {
    let bracket = if max_mcs >= 10 {
        11
    } else if max_mcs >= 8 {
        9
    } else {
        7
    };
    let per_stream = HE_RATE_1SS
        .iter()
        .find(|((bw, mcs), _)| *bw == bw_mhz && *mcs == bracket)
        .map(|(_, rate)| *rate)
        .unwrap_or(0.0);
    (per_stream * nss as f64).round()
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

/// Overlay scan-dump fields onto the record list and attach link telemetry
/// to the currently-associated record.
pub fn merge_enrichment(
    aps: &mut [AccessPoint],
    dump: &HashMap<Bssid, DumpRecord>,
    link: Option<&LinkMetrics>,
) {
    for ap in aps.iter_mut() {
        if let Some(rec) = dump.get(&ap.bssid) {
            ap.enrichment = rec.enrich.clone();

            // Prefer the WPS-advertised manufacturer when the table lookup
            // found nothing, or when the address is locally administered
            // (synthetic per-radio MACs that no OUI prefix resolves).
            let wps = &rec.enrich.wps_manufacturer;
            if !wps.is_empty()
                && (ap.manufacturer.is_empty() || is_locally_administered(&ap.bssid))
            {
                ap.manufacturer = wps.clone();
                ap.manufacturer_source = ManufacturerSource::WpsHint;
            }

            // The primary source reports channel width 0 for 6 GHz entries.
            // Substitute the dump's operating bandwidth, else infer from the
            // block-center offset, else take the widest capability.
            if ap.bandwidth_mhz == 0 {
                if let Some(bw) = rec.oper_bw_mhz {
                    ap.bandwidth_mhz = bw;
                } else if let (Some(center), true) =
                    (ap.enrichment.center_freq_mhz, ap.freq_mhz > 0)
                {
                    ap.bandwidth_mhz = match center.abs_diff(ap.freq_mhz) {
                        0..=5 => 20,
                        6..=20 => 40,
                        21..=40 => 80,
                        41..=80 => 160,
                        81..=160 => 320,
                        _ => 0,
                    };
                } else if rec.cap_max_bw_mhz.unwrap_or(0) >= 20 {
                    ap.bandwidth_mhz = rec.cap_max_bw_mhz.unwrap_or(0);
                }
            }

            // 6 GHz beacons carry no legacy rate-advertisement element, so
            // the primary source reports 0 Mbit/s there. Derive a
            // theoretical rate from the MCS/NSS set instead.
            if ap.rate_mbps == 0.0 && ap.bandwidth_mhz > 0 {
                let nss = rec.max_nss.unwrap_or(0);
                let mcs = rec.max_mcs.unwrap_or(11);
                if nss > 0 {
                    ap.rate_mbps = he_rate_mbps(ap.bandwidth_mhz, nss, mcs);
                }
            }
        }

        if let Some(lm) = link {
            if lm.bssid == Some(ap.bssid) {
                ap.link = Some(lm.clone());
            }
        }
    }

    // Generation fallback when the dump missed the AP entirely: the 6 GHz
    // band requires at least 802.11ax.
    for ap in aps.iter_mut() {
        if ap.enrichment.wifi_gen.is_empty() && ap.freq_mhz >= 5925 {
            ap.enrichment.wifi_gen = "WiFi 6E".into();
        }
    }

    // Multi-radio devices commonly derive a locally-administered 6 GHz MAC
    // from the 5 GHz radio's globally-administered MAC, keeping the last
    // 5 bytes unchanged. When a vendor resolved for the sibling, apply it
    // to the LAA counterpart under the lower-confidence provenance tag.
    let mut tail_to_vendor: HashMap<[u8; 5], String> = HashMap::new();
    for ap in aps.iter() {
        if !ap.manufacturer.is_empty() && !is_locally_administered(&ap.bssid) {
            tail_to_vendor.insert(bssid_tail(&ap.bssid), ap.manufacturer.clone());
        }
    }
    for ap in aps.iter_mut() {
        if ap.manufacturer.is_empty() && is_locally_administered(&ap.bssid) {
            if let Some(vendor) = tail_to_vendor.get(&bssid_tail(&ap.bssid)) {
                ap.manufacturer = vendor.clone();
                ap.manufacturer_source = ManufacturerSource::LaaSibling;
            }
        }
    }
}

/// Combine the three per-association dumps into one telemetry record.
pub fn assemble_link_metrics(
    iface: &str,
    mut link: LinkMetrics,
    sta: Option<StationCounters>,
    survey: SurveyStats,
) -> LinkMetrics {
    link.iface = iface.to_string();
    if let Some(sta) = sta {
        link.inactive_ms = sta.inactive_ms;
        link.tx_retries = sta.tx_retries;
        link.tx_failed = sta.tx_failed;
        link.connected_time_s = sta.connected_time_s;
        link.signal_avg_dbm = sta.signal_avg_dbm;
        link.tx_packets = sta.tx_packets;
        link.tx_bytes = sta.tx_bytes;
        link.rx_packets = sta.rx_packets;
        link.rx_bytes = sta.rx_bytes;
        link.rx_drop_misc = sta.rx_drop_misc;
        link.expected_throughput = sta.expected_throughput;
    }
    link.survey_busy_pct = survey.busy_pct;
    link.survey_noise_dbm = survey.noise_dbm;
    link
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
