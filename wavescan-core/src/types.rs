//! Shared types, error enum, and the access-point record model.

use serde::Serialize;
use thiserror::Error;

use crate::vendor::VendorResolver;

/// All errors produced by wavescan-core.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("{0} not found — is it installed?")]
    ToolMissing(String),
    #[error("{tool} timed out after {timeout_secs}s")]
    Timeout { tool: String, timeout_secs: u64 },
    #[error("{tool} failed: {stderr}")]
    CommandFailed { tool: String, stderr: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config error: {0}")]
    Config(String),
}

impl ScanError {
    /// Fatal errors end the worker loop; everything else is transient and
    /// the loop keeps polling.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ScanError::ToolMissing(_))
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;

// ---------------------------------------------------------------------------
// BSSID helpers
// ---------------------------------------------------------------------------

/// 6-byte hardware address. Stored as raw bytes so map keys are free of
/// case-normalization concerns.
pub type Bssid = [u8; 6];

/// Parse a colon- or dash-separated MAC string. Case-insensitive.
pub fn bssid_from_str(s: &str) -> Option<Bssid> {
    let mut out = [0u8; 6];
    let mut n = 0;
    for part in s.trim().split([':', '-']) {
        if n == 6 || part.len() != 2 {
            return None;
        }
        out[n] = u8::from_str_radix(part, 16).ok()?;
        n += 1;
    }
    if n == 6 {
        Some(out)
    } else {
        None
    }
}

/// Format as uppercase colon-hex, the way the primary source prints it.
pub fn bssid_to_string(b: &Bssid) -> String {
    format!(
        "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
        b[0], b[1], b[2], b[3], b[4], b[5]
    )
}

/// U/L bit of the first octet — set on locally-administered addresses,
/// which are typically synthesized per-radio rather than burned in.
pub fn is_locally_administered(b: &Bssid) -> bool {
    b[0] & 0x02 != 0
}

/// Trailing 5 bytes. Multi-radio devices commonly derive per-band MACs
/// that differ only in the first octet.
pub fn bssid_tail(b: &Bssid) -> [u8; 5] {
    [b[1], b[2], b[3], b[4], b[5]]
}

// ---------------------------------------------------------------------------
// Frequency band
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Band {
    Band24,
    Band5,
    Band6,
    Unknown,
}

impl std::fmt::Display for Band {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Band::Band24 => write!(f, "2.4 GHz"),
            Band::Band5 => write!(f, "5 GHz"),
            Band::Band6 => write!(f, "6 GHz"),
            Band::Unknown => write!(f, "?"),
        }
    }
}

// ---------------------------------------------------------------------------
// Manufacturer provenance
// ---------------------------------------------------------------------------

/// Where a manufacturer name came from. `LaaSibling` is an inference and
/// deliberately kept distinct so consumers can render it as lower-confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ManufacturerSource {
    OuiDatabase,
    WpsHint,
    LaaSibling,
    Unknown,
}

impl std::fmt::Display for ManufacturerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ManufacturerSource::OuiDatabase => write!(f, "OUI database"),
            ManufacturerSource::WpsHint => write!(f, "WPS (scan dump)"),
            ManufacturerSource::LaaSibling => write!(f, "LAA sibling OUI"),
            ManufacturerSource::Unknown => write!(f, "Unknown"),
        }
    }
}

// ---------------------------------------------------------------------------
// Enrichment fields (secondary source)
// ---------------------------------------------------------------------------

/// Fields populated only when the scan dump covered the address this cycle.
/// Every field is optional/empty by default; the merger overlays whatever
/// the dump produced and leaves the rest untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Enrichment {
    /// Exact signal in dBm, more precise than the 0-100 scale.
    pub dbm_exact: Option<f64>,
    /// "WiFi 4" / "WiFi 5" / "WiFi 6" / "WiFi 6E" / "WiFi 7", or empty.
    pub wifi_gen: String,
    /// BSS Load channel utilization, raw 0-255.
    pub chan_util: Option<u8>,
    /// BSS Load station count.
    pub station_count: Option<u32>,
    /// "No" / "Optional" / "Required". Set for every address the dump
    /// covers, which is what makes it usable as a liveness signal.
    pub pmf: String,
    /// Compact AKM summary, e.g. "WPA2-PSK", "WPA3-SAE +FT".
    pub akm: String,
    /// Raw authentication-suites string as reported.
    pub akm_raw: String,
    /// Manufacturer advertised in the WPS IE, if any.
    pub wps_manufacturer: String,
    /// 802.11k Radio Resource Measurement.
    pub rrm: bool,
    /// 802.11v BSS Transition Management.
    pub btm: bool,
    /// 802.11r Fast Transition.
    pub ft: bool,
    /// Regulatory country code from the beacon, e.g. "DE".
    pub country: String,
    /// Bonded-block center frequency in MHz.
    pub center_freq_mhz: Option<u32>,
    /// Beacon interval in TU.
    pub beacon_interval_tu: Option<u32>,
    /// DTIM period from the beacon TIM IE.
    pub dtim_period: Option<u32>,
    /// Decoded RSN capability bits, human-readable.
    pub rsn_capabilities: String,
    /// Vendor-specific IE OUIs seen in the beacon, deduplicated.
    pub vendor_ie_ouis: String,
    /// Capability-family summary, e.g. "HT/VHT/HE · max width 160 MHz".
    pub phy_cap_summary: String,
    /// HE/EHT extras (BSS color, TWT, spatial reuse).
    pub he_eht_features: String,
}

/// Per-address output of the scan-dump parser: the enrichment fields plus
/// merge-only hints that never land on the emitted record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DumpRecord {
    pub enrich: Enrichment,
    /// Operating bandwidth from the HE/VHT Operation IE.
    pub oper_bw_mhz: Option<u32>,
    /// Widest bandwidth the capability IEs admit.
    pub cap_max_bw_mhz: Option<u32>,
    /// Max spatial streams from the MCS set.
    pub max_nss: Option<u32>,
    /// Max MCS index from the MCS set.
    pub max_mcs: Option<u32>,
}

// ---------------------------------------------------------------------------
// Live link telemetry (associated AP only)
// ---------------------------------------------------------------------------

/// Telemetry for the currently-associated access point, collected from the
/// link-status, per-station and survey dumps.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LinkMetrics {
    pub iface: String,
    pub bssid: Option<Bssid>,
    pub ssid: String,
    pub freq_mhz: Option<u32>,
    pub signal_dbm: Option<f64>,
    pub rx_bitrate: String,
    pub tx_bitrate: String,
    /// Decomposed PHY summaries of the bitrate strings.
    pub rx_phy: String,
    pub tx_phy: String,
    pub expected_throughput: String,
    pub signal_avg_dbm: Option<i32>,
    pub tx_retries: Option<u64>,
    pub tx_failed: Option<u64>,
    pub inactive_ms: Option<u64>,
    pub connected_time_s: Option<u64>,
    pub tx_packets: Option<u64>,
    pub tx_bytes: Option<u64>,
    pub rx_packets: Option<u64>,
    pub rx_bytes: Option<u64>,
    pub rx_drop_misc: Option<u64>,
    /// Delta-derived rates over the last cycle, not lifetime counters.
    pub tx_retry_rate_pct: Option<f64>,
    pub tx_fail_rate_pct: Option<f64>,
    pub survey_busy_pct: Option<f64>,
    pub survey_noise_dbm: Option<i32>,
}

// ---------------------------------------------------------------------------
// AccessPoint
// ---------------------------------------------------------------------------

/// One discovered access point. Identity is the hardware address; it is the
/// sole join key between the two sources and across polling cycles.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccessPoint {
    // Required fields, always populated from the primary source.
    pub ssid: String,
    pub bssid: Bssid,
    pub mode: String,
    pub channel: u16,
    pub freq_mhz: u32,
    pub rate_mbps: f64,
    /// 0-100 integer scale.
    pub signal: u8,
    pub security: String,
    pub wpa_flags: String,
    pub rsn_flags: String,
    pub bandwidth_mhz: u32,
    pub in_use: bool,

    // Derived once at construction, never re-derived by enrichment.
    pub band: Band,
    pub manufacturer: String,
    pub manufacturer_source: ManufacturerSource,

    // Secondary-source overlay.
    pub enrichment: Enrichment,
    /// Present only on the currently-associated record.
    pub link: Option<LinkMetrics>,

    /// Presentation hint: set while the record is only visible through the
    /// linger grace period.
    pub lingering: bool,
}

impl AccessPoint {
    /// Build a record from the primary source's required fields. Band and
    /// manufacturer are computed here, once.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ssid: String,
        bssid: Bssid,
        mode: String,
        channel: u16,
        freq_mhz: u32,
        rate_mbps: f64,
        signal: u8,
        security: String,
        wpa_flags: String,
        rsn_flags: String,
        bandwidth_mhz: u32,
        in_use: bool,
        vendors: &VendorResolver,
    ) -> Self {
        let manufacturer = vendors.manufacturer_for(&bssid).unwrap_or_default();
        let manufacturer_source = if manufacturer.is_empty() {
            ManufacturerSource::Unknown
        } else {
            ManufacturerSource::OuiDatabase
        };
        AccessPoint {
            ssid,
            bssid,
            mode,
            channel,
            freq_mhz,
            rate_mbps,
            signal,
            security,
            wpa_flags,
            rsn_flags,
            bandwidth_mhz,
            in_use,
            band: crate::channels::freq_to_band(freq_mhz),
            manufacturer,
            manufacturer_source,
            enrichment: Enrichment::default(),
            link: None,
            lingering: false,
        }
    }

    /// Signal in dBm. Prefers the exact value from the scan dump; falls back
    /// to an approximation of the 0-100 scale.
    pub fn dbm(&self) -> i32 {
        match self.enrichment.dbm_exact {
            Some(v) => v.round() as i32,
            None => signal_to_dbm(self.signal),
        }
    }

    /// Channel utilization as 0-100 percent.
    pub fn chan_util_pct(&self) -> Option<u8> {
        self.enrichment
            .chan_util
            .map(|raw| ((raw as f64) / 255.0 * 100.0).round() as u8)
    }

    /// Compact 802.11k/v/r roaming badge, e.g. "k v r" or "".
    pub fn kvr_flags(&self) -> String {
        let mut flags = Vec::new();
        if self.enrichment.rrm {
            flags.push("k");
        }
        if self.enrichment.btm {
            flags.push("v");
        }
        if self.enrichment.ft {
            flags.push("r");
        }
        flags.join(" ")
    }

    /// SSID for display; hidden networks show their hardware address.
    pub fn display_ssid(&self) -> String {
        if self.ssid.is_empty() {
            format!("<hidden> ({})", bssid_to_string(&self.bssid))
        } else {
            self.ssid.clone()
        }
    }

    /// Compact 802.11 PHY mode (e.g. B/G, A/N, AC, AX, BE).
    pub fn phy_mode(&self) -> &'static str {
        match self.enrichment.wifi_gen.as_str() {
            "WiFi 7" => "BE",
            "WiFi 6" | "WiFi 6E" => "AX",
            "WiFi 5" => "AC",
            "WiFi 4" => {
                if self.freq_mhz >= 5000 {
                    "A/N"
                } else {
                    "B/G/N"
                }
            }
            _ => {
                if self.freq_mhz >= 5000 {
                    "A"
                } else {
                    "B/G"
                }
            }
        }
    }

    /// Compact canonical security label combining the primary source's
    /// flag strings with the scan dump's AKM summary.
    pub fn security_short(&self) -> String {
        let sec = self.security.trim().to_uppercase();
        let wpa = self.wpa_flags.trim().to_uppercase();
        let rsn = self.rsn_flags.trim().to_uppercase();
        let akm_src = if self.enrichment.akm_raw.is_empty() {
            &self.enrichment.akm
        } else {
            &self.enrichment.akm_raw
        };
        let akm = akm_src.trim().to_uppercase();

        let has_wpa_ie = !matches!(wpa.as_str(), "" | "--" | "(NONE)");
        let has_rsn_ie = !matches!(rsn.as_str(), "" | "--" | "(NONE)");
        let has_wep = sec.contains("WEP");
        let has_sae = akm.contains("SAE");
        let has_psk = akm.contains("PSK")
            || sec.contains("PSK")
            || wpa.contains("PSK")
            || rsn.contains("PSK");
        let has_eap = akm.contains("EAP")
            || akm.contains("802.1X")
            || akm.contains("8021X")
            || akm.contains("ENTERPRISE")
            || sec.contains("EAP");
        let has_owe = akm.contains("OWE") || sec.contains("OWE");

        if sec.is_empty() && !has_wpa_ie && !has_rsn_ie && akm.is_empty() {
            return "Open".into();
        }
        if has_wep {
            return "WEP".into();
        }
        if has_owe {
            return "OWE".into();
        }

        if has_sae && has_psk {
            return "WPA2/WPA3 (PSK/SAE)".into();
        }
        if has_sae {
            return "WPA3 (SAE)".into();
        }

        if has_eap {
            if has_wpa_ie && has_rsn_ie {
                return "WPA/WPA2 (802.1X)".into();
            }
            if has_rsn_ie {
                return "WPA2 (802.1X)".into();
            }
            return "Enterprise (802.1X)".into();
        }

        if has_wpa_ie && has_rsn_ie {
            return "WPA/WPA2 (PSK)".into();
        }
        if has_rsn_ie {
            return "WPA2 (PSK)".into();
        }
        if has_wpa_ie {
            return "WPA (PSK)".into();
        }

        // Only the SECURITY column mentions WPA — no IE detail available.
        if sec.contains("WPA3") && sec.contains("WPA2") {
            return "WPA2/WPA3 (PSK/SAE)".into();
        }
        if sec.contains("WPA3") {
            return "WPA3".into();
        }
        if sec.contains("WPA2") && sec.contains("WPA1") {
            return "WPA/WPA2".into();
        }
        if sec.contains("WPA2") {
            return "WPA2".into();
        }
        if sec.contains("WPA") {
            return "WPA".into();
        }
        "Open".into()
    }
}

/// Approximate dBm from the primary source's 0-100 signal scale.
pub fn signal_to_dbm(signal: u8) -> i32 {
    (signal as i32) / 2 - 100
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
