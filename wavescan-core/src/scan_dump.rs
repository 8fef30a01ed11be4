//! Parse the secondary source's verbose scan dump.
//!
//! The dump is one large text block with a sub-block per access point,
//! introduced by a `BSS ` header followed by the hardware address. Each
//! sub-block is matched against a battery of independent extractions; every
//! extraction is optional — a missing pattern leaves its field unset rather
//! than failing the block.
//!
//! Companion parsers handle the three per-association dumps: link status,
//! per-station counters, and channel survey statistics.

use std::collections::{BTreeSet, HashMap};
use std::sync::LazyLock;

use regex::Regex;

use crate::types::{bssid_from_str, Bssid, DumpRecord, LinkMetrics};

// ---------------------------------------------------------------------------
// Compiled patterns (built once)
// ---------------------------------------------------------------------------

macro_rules! re {
    ($name:ident, $pat:literal) => {
        static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($pat).unwrap());
    };
}

re!(RE_BSS_SPLIT, r"(?m)^BSS ");
re!(RE_BSSID, r"^([0-9A-Fa-f:]{17})");
re!(RE_SIGNAL, r"signal:\s*(-?[\d.]+)\s*dBm");
re!(RE_FREQ, r"freq:\s*([\d.]+)");
re!(RE_WIDTH_TOKEN, r"(?i)\b(20|40|80|160|320)\s*MHz\b");
re!(RE_NSS_MCS, r"(?i)(\d+)\s+streams?\s*:\s*MCS\s+0-(\d+)");
re!(RE_BSS_COLOR, r"(?i)BSS\s+color:\s*(\d+)");
re!(RE_TWT, r"(?i)\bTWT\b");
re!(RE_SPATIAL_REUSE, r"(?i)Spatial\s+Reuse");
re!(RE_STATION_COUNT, r"station count:\s*(\d+)");
re!(RE_CHAN_UTIL, r"channel utilis[ae]tion:\s*(\d+)/255");
re!(RE_AKM, r"Authentication suites:(.*)");
re!(RE_MFP, r"(?i)Capabilities:.*?MFP-(capable|required)");
re!(RE_WPS_MANUF, r"(?im)^\s*\*\s*Manufacturer:\s*(.+?)\s*$");
re!(RE_COUNTRY, r"Country:\s+([A-Z]{2})");
re!(RE_BEACON_INT, r"(?i)beacon\s+interval:\s*(\d+)\s*TU");
re!(RE_DTIM, r"(?i)DTIM\s+period:\s*(\d+)");
re!(RE_RSN_CAPS_LINE, r"(?im)^\s*\*\s*Capabilities:\s*(.+?)\s*$");
re!(RE_HEX16, r"(?i)0x[0-9a-f]+");
re!(RE_VENDOR_OUI, r"(?i)Vendor\s+specific:\s*OUI\s*([0-9a-f:]{8})");
re!(RE_CENTER_FREQ1, r"\*\s*center freq(?:\s+segment)?\s*1\s*:\s*(\d+)");
re!(RE_SEC_OFFSET, r"\*\s*secondary channel offset:\s*(above|below)");
re!(RE_OPER_BW, r"(?i)\*\s*channel\s+width\s*:\s*(?:\d+\s+\()?(\d+)\s*MHz");
re!(RE_VHT_OPERATION, r"(?i)VHT\s+operation");
re!(RE_VHT_WIDTH_CODE, r"(?i)\*\s*channel\s+width:\s*(\d+)");

re!(RE_STATION_SPLIT, r"(?m)^Station\s+");
re!(RE_LINK_BSSID, r"(?i)Connected\s+to\s+([0-9a-f:]{17})");
re!(RE_LINK_SSID, r"(?m)^\s*SSID:\s*(.+?)\s*$");
re!(RE_LINK_FREQ, r"(?m)^\s*freq:\s*(\d+)\s*$");
re!(RE_LINK_SIGNAL, r"(?m)^\s*signal:\s*(-?[\d.]+)\s*dBm\s*$");
re!(RE_RX_BITRATE, r"(?m)^\s*rx\s+bitrate:\s*(.+?)\s*$");
re!(RE_TX_BITRATE, r"(?m)^\s*tx\s+bitrate:\s*(.+?)\s*$");

re!(RE_SURVEY_SPLIT, r"(?m)^Survey\s+data\s+from");
re!(RE_SURVEY_FREQ, r"(?i)frequency:\s*(\d+)\s*MHz");
re!(RE_ACTIVE_TIME, r"(?i)channel\s+active\s+time:\s*(\d+)\s*ms");
re!(RE_BUSY_TIME, r"(?i)channel\s+busy\s+time:\s*(\d+)\s*ms");
re!(RE_NOISE, r"(?i)noise:\s*(-?\d+)\s*dBm");

re!(RE_PHY_FAMILY, r"\b(EHT|HE|VHT|HT)-MCS\b");
re!(RE_PHY_MCS, r"\b(?:EHT|HE|VHT|HT)-MCS\s*(\d+)\b");
re!(RE_PHY_NSS, r"\b(?:EHT|HE|VHT|HT)-NSS\s*(\d+)\b");
re!(RE_PHY_GI, r"\b(?:EHT|HE|VHT|HT)-GI\s*([\d.]+)\b");
re!(RE_PHY_DCM, r"\b(?:EHT|HE)-DCM\s*(\d+)\b");
re!(RE_PHY_RU, r"\bRU\s*([0-9A-Za-z/]+)\b");

/// WPS manufacturer values that carry no information.
const WPS_PLACEHOLDERS: &[&str] = &["unknown", "private", "n/a"];

fn cap_u32(re: &Regex, text: &str) -> Option<u32> {
    re.captures(text)?.get(1)?.as_str().parse().ok()
}

fn cap_u64(re: &Regex, text: &str) -> Option<u64> {
    re.captures(text)?.get(1)?.as_str().parse().ok()
}

fn cap_i32(re: &Regex, text: &str) -> Option<i32> {
    re.captures(text)?.get(1)?.as_str().parse().ok()
}

fn cap_str<'t>(re: &Regex, text: &'t str) -> Option<&'t str> {
    Some(re.captures(text)?.get(1)?.as_str())
}

// ---------------------------------------------------------------------------
// Scan dump
// ---------------------------------------------------------------------------

/// Parse the full scan dump into per-address enrichment records.
///
/// Sub-blocks whose header does not parse as a hardware address are skipped
/// entirely; within a block, every extraction is independently optional.
pub fn parse_scan_dump(output: &str) -> HashMap<Bssid, DumpRecord> {
    let mut result = HashMap::new();
    for block in RE_BSS_SPLIT.split(output).skip(1) {
        if let Some((bssid, record)) = parse_block(block) {
            result.insert(bssid, record);
        }
    }
    result
}

fn parse_block(block: &str) -> Option<(Bssid, DumpRecord)> {
    let header = RE_BSSID.captures(block)?.get(1)?.as_str();
    let bssid = bssid_from_str(header)?;

    let mut rec = DumpRecord::default();
    let e = &mut rec.enrich;

    // Exact dBm
    e.dbm_exact = cap_str(&RE_SIGNAL, block).and_then(|s| s.parse().ok());

    // WiFi generation from capability-family markers; the two highest tiers
    // are split on the 6 GHz band edge.
    let has_eht = block.contains("EHT capabilities");
    let has_he = block.contains("HE capabilities");
    let has_vht = block.contains("VHT capabilities");
    let has_ht = block.contains("HT capabilities");
    let freq_val: f64 = cap_str(&RE_FREQ, block)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0.0);
    e.wifi_gen = if has_eht {
        "WiFi 7".into()
    } else if has_he {
        if freq_val >= 5925.0 {
            "WiFi 6E".into()
        } else {
            "WiFi 6".into()
        }
    } else if has_vht {
        "WiFi 5".into()
    } else if has_ht {
        "WiFi 4".into()
    } else {
        String::new()
    };

    // PHY capability summary + widest advertised width
    let mut families = Vec::new();
    if has_ht {
        families.push("HT");
    }
    if has_vht {
        families.push("VHT");
    }
    if has_he {
        families.push("HE");
    }
    if has_eht {
        families.push("EHT");
    }
    let max_width = RE_WIDTH_TOKEN
        .captures_iter(block)
        .filter_map(|c| c.get(1)?.as_str().parse::<u32>().ok())
        .max();
    let mut cap_bits = Vec::new();
    if !families.is_empty() {
        cap_bits.push(families.join("/"));
    }
    if let Some(w) = max_width {
        cap_bits.push(format!("max width {w} MHz"));
        rec.cap_max_bw_mhz = Some(w);
    }
    if !cap_bits.is_empty() {
        e.phy_cap_summary = cap_bits.join(" · ");
    }

    // Max spatial streams and MCS index from the MCS set
    let mut max_nss = None;
    let mut max_mcs = None;
    for c in RE_NSS_MCS.captures_iter(block) {
        let nss: u32 = c[1].parse().unwrap_or(0);
        let mcs: u32 = c[2].parse().unwrap_or(0);
        max_nss = Some(max_nss.unwrap_or(0).max(nss));
        max_mcs = Some(max_mcs.unwrap_or(0).max(mcs));
    }
    rec.max_nss = max_nss;
    rec.max_mcs = max_mcs;

    // HE/EHT extras
    let mut he_feats = Vec::new();
    if let Some(color) = cap_str(&RE_BSS_COLOR, block) {
        he_feats.push(format!("BSS color {color}"));
    }
    if RE_TWT.is_match(block) {
        he_feats.push("TWT".into());
    }
    if RE_SPATIAL_REUSE.is_match(block) {
        he_feats.push("Spatial reuse".into());
    }
    if !he_feats.is_empty() {
        e.he_eht_features = he_feats.join(", ");
    }

    // BSS Load
    e.station_count = cap_u32(&RE_STATION_COUNT, block);
    e.chan_util = cap_str(&RE_CHAN_UTIL, block).and_then(|s| s.parse().ok());

    // AKM summary
    if let Some(raw) = cap_str(&RE_AKM, block) {
        e.akm_raw = raw.trim().to_string();
        e.ft = raw.contains("FT/");
        e.akm = akm_label(raw, e.ft);
    }

    // Management-frame protection. Set for every parsed block — "No" when
    // no MFP marker is present — which makes this field a liveness signal
    // for "the dump covered this address this cycle".
    e.pmf = match RE_MFP.captures(block) {
        Some(c) if c[1].eq_ignore_ascii_case("required") => "Required".into(),
        Some(_) => "Optional".into(),
        None => "No".into(),
    };

    // WPS-advertised manufacturer, rejecting placeholder values
    if let Some(name) = cap_str(&RE_WPS_MANUF, block) {
        let name = name.trim().trim_matches('"');
        if !name.is_empty() && !WPS_PLACEHOLDERS.contains(&name.to_lowercase().as_str()) {
            e.wps_manufacturer = name.to_string();
        }
    }

    // 802.11k / 802.11v
    e.rrm = block.contains("Neighbor Report");
    e.btm = block.contains("BSS Transition");

    // Country code
    if let Some(cc) = cap_str(&RE_COUNTRY, block) {
        e.country = cc.to_string();
    }

    // Beacon / TIM
    e.beacon_interval_tu = cap_u32(&RE_BEACON_INT, block);
    e.dtim_period = cap_u32(&RE_DTIM, block);

    // RSN capability bits
    if let Some(raw_caps) = cap_str(&RE_RSN_CAPS_LINE, block) {
        let decoded = decode_rsn_capabilities(raw_caps);
        if !decoded.is_empty() {
            e.rsn_capabilities = decoded;
        }
    }

    // Vendor-specific IE OUIs, deduplicated and case-normalized
    let ouis: BTreeSet<String> = RE_VENDOR_OUI
        .captures_iter(block)
        .map(|c| c[1].to_uppercase())
        .collect();
    if !ouis.is_empty() {
        e.vendor_ie_ouis = ouis.into_iter().collect::<Vec<_>>().join(", ");
    }

    // Bonded-block center frequency: explicit value, else derived from the
    // HT secondary-channel-offset indicator.
    if let Some(cf) = cap_u32(&RE_CENTER_FREQ1, block) {
        if cf > 0 {
            e.center_freq_mhz = Some(cf);
        }
    }
    if e.center_freq_mhz.is_none() && freq_val > 0.0 {
        if let Some(offset) = cap_str(&RE_SEC_OFFSET, block) {
            let delta = if offset == "above" { 10 } else { -10 };
            e.center_freq_mhz = Some((freq_val as i64 + delta) as u32);
        }
    }

    // Operational channel width. The 6 GHz operation IE reports MHz
    // directly; the 5 GHz one uses a numeric width code.
    if let Some(cw) = cap_u32(&RE_OPER_BW, block) {
        if matches!(cw, 20 | 40 | 80 | 160 | 320) {
            rec.oper_bw_mhz = Some(cw);
        }
    }
    if rec.oper_bw_mhz.is_none() && RE_VHT_OPERATION.is_match(block) {
        if let Some(code) = cap_u32(&RE_VHT_WIDTH_CODE, block) {
            rec.oper_bw_mhz = match code {
                0 => Some(40),
                1 => Some(80),
                2 | 3 => Some(160),
                _ => None,
            };
        }
    }

    Some((bssid, rec))
}

/// Compact AKM label from the raw suites string. Priority: OWE beats
/// Enterprise beats dual SAE+PSK beats SAE beats PSK beats raw passthrough.
fn akm_label(raw: &str, ft: bool) -> String {
    let has_sae = raw.contains("SAE");
    let has_psk = raw.contains("PSK");
    let has_eap = raw.contains("EAP") || raw.contains("802.1X");
    let has_owe = raw.contains("OWE");

    let mut label = if has_owe {
        "OWE (Enhanced Open)".to_string()
    } else if has_eap {
        "Enterprise (EAP)".to_string()
    } else if has_sae && has_psk {
        "WPA2+WPA3".to_string()
    } else if has_sae {
        "WPA3-SAE".to_string()
    } else if has_psk {
        "WPA2-PSK".to_string()
    } else {
        raw.trim().to_string()
    };
    if ft {
        label.push_str(" +FT");
    }
    label
}

// ---------------------------------------------------------------------------
// RSN capability decoding
// ---------------------------------------------------------------------------

/// Decode an RSN Capabilities field into human labels using the IEEE bit
/// definitions. Falls back to token matching when the driver exposes only
/// tokenized text (no hex value).
pub fn decode_rsn_capabilities(raw_caps: &str) -> String {
    let text = raw_caps.trim();
    if text.is_empty() {
        return String::new();
    }

    let hex = match RE_HEX16.find(text) {
        Some(m) => m.as_str(),
        None => return decode_rsn_tokens(text),
    };
    let caps = u32::from_str_radix(&hex[2..], 16).unwrap_or(0) & 0xFFFF;
    let replay_counters = [1u8, 2, 4, 16];

    let mut decoded = Vec::new();
    if caps & (1 << 0) != 0 {
        decoded.push("Pre-authentication".to_string());
    }
    if caps & (1 << 1) != 0 {
        decoded.push("No pairwise cipher".to_string());
    }

    let ptk_rc = replay_counters[((caps >> 2) & 0x3) as usize];
    let gtk_rc = replay_counters[((caps >> 4) & 0x3) as usize];
    decoded.push(format!("PTKSA replay counters: {ptk_rc}"));
    decoded.push(format!("GTKSA replay counters: {gtk_rc}"));

    if caps & (1 << 6) != 0 {
        decoded.push("PMF capable".to_string());
    }
    if caps & (1 << 7) != 0 {
        decoded.push("PMF required".to_string());
    }
    if caps & (1 << 8) != 0 {
        decoded.push("Joint multi-band RSNA".to_string());
    }
    if caps & (1 << 9) != 0 {
        decoded.push("PeerKey".to_string());
    }
    if caps & (1 << 10) != 0 {
        decoded.push("SPP-A-MSDU capable".to_string());
    }
    if caps & (1 << 11) != 0 {
        decoded.push("SPP-A-MSDU required".to_string());
    }
    if caps & (1 << 12) != 0 {
        decoded.push("PBAC".to_string());
    }
    if caps & (1 << 13) != 0 {
        decoded.push("Extended Key ID".to_string());
    }

    // Raw value kept as a compact suffix for transparency
    decoded.push(format!("RSN caps 0x{caps:04X}"));
    decoded.join(", ")
}

fn decode_rsn_tokens(text: &str) -> String {
    const TOKEN_LABELS: &[(&str, &str)] = &[
        ("MFP-required", "PMF required"),
        ("MFP-capable", "PMF capable"),
        ("PreAuth", "Pre-authentication"),
        ("NoPairwise", "No pairwise cipher"),
        ("Peerkey", "PeerKey"),
        ("SPP-AMSDU-capable", "SPP-A-MSDU capable"),
        ("SPP-AMSDU-required", "SPP-A-MSDU required"),
        ("PBAC", "PBAC"),
        ("Extended-Key-ID", "Extended Key ID"),
        ("ExtKeyID", "Extended Key ID"),
        ("OCVC", "OCVC"),
    ];
    let lower = text.to_lowercase();
    let mut out: Vec<&str> = Vec::new();
    for (token, label) in TOKEN_LABELS {
        // MFP-required implies MFP-capable in the tokenized form; report
        // only the stronger one. Same for the two Extended-Key-ID spellings.
        if lower.contains(&token.to_lowercase()) && !out.contains(label) {
            if *label == "PMF capable" && out.contains(&"PMF required") {
                continue;
            }
            out.push(label);
        }
    }
    if out.is_empty() {
        text.to_string()
    } else {
        out.join(", ")
    }
}

// ---------------------------------------------------------------------------
// Link status
// ---------------------------------------------------------------------------

/// Parse the link-status dump for the current association. Returns `None`
/// when the interface is not connected.
pub fn parse_link_dump(output: &str) -> Option<LinkMetrics> {
    if output.trim().is_empty() || output.contains("Not connected.") {
        return None;
    }

    let bssid = cap_str(&RE_LINK_BSSID, output).and_then(bssid_from_str)?;
    let mut link = LinkMetrics {
        bssid: Some(bssid),
        ..LinkMetrics::default()
    };

    if let Some(ssid) = cap_str(&RE_LINK_SSID, output) {
        link.ssid = ssid.to_string();
    }
    link.freq_mhz = cap_u32(&RE_LINK_FREQ, output);
    link.signal_dbm = cap_str(&RE_LINK_SIGNAL, output).and_then(|s| s.parse().ok());

    if let Some(rx) = cap_str(&RE_RX_BITRATE, output) {
        link.rx_bitrate = rx.to_string();
        link.rx_phy = parse_bitrate_phy(rx);
    }
    if let Some(tx) = cap_str(&RE_TX_BITRATE, output) {
        link.tx_bitrate = tx.to_string();
        link.tx_phy = parse_bitrate_phy(tx);
    }

    Some(link)
}

/// Decompose a bitrate description string into a compact PHY summary,
/// e.g. "HE · MCS 11 · NSS 2 · GI 0.8 · 80 MHz".
pub fn parse_bitrate_phy(raw: &str) -> String {
    let text = raw.trim();
    if text.is_empty() {
        return String::new();
    }
    let mut parts = Vec::new();
    if let Some(c) = RE_PHY_FAMILY.captures(text) {
        parts.push(c[1].to_string());
    }
    if let Some(mcs) = cap_str(&RE_PHY_MCS, text) {
        parts.push(format!("MCS {mcs}"));
    }
    if let Some(nss) = cap_str(&RE_PHY_NSS, text) {
        parts.push(format!("NSS {nss}"));
    }
    if let Some(gi) = cap_str(&RE_PHY_GI, text) {
        parts.push(format!("GI {gi}"));
    }
    if let Some(dcm) = cap_str(&RE_PHY_DCM, text) {
        parts.push(format!("DCM {dcm}"));
    }
    if let Some(ru) = cap_str(&RE_PHY_RU, text) {
        parts.push(format!("RU {ru}"));
    }
    if let Some(bw) = cap_str(&RE_WIDTH_TOKEN, text) {
        parts.push(format!("{bw} MHz"));
    }
    parts.join(" · ")
}

// ---------------------------------------------------------------------------
// Station dump
// ---------------------------------------------------------------------------

/// Counters from the per-station statistics dump.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StationCounters {
    pub bssid: Option<Bssid>,
    pub inactive_ms: Option<u64>,
    pub tx_retries: Option<u64>,
    pub tx_failed: Option<u64>,
    pub connected_time_s: Option<u64>,
    pub signal_avg_dbm: Option<i32>,
    pub tx_packets: Option<u64>,
    pub tx_bytes: Option<u64>,
    pub rx_packets: Option<u64>,
    pub rx_bytes: Option<u64>,
    pub rx_drop_misc: Option<u64>,
    pub expected_throughput: String,
}

re!(RE_STA_INACTIVE, r"(?i)inactive\s+time:\s*(\d+)\s*ms");
re!(RE_STA_TX_RETRIES, r"(?i)tx\s+retries:\s*(\d+)");
re!(RE_STA_TX_FAILED, r"(?i)tx\s+failed:\s*(\d+)");
re!(RE_STA_CONNECTED, r"(?i)connected\s+time:\s*(\d+)\s*seconds");
re!(RE_STA_SIGNAL_AVG, r"(?i)signal\s+avg:\s*(-?\d+)\s*dBm");
re!(RE_STA_TX_PACKETS, r"(?i)tx\s+packets:\s*(\d+)");
re!(RE_STA_TX_BYTES, r"(?i)tx\s+bytes:\s*(\d+)");
re!(RE_STA_RX_PACKETS, r"(?i)rx\s+packets:\s*(\d+)");
re!(RE_STA_RX_BYTES, r"(?i)rx\s+bytes:\s*(\d+)");
re!(RE_STA_RX_DROP, r"(?i)rx\s+drop\s+misc:\s*(\d+)");
re!(RE_STA_EXPECTED, r"(?i)expected\s+throughput:\s*([^\n]+)");

/// Parse the station dump, returning the block matching `target` (or the
/// first block when no target is given).
pub fn parse_station_dump(output: &str, target: Option<&Bssid>) -> Option<StationCounters> {
    for block in RE_STATION_SPLIT.split(output).skip(1) {
        let header = match RE_BSSID.captures(block.trim_start()) {
            Some(c) => c.get(1).unwrap().as_str(),
            None => continue,
        };
        let bssid = match bssid_from_str(header) {
            Some(b) => b,
            None => continue,
        };
        if let Some(t) = target {
            if bssid != *t {
                continue;
            }
        }

        let mut sta = StationCounters {
            bssid: Some(bssid),
            ..StationCounters::default()
        };
        sta.inactive_ms = cap_u64(&RE_STA_INACTIVE, block);
        sta.tx_retries = cap_u64(&RE_STA_TX_RETRIES, block);
        sta.tx_failed = cap_u64(&RE_STA_TX_FAILED, block);
        sta.connected_time_s = cap_u64(&RE_STA_CONNECTED, block);
        sta.signal_avg_dbm = cap_i32(&RE_STA_SIGNAL_AVG, block);
        sta.tx_packets = cap_u64(&RE_STA_TX_PACKETS, block);
        sta.tx_bytes = cap_u64(&RE_STA_TX_BYTES, block);
        sta.rx_packets = cap_u64(&RE_STA_RX_PACKETS, block);
        sta.rx_bytes = cap_u64(&RE_STA_RX_BYTES, block);
        sta.rx_drop_misc = cap_u64(&RE_STA_RX_DROP, block);
        if let Some(tp) = cap_str(&RE_STA_EXPECTED, block) {
            sta.expected_throughput = tp.trim().to_string();
        }
        return Some(sta);
    }
    None
}

// ---------------------------------------------------------------------------
// Survey dump
// ---------------------------------------------------------------------------

/// Channel occupancy statistics from the survey dump.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SurveyStats {
    pub busy_pct: Option<f64>,
    pub noise_dbm: Option<i32>,
}

/// Parse the survey dump, preferring the entry flagged "[in use]" and
/// falling back to the entry matching the connected frequency.
pub fn parse_survey_dump(output: &str, target_freq_mhz: Option<u32>) -> SurveyStats {
    let mut chosen = None;
    for block in RE_SURVEY_SPLIT.split(output).skip(1) {
        let block = block.trim();
        if block.is_empty() {
            continue;
        }
        let freq = match cap_u32(&RE_SURVEY_FREQ, block) {
            Some(f) => f,
            None => continue,
        };
        if block.contains("[in use]") {
            chosen = Some(block);
            break;
        }
        if target_freq_mhz == Some(freq) {
            chosen = Some(block);
            break;
        }
    }
    let block = match chosen {
        Some(b) => b,
        None => return SurveyStats::default(),
    };

    let active_ms = cap_u64(&RE_ACTIVE_TIME, block);
    let busy_ms = cap_u64(&RE_BUSY_TIME, block);

    let mut stats = SurveyStats {
        noise_dbm: cap_i32(&RE_NOISE, block),
        ..SurveyStats::default()
    };
    if let (Some(active), Some(busy)) = (active_ms, busy_ms) {
        if active > 0 {
            stats.busy_pct = Some(busy as f64 / active as f64 * 100.0);
        }
    }
    stats
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const DUMP_24GHZ: &str = "\
BSS aa:bb:cc:dd:ee:ff(on wlan0) -- associated
\tTSF: 1234567 usec
\tfreq: 2437
\tbeacon interval: 100 TUs
\tcapability: ESS Privacy ShortSlotTime (0x0411)
\tsignal: -47.00 dBm
\tSSID: MyNet
\tCountry: DE\tEnvironment: Indoor/Outdoor
\tDTIM Period: 2
\tHT capabilities:
\t\tcapabilities: 0x19ef
\tHT operation:
\t\t * primary channel: 6
\t\t * secondary channel offset: above
\tRSN:\t * Version: 1
\t\t * Group cipher: CCMP
\t\t * Pairwise ciphers: CCMP
\t\t * Authentication suites: PSK SAE
\t\t * Capabilities: 1-PTKSA-RC 1-GTKSA-RC MFP-capable (0x0080)
\tBSS Load:
\t\t * station count: 5
\t\t * channel utilisation: 51/255
\tHE capabilities:
\t\tHE MCS and NSS set:
\t\t\t2 streams: MCS 0-11
\tRM enabled capabilities: Neighbor Report
\tExtended capabilities: BSS Transition
\tVendor specific: OUI 00:50:f2, data: 01
\tWPS:\t * Version: 1.0
\t\t * Manufacturer: AVM
";

    const DUMP_6GHZ: &str = "\
BSS 02:11:22:33:44:55(on wlan0)
\tfreq: 6115
\tsignal: -61.00 dBm
\tSSID: MyNet6
\tHE capabilities:
\t\tHE MCS and NSS set:
\t\t\t4 streams: MCS 0-11
\tHE operation:
\t\t * channel width: 2 (160 MHz)
\t\t * center freq segment 1: 6105
";

    fn parse_one(dump: &str, mac: &str) -> DumpRecord {
        let map = parse_scan_dump(dump);
        map[&bssid_from_str(mac).unwrap()].clone()
    }

    #[test]
    fn test_parse_dump_keyed_by_address() {
        let both = format!("{DUMP_24GHZ}{DUMP_6GHZ}");
        let map = parse_scan_dump(&both);
        assert_eq!(map.len(), 2);
        assert!(map.contains_key(&bssid_from_str("aa:bb:cc:dd:ee:ff").unwrap()));
        assert!(map.contains_key(&bssid_from_str("02:11:22:33:44:55").unwrap()));
    }

    #[test]
    fn test_parse_dump_case_normalized_key() {
        let upper = DUMP_24GHZ.replace("aa:bb:cc:dd:ee:ff", "AA:BB:CC:DD:EE:FF");
        let map = parse_scan_dump(&upper);
        assert!(map.contains_key(&bssid_from_str("aa:bb:cc:dd:ee:ff").unwrap()));
    }

    #[test]
    fn test_bad_header_skipped() {
        let map = parse_scan_dump("BSS not-a-mac(on wlan0)\n\tfreq: 2437\n");
        assert!(map.is_empty());
    }

    #[test]
    fn test_signal_and_load() {
        let rec = parse_one(DUMP_24GHZ, "aa:bb:cc:dd:ee:ff");
        assert_eq!(rec.enrich.dbm_exact, Some(-47.0));
        assert_eq!(rec.enrich.station_count, Some(5));
        assert_eq!(rec.enrich.chan_util, Some(51));
    }

    #[test]
    fn test_wifi_gen_he_below_6ghz() {
        // HE capabilities at 2437 MHz (< 5925) is the "6" tier, not "6E"
        let rec = parse_one(DUMP_24GHZ, "aa:bb:cc:dd:ee:ff");
        assert_eq!(rec.enrich.wifi_gen, "WiFi 6");
    }

    #[test]
    fn test_wifi_gen_he_6ghz() {
        let rec = parse_one(DUMP_6GHZ, "02:11:22:33:44:55");
        assert_eq!(rec.enrich.wifi_gen, "WiFi 6E");
    }

    #[test]
    fn test_wifi_gen_eht() {
        let dump = DUMP_6GHZ.replace("HE capabilities", "EHT capabilities");
        let rec = parse_one(&dump, "02:11:22:33:44:55");
        assert_eq!(rec.enrich.wifi_gen, "WiFi 7");
    }

    #[test]
    fn test_akm_sae_psk() {
        let rec = parse_one(DUMP_24GHZ, "aa:bb:cc:dd:ee:ff");
        assert_eq!(rec.enrich.akm_raw, "PSK SAE");
        assert_eq!(rec.enrich.akm, "WPA2+WPA3");
        assert!(!rec.enrich.ft);
    }

    #[test]
    fn test_akm_priority() {
        assert_eq!(akm_label(" OWE", false), "OWE (Enhanced Open)");
        assert_eq!(akm_label(" IEEE 802.1X", false), "Enterprise (EAP)");
        assert_eq!(akm_label(" SAE", false), "WPA3-SAE");
        assert_eq!(akm_label(" PSK", false), "WPA2-PSK");
        assert_eq!(akm_label(" FT/SAE SAE", true), "WPA3-SAE +FT");
        assert_eq!(akm_label(" 00-0f-ac:18", false), "00-0f-ac:18");
    }

    #[test]
    fn test_pmf_levels() {
        let rec = parse_one(DUMP_24GHZ, "aa:bb:cc:dd:ee:ff");
        assert_eq!(rec.enrich.pmf, "Optional");

        let required = DUMP_24GHZ.replace("MFP-capable", "MFP-required");
        let rec = parse_one(&required, "aa:bb:cc:dd:ee:ff");
        assert_eq!(rec.enrich.pmf, "Required");

        // Always set — "No" is the liveness floor
        let rec = parse_one(DUMP_6GHZ, "02:11:22:33:44:55");
        assert_eq!(rec.enrich.pmf, "No");
    }

    #[test]
    fn test_wps_manufacturer() {
        let rec = parse_one(DUMP_24GHZ, "aa:bb:cc:dd:ee:ff");
        assert_eq!(rec.enrich.wps_manufacturer, "AVM");
    }

    #[test]
    fn test_wps_placeholder_rejected() {
        let dump = DUMP_24GHZ.replace("Manufacturer: AVM", "Manufacturer: Unknown");
        let rec = parse_one(&dump, "aa:bb:cc:dd:ee:ff");
        assert_eq!(rec.enrich.wps_manufacturer, "");
    }

    #[test]
    fn test_roaming_flags() {
        let rec = parse_one(DUMP_24GHZ, "aa:bb:cc:dd:ee:ff");
        assert!(rec.enrich.rrm);
        assert!(rec.enrich.btm);
        let rec = parse_one(DUMP_6GHZ, "02:11:22:33:44:55");
        assert!(!rec.enrich.rrm);
        assert!(!rec.enrich.btm);
    }

    #[test]
    fn test_country_beacon_dtim() {
        let rec = parse_one(DUMP_24GHZ, "aa:bb:cc:dd:ee:ff");
        assert_eq!(rec.enrich.country, "DE");
        assert_eq!(rec.enrich.beacon_interval_tu, Some(100));
        assert_eq!(rec.enrich.dtim_period, Some(2));
    }

    #[test]
    fn test_rsn_capabilities_decoded() {
        let rec = parse_one(DUMP_24GHZ, "aa:bb:cc:dd:ee:ff");
        assert!(rec.enrich.rsn_capabilities.contains("PMF required"));
        assert!(rec.enrich.rsn_capabilities.contains("RSN caps 0x0080"));
    }

    #[test]
    fn test_vendor_ie_ouis() {
        let rec = parse_one(DUMP_24GHZ, "aa:bb:cc:dd:ee:ff");
        assert_eq!(rec.enrich.vendor_ie_ouis, "00:50:F2");
    }

    #[test]
    fn test_center_freq_from_secondary_offset() {
        let rec = parse_one(DUMP_24GHZ, "aa:bb:cc:dd:ee:ff");
        assert_eq!(rec.enrich.center_freq_mhz, Some(2447));

        let below = DUMP_24GHZ.replace("offset: above", "offset: below");
        let rec = parse_one(&below, "aa:bb:cc:dd:ee:ff");
        assert_eq!(rec.enrich.center_freq_mhz, Some(2427));
    }

    #[test]
    fn test_center_freq_explicit() {
        let rec = parse_one(DUMP_6GHZ, "02:11:22:33:44:55");
        assert_eq!(rec.enrich.center_freq_mhz, Some(6105));
    }

    #[test]
    fn test_oper_bw_he() {
        let rec = parse_one(DUMP_6GHZ, "02:11:22:33:44:55");
        assert_eq!(rec.oper_bw_mhz, Some(160));
    }

    #[test]
    fn test_oper_bw_vht_code() {
        let dump = "\
BSS aa:bb:cc:dd:ee:01(on wlan0)
\tfreq: 5580
\tVHT capabilities:
\tVHT operation:
\t\t * channel width: 1 (80 MHz)
";
        // MHz form present → direct
        let rec = parse_one(dump, "aa:bb:cc:dd:ee:01");
        assert_eq!(rec.oper_bw_mhz, Some(80));

        // Code-only form → mapped through the VHT width-code table
        let coded = dump.replace("1 (80 MHz)", "1");
        let rec = parse_one(&coded, "aa:bb:cc:dd:ee:01");
        assert_eq!(rec.oper_bw_mhz, Some(80));
    }

    #[test]
    fn test_nss_mcs_and_cap_summary() {
        let rec = parse_one(DUMP_6GHZ, "02:11:22:33:44:55");
        assert_eq!(rec.max_nss, Some(4));
        assert_eq!(rec.max_mcs, Some(11));
        assert_eq!(rec.cap_max_bw_mhz, Some(160));
        assert_eq!(rec.enrich.phy_cap_summary, "HE · max width 160 MHz");
    }

    #[test]
    fn test_reparse_idempotent() {
        let a = parse_scan_dump(DUMP_24GHZ);
        let b = parse_scan_dump(DUMP_24GHZ);
        assert_eq!(a, b);
    }

    #[test]
    fn test_decode_rsn_hex() {
        let s = decode_rsn_capabilities("1-PTKSA-RC 1-GTKSA-RC (0x00c0)");
        assert_eq!(
            s,
            "PTKSA replay counters: 1, GTKSA replay counters: 1, \
             PMF capable, PMF required, RSN caps 0x00C0"
        );
    }

    #[test]
    fn test_decode_rsn_replay_counters() {
        // bits 2-3 = 3 → 16 PTKSA counters
        let s = decode_rsn_capabilities("(0x000c)");
        assert!(s.contains("PTKSA replay counters: 16"));
        assert!(s.contains("GTKSA replay counters: 1"));
    }

    #[test]
    fn test_decode_rsn_token_fallback() {
        let s = decode_rsn_capabilities("MFP-required PreAuth");
        assert_eq!(s, "PMF required, Pre-authentication");
        assert_eq!(decode_rsn_capabilities("plain text"), "plain text");
        assert_eq!(decode_rsn_capabilities(""), "");
    }

    const LINK: &str = "\
Connected to aa:bb:cc:dd:ee:ff (on wlan0)
\tSSID: MyNet
\tfreq: 2437
\tRX: 123456 bytes (890 packets)
\tTX: 65432 bytes (456 packets)
\tsignal: -47 dBm
\trx bitrate: 573.5 MBit/s 80MHz HE-MCS 11 HE-NSS 2 HE-GI 0.8
\ttx bitrate: 480.4 MBit/s 80MHz HE-MCS 9 HE-NSS 2 HE-GI 0.8
";

    #[test]
    fn test_parse_link_dump() {
        let link = parse_link_dump(LINK).unwrap();
        assert_eq!(link.bssid, bssid_from_str("aa:bb:cc:dd:ee:ff"));
        assert_eq!(link.ssid, "MyNet");
        assert_eq!(link.freq_mhz, Some(2437));
        assert_eq!(link.signal_dbm, Some(-47.0));
        assert_eq!(link.rx_phy, "HE · MCS 11 · NSS 2 · GI 0.8 · 80 MHz");
    }

    #[test]
    fn test_parse_link_dump_not_connected() {
        assert!(parse_link_dump("Not connected.\n").is_none());
        assert!(parse_link_dump("").is_none());
    }

    #[test]
    fn test_parse_bitrate_phy_legacy() {
        // Legacy rate string with no HT/VHT/HE markers
        assert_eq!(parse_bitrate_phy("54.0 MBit/s"), "");
        assert_eq!(parse_bitrate_phy(""), "");
    }

    const STATIONS: &str = "\
Station aa:bb:cc:dd:ee:ff (on wlan0)
\tinactive time:\t10 ms
\trx bytes:\t123456
\trx packets:\t890
\ttx bytes:\t65432
\ttx packets:\t456
\ttx retries:\t12
\ttx failed:\t2
\trx drop misc:\t3
\tsignal:  \t-47 dBm
\tsignal avg:\t-48 dBm
\texpected throughput:\t345.6Mbps
\tconnected time:\t3600 seconds
Station 11:22:33:44:55:66 (on wlan0)
\tinactive time:\t99 ms
";

    #[test]
    fn test_parse_station_dump_target() {
        let target = bssid_from_str("aa:bb:cc:dd:ee:ff").unwrap();
        let sta = parse_station_dump(STATIONS, Some(&target)).unwrap();
        assert_eq!(sta.inactive_ms, Some(10));
        assert_eq!(sta.tx_retries, Some(12));
        assert_eq!(sta.tx_failed, Some(2));
        assert_eq!(sta.connected_time_s, Some(3600));
        assert_eq!(sta.signal_avg_dbm, Some(-48));
        assert_eq!(sta.tx_packets, Some(456));
        assert_eq!(sta.rx_bytes, Some(123456));
        assert_eq!(sta.rx_drop_misc, Some(3));
        assert_eq!(sta.expected_throughput, "345.6Mbps");
    }

    #[test]
    fn test_parse_station_dump_other_target() {
        let target = bssid_from_str("11:22:33:44:55:66").unwrap();
        let sta = parse_station_dump(STATIONS, Some(&target)).unwrap();
        assert_eq!(sta.inactive_ms, Some(99));
    }

    #[test]
    fn test_parse_station_dump_missing_target() {
        let target = bssid_from_str("00:00:00:00:00:01").unwrap();
        assert!(parse_station_dump(STATIONS, Some(&target)).is_none());
    }

    const SURVEY: &str = "\
Survey data from wlan0
\tfrequency:\t\t\t2412 MHz
\tnoise:\t\t\t\t-95 dBm
\tchannel active time:\t\t1000 ms
\tchannel busy time:\t\t300 ms
Survey data from wlan0
\tfrequency:\t\t\t2437 MHz [in use]
\tnoise:\t\t\t\t-92 dBm
\tchannel active time:\t\t2000 ms
\tchannel busy time:\t\t500 ms
";

    #[test]
    fn test_survey_prefers_in_use() {
        let stats = parse_survey_dump(SURVEY, None);
        assert_eq!(stats.noise_dbm, Some(-92));
        assert_eq!(stats.busy_pct, Some(25.0));
    }

    #[test]
    fn test_survey_frequency_fallback() {
        let no_flag = SURVEY.replace(" [in use]", "");
        let stats = parse_survey_dump(&no_flag, Some(2412));
        assert_eq!(stats.noise_dbm, Some(-95));
        assert_eq!(stats.busy_pct, Some(30.0));
        assert_eq!(parse_survey_dump(&no_flag, Some(5180)), SurveyStats::default());
    }
}
