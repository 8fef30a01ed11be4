//! Parse the primary source's terse listing: one colon-delimited line per
//! access point, with colons inside a field escaped as `\:` (hardware
//! addresses). A naive split on ':' would shred the address field, so the
//! splitter walks the line character by character.

use crate::channels::chan_to_freq;
use crate::types::{bssid_from_str, AccessPoint};
use crate::vendor::VendorResolver;

/// Field order requested from the primary source.
pub const TERSE_FIELDS: &str =
    "IN-USE,SSID,BSSID,MODE,CHAN,FREQ,RATE,SIGNAL,SECURITY,WPA-FLAGS,RSN-FLAGS,BANDWIDTH";

/// Minimum fields for a line to be considered well-formed.
const MIN_FIELDS: usize = 12;

/// Split one terse line on unescaped ':' characters. `\:` emits a literal
/// colon into the current field instead of closing it.
pub fn split_terse(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut cur = String::new();
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' && chars.peek() == Some(&':') {
            cur.push(':');
            chars.next();
        } else if c == ':' {
            fields.push(std::mem::take(&mut cur));
        } else {
            cur.push(c);
        }
    }
    fields.push(cur);
    fields
}

/// First run of digits anywhere in the field, tolerant of units text
/// ("2437 MHz" → 2437).
fn leading_u32(s: &str) -> Option<u32> {
    let start = s.find(|c: char| c.is_ascii_digit())?;
    let digits: String = s[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// First number, allowing a decimal point ("54.5 Mbit/s" → 54.5).
fn leading_f64(s: &str) -> Option<f64> {
    let start = s.find(|c: char| c.is_ascii_digit())?;
    let num: String = s[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    num.parse().ok()
}

/// Parse the full terse listing into access-point records.
///
/// Lines with fewer than 12 fields or an unparsable hardware address are
/// silently dropped — one bad line never discards the cycle.
pub fn parse_terse(output: &str, vendors: &VendorResolver) -> Vec<AccessPoint> {
    let mut aps = Vec::new();
    for line in output.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let parts = split_terse(line);
        if parts.len() < MIN_FIELDS {
            continue;
        }
        let bssid = match bssid_from_str(parts[2].trim()) {
            Some(b) => b,
            None => continue,
        };

        let in_use = parts[0].trim() == "*";
        let ssid = parts[1].trim().to_string();
        let mode = parts[3].trim().to_string();
        let channel: u16 = parts[4].trim().parse().unwrap_or(0);
        let mut freq_mhz = leading_u32(&parts[5]).unwrap_or(0);
        let rate_mbps = leading_f64(&parts[6]).unwrap_or(0.0);
        let signal: u8 = parts[7].trim().parse().unwrap_or(0);
        let security = parts[8].trim().to_string();
        let wpa_flags = parts[9].trim().to_string();
        let rsn_flags = parts[10].trim().to_string();
        let bandwidth_mhz = leading_u32(&parts[11]).unwrap_or(20);

        // Derive the frequency from the channel when not provided
        if freq_mhz == 0 && channel != 0 {
            freq_mhz = chan_to_freq(channel);
        }

        aps.push(AccessPoint::new(
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
            vendors,
        ));
    }
    aps
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
