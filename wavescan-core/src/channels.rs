//! Channel/frequency arithmetic for 2.4/5/6 GHz.
//!
//! Responsibilities:
//! - Channel number → center frequency, per band
//! - Frequency → band classification
//! - Bonded-channel block resolution (40/80/160/320 MHz)
//!
//! All frequencies are integer MHz; all channel numbers are integers.
//! The bonded-block reverse indexes are built once at first use and never
//! mutated afterwards.

use std::collections::HashMap;
use std::sync::LazyLock;

use crate::types::{AccessPoint, Band};

// ---------------------------------------------------------------------------
// Channel → center frequency tables
// ---------------------------------------------------------------------------

/// 2.4 GHz: channels 1-14, 5 MHz spacing except channel 14 at 2484 MHz.
const CH24: &[(u16, u32)] = &[
    (1, 2412),
    (2, 2417),
    (3, 2422),
    (4, 2427),
    (5, 2432),
    (6, 2437),
    (7, 2442),
    (8, 2447),
    (9, 2452),
    (10, 2457),
    (11, 2462),
    (12, 2467),
    (13, 2472),
    (14, 2484),
];

/// 5 GHz: the standard 20 MHz primaries.
const CH5: &[(u16, u32)] = &[
    (36, 5180),
    (40, 5200),
    (44, 5220),
    (48, 5240),
    (52, 5260),
    (56, 5280),
    (60, 5300),
    (64, 5320),
    (100, 5500),
    (104, 5520),
    (108, 5540),
    (112, 5560),
    (116, 5580),
    (120, 5600),
    (124, 5620),
    (128, 5640),
    (132, 5660),
    (136, 5680),
    (140, 5700),
    (144, 5720),
    (149, 5745),
    (153, 5765),
    (157, 5785),
    (161, 5805),
    (165, 5825),
    (169, 5845),
    (173, 5865),
    (177, 5885),
];

fn freq_24ghz(chan: u16) -> Option<u32> {
    CH24.iter().find(|(c, _)| *c == chan).map(|(_, f)| *f)
}

fn freq_5ghz(chan: u16) -> Option<u32> {
    CH5.iter().find(|(c, _)| *c == chan).map(|(_, f)| *f)
}

/// 6 GHz primaries are channels 1, 5, 9, …, 233 with
/// `center_MHz = 5950 + 5 * channel`. 59 primaries covering 5925-7125 MHz.
fn freq_6ghz(chan: u16) -> Option<u32> {
    if chan >= 1 && chan <= 233 && chan % 4 == 1 {
        Some(5950 + 5 * chan as u32)
    } else {
        None
    }
}

/// Best-guess center frequency for a channel number, 0 if unknown.
///
/// Low channel numbers are ambiguous between 2.4 and 6 GHz; they resolve
/// to 2.4 GHz here, since the primary source only omits the frequency on
/// entries where the 2.4 GHz reading is the safer guess.
pub fn chan_to_freq(chan: u16) -> u32 {
    freq_24ghz(chan)
        .or_else(|| freq_5ghz(chan))
        .or_else(|| freq_6ghz(chan))
        .unwrap_or(0)
}

/// Classify a frequency into a band. Total: every input maps to exactly
/// one of the four categories.
pub fn freq_to_band(freq_mhz: u32) -> Band {
    if (2400..2500).contains(&freq_mhz) {
        Band::Band24
    } else if (5000..5900).contains(&freq_mhz) {
        Band::Band5
    } else if (5925..=7125).contains(&freq_mhz) {
        Band::Band6
    } else {
        Band::Unknown
    }
}

// ---------------------------------------------------------------------------
// Bonded-channel block tables
//
// IEEE 802.11 defines fixed channel blocks for each bandwidth. An AP
// reporting its primary 20 MHz channel at a wider width actually occupies
// the whole bonded block, not ±BW/2 around the primary's center.
//
// Example: primary ch 116 @ 80 MHz → block ch 116-128 → center at ch 122.
// ---------------------------------------------------------------------------

/// 5 GHz 40 MHz pairs: (member channels, block center MHz).
const GROUPS_5G_40: &[(&[u16], u32)] = &[
    (&[36, 40], 5190),
    (&[44, 48], 5230),
    (&[52, 56], 5270),
    (&[60, 64], 5310),
    (&[100, 104], 5510),
    (&[108, 112], 5550),
    (&[116, 120], 5590),
    (&[124, 128], 5630),
    (&[132, 136], 5670),
    (&[140, 144], 5710),
    (&[149, 153], 5755),
    (&[157, 161], 5795),
    (&[165, 169], 5835),
    (&[173, 177], 5875),
];

const GROUPS_5G_80: &[(&[u16], u32)] = &[
    (&[36, 40, 44, 48], 5210),
    (&[52, 56, 60, 64], 5290),
    (&[100, 104, 108, 112], 5530),
    (&[116, 120, 124, 128], 5610),
    (&[132, 136, 140, 144], 5690),
    (&[149, 153, 157, 161], 5775),
    (&[165, 169, 173, 177], 5855),
];

const GROUPS_5G_160: &[(&[u16], u32)] = &[
    (&[36, 40, 44, 48, 52, 56, 60, 64], 5250),
    (&[100, 104, 108, 112, 116, 120, 124, 128], 5570),
    (&[149, 153, 157, 161, 165, 169, 173, 177], 5815),
];

type BondedIndex = HashMap<(u16, u32), (u32, Vec<u16>)>;

/// Reverse index: (any member channel, bandwidth) → (center MHz, members).
static BONDED_5G: LazyLock<BondedIndex> = LazyLock::new(|| {
    let mut index = BondedIndex::new();
    for (bw, groups) in [(40, GROUPS_5G_40), (80, GROUPS_5G_80), (160, GROUPS_5G_160)] {
        for (chans, center) in groups {
            for &c in *chans {
                index.insert((c, bw), (*center, chans.to_vec()));
            }
        }
    }
    index
});

/// Generate one 6 GHz bonded group from its center channel.
///
/// Member channels follow `start = center - 2*(n20 - 1)`,
/// `members[i] = start + 4*i` for `i in 0..n20`, where `n20 = bw/20`.
fn make_6ghz_group(center_chan: u16, bw_mhz: u32) -> (Vec<u16>, u32) {
    let n20 = (bw_mhz / 20) as u16;
    let start = center_chan - 2 * (n20 - 1);
    let chans: Vec<u16> = (0..n20).map(|i| start + 4 * i).collect();
    (chans, 5950 + 5 * center_chan as u32)
}

static BONDED_6G: LazyLock<BondedIndex> = LazyLock::new(|| {
    let mut index = BondedIndex::new();
    // Center channels per bandwidth: 40 MHz at 3,11,…,179; 80 MHz at
    // 7,23,…,167; 160 MHz at 15,47,…,143; 320 MHz at 31,95,159.
    let plans: [(u32, u16, u16, u16); 4] = [
        (40, 3, 179, 8),
        (80, 7, 167, 16),
        (160, 15, 143, 32),
        (320, 31, 159, 64),
    ];
    for (bw, first, last, step) in plans {
        let mut center = first;
        while center <= last {
            let (chans, freq) = make_6ghz_group(center, bw);
            for &c in &chans {
                index.insert((c, bw), (freq, chans.clone()));
            }
            center += step;
        }
    }
    index
});

/// Resolve a (band, primary channel, bandwidth) to the bonded block's
/// center frequency and full member list.
///
/// A combination absent from the tables degrades to the primary channel as
/// its own 20 MHz block — a policy, not an error.
pub fn bonded_block(band: Band, chan: u16, bw_mhz: u32) -> (u32, Vec<u16>) {
    let hit = match band {
        Band::Band5 => BONDED_5G.get(&(chan, bw_mhz)),
        Band::Band6 => BONDED_6G.get(&(chan, bw_mhz)),
        _ => None,
    };
    match hit {
        Some((center, chans)) => (*center, chans.clone()),
        None => {
            let freq = match band {
                Band::Band5 => freq_5ghz(chan),
                Band::Band6 => freq_6ghz(chan),
                Band::Band24 => freq_24ghz(chan),
                Band::Unknown => None,
            };
            (freq.unwrap_or_else(|| chan_to_freq(chan)), vec![chan])
        }
    }
}

/// Outermost primary channels inside a bonded block of `bw_mhz` centered at
/// `center_freq` MHz.
///
/// Each 20 MHz primary's center sits `bw/2 - 10` MHz inside the block edge,
/// so the outermost centers are at `center_freq ± (bw/2 - 10)`.
pub fn block_channel_range(center_freq: u32, bw_mhz: u32, band: Band) -> Option<(u16, u16)> {
    if bw_mhz < 20 {
        return None;
    }
    let half = bw_mhz / 2 - 10;
    let lo = center_freq.saturating_sub(half);
    let hi = center_freq + half;

    let in_range = |freq: u32| freq >= lo && freq <= hi;
    let members: Vec<u16> = match band {
        Band::Band24 => CH24
            .iter()
            .filter(|(_, f)| in_range(*f))
            .map(|(c, _)| *c)
            .collect(),
        Band::Band5 => CH5
            .iter()
            .filter(|(_, f)| in_range(*f))
            .map(|(c, _)| *c)
            .collect(),
        Band::Band6 => (1..=233u16)
            .step_by(4)
            .filter(|&c| in_range(5950 + 5 * c as u32))
            .collect(),
        Band::Unknown => Vec::new(),
    };
    let lo_chan = *members.iter().min()?;
    let hi_chan = *members.iter().max()?;
    Some((lo_chan, hi_chan))
}

/// Human-readable channel span, e.g. "116–128" for ch 116 @ 80 MHz.
pub fn channel_span(ap: &AccessPoint) -> String {
    if ap.channel == 0 {
        return "?".into();
    }

    match ap.band {
        Band::Band5 => {
            // Prefer the reported block center; fall back to the lookup table.
            if ap.bandwidth_mhz > 20 {
                if let Some(center) = ap.enrichment.center_freq_mhz {
                    if let Some((lo, hi)) =
                        block_channel_range(center, ap.bandwidth_mhz, Band::Band5)
                    {
                        if lo != hi {
                            return format!("{lo}–{hi}");
                        }
                    }
                }
            }
            let (_, chans) = bonded_block(Band::Band5, ap.channel, ap.bandwidth_mhz);
            if chans.len() > 1 {
                return format!("{}–{}", chans[0], chans[chans.len() - 1]);
            }
            ap.channel.to_string()
        }
        Band::Band24 => {
            if ap.bandwidth_mhz == 40 {
                if let Some(center) = ap.enrichment.center_freq_mhz {
                    if let Some((lo, hi)) = block_channel_range(center, 40, Band::Band24) {
                        if lo != hi {
                            return format!("{lo}–{hi}");
                        }
                    }
                }
            }
            ap.channel.to_string()
        }
        Band::Band6 => {
            if ap.bandwidth_mhz > 20 {
                let (_, chans) = bonded_block(Band::Band6, ap.channel, ap.bandwidth_mhz);
                if chans.len() > 1 {
                    return format!("{}–{}", chans[0], chans[chans.len() - 1]);
                }
                if let Some(center) = ap.enrichment.center_freq_mhz {
                    if let Some((lo, hi)) =
                        block_channel_range(center, ap.bandwidth_mhz, Band::Band6)
                    {
                        if lo != hi {
                            return format!("{lo}–{hi}");
                        }
                    }
                }
            }
            ap.channel.to_string()
        }
        Band::Unknown => ap.channel.to_string(),
    }
}

/// MHz center to use when placing an AP's spectrum footprint.
///
/// 5/6 GHz use the bonded-block tables; 2.4 GHz (and table misses) use the
/// reported block center when available, else the primary channel's center.
pub fn draw_center(ap: &AccessPoint) -> u32 {
    if ap.bandwidth_mhz > 20 {
        if ap.band == Band::Band5 && ap.channel != 0 {
            let (center, _) = bonded_block(Band::Band5, ap.channel, ap.bandwidth_mhz);
            if center != 0 {
                return center;
            }
        }
        if ap.band == Band::Band6 && ap.channel != 0 {
            let (center, chans) = bonded_block(Band::Band6, ap.channel, ap.bandwidth_mhz);
            if center != 0 && chans.len() > 1 {
                return center;
            }
        }
        if let Some(center) = ap.enrichment.center_freq_mhz {
            return center;
        }
    }
    ap.freq_mhz
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
