//! wavescan: CLI consumer for the Wi-Fi discovery pipeline.

use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand};
use comfy_table::{Cell, Table};

use wavescan_core::channels;
use wavescan_core::config;
use wavescan_core::enrich::merge_enrichment;
use wavescan_core::scan_dump::parse_scan_dump;
use wavescan_core::scanner::{spawn_scanner, ScanEvent, ScanWorker, SystemRunner};
use wavescan_core::terse::parse_terse;
use wavescan_core::types::*;
use wavescan_core::vendor::VendorResolver;

#[derive(Parser)]
#[command(name = "wavescan", version, about = "Wi-Fi access-point scanner")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one acquisition cycle and print the access-point table
    Scan {
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Poll continuously, printing each cycle's table
    Watch {
        /// Seconds between cycles
        #[arg(short, long)]
        interval: Option<u64>,

        /// Linger window in seconds (0 disables)
        #[arg(long)]
        linger: Option<f64>,

        /// Active rescan every Nth cycle
        #[arg(long)]
        rescan_every: Option<u32>,

        /// Stop after this many cycles (0 = run until interrupted)
        #[arg(long, default_value = "0")]
        cycles: u64,

        /// Emit JSON instead of tables
        #[arg(long)]
        json: bool,
    },

    /// Parse saved tool-output files and print the merged table
    Parse {
        /// File with the terse listing output
        terse: PathBuf,

        /// File with the scan-dump output
        #[arg(long)]
        dump: Option<PathBuf>,

        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    match cli.command {
        Commands::Scan { json } => cmd_scan(json),
        Commands::Watch {
            interval,
            linger,
            rescan_every,
            cycles,
            json,
        } => cmd_watch(interval, linger, rescan_every, cycles, json),
        Commands::Parse { terse, dump, json } => cmd_parse(terse, dump, json),
    }
}

fn cmd_scan(json: bool) {
    let config = config::load_config();
    let mut worker = ScanWorker::new(config, SystemRunner, VendorResolver::builtin());

    match worker.run_cycle(Instant::now()) {
        Ok(aps) => emit(&aps, json),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

fn cmd_watch(
    interval: Option<u64>,
    linger: Option<f64>,
    rescan_every: Option<u32>,
    cycles: u64,
    json: bool,
) {
    let mut config = config::load_config();
    if let Some(v) = interval {
        config.interval_secs = v;
    }
    if let Some(v) = linger {
        config.linger_secs = v;
    }
    if let Some(v) = rescan_every {
        config.rescan_every = v;
    }

    let (handle, rx) = spawn_scanner(config, VendorResolver::builtin());
    let mut seen = 0u64;

    for event in rx.iter() {
        match event {
            ScanEvent::Records(aps) => {
                seen += 1;
                if !json {
                    println!("Cycle {seen}: {} access points", aps.len());
                }
                emit(&aps, json);
                if cycles > 0 && seen >= cycles {
                    break;
                }
            }
            ScanEvent::Failed(err) => {
                eprintln!("Error: {err}");
                if err.is_fatal() {
                    std::process::exit(1);
                }
            }
        }
    }

    handle.stop();
}

fn cmd_parse(terse: PathBuf, dump: Option<PathBuf>, json: bool) {
    let terse_text = std::fs::read_to_string(&terse).unwrap_or_else(|e| {
        eprintln!("Error opening {}: {e}", terse.display());
        std::process::exit(1);
    });

    let vendors = VendorResolver::builtin();
    let mut aps = parse_terse(&terse_text, &vendors);

    if let Some(dump_path) = dump {
        let dump_text = std::fs::read_to_string(&dump_path).unwrap_or_else(|e| {
            eprintln!("Error opening {}: {e}", dump_path.display());
            std::process::exit(1);
        });
        let records = parse_scan_dump(&dump_text);
        merge_enrichment(&mut aps, &records, None);
    }

    emit(&aps, json);
}

fn emit(aps: &[AccessPoint], json: bool) {
    if json {
        match serde_json::to_string_pretty(aps) {
            Ok(text) => println!("{text}"),
            Err(e) => eprintln!("Error: {e}"),
        }
    } else {
        print_table(aps);
        print_link_details(aps);
    }
}

fn print_table(aps: &[AccessPoint]) {
    let mut sorted: Vec<&AccessPoint> = aps.iter().collect();
    sorted.sort_by(|a, b| b.signal.cmp(&a.signal).then_with(|| a.ssid.cmp(&b.ssid)));

    let mut table = Table::new();
    table.set_header(vec![
        "", "SSID", "BSSID", "Manufacturer", "Band", "Ch", "Span", "Freq", "Width", "Sig",
        "dBm", "Rate", "Security", "Gen", "Util%", "Clients", "Roam",
    ]);

    for ap in sorted {
        let marker = if ap.in_use {
            "*"
        } else if ap.lingering {
            "~"
        } else {
            ""
        };
        table.add_row(vec![
            Cell::new(marker),
            Cell::new(ap.display_ssid()),
            Cell::new(bssid_to_string(&ap.bssid)),
            Cell::new(&ap.manufacturer),
            Cell::new(ap.band),
            Cell::new(ap.channel),
            Cell::new(channels::channel_span(ap)),
            Cell::new(ap.freq_mhz),
            Cell::new(ap.bandwidth_mhz),
            Cell::new(ap.signal),
            Cell::new(ap.dbm()),
            Cell::new(format!("{:.0}", ap.rate_mbps)),
            Cell::new(ap.security_short()),
            Cell::new(&ap.enrichment.wifi_gen),
            Cell::new(
                ap.chan_util_pct()
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "-".into()),
            ),
            Cell::new(
                ap.enrichment
                    .station_count
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "-".into()),
            ),
            Cell::new(ap.kvr_flags()),
        ]);
    }

    println!("{table}");
}

fn print_link_details(aps: &[AccessPoint]) {
    let link = match aps.iter().find_map(|ap| ap.link.as_ref()) {
        Some(l) => l,
        None => return,
    };

    println!();
    println!("Link ({} on {}):", link.ssid, link.iface);
    if let (Some(sig), Some(avg)) = (link.signal_dbm, link.signal_avg_dbm) {
        println!("  signal: {sig} dBm (avg {avg} dBm)");
    }
    if !link.rx_phy.is_empty() {
        println!("  rx: {}  [{}]", link.rx_bitrate, link.rx_phy);
    }
    if !link.tx_phy.is_empty() {
        println!("  tx: {}  [{}]", link.tx_bitrate, link.tx_phy);
    }
    if let (Some(retry), Some(fail)) = (link.tx_retry_rate_pct, link.tx_fail_rate_pct) {
        println!("  tx retries: {retry:.1}%  failures: {fail:.1}%");
    }
    if let Some(busy) = link.survey_busy_pct {
        println!("  channel busy: {busy:.0}%");
    }
    if let Some(noise) = link.survey_noise_dbm {
        println!("  noise floor: {noise} dBm");
    }
    if let Some(secs) = link.connected_time_s {
        println!("  connected: {secs} s");
    }
}
