//! Scan cadence controller.
//!
//! A single dedicated worker thread polls the external sources, runs the
//! parse → enrich → stabilize pipeline, and emits each cycle's record list
//! over a channel. The worker is the only writer of the stability caches,
//! so they need no locking; consumers only ever see the emitted record
//! lists, which are never mutated after the send.
//!
//! Every external invocation is guarded by a bounded timeout so a hung tool
//! cannot wedge the worker. Stopping is cooperative: set the flag, let the
//! in-flight call return or time out, join.

use std::collections::HashMap;
use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::config::ScanConfig;
use crate::enrich::{assemble_link_metrics, merge_enrichment};
use crate::scan_dump::{
    parse_link_dump, parse_scan_dump, parse_station_dump, parse_survey_dump,
};
use crate::stability::{EnrichmentCache, LingerCache, RetryRates, StickyFields};
use crate::terse::{parse_terse, TERSE_FIELDS};
use crate::types::{AccessPoint, Bssid, DumpRecord, LinkMetrics, Result, ScanError};
use crate::vendor::VendorResolver;

/// Timeout for a cached (no-rescan) read of the primary source.
const CACHED_READ_TIMEOUT: Duration = Duration::from_secs(8);
/// Timeout for an active-rescan read — the radio sweep takes a while.
const RESCAN_TIMEOUT: Duration = Duration::from_secs(30);
/// Timeout for the scan dump.
const SCAN_DUMP_TIMEOUT: Duration = Duration::from_secs(6);
/// Timeout for the link/station/survey/interface invocations.
const LINK_TIMEOUT: Duration = Duration::from_secs(3);

/// One extra active rescan shortly after startup, so the first seconds of a
/// session are not served entirely from a stale driver cache.
const WARMUP_RESCAN_CYCLE: u64 = 2;

// ---------------------------------------------------------------------------
// Command execution
// ---------------------------------------------------------------------------

/// Captured output of one external invocation.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Seam between the worker and the external tools. The system
/// implementation shells out; tests script it.
pub trait CommandRunner: Send {
    fn run(&mut self, program: &str, args: &[&str], timeout: Duration) -> Result<CommandOutput>;
}

/// Runs real subprocesses with piped output and a bounded wait.
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&mut self, program: &str, args: &[&str], timeout: Duration) -> Result<CommandOutput> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ScanError::ToolMissing(program.to_string())
                } else {
                    ScanError::Io(e)
                }
            })?;

        // Drain pipes on their own threads so a chatty child never blocks
        // on a full pipe while we wait on it.
        let stdout = drain_thread(child.stdout.take());
        let stderr = drain_thread(child.stderr.take());

        let deadline = Instant::now() + timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    if Instant::now() >= deadline {
                        kill_and_reap(&mut child);
                        join_drain(stdout);
                        join_drain(stderr);
                        return Err(ScanError::Timeout {
                            tool: program.to_string(),
                            timeout_secs: timeout.as_secs(),
                        });
                    }
                    thread::sleep(Duration::from_millis(25));
                }
                Err(e) => {
                    kill_and_reap(&mut child);
                    join_drain(stdout);
                    join_drain(stderr);
                    return Err(ScanError::Io(e));
                }
            }
        };

        Ok(CommandOutput {
            success: status.success(),
            stdout: join_drain(stdout),
            stderr: join_drain(stderr),
        })
    }
}

fn drain_thread<P: Read + Send + 'static>(pipe: Option<P>) -> Option<JoinHandle<String>> {
    pipe.map(|mut p| {
        thread::spawn(move || {
            let mut buf = String::new();
            let _ = p.read_to_string(&mut buf);
            buf
        })
    })
}

fn join_drain(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

fn kill_and_reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

// ---------------------------------------------------------------------------
// Source invocations
// ---------------------------------------------------------------------------

/// The external command invocations behind one polling cycle.
pub struct WifiSources<R: CommandRunner> {
    runner: R,
    /// Managed wireless interface — configured, or detected once and cached.
    iface: Option<String>,
}

impl<R: CommandRunner> WifiSources<R> {
    pub fn new(runner: R, interface: Option<String>) -> Self {
        WifiSources {
            runner,
            iface: interface,
        }
    }

    /// Terse listing from the primary source. `rescan` selects the active
    /// sweep over the cached read.
    pub fn list_terse(&mut self, rescan: bool) -> Result<String> {
        let rescan_arg = if rescan { "yes" } else { "no" };
        let timeout = if rescan {
            RESCAN_TIMEOUT
        } else {
            CACHED_READ_TIMEOUT
        };
        let out = self.runner.run(
            "nmcli",
            &[
                "-t", "-f", TERSE_FIELDS, "dev", "wifi", "list", "--rescan", rescan_arg,
            ],
            timeout,
        )?;
        if !out.success {
            return Err(ScanError::CommandFailed {
                tool: "nmcli".into(),
                stderr: out.stderr.trim().to_string(),
            });
        }
        Ok(out.stdout)
    }

    /// First 'managed' wireless interface reported by `iw dev`.
    fn interface(&mut self) -> Option<String> {
        if self.iface.is_some() {
            return self.iface.clone();
        }
        let out = self.runner.run("iw", &["dev"], LINK_TIMEOUT).ok()?;
        if !out.success {
            return None;
        }
        let mut current: Option<String> = None;
        for line in out.stdout.lines() {
            let s = line.trim();
            if let Some(name) = s.strip_prefix("Interface ") {
                current = Some(name.trim().to_string());
            } else if s.starts_with("type managed") {
                if let Some(name) = current.take() {
                    self.iface = Some(name);
                    return self.iface.clone();
                }
            }
        }
        None
    }

    /// Scan dump plus association telemetry. Everything here is soft — the
    /// secondary source only enriches, so failures yield empty results
    /// rather than errors.
    pub fn enrichment(&mut self) -> (HashMap<Bssid, DumpRecord>, Option<LinkMetrics>) {
        let iface = match self.interface() {
            Some(i) => i,
            None => return (HashMap::new(), None),
        };
        let dump = match self
            .runner
            .run("iw", &["dev", &iface, "scan", "dump"], SCAN_DUMP_TIMEOUT)
        {
            Ok(out) if out.success => parse_scan_dump(&out.stdout),
            _ => HashMap::new(),
        };
        let link = self.link_metrics(&iface);
        (dump, link)
    }

    fn link_metrics(&mut self, iface: &str) -> Option<LinkMetrics> {
        let out = self
            .runner
            .run("iw", &["dev", iface, "link"], LINK_TIMEOUT)
            .ok()?;
        if !out.success {
            return None;
        }
        let link = parse_link_dump(&out.stdout)?;

        let sta = self
            .runner
            .run("iw", &["dev", iface, "station", "dump"], LINK_TIMEOUT)
            .ok()
            .filter(|o| o.success)
            .and_then(|o| parse_station_dump(&o.stdout, link.bssid.as_ref()));

        let survey = self
            .runner
            .run("iw", &["dev", iface, "survey", "dump"], LINK_TIMEOUT)
            .ok()
            .filter(|o| o.success)
            .map(|o| parse_survey_dump(&o.stdout, link.freq_mhz))
            .unwrap_or_default();

        Some(assemble_link_metrics(iface, link, sta, survey))
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

/// Events emitted by the worker, one per cycle.
#[derive(Debug)]
pub enum ScanEvent {
    /// A completed cycle's record list, safe to read without
    /// synchronization — it is never touched again after the send.
    Records(Vec<AccessPoint>),
    /// A failed cycle. Fatal errors (`ScanError::is_fatal`) end the worker
    /// loop; everything else is transient and polling continues.
    Failed(ScanError),
}

/// The polling state machine: cycle counter, source invocations, and the
/// composed stability caches.
pub struct ScanWorker<R: CommandRunner> {
    config: ScanConfig,
    sources: WifiSources<R>,
    vendors: VendorResolver,
    sticky: StickyFields,
    enrich_cache: EnrichmentCache,
    retry_rates: RetryRates,
    linger: LingerCache,
    cycle: u64,
}

impl<R: CommandRunner> ScanWorker<R> {
    pub fn new(config: ScanConfig, runner: R, vendors: VendorResolver) -> Self {
        let iface = config.interface.clone();
        let linger = LingerCache::new(Duration::from_secs_f64(config.linger_secs.max(0.0)));
        ScanWorker {
            sources: WifiSources::new(runner, iface),
            vendors,
            sticky: StickyFields::new(),
            enrich_cache: EnrichmentCache::new(),
            retry_rates: RetryRates::new(),
            linger,
            cycle: 0,
            config,
        }
    }

    /// Whether the upcoming cycle runs the expensive active double-rescan.
    /// Deterministic in the cycle counter alone.
    fn is_rescan_cycle(&self) -> bool {
        self.cycle % self.config.rescan_every.max(1) as u64 == 0
            || self.cycle == WARMUP_RESCAN_CYCLE
    }

    /// Run one full acquisition cycle. The counter advances whether or not
    /// the cycle succeeds, so the rescan cadence stays deterministic.
    pub fn run_cycle(&mut self, now: Instant) -> Result<Vec<AccessPoint>> {
        let rescan = self.is_rescan_cycle();
        self.cycle += 1;

        let output = if rescan {
            // Hidden APs only reveal their name after answering an active
            // probe: the first rescan sends the probes, the second rescan's
            // read captures the probe responses that arrived in between.
            // A single rescan reliably misses them.
            self.sources.list_terse(true)?;
            self.sources.list_terse(true)?
        } else {
            self.sources.list_terse(false)?
        };

        let mut aps = parse_terse(&output, &self.vendors);
        let (dump, link) = self.sources.enrichment();
        merge_enrichment(&mut aps, &dump, link.as_ref());

        for ap in aps.iter_mut() {
            self.sticky.observe(ap);
        }
        for ap in aps.iter_mut() {
            self.enrich_cache.observe(ap);
        }
        for ap in aps.iter_mut() {
            self.retry_rates.observe(ap);
            if ap.in_use {
                self.enrich_cache.refresh(ap);
            }
        }
        self.linger.merge(&mut aps, now);

        Ok(aps)
    }
}

// ---------------------------------------------------------------------------
// Background thread
// ---------------------------------------------------------------------------

/// Handle to a running scan worker.
pub struct ScanHandle {
    stop: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ScanHandle {
    /// Signal the worker to stop and wait for the in-flight cycle (if any)
    /// to return or time out.
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

/// Spawn the worker against the real system tools.
pub fn spawn_scanner(
    config: ScanConfig,
    vendors: VendorResolver,
) -> (ScanHandle, Receiver<ScanEvent>) {
    spawn_scanner_with(config, SystemRunner, vendors)
}

/// Spawn the worker with an explicit runner. Events arrive on the returned
/// channel; the channel disconnecting means the worker exited.
pub fn spawn_scanner_with<R: CommandRunner + 'static>(
    config: ScanConfig,
    runner: R,
    vendors: VendorResolver,
) -> (ScanHandle, Receiver<ScanEvent>) {
    let (tx, rx) = mpsc::channel();
    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = stop.clone();
    let interval = Duration::from_secs(config.interval_secs.max(1));
    let mut worker = ScanWorker::new(config, runner, vendors);

    let join = thread::spawn(move || {
        while !stop_flag.load(Ordering::Relaxed) {
            match worker.run_cycle(Instant::now()) {
                Ok(aps) => {
                    if tx.send(ScanEvent::Records(aps)).is_err() {
                        break; // receiver dropped
                    }
                }
                Err(err) => {
                    let fatal = err.is_fatal();
                    let _ = tx.send(ScanEvent::Failed(err));
                    if fatal {
                        break;
                    }
                }
            }

            // Interruptible sleep between cycles
            let deadline = Instant::now() + interval;
            while Instant::now() < deadline {
                if stop_flag.load(Ordering::Relaxed) {
                    return;
                }
                thread::sleep(Duration::from_millis(50));
            }
        }
    });

    (
        ScanHandle {
            stop,
            join: Some(join),
        },
        rx,
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
