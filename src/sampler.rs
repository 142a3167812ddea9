use std::time::{Duration, Instant};

use regex::Regex;
use sysinfo::{
    CpuRefreshKind, Disks, MemoryRefreshKind, Pid, Process, ProcessRefreshKind, ProcessStatus,
    ProcessesToUpdate, RefreshKind, Signal, System, UpdateKind,
};

use crate::cache::TtlCache;
use crate::classify::Classifier;
use crate::record::{ProcRecord, ProcStatus};

const MB: f64 = 1024.0 * 1024.0;

pub const IDENTITY_TTL: Duration = Duration::from_secs(30);
pub const SWAP_TTL: Duration = Duration::from_secs(2);
pub const CACHE_SWEEP: Duration = Duration::from_secs(10);
const DISK_TTL: Duration = Duration::from_secs(3);

//cost tiers: below these RSS sizes the expensive reads are skipped
const CPU_SKIP_RSS_MB: f64 = 2.0;
const SWAP_READ_RSS_MB: f64 = 50.0;
const SWAP_READ_RSS_MB_LITE: f64 = 200.0;
const IO_READ_RSS_MB: f64 = 25.0;

#[derive(Clone)]
struct Identity {
    name: String,
    cmdline: String,
    app: String,
}

/// System-wide readings taken once per frame for the header and the
/// alert checks.
#[derive(Clone, Debug, Default)]
pub struct SystemStats {
    pub mem_total: u64,
    pub mem_used: u64,
    pub mem_available: u64,
    pub mem_free: u64,
    pub mem_buffers: u64,
    pub mem_cached: u64,
    pub mem_pct: f64,
    pub swap_total: u64,
    pub swap_used: u64,
    pub swap_pct: f64,
    pub load_one: f64,
    pub load_five: f64,
    pub load_fifteen: f64,
    pub cpu_count: usize,
    pub disk_pct: Option<f64>,
}

/// Samples the live process table into `ProcRecord`s. Owns the sysinfo
/// handle, the identity/swap caches and the classifier; nothing else
/// touches them.
pub struct Sampler {
    system: System,
    classifier: Classifier,
    identity: TtlCache<Identity>,
    swap: TtlCache<f64>,
    disk: Option<(Instant, Option<f64>)>,
    pub lite: bool,
}

impl Sampler {
    pub fn new(lite: bool) -> Self {
        let mut system = System::new_with_specifics(
            RefreshKind::nothing()
                .with_cpu(CpuRefreshKind::everything())
                .with_memory(MemoryRefreshKind::everything()),
        );
        system.refresh_memory();
        Self {
            system,
            classifier: Classifier::new(),
            identity: TtlCache::new(IDENTITY_TTL, CACHE_SWEEP),
            swap: TtlCache::new(SWAP_TTL, CACHE_SWEEP),
            disk: None,
            lite,
        }
    }

    /// One sampling pass over all visible processes. Only processes
    /// with readable resident memory make it into the result; order is
    /// enumeration order. A process vanishing mid-pass is skipped by
    /// the OS layer, never an error.
    pub fn sample(&mut self, filter: Option<&Regex>) -> Vec<ProcRecord> {
        let now = Instant::now();
        self.identity.maybe_sweep(now);
        self.swap.maybe_sweep(now);

        self.system.refresh_memory();
        let mut kind = ProcessRefreshKind::nothing().with_memory().with_cpu();
        if !self.lite {
            kind = kind.with_disk_usage();
        }
        if !self.lite || filter.is_some() {
            //command lines never change over a process lifetime
            kind = kind.with_cmd(UpdateKind::OnlyIfNotSet);
        }
        self.system
            .refresh_processes_specifics(ProcessesToUpdate::All, true, kind);

        //one total-memory reading per pass keeps mem_pct consistent
        //across all records of the pass
        let total = self.system.total_memory() as f64;
        let inv_total = if total > 0.0 { 100.0 / total } else { 0.0 };

        let swap_floor = if self.lite {
            SWAP_READ_RSS_MB_LITE
        } else {
            SWAP_READ_RSS_MB
        };

        let mut rows = Vec::with_capacity(self.system.processes().len());
        for (pid, p) in self.system.processes() {
            let pid = pid.as_u32();
            if pid == 0 {
                continue;
            }
            let ppid = p.parent().map_or(0, |pp| pp.as_u32());

            let (name, cmdline, app) = match self.identity.get(pid, now) {
                Some(id) => {
                    let mut cmdline = id.cmdline.clone();
                    //a lite-mode cache entry carries no command line;
                    //filtering needs text to match against
                    if filter.is_some() && cmdline.is_empty() {
                        cmdline = join_cmd(p, 10);
                    }
                    (id.name.clone(), cmdline, id.app.clone())
                }
                None => {
                    let name = p.name().to_string_lossy().to_string();
                    let cmdline = if !self.lite || filter.is_some() {
                        join_cmd(p, 10)
                    } else {
                        String::new()
                    };
                    let app = self.classifier.classify(&name, &cmdline);
                    self.identity.insert(
                        pid,
                        Identity {
                            name: name.clone(),
                            cmdline: cmdline.clone(),
                            app: app.clone(),
                        },
                        now,
                    );
                    (name, cmdline, app)
                }
            };

            //drop non-matching processes before the expensive reads
            if let Some(re) = filter {
                let hit = re.is_match(&app)
                    || re.is_match(&name)
                    || (!cmdline.is_empty() && re.is_match(&cmdline));
                if !hit {
                    continue;
                }
            }

            let rss_bytes = p.memory();
            if rss_bytes == 0 {
                //resident memory unreadable (kernel thread, access
                //denied, exited mid-pass); memory is mandatory
                continue;
            }
            let rss_mb = rss_bytes as f64 / MB;

            let cpu = if self.lite && rss_mb < CPU_SKIP_RSS_MB {
                0.0
            } else {
                f64::from(p.cpu_usage())
            };

            let swap_mb = if rss_mb > swap_floor {
                cached_swap_mb(&mut self.swap, pid, now)
            } else {
                0.0
            };

            let (mut io_read_mb, mut io_write_mb) = (0.0, 0.0);
            if !self.lite && rss_mb > IO_READ_RSS_MB {
                let du = p.disk_usage();
                io_read_mb = du.total_read_bytes as f64 / MB;
                io_write_mb = du.total_written_bytes as f64 / MB;
            }

            let status = if self.lite {
                ProcStatus::Running
            } else {
                map_status(p.status())
            };

            rows.push(ProcRecord {
                pid,
                ppid,
                name,
                rss_mb,
                cpu,
                mem_pct: rss_bytes as f64 * inv_total,
                swap_mb,
                cmdline,
                app,
                io_read_mb,
                io_write_mb,
                net_sent_mb: 0.0,
                net_recv_mb: 0.0,
                status,
            });
        }
        rows
    }

    //statvfs-ing every mount is far too costly to repeat per frame;
    //the reading only feeds the alert checks, a short TTL is plenty
    fn cached_disk_pct(&mut self, now: Instant, read: impl FnOnce() -> Option<f64>) -> Option<f64> {
        if let Some((at, v)) = self.disk {
            if now.duration_since(at) < DISK_TTL {
                return v;
            }
        }
        let v = read();
        self.disk = Some((now, v));
        v
    }

    pub fn stats(&mut self) -> SystemStats {
        self.system.refresh_memory();
        let disk_pct = self.cached_disk_pct(Instant::now(), root_disk_pct);
        let s = &self.system;
        let mem_total = s.total_memory();
        let mem_used = s.used_memory();
        let swap_total = s.total_swap();
        let swap_used = s.used_swap();
        let load = System::load_average();

        //sysinfo does not expose buffers/cached, read them directly
        let (mem_buffers, mem_cached) = match crate::swapclean::read_meminfo("/proc/meminfo") {
            Ok(mi) => (
                mi.get("Buffers").copied().unwrap_or(0) * 1024,
                mi.get("Cached").copied().unwrap_or(0) * 1024,
            ),
            Err(_) => (0, 0),
        };

        SystemStats {
            mem_total,
            mem_used,
            mem_available: s.available_memory(),
            mem_free: s.free_memory(),
            mem_buffers,
            mem_cached,
            mem_pct: pct(mem_used, mem_total),
            swap_total,
            swap_used,
            swap_pct: pct(swap_used, swap_total),
            load_one: load.one,
            load_five: load.five,
            load_fifteen: load.fifteen,
            cpu_count: s.cpus().len().max(1),
            disk_pct,
        }
    }

    /// Sends a signal to one process. Returns false when the process is
    /// gone or the delivery was refused.
    pub fn signal_pid(&self, pid: u32, sig: Signal) -> bool {
        self.system
            .process(Pid::from_u32(pid))
            .and_then(|p| p.kill_with(sig))
            .unwrap_or(false)
    }

    /// Signals every process classifying into `app`. Per-process
    /// failures are counted, never propagated.
    pub fn signal_app(&mut self, app: &str, sig: Signal) -> (usize, usize) {
        let mut sent = 0;
        let mut denied = 0;
        for p in self.system.processes().values() {
            let name = p.name().to_string_lossy().to_string();
            let cmd = join_cmd(p, 4);
            if self.classifier.classify(&name, &cmd) != app {
                continue;
            }
            match p.kill_with(sig) {
                Some(true) => sent += 1,
                Some(false) | None => denied += 1,
            }
        }
        (sent, denied)
    }
}

fn cached_swap_mb(cache: &mut TtlCache<f64>, pid: u32, now: Instant) -> f64 {
    if let Some(v) = cache.get(pid, now) {
        return *v;
    }
    let v = read_vmswap_mb(pid).unwrap_or(0.0);
    cache.insert(pid, v, now);
    v
}

fn join_cmd(p: &Process, max_args: usize) -> String {
    let cmd = p.cmd();
    if cmd.is_empty() {
        return String::new();
    }
    cmd.iter()
        .take(max_args)
        .map(|a| a.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}

fn map_status(s: ProcessStatus) -> ProcStatus {
    match s {
        ProcessStatus::Run => ProcStatus::Running,
        ProcessStatus::Zombie => ProcStatus::Zombie,
        ProcessStatus::Unknown(_) => ProcStatus::Unknown,
        _ => ProcStatus::Other,
    }
}

fn pct(used: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        used as f64 * 100.0 / total as f64
    }
}

fn root_disk_pct() -> Option<f64> {
    let disks = Disks::new_with_refreshed_list();
    disks
        .iter()
        .find(|d| d.mount_point() == std::path::Path::new("/"))
        .map(|d| {
            let total = d.total_space();
            let used = total.saturating_sub(d.available_space());
            pct(used, total)
        })
}

/// VmSwap from /proc/<pid>/status in MB. None when the file is gone or
/// carries no swap line (also the case off Linux).
fn read_vmswap_mb(pid: u32) -> Option<f64> {
    let status = std::fs::read_to_string(format!("/proc/{pid}/status")).ok()?;
    for line in status.lines() {
        if let Some(rest) = line.strip_prefix("VmSwap:") {
            let kb: f64 = rest.split_whitespace().next()?.parse().ok()?;
            return Some(kb / 1024.0);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_includes_current_process() {
        let mut sampler = Sampler::new(false);
        let rows = sampler.sample(None);
        let me = std::process::id();
        assert!(rows.iter().any(|r| r.pid == me));
    }

    #[test]
    fn sample_respects_filter() {
        let mut sampler = Sampler::new(false);
        let re = Regex::new("this-matches-no-process-at-all").unwrap();
        assert!(sampler.sample(Some(&re)).is_empty());
    }

    #[test]
    fn records_have_consistent_mem_pct() {
        let mut sampler = Sampler::new(false);
        for r in sampler.sample(None) {
            assert!(r.mem_pct >= 0.0 && r.mem_pct <= 100.0);
            assert!(r.rss_mb > 0.0);
            assert!(!r.app.is_empty());
            assert_eq!(r.net_sent_mb, 0.0);
            assert_eq!(r.net_recv_mb, 0.0);
        }
    }

    #[test]
    fn lite_mode_reports_running_status() {
        let mut sampler = Sampler::new(true);
        for r in sampler.sample(None) {
            assert_eq!(r.status, ProcStatus::Running);
        }
    }

    #[test]
    fn disk_reading_is_reused_within_its_ttl() {
        let mut sampler = Sampler::new(false);
        let t0 = Instant::now();
        let mut reads = 0;
        let v1 = sampler.cached_disk_pct(t0, || {
            reads += 1;
            Some(42.0)
        });
        let v2 = sampler.cached_disk_pct(t0 + Duration::from_secs(1), || {
            reads += 1;
            Some(7.0)
        });
        assert_eq!(v1, Some(42.0));
        assert_eq!(v2, Some(42.0));
        assert_eq!(reads, 1);
        //past the TTL the next call queries again
        let v3 = sampler.cached_disk_pct(t0 + Duration::from_secs(4), || {
            reads += 1;
            Some(7.0)
        });
        assert_eq!(v3, Some(7.0));
        assert_eq!(reads, 2);
    }

    #[test]
    fn stats_are_populated() {
        let mut sampler = Sampler::new(false);
        let stats = sampler.stats();
        assert!(stats.mem_total > 0);
        assert!(stats.cpu_count >= 1);
    }
}
