use std::time::{Duration, Instant};

use crate::record::{GroupRecord, ProcRecord, ProcStatus};
use crate::sampler::SystemStats;

//base thresholds; "critical" tiers sit at multiples of these
pub const CPU_HOT: f64 = 100.0;
pub const RSS_HOT_MB: f64 = 800.0;
pub const SWAP_HOT_MB: f64 = 500.0;
pub const SWAP_CLEAN_SUGGEST_PCT: f64 = 80.0;
const DISK_USAGE_CRITICAL: f64 = 95.0;
const DISK_USAGE_HIGH: f64 = 85.0;

const ALERT_TTL: Duration = Duration::from_secs(3);
const MAX_ALERTS: usize = 10;

/// Recency cache over the alert scan. The scan re-walks all rows and
/// groups, so it runs at most once per TTL; in between the previous
/// lines are served as-is.
pub struct AlertCache {
    lines: Vec<String>,
    at: Option<Instant>,
}

impl AlertCache {
    pub fn new() -> Self {
        Self {
            lines: Vec::new(),
            at: None,
        }
    }

    pub fn collect(
        &mut self,
        now: Instant,
        stats: &SystemStats,
        rows: &[ProcRecord],
        groups: &[GroupRecord],
    ) -> &[String] {
        if let Some(at) = self.at {
            if now.duration_since(at) < ALERT_TTL {
                return &self.lines;
            }
        }
        let mut lines = derive(stats, rows, groups);
        //keep the most recently evaluated tail
        if lines.len() > MAX_ALERTS {
            lines.drain(..lines.len() - MAX_ALERTS);
        }
        self.lines = lines;
        self.at = Some(now);
        &self.lines
    }

    #[cfg(test)]
    fn force_expire(&mut self) {
        self.at = None;
    }
}

impl Default for AlertCache {
    fn default() -> Self {
        Self::new()
    }
}

fn stamp() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}

//pure arithmetic and formatting over already-sampled data; nothing in
//here touches the OS, so a scan can never fail mid-cycle
fn derive(stats: &SystemStats, rows: &[ProcRecord], groups: &[GroupRecord]) -> Vec<String> {
    let mut alerts = Vec::new();
    let now = stamp();
    let sys = |msg: String| format!("{now} SYSTEM  {:<10} {:<30}: {msg}", "", "");

    if stats.mem_pct > 95.0 {
        alerts.push(sys(format!("MEMORY CRITICAL ({:.1}%)", stats.mem_pct)));
    } else if stats.mem_pct > 85.0 {
        alerts.push(sys(format!("High memory usage ({:.1}%)", stats.mem_pct)));
    }

    if stats.swap_pct >= SWAP_CLEAN_SUGGEST_PCT {
        alerts.push(sys(format!(
            "Swap {:.1}% - consider running swap-clean",
            stats.swap_pct
        )));
    }

    if let Some(disk_pct) = stats.disk_pct {
        if disk_pct > DISK_USAGE_CRITICAL {
            alerts.push(sys(format!("DISK CRITICAL ({disk_pct:.1}%)")));
        } else if disk_pct > DISK_USAGE_HIGH {
            alerts.push(sys(format!("High disk usage ({disk_pct:.1}%)")));
        }
    }

    let zombies = rows.iter().filter(|r| r.status == ProcStatus::Zombie).count();
    if zombies > 0 {
        alerts.push(sys(format!("{zombies} zombie processes detected")));
    }

    //only the heaviest rows are worth scanning in detail
    let mut hot: Vec<&ProcRecord> = rows
        .iter()
        .filter(|r| r.cpu >= 5.0 || r.mem_pct >= 5.0)
        .collect();
    hot.sort_by(|a, b| (b.cpu + b.mem_pct).total_cmp(&(a.cpu + a.mem_pct)));
    hot.truncate(20);

    for r in hot {
        let cmd = if r.cmdline.is_empty() { &r.name } else { &r.cmdline };
        let cmd: String = cmd.chars().take(30).collect();
        let app: String = r.app.chars().take(10).collect();
        let head = format!("{now} {:>6} {app:<10} {cmd:<30}", r.pid);

        if r.cpu >= CPU_HOT * 2.0 {
            alerts.push(format!("{head}: CPU critical ({:.1}%)", r.cpu));
        } else if r.cpu >= CPU_HOT {
            alerts.push(format!("{head}: High CPU ({:.1}%)", r.cpu));
        }
        if r.mem_pct >= 15.0 {
            alerts.push(format!("{head}: MEMORY CRITICAL ({:.1}%)", r.mem_pct));
        } else if r.mem_pct >= 10.0 {
            alerts.push(format!("{head}: High memory ({:.1}%)", r.mem_pct));
        }
        if r.swap_mb >= SWAP_HOT_MB * 3.0 {
            alerts.push(format!("{head}: SWAP CRITICAL ({:.1}MB)", r.swap_mb));
        } else if r.swap_mb >= SWAP_HOT_MB {
            alerts.push(format!("{head}: High swap ({:.1}MB)", r.swap_mb));
        }
        if r.mem_pct >= 5.0 && r.swap_mb >= SWAP_HOT_MB {
            alerts.push(format!(
                "{head}: Memory pressure ({:.1}% + {:.1}MB)",
                r.mem_pct, r.swap_mb
            ));
        }
        if r.io_read_mb > 100.0 || r.io_write_mb > 100.0 {
            alerts.push(format!(
                "{head}: High I/O ({:.1}MB read, {:.1}MB write)",
                r.io_read_mb, r.io_write_mb
            ));
        }
        if r.status == ProcStatus::Zombie {
            alerts.push(format!("{head}: ZOMBIE PROCESS"));
        }
    }

    let mut top_groups: Vec<&GroupRecord> = groups.iter().collect();
    top_groups.sort_by(|a, b| b.cpu.total_cmp(&a.cpu));
    top_groups.truncate(10);
    for g in top_groups {
        let app: String = g.app.chars().take(10).collect();
        let head = format!("{now} group   {app:<10} {:>3}procs{:<26}", g.procs, "");
        if g.cpu >= CPU_HOT * 2.0 {
            alerts.push(format!("{head}: Group CPU critical ({:.1}%)", g.cpu));
        } else if g.cpu >= CPU_HOT {
            alerts.push(format!("{head}: Group high CPU ({:.1}%)", g.cpu));
        }
        if g.swap_mb >= SWAP_HOT_MB * 4.0 {
            alerts.push(format!("{head}: Group swap critical ({:.1}MB)", g.swap_mb));
        }
    }

    alerts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{aggregate, test_row};

    fn stats() -> SystemStats {
        SystemStats {
            mem_pct: 50.0,
            cpu_count: 4,
            ..SystemStats::default()
        }
    }

    #[test]
    fn quiet_system_has_no_alerts() {
        let mut cache = AlertCache::new();
        let rows = vec![test_row(1, 0, "calm", 10.0)];
        let groups = aggregate(&rows);
        let out = cache.collect(Instant::now(), &stats(), &rows, &groups);
        assert!(out.is_empty());
    }

    #[test]
    fn memory_critical_fires() {
        let mut cache = AlertCache::new();
        let s = SystemStats {
            mem_pct: 97.0,
            ..stats()
        };
        let out = cache.collect(Instant::now(), &s, &[], &[]);
        assert_eq!(out.len(), 1);
        assert!(out[0].contains("MEMORY CRITICAL"));
    }

    #[test]
    fn zombie_and_hot_cpu_reported() {
        let mut cache = AlertCache::new();
        let mut z = test_row(5, 0, "dead", 10.0);
        z.status = ProcStatus::Zombie;
        let mut hot = test_row(6, 0, "burn", 10.0);
        hot.cpu = 250.0;
        let rows = vec![z, hot];
        let groups = aggregate(&rows);
        let out = cache.collect(Instant::now(), &stats(), &rows, &groups);
        assert!(out.iter().any(|l| l.contains("zombie processes")));
        assert!(out.iter().any(|l| l.contains("CPU critical")));
        //group sums inherit the hot cpu
        assert!(out.iter().any(|l| l.contains("Group CPU critical")));
    }

    #[test]
    fn multibyte_names_truncate_cleanly() {
        let mut cache = AlertCache::new();
        let mut r = test_row(9, 0, "жёлтый-демон-из-глубины-машины", 10.0);
        r.cpu = 250.0;
        r.cmdline = "жёлтый-демон --глубина=максимум --ещё --и --ещё".to_string();
        let rows = vec![r];
        let groups = aggregate(&rows);
        let out = cache.collect(Instant::now(), &stats(), &rows, &groups);
        assert!(out.iter().any(|l| l.contains("CPU critical")));
    }

    #[test]
    fn output_is_bounded_to_ten_lines() {
        let mut cache = AlertCache::new();
        let rows: Vec<_> = (0..30)
            .map(|i| {
                let mut r = test_row(i, 0, "burn", 10.0);
                r.cpu = 250.0;
                r.mem_pct = 20.0;
                r
            })
            .collect();
        let groups = aggregate(&rows);
        let out = cache.collect(Instant::now(), &stats(), &rows, &groups);
        assert_eq!(out.len(), 10);
    }

    #[test]
    fn cache_serves_previous_lines_within_ttl() {
        let mut cache = AlertCache::new();
        let s = SystemStats {
            mem_pct: 97.0,
            ..stats()
        };
        let now = Instant::now();
        let first = cache.collect(now, &s, &[], &[]).to_vec();
        //stats changed, but the TTL has not elapsed
        let calm = stats();
        let second = cache.collect(now + Duration::from_secs(1), &calm, &[], &[]).to_vec();
        assert_eq!(first, second);
        cache.force_expire();
        let third = cache.collect(now + Duration::from_secs(2), &calm, &[], &[]);
        assert!(third.is_empty());
    }
}
