use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcStatus {
    Running,
    Zombie,
    Unknown,
    Other,
}

/// One OS process as observed in a single sampling pass. Rebuilt fresh
/// every pass, never mutated after construction.
#[derive(Clone, Debug)]
pub struct ProcRecord {
    pub pid: u32,
    pub ppid: u32,
    pub name: String,
    pub rss_mb: f64,
    pub cpu: f64,
    pub mem_pct: f64,
    pub swap_mb: f64,
    pub cmdline: String,
    pub app: String,
    pub io_read_mb: f64,
    pub io_write_mb: f64,
    //reserved, no network sampling is implemented
    pub net_sent_mb: f64,
    pub net_recv_mb: f64,
    pub status: ProcStatus,
}

/// Per-application sums over one pass. %CPU and %MEM are plain
/// arithmetic sums over member processes and can exceed 100.
#[derive(Clone, Debug, Default)]
pub struct GroupRecord {
    pub app: String,
    pub procs: usize,
    pub rss_mb: f64,
    pub mem_pct: f64,
    pub cpu: f64,
    pub swap_mb: f64,
    pub io_read_mb: f64,
    pub io_write_mb: f64,
    pub net_sent_mb: f64,
    pub net_recv_mb: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    Mem,
    Cpu,
    Rss,
    Swap,
    Io,
    Net,
    Count,
}

impl SortKey {
    pub const ALL: [SortKey; 7] = [
        SortKey::Mem,
        SortKey::Cpu,
        SortKey::Rss,
        SortKey::Swap,
        SortKey::Io,
        SortKey::Net,
        SortKey::Count,
    ];

    pub fn next(self) -> Self {
        let i = Self::ALL.iter().position(|k| *k == self).unwrap_or(0);
        Self::ALL[(i + 1) % Self::ALL.len()]
    }

    pub fn label(self) -> &'static str {
        match self {
            SortKey::Mem => "mem",
            SortKey::Cpu => "cpu",
            SortKey::Rss => "rss",
            SortKey::Swap => "swap",
            SortKey::Io => "io",
            SortKey::Net => "net",
            SortKey::Count => "count",
        }
    }
}

impl std::str::FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|k| k.label() == s)
            .copied()
            .ok_or_else(|| format!("unknown sort key '{s}' (mem cpu rss swap io net count)"))
    }
}

/// Folds records into per-application groups by summation. Output order
/// is first appearance; callers sort separately.
pub fn aggregate(rows: &[ProcRecord]) -> Vec<GroupRecord> {
    let mut groups: Vec<GroupRecord> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();
    for r in rows {
        let i = match index.get(r.app.as_str()) {
            Some(&i) => i,
            None => {
                groups.push(GroupRecord {
                    app: r.app.clone(),
                    ..GroupRecord::default()
                });
                index.insert(r.app.as_str(), groups.len() - 1);
                groups.len() - 1
            }
        };
        let g = &mut groups[i];
        g.procs += 1;
        g.rss_mb += r.rss_mb;
        g.mem_pct += r.mem_pct;
        g.cpu += r.cpu;
        g.swap_mb += r.swap_mb;
        g.io_read_mb += r.io_read_mb;
        g.io_write_mb += r.io_write_mb;
        g.net_sent_mb += r.net_sent_mb;
        g.net_recv_mb += r.net_recv_mb;
    }
    groups
}

pub fn sort_groups(groups: &mut [GroupRecord], key: SortKey) {
    match key {
        SortKey::Count => groups.sort_by(|a, b| b.procs.cmp(&a.procs)),
        _ => groups.sort_by(|a, b| group_metric(b, key).total_cmp(&group_metric(a, key))),
    }
}

fn group_metric(g: &GroupRecord, key: SortKey) -> f64 {
    match key {
        SortKey::Mem => g.mem_pct,
        SortKey::Cpu => g.cpu,
        SortKey::Rss => g.rss_mb,
        SortKey::Swap => g.swap_mb,
        SortKey::Io => g.io_read_mb + g.io_write_mb,
        SortKey::Net => g.net_sent_mb,
        SortKey::Count => g.procs as f64,
    }
}

pub fn sort_rows(rows: &mut [ProcRecord], key: SortKey) {
    match key {
        //count has no per-process meaning, fall back to pid
        SortKey::Count => rows.sort_by(|a, b| b.pid.cmp(&a.pid)),
        _ => rows.sort_by(|a, b| row_metric(b, key).total_cmp(&row_metric(a, key))),
    }
}

pub fn row_metric(r: &ProcRecord, key: SortKey) -> f64 {
    match key {
        SortKey::Mem => r.mem_pct,
        SortKey::Cpu => r.cpu,
        SortKey::Swap => r.swap_mb,
        SortKey::Io => r.io_read_mb + r.io_write_mb,
        SortKey::Net => r.net_sent_mb,
        SortKey::Rss | SortKey::Count => r.rss_mb,
    }
}

#[cfg(test)]
pub fn test_row(pid: u32, ppid: u32, app: &str, rss_mb: f64) -> ProcRecord {
    ProcRecord {
        pid,
        ppid,
        name: app.to_string(),
        rss_mb,
        cpu: 0.0,
        mem_pct: 0.0,
        swap_mb: 0.0,
        cmdline: String::new(),
        app: app.to_string(),
        io_read_mb: 0.0,
        io_write_mb: 0.0,
        net_sent_mb: 0.0,
        net_recv_mb: 0.0,
        status: ProcStatus::Running,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_empty_is_empty() {
        assert!(aggregate(&[]).is_empty());
    }

    #[test]
    fn aggregate_sums_and_counts() {
        let rows = vec![
            test_row(1, 0, "foo", 100.0),
            test_row(2, 0, "foo", 50.0),
            test_row(3, 0, "bar", 200.0),
        ];
        let groups = aggregate(&rows);
        assert_eq!(groups.len(), 2);
        let total: usize = groups.iter().map(|g| g.procs).sum();
        assert_eq!(total, rows.len());
        let foo = groups.iter().find(|g| g.app == "foo").unwrap();
        assert_eq!(foo.procs, 2);
        assert!((foo.rss_mb - 150.0).abs() < 1e-9);
        let bar = groups.iter().find(|g| g.app == "bar").unwrap();
        assert_eq!(bar.procs, 1);
        assert!((bar.rss_mb - 200.0).abs() < 1e-9);
    }

    #[test]
    fn sort_by_rss_descending() {
        let rows = vec![
            test_row(1, 0, "foo", 100.0),
            test_row(2, 0, "foo", 50.0),
            test_row(3, 0, "bar", 200.0),
        ];
        let mut groups = aggregate(&rows);
        sort_groups(&mut groups, SortKey::Rss);
        assert_eq!(groups[0].app, "bar");
        assert_eq!(groups[1].app, "foo");
    }

    #[test]
    fn first_appearance_defines_order() {
        let rows = vec![
            test_row(1, 0, "b", 1.0),
            test_row(2, 0, "a", 9.0),
            test_row(3, 0, "b", 1.0),
        ];
        let groups = aggregate(&rows);
        assert_eq!(groups[0].app, "b");
        assert_eq!(groups[1].app, "a");
    }

    #[test]
    fn sort_key_cycle_wraps() {
        let mut k = SortKey::Mem;
        for _ in 0..SortKey::ALL.len() {
            k = k.next();
        }
        assert_eq!(k, SortKey::Mem);
    }

    #[test]
    fn sort_key_parse() {
        assert_eq!("swap".parse::<SortKey>().unwrap(), SortKey::Swap);
        assert!("bogus".parse::<SortKey>().is_err());
    }
}
