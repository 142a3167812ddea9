//! Cache-drop helper: sync, then write the drop level to
//! /proc/sys/vm/drop_caches and report how much MemAvailable grew.
//! Runs as its own (root) process, invoked by the TUI.

use std::process::Command;

use anyhow::{bail, Context, Result};

use crate::swapclean::read_meminfo;

const DROP_CACHES_PATH: &str = "/proc/sys/vm/drop_caches";

/// Levels: 1 page cache, 2 dentries+inodes, 3 both.
pub fn run(level: u8, verbose: bool, dry_run: bool) -> Result<u64> {
    if !(1..=3).contains(&level) {
        bail!("invalid drop level {level} (expected 1..3)");
    }

    let before = mem_available_kb()?;
    if verbose {
        println!("MemAvailable before: {before} kB");
    }

    if dry_run {
        println!("[dry-run] sync");
        println!("[dry-run] echo {level} > {DROP_CACHES_PATH}");
        return Ok(0);
    }

    let status = Command::new("sync").status().context("running sync")?;
    if !status.success() {
        bail!("sync failed");
    }
    std::fs::write(DROP_CACHES_PATH, level.to_string())
        .with_context(|| format!("writing {DROP_CACHES_PATH}"))?;

    let after = mem_available_kb()?;
    let freed_mb = after.saturating_sub(before) / 1024;
    if verbose {
        println!("MemAvailable after:  {after} kB");
    }
    Ok(freed_mb)
}

fn mem_available_kb() -> Result<u64> {
    read_meminfo("/proc/meminfo")
        .context("reading meminfo")?
        .get("MemAvailable")
        .copied()
        .context("MemAvailable not found in meminfo")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_level() {
        assert!(run(0, false, true).is_err());
        assert!(run(4, false, true).is_err());
    }
}
