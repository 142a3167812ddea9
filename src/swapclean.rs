//! Swap-cycle helper: frees swapped-out pages by cycling swapoff/swapon,
//! but only when enough RAM is available to absorb the used swap plus a
//! safety buffer. Runs as its own (root) process, invoked by the TUI.

use std::collections::HashMap;
use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result};

pub const DEFAULT_SAFETY_MB: u64 = 512;

//exit codes, surfaced to the invoking TUI
pub const EXIT_OK: i32 = 0;
pub const EXIT_ERROR: i32 = 1;
pub const EXIT_NOTHING_CLEANED: i32 = 2;
pub const EXIT_SOLE_ENTRY_TOO_BIG: i32 = 3;

/// Parses a /proc/meminfo-style file into field -> kB values.
pub fn read_meminfo<P: AsRef<Path>>(path: P) -> std::io::Result<HashMap<String, u64>> {
    let text = std::fs::read_to_string(path)?;
    let mut out = HashMap::new();
    for line in text.lines() {
        let mut parts = line.split_whitespace();
        if let (Some(key), Some(val)) = (parts.next(), parts.next()) {
            if let Ok(kb) = val.parse::<u64>() {
                out.insert(key.trim_end_matches(':').to_string(), kb);
            }
        }
    }
    Ok(out)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SwapEntry {
    pub filename: String,
    pub kind: String,
    pub size_kb: u64,
    pub used_kb: u64,
    pub priority: i64,
}

/// Parses /proc/swaps (header line skipped).
pub fn read_swaps<P: AsRef<Path>>(path: P) -> std::io::Result<Vec<SwapEntry>> {
    let text = std::fs::read_to_string(path)?;
    let mut entries = Vec::new();
    for line in text.lines().skip(1) {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 5 {
            continue;
        }
        let (Ok(size_kb), Ok(used_kb), Ok(priority)) =
            (parts[2].parse(), parts[3].parse(), parts[4].parse())
        else {
            continue;
        };
        entries.push(SwapEntry {
            filename: parts[0].to_string(),
            kind: parts[1].to_string(),
            size_kb,
            used_kb,
            priority,
        });
    }
    Ok(entries)
}

#[derive(Debug, PartialEq, Eq)]
pub enum SwapPlan {
    /// No swap configured, nothing to do.
    NoSwap,
    /// Swap configured but unused, nothing to do.
    NotInUse,
    /// Enough RAM to absorb all used swap plus the safety buffer.
    AllAtOnce,
    /// Not enough RAM for everything at once; go entry by entry.
    FileByFile,
}

/// The all-swap decision: proceed in one shot only when MemAvailable
/// covers the used swap plus the safety buffer.
pub fn plan(mem_available_kb: u64, swap_total_kb: u64, swap_free_kb: u64, safety_kb: u64) -> SwapPlan {
    if swap_total_kb == 0 {
        return SwapPlan::NoSwap;
    }
    let swap_used_kb = swap_total_kb.saturating_sub(swap_free_kb);
    if swap_used_kb == 0 {
        return SwapPlan::NotInUse;
    }
    if mem_available_kb >= swap_used_kb + safety_kb {
        SwapPlan::AllAtOnce
    } else {
        SwapPlan::FileByFile
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum EntryFit {
    /// RAM covers used swap plus safety.
    Proceed,
    /// RAM covers used swap but not the safety buffer.
    ProceedWithoutSafety,
    /// Entry does not fit in RAM at all.
    Skip,
}

pub fn entry_fits(mem_available_kb: u64, used_kb: u64, safety_kb: u64) -> EntryFit {
    if mem_available_kb >= used_kb + safety_kb {
        EntryFit::Proceed
    } else if mem_available_kb >= used_kb {
        EntryFit::ProceedWithoutSafety
    } else {
        EntryFit::Skip
    }
}

pub struct Options {
    pub safety_mb: u64,
    pub verbose: bool,
    pub dry_run: bool,
}

/// Runs the clean against the live system. Returns the process exit
/// code (0 done, 1 error, 2 nothing cleaned, 3 sole entry too big).
pub fn run(opts: &Options) -> Result<i32> {
    run_at(opts, "/proc/meminfo", "/proc/swaps")
}

fn run_at(opts: &Options, meminfo_path: &str, swaps_path: &str) -> Result<i32> {
    let safety_kb = opts.safety_mb * 1024;
    let meminfo = read_meminfo(meminfo_path).context("reading meminfo")?;
    let Some(&mem_available_kb) = meminfo.get("MemAvailable") else {
        eprintln!("error: failed to read MemAvailable from meminfo");
        return Ok(EXIT_ERROR);
    };
    let swap_total_kb = meminfo.get("SwapTotal").copied().unwrap_or(0);
    let swap_free_kb = meminfo.get("SwapFree").copied().unwrap_or(0);
    let swap_used_kb = swap_total_kb.saturating_sub(swap_free_kb);

    if opts.verbose {
        println!("MemAvailable: {mem_available_kb} kB");
        println!("SwapTotal:    {swap_total_kb} kB");
        println!("SwapFree:     {swap_free_kb} kB");
        println!("SwapUsed:     {swap_used_kb} kB");
        println!("Safety:       {safety_kb} kB");
    }

    match plan(mem_available_kb, swap_total_kb, swap_free_kb, safety_kb) {
        SwapPlan::NoSwap => {
            println!("No swap configured. Nothing to do.");
            Ok(EXIT_OK)
        }
        SwapPlan::NotInUse => {
            println!("Swap is not in use. Nothing to do.");
            Ok(EXIT_OK)
        }
        SwapPlan::AllAtOnce => {
            if !cycle(&["swapoff", "-a"], &["swapon", "-a"], opts) {
                return Ok(EXIT_ERROR);
            }
            println!("Swap clean completed.");
            Ok(EXIT_OK)
        }
        SwapPlan::FileByFile => {
            eprintln!("Not enough RAM to clean all swap at once. Trying file-by-file...");
            file_by_file(opts, meminfo_path, swaps_path, safety_kb)
        }
    }
}

//smallest used entry first; meminfo re-read before each entry since the
//previous cycle changed it
fn file_by_file(opts: &Options, meminfo_path: &str, swaps_path: &str, safety_kb: u64) -> Result<i32> {
    let mut entries = read_swaps(swaps_path).context("reading swaps")?;
    if entries.is_empty() {
        eprintln!("No swap entries found.");
        return Ok(EXIT_NOTHING_CLEANED);
    }
    entries.sort_by_key(|e| e.used_kb);
    let total_entries = entries.len();
    let mut did_any = false;

    for entry in &entries {
        let current = read_swaps(swaps_path)?
            .into_iter()
            .find(|e| e.filename == entry.filename);
        let Some(current) = current else {
            continue; //no longer active
        };
        let mem_available_kb = read_meminfo(meminfo_path)?
            .get("MemAvailable")
            .copied()
            .unwrap_or(0);

        match entry_fits(mem_available_kb, current.used_kb, safety_kb) {
            EntryFit::Proceed => {}
            EntryFit::ProceedWithoutSafety => {
                eprintln!(
                    "Warning: safety buffer not met for {}; proceeding without safety.",
                    current.filename
                );
            }
            EntryFit::Skip => {
                if total_entries == 1 {
                    eprintln!(
                        "Not enough RAM to clean the only swap entry ({}).",
                        current.filename
                    );
                    eprintln!(
                        "Need {} kB, have {} kB.",
                        current.used_kb, mem_available_kb
                    );
                    return Ok(EXIT_SOLE_ENTRY_TOO_BIG);
                }
                eprintln!(
                    "Skipping {}: not enough RAM (need {} kB, have {} kB)",
                    current.filename, current.used_kb, mem_available_kb
                );
                continue;
            }
        }

        if !cycle(
            &["swapoff", &current.filename],
            &["swapon", &current.filename],
            opts,
        ) {
            eprintln!("Failed to cycle {}", current.filename);
            continue;
        }
        did_any = true;
    }

    if did_any {
        println!("Swap clean completed (file-by-file).");
        Ok(EXIT_OK)
    } else {
        eprintln!("No swap entries could be cleaned safely.");
        Ok(EXIT_NOTHING_CLEANED)
    }
}

fn cycle(off: &[&str], on: &[&str], opts: &Options) -> bool {
    run_cmd(off, opts) && run_cmd(on, opts)
}

fn run_cmd(cmd: &[&str], opts: &Options) -> bool {
    if opts.dry_run {
        println!("[dry-run] {}", cmd.join(" "));
        return true;
    }
    match Command::new(cmd[0]).args(&cmd[1..]).output() {
        Ok(out) if out.status.success() => true,
        Ok(out) => {
            eprintln!(
                "error running {}: {}",
                cmd[0],
                String::from_utf8_lossy(&out.stderr).trim()
            );
            false
        }
        Err(e) => {
            eprintln!("error running {}: {e}", cmd[0]);
            false
        }
    }
}
