mod actions;
mod alerts;
mod cache;
mod classify;
mod config;
mod dropcaches;
mod helpers;
mod record;
mod sampler;
mod session;
mod swapclean;
mod tree;
mod tui;

use gumdrop::Options;

use crate::record::{aggregate, sort_groups, SortKey};
use crate::sampler::Sampler;
use crate::session::Session;

#[derive(Options)]
struct Args {
    #[options(help = "print help")]
    help: bool,

    #[options(help = "print one sample as a table and exit")]
    once: bool,

    #[options(help = "regex filter on app/name/cmdline, case-insensitive")]
    filter: Option<String>,

    #[options(help = "sort key: mem cpu rss swap io net count")]
    sort: Option<SortKey>,

    #[options(help = "rows printed with --once", default = "15")]
    top: usize,

    #[options(help = "seconds between samples, 1-10")]
    refresh: Option<f64>,

    #[options(help = "cheaper sampling for loaded hosts")]
    lite: bool,

    #[options(no_short, help = "cycle swap off/on to free swapped pages (root), then exit")]
    swap_clean: bool,

    #[options(no_short, help = "drop kernel caches (root), then exit")]
    drop_caches: bool,

    #[options(no_short, help = "helper: print the actions without executing them")]
    dry_run: bool,

    #[options(no_short, help = "helper: verbose output")]
    verbose: bool,

    #[options(no_short, help = "helper: RAM headroom to keep free, MiB", default = "512")]
    safety_mb: u64,

    #[options(no_short, help = "helper: drop_caches level 1-3", default = "3")]
    level: u8,
}

fn main() {
    env_logger::init();
    let args = Args::parse_args_default_or_exit();

    //helper modes run to completion and exit with their own codes; the
    //TUI spawns them through sudo and reads the code back
    if args.swap_clean {
        std::process::exit(run_swap_clean(&args));
    }
    if args.drop_caches {
        std::process::exit(run_drop_caches(&args));
    }

    if args.once {
        print_once(&args);
        return;
    }

    let config = config::Config::load();
    let sort = args.sort.unwrap_or(config.sort);
    let refresh = args.refresh.unwrap_or(config.refresh);
    let lite = args.lite || config.lite;

    let session = Session::new(args.filter.as_deref().unwrap_or(""), sort, refresh);
    let sampler = Sampler::new(lite);
    match tui::run(session, sampler) {
        Ok(session) => {
            //keep in-TUI sort/refresh tweaks for the next run
            config::Config {
                sort: session.sort_key,
                refresh: session.refresh_secs,
                lite,
            }
            .save();
        }
        Err(e) => {
            eprintln!("apptop: {e}");
            std::process::exit(1);
        }
    }
}

fn run_swap_clean(args: &Args) -> i32 {
    if !actions::is_root() && !args.dry_run {
        eprintln!("swap-clean must run as root (try sudo, or --dry-run)");
        return swapclean::EXIT_ERROR;
    }
    let opts = swapclean::Options {
        safety_mb: args.safety_mb,
        verbose: args.verbose,
        dry_run: args.dry_run,
    };
    match swapclean::run(&opts) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("swap-clean error: {e}");
            swapclean::EXIT_ERROR
        }
    }
}

fn run_drop_caches(args: &Args) -> i32 {
    if !actions::is_root() && !args.dry_run {
        eprintln!("drop-caches must run as root (try sudo, or --dry-run)");
        return 1;
    }
    match dropcaches::run(args.level, args.verbose, args.dry_run) {
        Ok(freed_mb) => {
            println!("freed {freed_mb} MB");
            0
        }
        Err(e) => {
            eprintln!("drop-caches error: {e}");
            1
        }
    }
}

//one sample to stdout, for scripts and quick looks without the TUI
fn print_once(args: &Args) {
    let filter = args.filter.as_deref().map(|text| {
        regex::RegexBuilder::new(text)
            .case_insensitive(true)
            .build()
            .unwrap_or_else(|e| {
                eprintln!("apptop: bad filter pattern: {e}");
                std::process::exit(1);
            })
    });

    let mut sampler = Sampler::new(args.lite);
    let rows = sampler.sample(filter.as_ref());
    let mut groups = aggregate(&rows);
    sort_groups(&mut groups, args.sort.unwrap_or(SortKey::Mem));

    println!(
        "{:<24} {:>5} {:>10} {:>10} {:>7} {:>7} {:>10} {:>10}",
        "APP", "PROCS", "RSS(MiB)", "SWAP(MiB)", "%MEM", "%CPU", "IO_R(MB)", "IO_W(MB)"
    );
    for g in groups.iter().take(args.top) {
        let app: String = g.app.chars().take(24).collect();
        println!(
            "{:<24} {:>5} {:>10.1} {:>10.1} {:>7.1} {:>7.1} {:>10.1} {:>10.1}",
            app, g.procs, g.rss_mb, g.swap_mb, g.mem_pct, g.cpu, g.io_read_mb, g.io_write_mb
        );
    }
}
