const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

pub fn gib(bytes: u64) -> f64 {
    bytes as f64 / GIB
}

///fixed-width usage bar, clamped to 0..100
pub fn make_bar(pct: f64, width: usize) -> String {
    let pct = pct.clamp(0.0, 100.0);
    let filled = (pct / 100.0 * width as f64).round() as usize;
    let filled = filled.min(width);
    let mut bar = "█".repeat(filled);
    bar.push_str(&"░".repeat(width - filled));
    bar
}
