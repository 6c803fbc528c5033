use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Memory pressure as seen by the resource governor.
///
/// - `Normal`: full worker dedup capacity, full chunk/batch sizes.
/// - `Throttled`: halve the worker dedup cap and chunk/batch sizes.
/// - `Critical`: drop worker-side dedup entirely and briefly pause dispatch
///   so the store writer can drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pressure {
    Normal,
    Throttled,
    Critical,
}

/// Polls system free memory and classifies it against two thresholds.
/// Samples are cached for one second, so callers can consult the monitor on
/// every chunk without hammering `/proc`.
pub struct MemoryMonitor {
    warn_bytes: u64,
    crit_bytes: u64,
    cache: Mutex<Option<(Instant, Pressure)>>,
}

impl MemoryMonitor {
    pub fn new(warn_gb: f64, crit_gb: f64) -> Self {
        let gib = |g: f64| (g.max(0.0) * 1024.0 * 1024.0 * 1024.0) as u64;
        Self {
            warn_bytes: gib(warn_gb),
            crit_bytes: gib(crit_gb),
            cache: Mutex::new(None),
        }
    }

    pub fn pressure(&self) -> Pressure {
        let mut cache = self.cache.lock().unwrap();
        if let Some((sampled_at, pressure)) = *cache {
            if sampled_at.elapsed() < Duration::from_secs(1) {
                return pressure;
            }
        }
        let pressure = match available_memory_bytes() {
            Some(avail) if avail <= self.crit_bytes => Pressure::Critical,
            Some(avail) if avail <= self.warn_bytes => Pressure::Throttled,
            // Unknown platforms report Normal rather than guessing.
            _ => Pressure::Normal,
        };
        *cache = Some((Instant::now(), pressure));
        pressure
    }

    /// Scale a chunk/batch size for the current pressure state.
    pub fn scaled(&self, base: usize) -> usize {
        match self.pressure() {
            Pressure::Normal => base.max(1),
            Pressure::Throttled | Pressure::Critical => (base / 2).max(1),
        }
    }
}

fn available_memory_bytes() -> Option<u64> {
    if cfg!(target_os = "linux") {
        let text = std::fs::read_to_string("/proc/meminfo").ok()?;
        parse_meminfo(&text)
    } else {
        None
    }
}

/// Extract `MemAvailable` (kB) from /proc/meminfo text.
fn parse_meminfo(text: &str) -> Option<u64> {
    for line in text.lines() {
        if let Some(rest) = line.strip_prefix("MemAvailable:") {
            let kb: u64 = rest.trim().trim_end_matches("kB").trim().parse().ok()?;
            return Some(kb * 1024);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mem_available() {
        let text = "MemTotal:       16266216 kB\nMemFree:         1065148 kB\nMemAvailable:    8230424 kB\n";
        assert_eq!(parse_meminfo(text), Some(8_230_424 * 1024));
    }

    #[test]
    fn missing_field_yields_none() {
        assert_eq!(parse_meminfo("MemTotal: 1 kB\n"), None);
    }

    #[test]
    fn scaled_never_returns_zero() {
        let monitor = MemoryMonitor::new(4.0, 2.0);
        assert!(monitor.scaled(1) >= 1);
        assert!(monitor.scaled(100_000) >= 1);
    }
}
