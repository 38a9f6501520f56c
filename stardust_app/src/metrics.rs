//! Per-core CPU load sampling.
//!
//! Reads `/proc/stat` and reports load as the busy share of each core's
//! time delta since the previous sample. The first sample after startup has
//! no delta to compare against and reports zeros; platforms without
//! `/proc/stat` report no cores at all and the graphs stay flat.

use stardust_engine::CpuLoadSource;

/// Busy/total jiffy counters for one core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CpuTimes {
    busy: u64,
    total: u64,
}

/// Parse the per-core `cpuN` lines of a `/proc/stat` dump.
///
/// Fields are user, nice, system, idle, iowait, irq, softirq, steal;
/// idle and iowait count as not busy. Truncated lines are skipped.
fn parse_proc_stat(text: &str) -> Vec<CpuTimes> {
    let mut cores = Vec::new();
    for line in text.lines() {
        let mut fields = line.split_whitespace();
        let Some(label) = fields.next() else { continue };
        if !label.starts_with("cpu") || label == "cpu" {
            continue;
        }
        let values: Vec<u64> = fields.filter_map(|f| f.parse().ok()).collect();
        if values.len() < 4 {
            continue;
        }
        let idle = values[3] + values.get(4).copied().unwrap_or(0);
        let total: u64 = values.iter().take(8).sum();
        cores.push(CpuTimes {
            busy: total - idle,
            total,
        });
    }
    cores
}

/// [`CpuLoadSource`] backed by `/proc/stat` deltas.
#[derive(Debug, Default)]
pub struct ProcStatSampler {
    prev: Vec<CpuTimes>,
}

impl ProcStatSampler {
    pub fn new() -> Self {
        Self::default()
    }

    fn loads_from(&mut self, current: Vec<CpuTimes>) -> Vec<f32> {
        let loads = current
            .iter()
            .enumerate()
            .map(|(i, now)| match self.prev.get(i) {
                Some(prev) if now.total > prev.total => {
                    let busy = now.busy.saturating_sub(prev.busy) as f32;
                    let total = (now.total - prev.total) as f32;
                    (100.0 * busy / total).clamp(0.0, 100.0)
                }
                _ => 0.0,
            })
            .collect();
        self.prev = current;
        loads
    }
}

impl CpuLoadSource for ProcStatSampler {
    fn sample(&mut self) -> Vec<f32> {
        match std::fs::read_to_string("/proc/stat") {
            Ok(text) => self.loads_from(parse_proc_stat(&text)),
            Err(_) => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SNAPSHOT_A: &str = "\
cpu  100 0 100 800 0 0 0 0 0 0
cpu0 50 0 50 400 0 0 0 0 0 0
cpu1 50 0 50 400 0 0 0 0 0 0
intr 12345
ctxt 67890
";

    const SNAPSHOT_B: &str = "\
cpu  200 0 200 1600 0 0 0 0 0 0
cpu0 150 0 150 400 0 0 0 0 0 0
cpu1 50 0 50 1200 0 0 0 0 0 0
";

    #[test]
    fn parses_only_per_core_lines() {
        let cores = parse_proc_stat(SNAPSHOT_A);
        assert_eq!(cores.len(), 2);
        assert_eq!(cores[0], CpuTimes { busy: 100, total: 500 });
    }

    #[test]
    fn load_is_busy_share_of_the_delta() {
        let mut sampler = ProcStatSampler::new();
        // No previous sample yet: all zeros.
        let first = sampler.loads_from(parse_proc_stat(SNAPSHOT_A));
        assert_eq!(first, vec![0.0, 0.0]);

        // cpu0 spent its whole delta busy, cpu1 was fully idle.
        let second = sampler.loads_from(parse_proc_stat(SNAPSHOT_B));
        assert_eq!(second, vec![100.0, 0.0]);
    }

    #[test]
    fn counter_stalls_report_zero() {
        let mut sampler = ProcStatSampler::new();
        sampler.loads_from(parse_proc_stat(SNAPSHOT_A));
        let repeat = sampler.loads_from(parse_proc_stat(SNAPSHOT_A));
        assert_eq!(repeat, vec![0.0, 0.0]);
    }

    #[test]
    fn truncated_lines_are_skipped() {
        let cores = parse_proc_stat("cpu0 1 2\ncpu1 10 0 10 80 0 0 0 0\n");
        assert_eq!(cores.len(), 1);
        assert_eq!(cores[0].total, 100);
    }
}
