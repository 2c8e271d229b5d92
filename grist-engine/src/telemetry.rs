//! Resource telemetry sampler
//!
//! Samples CPU and memory on a dedicated thread at a fixed interval for the
//! lifetime of a stage execution, and hands the series back when stopped.
//! Sampling is best-effort: a failed read is logged and skipped, it never
//! fails the owning process.
//!
//! Two CPU measurement strategies, selected by configuration:
//! - `Process`: utime+stime deltas from `/proc/self/stat` over wall time.
//! - `Cgroup`: `usage_usec` deltas from the cgroup `cpu.stat` file,
//!   normalized by the CPU count. Falls back to process measurement when
//!   the cgroup file is unreadable.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use grist_core::domain::metric::MetricSample;
use tracing::warn;

/// Linux default clock tick rate; `/proc/self/stat` times are in ticks.
const CLK_TCK: f64 = 100.0;

/// CPU measurement strategy
#[derive(Debug, Clone)]
pub enum CpuMode {
    Process,
    Cgroup { stat_path: PathBuf },
}

/// Sampler configuration
#[derive(Debug, Clone)]
pub struct SamplerConfig {
    pub interval: Duration,
    pub cpu_mode: CpuMode,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(25),
            cpu_mode: CpuMode::Process,
        }
    }
}

/// A running sampler attached to one stage execution
pub struct ResourceSampler {
    stop: Arc<AtomicBool>,
    handle: std::thread::JoinHandle<Vec<MetricSample>>,
}

impl ResourceSampler {
    /// Start sampling on a monitor thread. The first sample is taken
    /// immediately; its CPU reading is 0 since percent needs a delta.
    pub fn start(config: SamplerConfig) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);

        let handle = std::thread::spawn(move || {
            let mut samples = Vec::new();
            let mut tracker = CpuTracker::new(config.cpu_mode);

            while !stop_flag.load(Ordering::Relaxed) {
                match take_sample(&mut tracker) {
                    Some(sample) => samples.push(sample),
                    None => warn!("Resource sample skipped: /proc read failed"),
                }
                std::thread::sleep(config.interval);
            }

            samples
        });

        Self { stop, handle }
    }

    /// Stop sampling and collect the series.
    pub fn stop(self) -> Vec<MetricSample> {
        self.stop.store(true, Ordering::Relaxed);
        match self.handle.join() {
            Ok(samples) => samples,
            Err(_) => {
                warn!("Resource sampler thread panicked; dropping its samples");
                Vec::new()
            }
        }
    }
}

fn take_sample(tracker: &mut CpuTracker) -> Option<MetricSample> {
    let memory = read_memory_mb()?;
    let cpu = tracker.sample();
    Some(MetricSample {
        timestamp: Utc::now(),
        cpu,
        memory,
    })
}

/// Tracks cumulative CPU seconds between samples to derive a percentage.
struct CpuTracker {
    mode: CpuMode,
    num_cpus: f64,
    last: Option<(Instant, f64)>,
}

impl CpuTracker {
    fn new(mode: CpuMode) -> Self {
        let num_cpus = std::thread::available_parallelism()
            .map(|n| n.get() as f64)
            .unwrap_or(1.0);
        Self {
            mode,
            num_cpus,
            last: None,
        }
    }

    fn sample(&mut self) -> f64 {
        let now = Instant::now();
        let (cumulative, normalize) = match self.cumulative_cpu_seconds() {
            Some(v) => v,
            None => return 0.0,
        };

        let percent = match self.last {
            Some((then, before)) => {
                let wall = now.duration_since(then).as_secs_f64();
                if wall > 0.0 {
                    (cumulative - before) / wall * 100.0 / normalize
                } else {
                    0.0
                }
            }
            None => 0.0,
        };
        self.last = Some((now, cumulative));
        percent.max(0.0)
    }

    fn cumulative_cpu_seconds(&self) -> Option<(f64, f64)> {
        match &self.mode {
            CpuMode::Process => {
                let content = std::fs::read_to_string("/proc/self/stat").ok()?;
                Some((parse_stat_cpu_seconds(&content)?, 1.0))
            }
            CpuMode::Cgroup { stat_path } => match std::fs::read_to_string(stat_path) {
                Ok(content) => {
                    let usec = parse_cgroup_usage_usec(&content)?;
                    Some((usec as f64 / 1_000_000.0, self.num_cpus))
                }
                Err(e) => {
                    warn!(
                        "Cgroup cpu.stat unreadable, falling back to process CPU: {}",
                        e
                    );
                    let content = std::fs::read_to_string("/proc/self/stat").ok()?;
                    Some((parse_stat_cpu_seconds(&content)?, 1.0))
                }
            },
        }
    }
}

/// utime + stime from `/proc/self/stat`, in seconds.
fn parse_stat_cpu_seconds(content: &str) -> Option<f64> {
    // comm (field 2) is parenthesized and may contain spaces; fields
    // resume after the closing paren, starting with state (field 3).
    let rest = &content[content.rfind(')')? + 1..];
    let fields: Vec<&str> = rest.split_whitespace().collect();
    let utime: u64 = fields.get(11)?.parse().ok()?;
    let stime: u64 = fields.get(12)?.parse().ok()?;
    Some((utime + stime) as f64 / CLK_TCK)
}

/// `usage_usec` from a cgroup v2 `cpu.stat` file.
fn parse_cgroup_usage_usec(content: &str) -> Option<u64> {
    for line in content.lines() {
        if let Some(value) = line.strip_prefix("usage_usec") {
            return value.trim().parse().ok();
        }
    }
    None
}

/// Resident set size from `/proc/self/status`, in MB.
fn read_memory_mb() -> Option<f64> {
    let content = std::fs::read_to_string("/proc/self/status").ok()?;
    parse_vmrss_mb(&content)
}

fn parse_vmrss_mb(content: &str) -> Option<f64> {
    for line in content.lines() {
        if let Some(rest) = line.strip_prefix("VmRSS:") {
            let kb: f64 = rest.trim().trim_end_matches("kB").trim().parse().ok()?;
            return Some(kb / 1024.0);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stat_handles_spaces_in_comm() {
        let stat = "1234 (tokio worker 1) S 1 1234 1234 0 -1 4194304 100 0 0 0 250 150 0 0 20 0 8 0 12345 1000000 500 18446744073709551615";
        assert_eq!(parse_stat_cpu_seconds(stat), Some(4.0));
    }

    #[test]
    fn test_parse_cgroup_usage() {
        let stat = "usage_usec 2500000\nuser_usec 2000000\nsystem_usec 500000\n";
        assert_eq!(parse_cgroup_usage_usec(stat), Some(2_500_000));
        assert_eq!(parse_cgroup_usage_usec("nr_periods 5\n"), None);
    }

    #[test]
    fn test_parse_vmrss() {
        let status = "Name:\tgrist\nVmPeak:\t  204800 kB\nVmRSS:\t  102400 kB\n";
        assert_eq!(parse_vmrss_mb(status), Some(100.0));
        assert_eq!(parse_vmrss_mb("Name:\tgrist\n"), None);
    }

    #[test]
    fn test_sampler_collects_and_stops() {
        let sampler = ResourceSampler::start(SamplerConfig {
            interval: Duration::from_millis(5),
            cpu_mode: CpuMode::Process,
        });
        std::thread::sleep(Duration::from_millis(30));
        let samples = sampler.stop();

        assert!(!samples.is_empty());
        for pair in samples.windows(2) {
            assert!(pair[0].timestamp <= pair[1].timestamp);
        }
    }
}
