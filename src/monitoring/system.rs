use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use sysinfo::{Pid, System};
use tracing::{debug, warn};

/// Real-time window over which process CPU time is measured.
///
/// The window elapses inside every collection, so a collection never takes
/// less than this long.
pub const CPU_SAMPLE_WINDOW: Duration = Duration::from_millis(100);

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Samples resource usage of the current process
#[derive(Debug)]
pub struct SystemSampler {
    system: Mutex<System>,
    pid: Option<Pid>,
    start_time: Instant,
}

impl Default for SystemSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemSampler {
    pub fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                warn!("Cannot resolve current pid, memory usage will read as 0: {}", e);
                None
            }
        };

        Self {
            system: Mutex::new(System::new()),
            pid,
            start_time: Instant::now(),
        }
    }

    pub fn uptime_seconds(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }

    /// Resident memory of this process in MB, 0 if the host cannot report it
    pub fn memory_usage_mb(&self) -> f64 {
        let Some(pid) = self.pid else {
            return 0.0;
        };

        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        if !system.refresh_process(pid) {
            debug!("Process {} not visible to sysinfo", pid);
            return 0.0;
        }

        system
            .process(pid)
            .map(|process| process.memory() as f64 / BYTES_PER_MB)
            .unwrap_or(0.0)
    }

    /// Measure CPU utilization of this process over [`CPU_SAMPLE_WINDOW`].
    ///
    /// Returns 0 when process CPU time is unavailable on this host. The
    /// window elapses either way.
    pub async fn cpu_usage_percent(&self) -> f64 {
        let cpu_before = process_cpu_time();
        let wall_start = Instant::now();

        tokio::time::sleep(CPU_SAMPLE_WINDOW).await;

        let (Some(cpu_before), Some(cpu_after)) = (cpu_before, process_cpu_time()) else {
            return 0.0;
        };
        let wall = wall_start.elapsed().as_secs_f64();

        cpu_percent(cpu_after.saturating_sub(cpu_before), wall)
    }
}

fn cpu_percent(cpu_delta: Duration, wall_seconds: f64) -> f64 {
    if wall_seconds <= 0.0 {
        return 0.0;
    }
    100.0 * cpu_delta.as_secs_f64() / wall_seconds
}

/// User plus system CPU time consumed by this process so far
#[cfg(unix)]
fn process_cpu_time() -> Option<Duration> {
    use nix::sys::resource::{getrusage, UsageWho};
    use nix::sys::time::TimeVal;

    fn to_duration(tv: TimeVal) -> Duration {
        Duration::from_secs(tv.tv_sec().max(0) as u64)
            + Duration::from_micros(tv.tv_usec().max(0) as u64)
    }

    match getrusage(UsageWho::RUSAGE_SELF) {
        Ok(usage) => Some(to_duration(usage.user_time()) + to_duration(usage.system_time())),
        Err(e) => {
            debug!("getrusage failed: {}", e);
            None
        }
    }
}

#[cfg(not(unix))]
fn process_cpu_time() -> Option<Duration> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_cpu_percent_from_deltas() {
        assert_relative_eq!(cpu_percent(Duration::from_millis(50), 0.1), 50.0);
        assert_relative_eq!(cpu_percent(Duration::from_millis(200), 0.1), 200.0);
        assert_eq!(cpu_percent(Duration::from_millis(50), 0.0), 0.0);
    }

    #[tokio::test]
    async fn test_cpu_sample_takes_the_full_window() {
        let sampler = SystemSampler::new();
        let start = Instant::now();
        let cpu = sampler.cpu_usage_percent().await;

        assert!(cpu >= 0.0);
        assert!(start.elapsed() >= CPU_SAMPLE_WINDOW);
    }

    #[test]
    fn test_memory_and_uptime_are_non_negative() {
        let sampler = SystemSampler::new();
        assert!(sampler.memory_usage_mb() >= 0.0);
        assert!(sampler.uptime_seconds() >= 0.0);
    }
}
