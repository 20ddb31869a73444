use sysinfo::System;
use thiserror::Error;

const MIB: u64 = 1024 * 1024;

/// Limits applied before a run is allowed to start.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceThresholds {
    /// A run refuses to start with less free memory than this.
    pub min_available_memory_bytes: u64,
    pub memory_warn_percent: f32,
    pub cpu_warn_percent: f32,
}

impl Default for ResourceThresholds {
    fn default() -> Self {
        Self {
            min_available_memory_bytes: 500 * MIB,
            memory_warn_percent: 90.0,
            cpu_warn_percent: 80.0,
        }
    }
}

/// Point-in-time view of host memory and CPU pressure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceSnapshot {
    pub total_memory_bytes: u64,
    pub available_memory_bytes: u64,
    pub cpu_percent: f32,
}

impl ResourceSnapshot {
    pub fn memory_used_percent(&self) -> f32 {
        if self.total_memory_bytes == 0 {
            return 0.0;
        }
        let used = self.total_memory_bytes.saturating_sub(self.available_memory_bytes);
        (used as f64 / self.total_memory_bytes as f64 * 100.0) as f32
    }

    pub fn available_memory_mb(&self) -> u64 {
        self.available_memory_bytes / MIB
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ResourceError {
    #[error("insufficient memory: {available_mb} MB available, {required_mb} MB required")]
    InsufficientMemory { available_mb: u64, required_mb: u64 },
}

/// Pre-run gate over host resources.
///
/// `check` is the hard gate; `usage_warnings` only reports pressure and
/// never blocks a run.
#[derive(Debug, Clone, Default)]
pub struct ResourceGuard {
    thresholds: ResourceThresholds,
}

impl ResourceGuard {
    pub fn new(thresholds: ResourceThresholds) -> Self {
        Self { thresholds }
    }

    pub fn check(&self, snapshot: &ResourceSnapshot) -> Result<(), ResourceError> {
        if snapshot.available_memory_bytes < self.thresholds.min_available_memory_bytes {
            return Err(ResourceError::InsufficientMemory {
                available_mb: snapshot.available_memory_mb(),
                required_mb: self.thresholds.min_available_memory_bytes / MIB,
            });
        }
        Ok(())
    }

    pub fn usage_warnings(&self, snapshot: &ResourceSnapshot) -> Vec<String> {
        let mut warnings = Vec::new();

        let memory_percent = snapshot.memory_used_percent();
        if memory_percent > self.thresholds.memory_warn_percent {
            warnings.push(format!("memory usage high: {memory_percent:.1}%"));
        }
        if snapshot.cpu_percent > self.thresholds.cpu_warn_percent {
            warnings.push(format!("cpu usage high: {:.1}%", snapshot.cpu_percent));
        }

        warnings
    }
}

/// Sample the host. CPU usage needs two refreshes a short interval apart to
/// produce a meaningful delta.
pub fn sample_host() -> ResourceSnapshot {
    let mut sys = System::new();
    sys.refresh_memory();
    sys.refresh_cpu();
    std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
    sys.refresh_cpu();

    ResourceSnapshot {
        total_memory_bytes: sys.total_memory(),
        available_memory_bytes: sys.available_memory(),
        cpu_percent: sys.global_cpu_info().cpu_usage(),
    }
}
