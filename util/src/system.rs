//! Samples host-level counters used to advertise local load

use sysinfo::System;

/// The host name reported when the platform refuses to provide one
const UNKNOWN_HOST: &str = "unknown-host";

/// Returns the local machine's host name
pub fn host_name() -> String {
    gethostname::gethostname().into_string().unwrap_or_else(|_| UNKNOWN_HOST.to_string())
}

/// Samples cpu and memory utilization from the host
///
/// Refreshing cpu usage requires two observations spaced apart; the sampler
/// keeps its `System` alive between calls so successive samples are cheap and
/// meaningful
pub struct HostSampler {
    /// The underlying sysinfo handle, refreshed in place on each sample
    system: System,
}

impl Default for HostSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl HostSampler {
    /// Constructor
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_usage();
        system.refresh_memory();

        Self { system }
    }

    /// Sample the host's cpu load, normalized to [0, 1]
    pub fn cpu_load(&mut self) -> f32 {
        self.system.refresh_cpu_usage();
        let cpus = self.system.cpus();
        if cpus.is_empty() {
            return 0.;
        }

        let total: f32 = cpus.iter().map(|cpu| cpu.cpu_usage()).sum();
        (total / (cpus.len() as f32) / 100.).clamp(0., 1.)
    }

    /// Sample the host's memory utilization, normalized to [0, 1]
    pub fn memory_usage(&mut self) -> f32 {
        self.system.refresh_memory();
        let total = self.system.total_memory();
        if total == 0 {
            return 0.;
        }

        (self.system.used_memory() as f32 / total as f32).clamp(0., 1.)
    }
}
