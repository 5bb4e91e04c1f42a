//! Host resource introspection

use std::path::Path;
use sysinfo::System;

/// Source of host-level resource facts
pub trait ResourceProbe: Send + Sync {
    /// Total memory in GB, one decimal
    fn memory_gb(&self) -> f64;

    fn cpu_cores(&self) -> usize;

    /// Whether GPU markers are present
    fn has_accelerator(&self) -> bool;
}

/// Reads the real host via sysinfo and the process environment
#[derive(Debug, Default, Clone, Copy)]
pub struct HostResources;

impl ResourceProbe for HostResources {
    fn memory_gb(&self) -> f64 {
        let mut sys = System::new();
        sys.refresh_memory();
        bytes_to_gb(sys.total_memory())
    }

    fn cpu_cores(&self) -> usize {
        num_cpus::get()
    }

    fn has_accelerator(&self) -> bool {
        accelerator_markers(|key| std::env::var(key).ok()) || Path::new("/dev/nvidia0").exists()
    }
}

/// Fixed values, for hosts where introspection should be bypassed
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StaticResources {
    pub memory_gb: f64,
    pub cpu_cores: usize,
    pub has_accelerator: bool,
}

impl ResourceProbe for StaticResources {
    fn memory_gb(&self) -> f64 {
        self.memory_gb
    }

    fn cpu_cores(&self) -> usize {
        self.cpu_cores
    }

    fn has_accelerator(&self) -> bool {
        self.has_accelerator
    }
}

/// GPU hints from environment variables
pub fn accelerator_markers<F>(lookup: F) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |key: &str| lookup(key).map(|v| !v.trim().is_empty()).unwrap_or(false);

    non_empty("CUDA_VISIBLE_DEVICES")
        || non_empty("NVIDIA_VISIBLE_DEVICES")
        || lookup("GPU_ENABLED").map(|v| v == "true").unwrap_or(false)
}

fn bytes_to_gb(bytes: u64) -> f64 {
    let gb = bytes as f64 / (1024.0 * 1024.0 * 1024.0);
    (gb * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_bytes_to_gb_rounding() {
        assert_eq!(bytes_to_gb(0), 0.0);
        assert_eq!(bytes_to_gb(16 * 1024 * 1024 * 1024), 16.0);
        assert_eq!(bytes_to_gb(1610612736), 1.5);
    }

    #[test]
    fn test_accelerator_markers() {
        let vars: HashMap<&str, &str> = [("CUDA_VISIBLE_DEVICES", "0")].into_iter().collect();
        assert!(accelerator_markers(|k| vars.get(k).map(|v| v.to_string())));

        let vars: HashMap<&str, &str> = [("GPU_ENABLED", "false")].into_iter().collect();
        assert!(!accelerator_markers(|k| vars.get(k).map(|v| v.to_string())));

        let vars: HashMap<&str, &str> = [("NVIDIA_VISIBLE_DEVICES", " ")].into_iter().collect();
        assert!(!accelerator_markers(|k| vars.get(k).map(|v| v.to_string())));
    }

    #[test]
    fn test_host_resources_reports_cores() {
        assert!(HostResources.cpu_cores() >= 1);
    }
}
