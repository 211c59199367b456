// File: presencebot-core/src/samplers/system.rs

use parking_lot::{Mutex, RwLock};
use sysinfo::System;
use tracing::trace;

/// Host load figures exposed to templates.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemSnapshot {
    pub cpu_name: String,
    pub cpu_cores: usize,
    /// GHz with one decimal, e.g. "3.6".
    pub cpu_speed: String,
    pub cpu_usage: u32,
    pub ram_usage: u32,
}

impl Default for SystemSnapshot {
    fn default() -> Self {
        Self {
            cpu_name: "CPU".to_string(),
            cpu_cores: 1,
            cpu_speed: "0.0".to_string(),
            cpu_usage: 0,
            ram_usage: 0,
        }
    }
}

/// Process-wide sampler. CPU usage is the delta between two consecutive
/// `refresh` calls, so the first reading is usually 0.
pub struct SystemSampler {
    system: Mutex<System>,
    latest: RwLock<SystemSnapshot>,
}

impl SystemSampler {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_all();
        system.refresh_memory();
        let snapshot = snapshot_of(&system);
        Self {
            system: Mutex::new(system),
            latest: RwLock::new(snapshot),
        }
    }

    pub fn refresh(&self) {
        let snapshot = {
            let mut system = self.system.lock();
            system.refresh_cpu_all();
            system.refresh_memory();
            snapshot_of(&system)
        };
        trace!(
            "(SystemSampler) cpu={}%, ram={}%",
            snapshot.cpu_usage,
            snapshot.ram_usage
        );
        *self.latest.write() = snapshot;
    }

    pub fn latest(&self) -> SystemSnapshot {
        self.latest.read().clone()
    }
}

impl Default for SystemSampler {
    fn default() -> Self {
        Self::new()
    }
}

fn snapshot_of(system: &System) -> SystemSnapshot {
    let cpus = system.cpus();
    let defaults = SystemSnapshot::default();

    let cpu_name = cpus
        .first()
        .map(|c| c.brand().trim().to_string())
        .filter(|b| !b.is_empty())
        .unwrap_or(defaults.cpu_name);
    let cpu_speed = cpus
        .first()
        .map(|c| format!("{:.1}", c.frequency() as f64 / 1000.0))
        .unwrap_or(defaults.cpu_speed);

    let total = system.total_memory();
    let ram_usage = if total == 0 {
        0
    } else {
        (system.used_memory() as f64 / total as f64 * 100.0).floor() as u32
    };

    SystemSnapshot {
        cpu_name,
        cpu_cores: cpus.len().max(1),
        cpu_speed,
        cpu_usage: system.global_cpu_usage().clamp(0.0, 100.0).floor() as u32,
        ram_usage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readings_stay_in_range() {
        let sampler = SystemSampler::new();
        sampler.refresh();
        let snap = sampler.latest();
        assert!(snap.cpu_cores >= 1);
        assert!(snap.cpu_usage <= 100);
        assert!(snap.ram_usage <= 100);
        assert!(snap.cpu_speed.contains('.'));
    }
}
