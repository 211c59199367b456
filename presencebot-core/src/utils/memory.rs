// File: presencebot-core/src/utils/memory.rs

use parking_lot::Mutex;
use sysinfo::{ProcessesToUpdate, System};

/// Source of the memory-pressure reading the health sweep acts on.
#[cfg_attr(test, mockall::automock)]
pub trait MemoryProbe: Send + Sync {
    /// Current usage as a percentage of the budget, 0.0 to 100.0 (or above
    /// when the budget is already exceeded).
    fn usage_percent(&self) -> f64;
}

/// Resident memory of this process measured against a byte budget. Without
/// an explicit budget the machine's total memory is used.
pub struct ProcessMemoryMonitor {
    system: Mutex<System>,
    budget_bytes: u64,
}

impl ProcessMemoryMonitor {
    pub fn new(budget_bytes: Option<u64>) -> Self {
        let mut system = System::new();
        let budget_bytes = match budget_bytes {
            Some(b) if b > 0 => b,
            _ => {
                system.refresh_memory();
                system.total_memory().max(1)
            }
        };
        Self {
            system: Mutex::new(system),
            budget_bytes,
        }
    }

    pub fn budget_bytes(&self) -> u64 {
        self.budget_bytes
    }

    pub fn used_bytes(&self) -> u64 {
        let Ok(pid) = sysinfo::get_current_pid() else {
            return 0;
        };
        let mut system = self.system.lock();
        let _ = system.refresh_processes(ProcessesToUpdate::Some(&[pid]), false);
        system.process(pid).map_or(0, sysinfo::Process::memory)
    }
}

impl MemoryProbe for ProcessMemoryMonitor {
    fn usage_percent(&self) -> f64 {
        self.used_bytes() as f64 / self.budget_bytes as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn measures_this_process() {
        let monitor = ProcessMemoryMonitor::new(Some(u64::MAX / 2));
        assert!(monitor.used_bytes() > 0);
        assert!(monitor.usage_percent() < 1.0);
    }

    #[test]
    fn zero_budget_falls_back_to_total_memory() {
        let monitor = ProcessMemoryMonitor::new(Some(0));
        assert!(monitor.budget_bytes() > 0);
    }
}
