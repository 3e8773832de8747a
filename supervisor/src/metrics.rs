//! Per-VM resource metrics, read from the host process table. Grounded on
//! the teacher's `ShimHandler::metrics` (a shared `System` reused across
//! calls so CPU usage can be computed as a delta between refreshes).

use sysinfo::{Pid, System};

#[derive(Debug, Clone, Copy, Default)]
pub struct VmMetrics {
    pub cpu_percent: Option<f32>,
    pub memory_bytes: Option<u64>,
}

pub struct MetricsReader {
    sys: System,
}

impl Default for MetricsReader {
    fn default() -> Self {
        Self { sys: System::new() }
    }
}

impl MetricsReader {
    pub fn read(&mut self, pid: u32) -> VmMetrics {
        let pid = Pid::from_u32(pid);
        self.sys.refresh_process(pid);
        match self.sys.process(pid) {
            Some(process) => VmMetrics {
                cpu_percent: Some(process.cpu_usage()),
                memory_bytes: Some(process.memory()),
            },
            None => VmMetrics::default(),
        }
    }
}
