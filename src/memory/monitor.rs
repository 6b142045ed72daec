//! Memory estimation for dense n-gram materialization
//!
//! Predicts how many bytes a dense numeric table will take and compares the
//! prediction against what the host can currently give the process.

use parking_lot::Mutex;
use sysinfo::{Pid, ProcessesToUpdate, System};

/// Bytes per dense cell (64-bit numeric).
pub const DENSE_CELL_BYTES: u64 = 8;

/// Fixed per-table overhead added to every dense prediction.
pub const DENSE_TABLE_OVERHEAD_BYTES: u64 = 80;

/// Predict the bytes needed to materialize a `row_count x column_count` dense
/// table of 64-bit cells.
///
/// Model: `row_count * 8 * (column_count + 1) + 80`. The extra column covers
/// the implicit row index. Saturates instead of overflowing.
pub fn predict_dense_matrix_bytes(row_count: usize, column_count: usize) -> u64 {
    (row_count as u64)
        .saturating_mul(DENSE_CELL_BYTES)
        .saturating_mul((column_count as u64).saturating_add(1))
        .saturating_add(DENSE_TABLE_OVERHEAD_BYTES)
}

/// Point-in-time view of process and host memory.
///
/// Implementations must not cache: every call reflects the moment it is made.
pub trait MemoryEstimator: Send + Sync {
    /// Resident set size of the current process in bytes.
    fn current_process_resident_bytes(&self) -> u64;

    /// Memory the host can still hand out, in bytes.
    fn available_system_bytes(&self) -> u64;

    /// Bytes a dense `row_count x column_count` table would need.
    fn predict_dense_matrix_bytes(&self, row_count: usize, column_count: usize) -> u64 {
        predict_dense_matrix_bytes(row_count, column_count)
    }

    /// `(rss + predicted) / available`. Infinite when nothing is available.
    fn predicted_usage_ratio(&self, row_count: usize, column_count: usize) -> f64 {
        let available = self.available_system_bytes();
        if available == 0 {
            return f64::INFINITY;
        }
        let predicted = self
            .current_process_resident_bytes()
            .saturating_add(self.predict_dense_matrix_bytes(row_count, column_count));
        predicted as f64 / available as f64
    }
}

/// `MemoryEstimator` backed by live `sysinfo` readings.
pub struct SystemMemoryEstimator {
    system: Mutex<System>,
    pid: Pid,
}

impl SystemMemoryEstimator {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
            pid: Pid::from_u32(std::process::id()),
        }
    }
}

impl Default for SystemMemoryEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SystemMemoryEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemMemoryEstimator")
            .field("pid", &self.pid)
            .finish()
    }
}

impl MemoryEstimator for SystemMemoryEstimator {
    fn current_process_resident_bytes(&self) -> u64 {
        let mut system = self.system.lock();
        system.refresh_processes(ProcessesToUpdate::Some(&[self.pid]), true);
        system.process(self.pid).map(|p| p.memory()).unwrap_or(0)
    }

    fn available_system_bytes(&self) -> u64 {
        let mut system = self.system.lock();
        system.refresh_memory();
        system.available_memory()
    }
}
