//! Memory Module
//!
//! Dense-matrix footprint prediction and point-in-time process/host
//! memory readings used to keep n-gram features within budget.

pub mod monitor;

pub use monitor::{
    predict_dense_matrix_bytes, MemoryEstimator, SystemMemoryEstimator, DENSE_CELL_BYTES,
    DENSE_TABLE_OVERHEAD_BYTES,
};
