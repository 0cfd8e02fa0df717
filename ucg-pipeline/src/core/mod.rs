pub mod anomaly;
pub mod fs_scan;
pub mod ids;
pub mod metrics;
pub mod paths;
pub mod time;
