//! Background Tasks Module
//!
//! Contains background tasks that run periodically while the process is up.
//!
//! # Tasks
//! - Cache maintenance: sweeps expired and stale entries at a fixed interval

mod maintenance;

pub use maintenance::spawn_maintenance_task;
