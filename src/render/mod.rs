//! GPU interfaces

pub mod context;

pub use context::GpuContext;
