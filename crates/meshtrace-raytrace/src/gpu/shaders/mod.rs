//! WGSL shader sources for the trace kernel.

/// Conservative candidate-pruning compute shader.
pub const TRACE_SHADER: &str = include_str!("trace.wgsl");
