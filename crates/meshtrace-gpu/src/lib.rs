//! GPU device management for the meshtrace ray-tracing kernel.
//!
//! This crate owns nothing ray-tracing specific: it acquires a wgpu
//! device and queue for the compute backend and defines the GPU error
//! type. The backend holds the context for its whole lifetime and all
//! device resources die with it.

#![warn(missing_docs)]

mod context;

pub use context::{GpuContext, GpuError};
