//! Error types for the ray-tracing core.

use meshtrace_mesh::MeshId;
use thiserror::Error;

use crate::backend::RtLibrary;

/// Errors that can occur in the ray-tracing core.
///
/// Numerical edge cases (glancing hits, on-boundary points) are
/// absorbed by the intersection filter and never surface here, and a
/// miss is a value (`(INFTY, ID_NONE)`), not an error.
#[derive(Error, Debug)]
pub enum RayTraceError {
    /// A backend-specific operation was invoked on a backend that does
    /// not implement it.
    #[error("operation `{operation}` is not supported by the {library} backend")]
    Unsupported {
        /// Name of the rejected operation.
        operation: &'static str,
        /// The backend it was invoked on.
        library: RtLibrary,
    },

    /// A query referenced a surface-tree handle that was never issued.
    #[error("unknown surface tree id {0}")]
    UnknownSurfaceTree(u32),

    /// A query referenced an element-tree handle that was never issued.
    #[error("unknown element tree id {0}")]
    UnknownElementTree(u32),

    /// A registration referenced a volume the mesh does not contain.
    #[error("volume {0} is not part of the mesh")]
    UnknownVolume(MeshId),

    /// Building an acceleration structure failed.
    #[error("acceleration structure build failed: {0}")]
    Build(String),

    /// A caller-supplied argument was out of contract.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A global tree was queried after a volume registration
    /// invalidated it.
    #[error("global tree is stale; rebuild it after registering volumes")]
    StaleGlobalTree,

    /// The GPU device failed.
    #[cfg(feature = "gpu")]
    #[error(transparent)]
    Gpu(#[from] meshtrace_gpu::GpuError),
}

/// Result type for ray-tracing operations.
pub type Result<T> = std::result::Result<T, RayTraceError>;
