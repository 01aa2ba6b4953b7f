//! Tunable numerical parameters of the kernel.

/// Numerical parameters shared by every backend.
///
/// The defaults reproduce the behavior expected by transport codes:
/// origins are nudged off surfaces by a volume-scaled bump, near-tangent
/// hits are discarded rather than classified, and ambiguous containment
/// queries retry along a slightly rotated direction before giving up.
#[derive(Debug, Clone, Copy)]
pub struct RayTracerConfig {
    /// Scale factor applied to a volume's largest bounding-box extent to
    /// obtain its bump distance; the bump never drops below this value
    /// either.
    pub numerical_precision: f64,

    /// Hits whose direction-normal cosine is smaller than this in
    /// magnitude are treated as glancing and rejected.
    pub glancing_tolerance: f64,

    /// How many nudged directions a containment query tries before
    /// declaring the point on-boundary.
    pub containment_retries: u32,

    /// Candidate slots reserved per ray in the GPU pruning pass; rays
    /// that overflow fall back to the host tree.
    pub gpu_candidate_slots: usize,
}

impl Default for RayTracerConfig {
    fn default() -> Self {
        Self {
            numerical_precision: 1e-3,
            glancing_tolerance: 1e-6,
            containment_retries: 4,
            gpu_candidate_slots: 32,
        }
    }
}

impl RayTracerConfig {
    /// The bump distance for a volume whose largest bounding-box edge is
    /// `max_extent`: `max(1e-3, 1e-3 × max_extent)` at default settings.
    pub fn bump(&self, max_extent: f64) -> f64 {
        self.numerical_precision
            .max(self.numerical_precision * max_extent)
    }
}
