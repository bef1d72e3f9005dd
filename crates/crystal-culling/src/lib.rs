//! Frustum and distance culling for large sets of scene objects.
//!
//! Each registered object gets a conservative bounding sphere (see
//! [`tracker`]). [`FrustumCullingManager`] re-checks a budgeted, priority
//! ordered slice of the objects per pass and toggles node visibility only on
//! transitions.

mod manager;
pub mod tracker;

pub use manager::{CullingStats, FrustumCullingManager};
pub use tracker::{TrackedObject, compute_bounding_sphere};
