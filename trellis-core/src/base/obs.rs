//! Observation and action markers.
use serde::{de::DeserializeOwned, Serialize};

/// Represents an observation.
///
/// Observations stream through the compressed tape during collection, hence
/// the serialization bounds.
pub trait Obs: Clone + Send + Serialize + DeserializeOwned + 'static {}

/// Represents an action.
pub trait Act: Clone + Send + 'static {}

/// An observation laid out as fixed-shape image planes.
///
/// This is the seam between preprocessed frames and the policy network: the
/// network consumes `channels × height × width` values in plane-major order,
/// already scaled to unit range, without knowing how the planes were encoded.
pub trait PlanarObs: Obs {
    /// Number of planes.
    fn channels(&self) -> usize;

    /// Plane height in pixels.
    fn height(&self) -> usize;

    /// Plane width in pixels.
    fn width(&self) -> usize;

    /// Appends `channels * height * width` values in plane-major order.
    fn write_planes(&self, out: &mut Vec<f32>);
}
