use nalgebra::Matrix4;
use ndarray::{Array3, ArrayView3, Axis};
use tracing::debug;

use crate::axcodes::AxisCode;
use crate::orientation::{OrientationError, OrientationTransform};
use crate::volume::{AnyVolume, Volume, each_volume, map_volume};

/// Anything carrying an affine that can be permuted and flipped without
/// resampling.
pub trait Reorientable: Sized {
    fn affine(&self) -> &Matrix4<f64>;

    fn as_reoriented(&self, transform: &OrientationTransform) -> Self;

    /// Native orientation relative to the RAS+ world frame.
    fn orientation(&self) -> Result<OrientationTransform, OrientationError> {
        OrientationTransform::from_affine(self.affine())
    }

    fn axcodes(&self) -> Result<AxisCode, OrientationError> {
        AxisCode::from_affine(self.affine())
    }
}

impl<T: Clone> Reorientable for Volume<T> {
    fn affine(&self) -> &Matrix4<f64> {
        &self.affine
    }

    fn as_reoriented(&self, transform: &OrientationTransform) -> Self {
        Reorienter::apply(self, transform)
    }
}

impl Reorientable for AnyVolume {
    fn affine(&self) -> &Matrix4<f64> {
        each_volume!(self, volume => &volume.affine)
    }

    fn as_reoriented(&self, transform: &OrientationTransform) -> Self {
        map_volume!(self, volume => Reorienter::apply(volume, transform))
    }
}

/// Applies orientation transforms to volumes without resampling.
pub struct Reorienter;

impl Reorienter {
    /// Permute and flip the voxel data of `volume` by `transform` and update
    /// the affine so every voxel keeps its physical position.
    pub fn apply<T: Clone>(volume: &Volume<T>, transform: &OrientationTransform) -> Volume<T> {
        let shape = volume.shape();
        let data = Self::reorient_data(volume.data.view(), transform);
        let affine = Self::reorient_affine(&volume.affine, shape, transform);
        debug!(?shape, new_shape = ?data.shape(), %transform, "reoriented volume");
        Volume { data, affine }
    }

    /// Output axis `k` is input axis `transform[k].source`, reversed when its
    /// sign is negative.
    pub fn reorient_data<T: Clone>(
        data: ArrayView3<'_, T>,
        transform: &OrientationTransform,
    ) -> Array3<T> {
        let mut view = data.permuted_axes(transform.maps().map(|map| map.source));
        for (output, map) in transform.maps().iter().enumerate() {
            if map.sign.is_reverse() {
                view.invert_axis(Axis(output));
            }
        }
        view.as_standard_layout().into_owned()
    }

    /// Affine of the reoriented array: `affine · M`, where `M` maps new voxel
    /// indices back to the old ones.
    pub fn reorient_affine(
        affine: &Matrix4<f64>,
        shape: [usize; 3],
        transform: &OrientationTransform,
    ) -> Matrix4<f64> {
        let mut new_to_old = Matrix4::<f64>::zeros();
        new_to_old[(3, 3)] = 1.0;
        for (output, map) in transform.maps().iter().enumerate() {
            new_to_old[(map.source, output)] = map.sign.as_f64();
            if map.sign.is_reverse() {
                new_to_old[(map.source, 3)] = shape[map.source].saturating_sub(1) as f64;
            }
        }
        affine * new_to_old
    }
}
