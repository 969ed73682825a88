use crate::axcodes::AxisCode;
use crate::orientation::{OrientationError, OrientationTransform};
use crate::reorient::Reorienter;

use nalgebra::{Matrix4, Vector4};
use ndarray::{Array3, ArrayD, Axis, Ix3};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum VolumeError {
    #[error("Expected a 3D volume, found {found} dimensions")]
    Rank { found: usize },

    #[error(transparent)]
    Orientation(#[from] OrientationError),
}

/// Voxel samples together with the affine mapping voxel indices `(i, j, k, 1)`
/// to physical coordinates `(x, y, z, 1)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Volume<T = f32> {
    pub(crate) data: Array3<T>,
    pub(crate) affine: Matrix4<f64>,
}

impl<T> Volume<T> {
    /// # Errors
    ///
    /// Returns [`OrientationError::SingularAffine`] if the linear part of
    /// `affine` cannot be inverted.
    pub fn new(data: Array3<T>, affine: Matrix4<f64>) -> Result<Self, VolumeError> {
        let determinant = affine.fixed_view::<3, 3>(0, 0).into_owned().determinant();
        if !determinant.is_finite() || determinant.abs() <= f64::EPSILON {
            return Err(OrientationError::SingularAffine.into());
        }
        Ok(Self { data, affine })
    }

    /// Build a volume from an array of any rank. Trailing axes of length one
    /// are dropped before the rank is checked.
    pub fn from_dyn(mut data: ArrayD<T>, affine: Matrix4<f64>) -> Result<Self, VolumeError> {
        while data.ndim() > 3 && data.shape().last() == Some(&1) {
            let last = data.ndim() - 1;
            data = data.index_axis_move(Axis(last), 0);
        }
        let found = data.ndim();
        let data = data
            .into_dimensionality::<Ix3>()
            .map_err(|_| VolumeError::Rank { found })?;
        Self::new(data, affine)
    }

    /// Get the dimensions of the volume along its three array axes
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    pub fn shape(&self) -> [usize; 3] {
        let (a, b, c) = self.data.dim();
        [a, b, c]
    }

    /// Get a reference to the underlying data
    pub fn data(&self) -> &Array3<T> {
        &self.data
    }

    /// Get a mutable reference to the underlying data
    pub fn data_mut(&mut self) -> &mut Array3<T> {
        &mut self.data
    }

    pub fn affine(&self) -> &Matrix4<f64> {
        &self.affine
    }

    pub fn into_parts(self) -> (Array3<T>, Matrix4<f64>) {
        (self.data, self.affine)
    }

    /// Native orientation relative to the RAS+ world frame.
    pub fn orientation(&self) -> Result<OrientationTransform, OrientationError> {
        OrientationTransform::from_affine(&self.affine)
    }

    pub fn axcodes(&self) -> Result<AxisCode, OrientationError> {
        AxisCode::from_affine(&self.affine)
    }

    /// Physical position of the voxel at `index`.
    pub fn voxel_to_world(&self, index: [usize; 3]) -> [f64; 3] {
        let [i, j, k] = index.map(|v| v as f64);
        let world = self.affine * Vector4::new(i, j, k, 1.0);
        [world.x, world.y, world.z]
    }
}

impl<T: Clone> Volume<T> {
    /// A new volume with axes permuted and flipped by `transform`, describing
    /// the same physical samples.
    pub fn as_reoriented(&self, transform: &OrientationTransform) -> Volume<T> {
        Reorienter::apply(self, transform)
    }
}

/// A volume in the sample type it was stored with, so reorienting never
/// converts voxel values.
#[derive(Debug, Clone, PartialEq)]
pub enum AnyVolume {
    U8(Volume<u8>),
    I8(Volume<i8>),
    U16(Volume<u16>),
    I16(Volume<i16>),
    U32(Volume<u32>),
    I32(Volume<i32>),
    U64(Volume<u64>),
    I64(Volume<i64>),
    F32(Volume<f32>),
    F64(Volume<f64>),
}

/// Evaluate `$body` with `$volume` bound to the typed volume inside `$any`.
macro_rules! each_volume {
    ($any:expr, $volume:ident => $body:expr) => {
        match $any {
            AnyVolume::U8($volume) => $body,
            AnyVolume::I8($volume) => $body,
            AnyVolume::U16($volume) => $body,
            AnyVolume::I16($volume) => $body,
            AnyVolume::U32($volume) => $body,
            AnyVolume::I32($volume) => $body,
            AnyVolume::U64($volume) => $body,
            AnyVolume::I64($volume) => $body,
            AnyVolume::F32($volume) => $body,
            AnyVolume::F64($volume) => $body,
        }
    };
}

/// Like `each_volume!`, wrapping the resulting volume back into its variant.
macro_rules! map_volume {
    ($any:expr, $volume:ident => $body:expr) => {
        match $any {
            AnyVolume::U8($volume) => AnyVolume::U8($body),
            AnyVolume::I8($volume) => AnyVolume::I8($body),
            AnyVolume::U16($volume) => AnyVolume::U16($body),
            AnyVolume::I16($volume) => AnyVolume::I16($body),
            AnyVolume::U32($volume) => AnyVolume::U32($body),
            AnyVolume::I32($volume) => AnyVolume::I32($body),
            AnyVolume::U64($volume) => AnyVolume::U64($body),
            AnyVolume::I64($volume) => AnyVolume::I64($body),
            AnyVolume::F32($volume) => AnyVolume::F32($body),
            AnyVolume::F64($volume) => AnyVolume::F64($body),
        }
    };
}

pub(crate) use {each_volume, map_volume};

impl AnyVolume {
    pub fn shape(&self) -> [usize; 3] {
        each_volume!(self, volume => volume.shape())
    }

    /// Name of the sample type, as used in logs.
    pub fn sample_type(&self) -> &'static str {
        match self {
            AnyVolume::U8(_) => "u8",
            AnyVolume::I8(_) => "i8",
            AnyVolume::U16(_) => "u16",
            AnyVolume::I16(_) => "i16",
            AnyVolume::U32(_) => "u32",
            AnyVolume::I32(_) => "i32",
            AnyVolume::U64(_) => "u64",
            AnyVolume::I64(_) => "i64",
            AnyVolume::F32(_) => "f32",
            AnyVolume::F64(_) => "f64",
        }
    }
}

macro_rules! impl_from_volume {
    ($($variant:ident => $sample:ty),* $(,)?) => {
        $(
            impl From<Volume<$sample>> for AnyVolume {
                fn from(volume: Volume<$sample>) -> Self {
                    AnyVolume::$variant(volume)
                }
            }
        )*
    };
}

impl_from_volume!(
    U8 => u8,
    I8 => i8,
    U16 => u16,
    I16 => i16,
    U32 => u32,
    I32 => i32,
    U64 => u64,
    I64 => i64,
    F32 => f32,
    F64 => f64,
);

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;

    #[test]
    fn rejects_singular_affine() {
        let data = Array3::<f32>::zeros((2, 2, 2));
        let affine = Matrix4::from_diagonal(&Vector4::new(1.0, 0.0, 1.0, 1.0));
        assert_eq!(
            Volume::new(data, affine),
            Err(VolumeError::Orientation(OrientationError::SingularAffine))
        );
    }

    #[test]
    fn from_dyn_squeezes_trailing_singletons() {
        let data = ArrayD::<f32>::zeros(IxDyn(&[2, 3, 4, 1, 1]));
        let volume = Volume::from_dyn(data, Matrix4::identity()).unwrap();
        assert_eq!(volume.shape(), [2, 3, 4]);
    }

    #[test]
    fn from_dyn_rejects_other_ranks() {
        let flat = ArrayD::<f32>::zeros(IxDyn(&[2, 3]));
        assert_eq!(
            Volume::from_dyn(flat, Matrix4::identity()),
            Err(VolumeError::Rank { found: 2 })
        );
        let series = ArrayD::<f32>::zeros(IxDyn(&[2, 3, 4, 5]));
        assert_eq!(
            Volume::from_dyn(series, Matrix4::identity()),
            Err(VolumeError::Rank { found: 4 })
        );
    }

    #[test]
    fn maps_voxels_to_world() {
        let mut affine = Matrix4::from_diagonal(&Vector4::new(-2.0, 1.0, 3.0, 1.0));
        affine[(0, 3)] = 10.0;
        let volume = Volume::new(Array3::<u8>::zeros((4, 4, 4)), affine).unwrap();
        assert_eq!(volume.voxel_to_world([1, 2, 3]), [8.0, 2.0, 9.0]);
        assert_eq!(volume.axcodes().unwrap().to_string(), "LAS");
    }

    #[test]
    fn any_volume_keeps_sample_type() {
        let data = Array3::from_shape_fn((2, 3, 4), |(i, j, k)| (i * 12 + j * 4 + k) as f64 + 0.1);
        let any = AnyVolume::from(Volume::new(data, Matrix4::identity()).unwrap());
        assert_eq!(any.sample_type(), "f64");
        assert_eq!(any.shape(), [2, 3, 4]);
        let AnyVolume::F64(volume) = any else {
            panic!("expected f64 samples");
        };
        assert_eq!(volume.data()[[1, 2, 3]], 23.1);
    }
}
