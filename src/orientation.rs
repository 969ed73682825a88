//! Orientation transforms and their algebra.
//!
//! An [`OrientationTransform`] holds one [`AxisMap`] per *output* axis: the
//! input axis it is read from and whether that axis is traversed in reverse.
//! A volume's native orientation is the transform taking the RAS+ world frame
//! to the volume's array axes, so orientation changes between two arbitrary
//! arrangements are obtained by composing through that shared frame.

use std::fmt;
use std::ops::Index;

use nalgebra::{Matrix3, Matrix4};
use thiserror::Error;
use tracing::debug;

use crate::enums::Sign;

/// Columns of the orthonormalized affine whose entries all fall below this are
/// treated as carrying no direction.
const ZERO_COLUMN_TOLERANCE: f64 = 1e-8;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum OrientationError {
    #[error("Affine has a singular 3x3 block")]
    SingularAffine,

    #[error("Affine is degenerate: array axis {axis} has no direction")]
    Degenerate { axis: usize },

    #[error("Affine could not be decomposed")]
    Decomposition,

    #[error("Transform axes {indices:?} are not a permutation of 0, 1, 2")]
    NotAPermutation { indices: [usize; 3] },
}

impl OrientationError {
    /// Whether this is a programming defect rather than bad input data.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, OrientationError::NotAPermutation { .. })
    }
}

/// Source of a single output axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AxisMap {
    pub source: usize,
    pub sign: Sign,
}

impl AxisMap {
    pub const fn new(source: usize, sign: Sign) -> Self {
        Self { source, sign }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OrientationTransform([AxisMap; 3]);

impl OrientationTransform {
    /// Build a transform, rejecting source indices that are not a permutation
    /// of `{0, 1, 2}`.
    pub fn new(maps: [AxisMap; 3]) -> Result<Self, OrientationError> {
        let indices = maps.map(|map| map.source);
        let mut seen = [false; 3];
        for &index in &indices {
            match seen.get_mut(index) {
                Some(slot) if !*slot => *slot = true,
                _ => return Err(OrientationError::NotAPermutation { indices }),
            }
        }
        Ok(Self(maps))
    }

    /// Shorthand for `(source, ±1)` pairs. Any negative value means reverse.
    pub fn from_pairs(pairs: [(usize, i8); 3]) -> Result<Self, OrientationError> {
        Self::new(pairs.map(|(source, sign)| {
            AxisMap::new(source, Sign::from_value(f64::from(sign)))
        }))
    }

    /// Build from maps the caller already knows form a permutation.
    pub(crate) const fn from_permutation(maps: [AxisMap; 3]) -> Self {
        Self(maps)
    }

    pub const fn identity() -> Self {
        Self([
            AxisMap::new(0, Sign::Forward),
            AxisMap::new(1, Sign::Forward),
            AxisMap::new(2, Sign::Forward),
        ])
    }

    pub fn maps(&self) -> &[AxisMap; 3] {
        &self.0
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::identity()
    }

    /// Output axis reading from `source`, with its sign.
    fn output_for_source(&self, source: usize) -> Option<(usize, Sign)> {
        self.0
            .iter()
            .enumerate()
            .find(|(_, map)| map.source == source)
            .map(|(output, map)| (output, map.sign))
    }

    /// The transform undoing this one's permutation and flips.
    pub fn inverse(&self) -> Self {
        let mut maps = [AxisMap::new(0, Sign::Forward); 3];
        for (output, map) in self.0.iter().enumerate() {
            maps[map.source] = AxisMap::new(output, map.sign);
        }
        Self(maps)
    }

    /// Transform taking a volume arranged as `self` to the arrangement of
    /// `target`, both expressed against the same reference frame.
    ///
    /// This is `target ∘ self⁻¹`: for each output axis `k` the reference axis
    /// `target[k]` reads from is located among `self`'s axes, and the signs
    /// combine multiplicatively.
    pub fn compose(&self, target: &OrientationTransform) -> Result<Self, OrientationError> {
        Self::new(self.0)?;
        Self::new(target.0)?;

        let mut maps = [AxisMap::new(0, Sign::Forward); 3];
        for (output, wanted) in target.0.iter().enumerate() {
            let (source, source_sign) = self
                .output_for_source(wanted.source)
                .ok_or(OrientationError::NotAPermutation {
                    indices: self.0.map(|map| map.source),
                })?;
            maps[output] = AxisMap::new(source, wanted.sign * source_sign);
        }

        let composed = Self::new(maps)?;
        debug!(source = %self, target = %target, transform = %composed, "composed orientation");
        Ok(composed)
    }

    /// Native orientation of an affine relative to the RAS+ world frame.
    ///
    /// Voxel sizes are divided out of the linear block, the nearest orthonormal
    /// matrix is rebuilt from its SVD, and each array axis then claims the
    /// world axis it is most aligned with. Claimed world axes are zeroed so no
    /// two array axes can share one.
    pub fn from_affine(affine: &Matrix4<f64>) -> Result<Self, OrientationError> {
        let linear: Matrix3<f64> = affine.fixed_view::<3, 3>(0, 0).into_owned();

        let mut rotation_scale = linear;
        for mut column in rotation_scale.column_iter_mut() {
            let norm = column.norm();
            if norm != 0.0 {
                column /= norm;
            }
        }

        let svd = rotation_scale.svd(true, true);
        let (u, v_t) = match (svd.u, svd.v_t) {
            (Some(u), Some(v_t)) => (u, v_t),
            _ => return Err(OrientationError::Decomposition),
        };
        let singular = svd.singular_values;
        let tolerance = singular.max() * 3.0 * f64::EPSILON;

        let mut nearest = Matrix3::<f64>::zeros();
        for i in 0..3 {
            if singular[i] > tolerance {
                nearest += u.column(i) * v_t.row(i);
            }
        }

        let mut maps = [AxisMap::new(0, Sign::Forward); 3];
        for axis in 0..3 {
            let column = nearest.column(axis);
            if column.amax() <= ZERO_COLUMN_TOLERANCE {
                return Err(OrientationError::Degenerate { axis });
            }
            let world = column.iamax();
            maps[axis] = AxisMap::new(world, Sign::from_value(column[world]));
            nearest.row_mut(world).fill(0.0);
        }

        Self::new(maps)
    }
}

impl Default for OrientationTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl Index<usize> for OrientationTransform {
    type Output = AxisMap;

    fn index(&self, output: usize) -> &AxisMap {
        &self.0[output]
    }
}

impl fmt::Display for OrientationTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, map) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "({}, {:+})", map.source, map.sign.as_i8())?;
        }
        write!(f, "]")
    }
}

/// `target ∘ source⁻¹`; see [`OrientationTransform::compose`].
pub fn compose(
    source: &OrientationTransform,
    target: &OrientationTransform,
) -> Result<OrientationTransform, OrientationError> {
    source.compose(target)
}
