//! Three-letter anatomical axis codes such as `LAS`.
//!
//! Letters name the direction increasing index along each array axis points
//! toward, drawn from the pairs L/R, P/A and I/S with one pair per axis.

use std::fmt;
use std::str::FromStr;

use nalgebra::Matrix4;
use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::enums::{Sign, WorldAxis};
use crate::orientation::{AxisMap, OrientationError, OrientationTransform};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseAxisCodeError {
    #[error("Axis code must have exactly 3 letters, got {0:?}")]
    Length(String),

    #[error("Unknown axis letter {0:?}")]
    UnknownLetter(char),

    #[error("Axis code {0:?} uses the same axis pair twice")]
    RepeatedAxis(String),
}

/// Stored as the orientation transform the letters spell, so every code holds
/// exactly one letter per world axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AxisCode(OrientationTransform);

impl AxisCode {
    /// Left, Anterior, Superior.
    pub const LAS: AxisCode = AxisCode(OrientationTransform::from_permutation([
        AxisMap::new(0, Sign::Reverse),
        AxisMap::new(1, Sign::Forward),
        AxisMap::new(2, Sign::Forward),
    ]));

    /// Right, Anterior, Superior; the world frame itself.
    pub const RAS: AxisCode = AxisCode(OrientationTransform::identity());

    pub fn letters(&self) -> [char; 3] {
        // Transform sources are always a permutation of 0, 1, 2.
        self.0
            .maps()
            .map(|map| WorldAxis::ALL[map.source].label(map.sign))
    }

    /// Transform from the world frame to an array laid out as this code.
    pub fn to_transform(&self) -> OrientationTransform {
        self.0
    }

    /// Letters for an orientation transform expressed against the world frame.
    pub fn from_transform(transform: &OrientationTransform) -> Self {
        Self(*transform)
    }

    /// Code of the native orientation of `affine`.
    pub fn from_affine(affine: &Matrix4<f64>) -> Result<Self, OrientationError> {
        OrientationTransform::from_affine(affine).map(Self)
    }
}

impl Default for AxisCode {
    fn default() -> Self {
        Self::LAS
    }
}

impl FromStr for AxisCode {
    type Err = ParseAxisCodeError;

    fn from_str(code: &str) -> Result<Self, Self::Err> {
        let letters: Vec<char> = code.trim().chars().collect();
        let &[a, b, c] = letters.as_slice() else {
            return Err(ParseAxisCodeError::Length(code.to_string()));
        };

        let mut maps = [AxisMap::new(0, Sign::Forward); 3];
        for (slot, letter) in maps.iter_mut().zip([a, b, c]) {
            let (axis, sign) =
                WorldAxis::from_label(letter).ok_or(ParseAxisCodeError::UnknownLetter(letter))?;
            *slot = AxisMap::new(axis.index(), sign);
        }

        OrientationTransform::new(maps)
            .map(Self)
            .map_err(|_| ParseAxisCodeError::RepeatedAxis(code.to_string()))
    }
}

impl fmt::Display for AxisCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.letters().iter().try_for_each(|letter| write!(f, "{letter}"))
    }
}

impl Serialize for AxisCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Native orientation of an affine; see [`OrientationTransform::from_affine`].
pub fn from_affine(affine: &Matrix4<f64>) -> Result<OrientationTransform, OrientationError> {
    OrientationTransform::from_affine(affine)
}

pub fn code_to_transform(code: &AxisCode) -> OrientationTransform {
    code.to_transform()
}

pub fn transform_to_axcodes(transform: &OrientationTransform) -> AxisCode {
    AxisCode::from_transform(transform)
}
