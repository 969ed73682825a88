use std::ops::{Mul, Neg};

use serde::Serialize;

/// Axes of the RAS+ world frame every orientation is expressed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum WorldAxis {
    /// Left to Right
    LeftRight,
    /// Posterior to Anterior
    PosteriorAnterior,
    /// Inferior to Superior
    InferiorSuperior,
}

impl WorldAxis {
    pub const ALL: [WorldAxis; 3] = [
        WorldAxis::LeftRight,
        WorldAxis::PosteriorAnterior,
        WorldAxis::InferiorSuperior,
    ];

    pub fn index(self) -> usize {
        match self {
            WorldAxis::LeftRight => 0,
            WorldAxis::PosteriorAnterior => 1,
            WorldAxis::InferiorSuperior => 2,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Letters at the (negative, positive) ends of the axis.
    pub fn labels(self) -> (char, char) {
        match self {
            WorldAxis::LeftRight => ('L', 'R'),
            WorldAxis::PosteriorAnterior => ('P', 'A'),
            WorldAxis::InferiorSuperior => ('I', 'S'),
        }
    }

    /// Letter an axis running in `sign` direction points toward.
    pub fn label(self, sign: Sign) -> char {
        let (negative, positive) = self.labels();
        match sign {
            Sign::Forward => positive,
            Sign::Reverse => negative,
        }
    }

    /// Find the axis and direction a single letter names.
    pub fn from_label(letter: char) -> Option<(Self, Sign)> {
        let letter = letter.to_ascii_uppercase();
        Self::ALL.into_iter().find_map(|axis| {
            let (negative, positive) = axis.labels();
            if letter == positive {
                Some((axis, Sign::Forward))
            } else if letter == negative {
                Some((axis, Sign::Reverse))
            } else {
                None
            }
        })
    }
}

/// Traversal direction of an axis: `Forward` is +1, `Reverse` is -1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum Sign {
    #[default]
    Forward,
    Reverse,
}

impl Sign {
    pub fn from_value(value: f64) -> Self {
        if value < 0.0 { Sign::Reverse } else { Sign::Forward }
    }

    pub fn as_i8(self) -> i8 {
        match self {
            Sign::Forward => 1,
            Sign::Reverse => -1,
        }
    }

    pub fn as_f64(self) -> f64 {
        f64::from(self.as_i8())
    }

    pub fn is_reverse(self) -> bool {
        matches!(self, Sign::Reverse)
    }
}

impl Mul for Sign {
    type Output = Sign;

    fn mul(self, rhs: Sign) -> Sign {
        if self == rhs { Sign::Forward } else { Sign::Reverse }
    }
}

impl Neg for Sign {
    type Output = Sign;

    fn neg(self) -> Sign {
        self * Sign::Reverse
    }
}

/// Slice ordering used when assembling a DICOM series into a volume.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortBy {
    /// Position of each slice along the series' slice normal
    #[default]
    ImagePositionPatient,
    TablePosition,
    InstanceNumber,
    None,
}
