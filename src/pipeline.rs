//! The three reorientation workflows.
//!
//! Each one picks a source and a target orientation, composes them with
//! [`OrientationTransform::compose`] and applies the result. They differ only in
//! where the two orientations come from.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use nifti::NiftiError;

use crate::axcodes::AxisCode;
use crate::orientation::{OrientationError, OrientationTransform};
use crate::reorient::Reorientable;
use crate::volume::VolumeError;
use crate::volume_loader::{LoadedVolume, VolumeLoader, VolumeLoaderError};
use crate::volume_writer::{VolumeWriter, VolumeWriterError};

/// Broad failure classes reported to callers of the workflows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A file could not be read, recognized or written
    Io,
    /// The volume's header or data is malformed
    Format,
    /// A transform was built with axes that are not a permutation
    InvariantViolation,
}

impl ErrorKind {
    /// Process status for this kind, following `sysexits.h` so it never
    /// collides with the usage status 2 of argument parsing.
    pub fn exit_code(self) -> u8 {
        match self {
            ErrorKind::Io => 74,
            ErrorKind::Format => 65,
            ErrorKind::InvariantViolation => 70,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorKind::Io => "IO error",
            ErrorKind::Format => "format error",
            ErrorKind::InvariantViolation => "invariant violation",
        })
    }
}

#[derive(Debug, Error)]
pub enum ReorientError {
    #[error("Failed to load {}: {source}", path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: VolumeLoaderError,
    },

    #[error("Failed to save {}: {source}", path.display())]
    Save {
        path: PathBuf,
        #[source]
        source: VolumeWriterError,
    },

    #[error(transparent)]
    Orientation(#[from] OrientationError),
}

impl ReorientError {
    pub fn kind(&self) -> ErrorKind {
        let orientation_kind = |err: &OrientationError| {
            if err.is_invariant_violation() {
                ErrorKind::InvariantViolation
            } else {
                ErrorKind::Format
            }
        };

        match self {
            ReorientError::Load { source, .. } => match source {
                VolumeLoaderError::Io(_)
                | VolumeLoaderError::Dicom(_)
                | VolumeLoaderError::NoValidImages => ErrorKind::Io,
                VolumeLoaderError::Nifti(err) => nifti_kind(err),
                VolumeLoaderError::InconsistentDimensions
                | VolumeLoaderError::MissingGeometry
                | VolumeLoaderError::Volume(VolumeError::Rank { .. }) => ErrorKind::Format,
                VolumeLoaderError::Volume(VolumeError::Orientation(err)) => orientation_kind(err),
            },
            ReorientError::Save { .. } => ErrorKind::Io,
            ReorientError::Orientation(err) => orientation_kind(err),
        }
    }
}

/// Unreadable or unrecognized files are IO failures; a NIfTI file whose header
/// or data does not hold together is a format failure.
fn nifti_kind(err: &NiftiError) -> ErrorKind {
    match err {
        NiftiError::Io(_)
        | NiftiError::MissingVolumeFile(_)
        | NiftiError::InvalidFormat
        | NiftiError::NoVolumeData => ErrorKind::Io,
        _ => ErrorKind::Format,
    }
}

/// Where a restore takes its target orientation from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestoreTarget {
    /// The reference volume's own affine
    ReferenceNative,
    /// LAS, assuming the reference already is LAS without checking
    AssumeCanonical,
}

impl RestoreTarget {
    pub fn transform_for<R: Reorientable>(
        self,
        reference: &R,
    ) -> Result<OrientationTransform, OrientationError> {
        match self {
            RestoreTarget::ReferenceNative => reference.orientation(),
            RestoreTarget::AssumeCanonical => Ok(AxisCode::LAS.to_transform()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalReport {
    pub input_axcodes: AxisCode,
    pub target_axcodes: AxisCode,
    pub output_axcodes: AxisCode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestoreReport {
    pub target: RestoreTarget,
    pub las_axcodes: AxisCode,
    pub reference_axcodes: AxisCode,
    pub target_axcodes: AxisCode,
    pub restored_axcodes: AxisCode,
}

impl RestoreReport {
    /// Whether the reference's actual orientation differs from the one the
    /// restore aimed for.
    pub fn mismatch(&self) -> bool {
        self.reference_axcodes != self.target_axcodes
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "workflow", rename_all = "kebab-case")]
pub enum Report {
    ToCanonical(CanonicalReport),
    Restore(RestoreReport),
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Report::ToCanonical(report) => {
                writeln!(f, "input_axcodes: {}", report.input_axcodes)?;
                writeln!(f, "target_axcodes: {}", report.target_axcodes)?;
                write!(f, "output_axcodes: {}", report.output_axcodes)
            }
            Report::Restore(report) => {
                writeln!(f, "las_axcodes: {}", report.las_axcodes)?;
                writeln!(f, "reference_axcodes: {}", report.reference_axcodes)?;
                writeln!(f, "restored_axcodes: {}", report.restored_axcodes)?;
                write!(f, "target_axcodes: {}", report.target_axcodes)
            }
        }
    }
}

/// Reorient `volume` from the `source` arrangement to the `target` one.
pub fn reorient_between<V: Reorientable>(
    volume: &V,
    source: &OrientationTransform,
    target: &OrientationTransform,
) -> Result<V, OrientationError> {
    let transform = source.compose(target)?;
    debug!(%source, %target, %transform, "applying orientation transform");
    Ok(volume.as_reoriented(&transform))
}

/// Reorient `volume` from its native orientation to `target`.
pub fn to_canonical<V: Reorientable>(
    volume: &V,
    target: AxisCode,
) -> Result<(V, CanonicalReport), OrientationError> {
    let source = volume.orientation()?;
    let output = reorient_between(volume, &source, &target.to_transform())?;

    let report = CanonicalReport {
        input_axcodes: AxisCode::from_transform(&source),
        target_axcodes: target,
        output_axcodes: output.axcodes()?,
    };
    Ok((output, report))
}

/// Bring an LAS-oriented volume back to the orientation chosen by `target`.
///
/// The input is treated as LAS regardless of its affine; its derived code is
/// still reported so callers can spot inputs that were not.
pub fn restore<V: Reorientable, R: Reorientable>(
    las_volume: &V,
    reference: &R,
    target: RestoreTarget,
) -> Result<(V, RestoreReport), OrientationError> {
    let source = AxisCode::LAS.to_transform();
    let target_transform = target.transform_for(reference)?;
    let output = reorient_between(las_volume, &source, &target_transform)?;

    let report = RestoreReport {
        target,
        las_axcodes: las_volume.axcodes()?,
        reference_axcodes: reference.axcodes()?,
        target_axcodes: AxisCode::from_transform(&target_transform),
        restored_axcodes: output.axcodes()?,
    };
    if report.mismatch() {
        warn!(
            reference = %report.reference_axcodes,
            target = %report.target_axcodes,
            "reference orientation differs from the restore target"
        );
    }
    Ok((output, report))
}

/// Restore using the reference's own orientation.
pub fn restore_native<V: Reorientable, R: Reorientable>(
    las_volume: &V,
    reference: &R,
) -> Result<(V, RestoreReport), OrientationError> {
    restore(las_volume, reference, RestoreTarget::ReferenceNative)
}

/// Restore assuming the reference is LAS.
pub fn restore_assuming_canonical<V: Reorientable, R: Reorientable>(
    las_volume: &V,
    reference: &R,
) -> Result<(V, RestoreReport), OrientationError> {
    restore(las_volume, reference, RestoreTarget::AssumeCanonical)
}

/// A file-level run of one of the three workflows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Workflow<'a> {
    ToCanonical {
        input: &'a Path,
        target: AxisCode,
    },
    Restore {
        las_input: &'a Path,
        reference: &'a Path,
        target: RestoreTarget,
    },
}

fn load(path: &Path) -> Result<LoadedVolume, ReorientError> {
    VolumeLoader::load(path).map_err(|source| ReorientError::Load {
        path: path.to_path_buf(),
        source,
    })
}

/// Save `volume`, carrying over the header fields of the file it came from.
fn save(volume: &LoadedVolume, path: &Path) -> Result<(), ReorientError> {
    VolumeWriter::save_any(&volume.volume, path, volume.header.as_ref()).map_err(|source| {
        ReorientError::Save {
            path: path.to_path_buf(),
            source,
        }
    })
}

/// Load the inputs of `workflow`, compute the result and save it to `output`
/// once it is complete.
pub fn run(workflow: Workflow<'_>, output: &Path) -> Result<Report, ReorientError> {
    match workflow {
        Workflow::ToCanonical { input, target } => run_to_canonical(input, output, target),
        Workflow::Restore {
            las_input,
            reference,
            target,
        } => run_restore(las_input, reference, output, target),
    }
}

/// Load `input`, reorient it to `target` and save the result to `output`.
pub fn run_to_canonical(
    input: &Path,
    output: &Path,
    target: AxisCode,
) -> Result<Report, ReorientError> {
    let loaded = load(input)?;
    let (volume, report) = to_canonical(&loaded.volume, target)?;
    save(&LoadedVolume { volume, ..loaded }, output)?;
    Ok(Report::ToCanonical(report))
}

/// Load an LAS volume and its reference, restore and save the result with
/// the LAS volume's own header fields.
pub fn run_restore(
    las_input: &Path,
    reference: &Path,
    output: &Path,
    target: RestoreTarget,
) -> Result<Report, ReorientError> {
    let las = load(las_input)?;
    let reference = load(reference)?;
    let (volume, report) = restore(&las.volume, &reference.volume, target)?;
    save(&LoadedVolume { volume, ..las }, output)?;
    Ok(Report::Restore(report))
}
