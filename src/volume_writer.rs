use crate::volume::{AnyVolume, Volume, each_volume};

use bytemuck::Pod;
use nifti::{DataElement, NiftiHeader, writer::WriterOptions};
use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::info;

/// NIfTI code for an sform aligned to some anatomical reference.
const XFORM_ALIGNED_ANAT: i16 = 2;

#[derive(Debug, Error)]
pub enum VolumeWriterError {
    #[error("Unsupported output file name {0:?}, expected .nii or .nii.gz")]
    UnsupportedExtension(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("NIfTI error: {0}")]
    Nifti(#[from] nifti::NiftiError),
}

pub struct VolumeWriter;

impl VolumeWriter {
    /// Save `volume` as a single-file NIfTI-1 image with a fresh header,
    /// gzip compressed when the name ends in `.nii.gz`.
    pub fn save<T>(volume: &Volume<T>, path: impl AsRef<Path>) -> Result<(), VolumeWriterError>
    where
        T: DataElement + Pod,
    {
        Self::save_with_header(volume, path, None)
    }

    /// Save a volume of any sample type, keeping that type on disk.
    pub fn save_any(
        volume: &AnyVolume,
        path: impl AsRef<Path>,
        reference: Option<&NiftiHeader>,
    ) -> Result<(), VolumeWriterError> {
        let path = path.as_ref();
        each_volume!(volume, volume => Self::save_with_header(volume, path, reference))
    }

    /// Save `volume`, copying the fields of `reference` that do not describe
    /// the data layout or the affine.
    ///
    /// The image is written inside a hidden directory next to `path` and
    /// renamed over it once complete, so a failed write never leaves a
    /// partial file behind.
    pub fn save_with_header<T>(
        volume: &Volume<T>,
        path: impl AsRef<Path>,
        reference: Option<&NiftiHeader>,
    ) -> Result<(), VolumeWriterError>
    where
        T: DataElement + Pod,
    {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .filter(|name| name.ends_with(".nii") || name.ends_with(".nii.gz"))
            .ok_or_else(|| VolumeWriterError::UnsupportedExtension(path.to_path_buf()))?;

        let directory = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        // The writer rebuilds the extension from the last dot, so the staged
        // name must not carry any dot of its own before `.nii`.
        let staged_name = if file_name.ends_with(".gz") {
            "volume.nii.gz"
        } else {
            "volume.nii"
        };
        let staging = tempfile::Builder::new().prefix(".").tempdir_in(directory)?;
        let staged = staging.path().join(staged_name);

        let header = Self::header_for(volume, reference);
        WriterOptions::new(&staged)
            .reference_header(&header)
            .write_nifti(volume.data())?;
        fs::rename(&staged, path)?;

        info!(
            path = %path.display(),
            shape = ?volume.shape(),
            datatype = ?T::DATA_TYPE,
            "saved volume"
        );
        Ok(())
    }

    /// Header carrying the volume's affine as an sform; the qform is left
    /// unset so readers cannot pick a stale rotation.
    ///
    /// The sform code comes from `reference` (its sform code, else its qform
    /// code) and falls back to aligned-anatomical.
    pub fn header_for<T>(volume: &Volume<T>, reference: Option<&NiftiHeader>) -> NiftiHeader {
        let affine = volume.affine();
        let row = |r: usize| {
            [
                affine[(r, 0)] as f32,
                affine[(r, 1)] as f32,
                affine[(r, 2)] as f32,
                affine[(r, 3)] as f32,
            ]
        };

        let sform_code = reference
            .and_then(|header| {
                [header.sform_code, header.qform_code]
                    .into_iter()
                    .find(|&code| code > 0)
            })
            .unwrap_or(XFORM_ALIGNED_ANAT);

        let base = reference.cloned().unwrap_or_default();
        let mut pixdim = base.pixdim;
        for axis in 0..3 {
            pixdim[axis + 1] = affine.fixed_view::<3, 1>(0, axis).norm() as f32;
        }

        NiftiHeader {
            sform_code,
            qform_code: 0,
            srow_x: row(0),
            srow_y: row(1),
            srow_z: row(2),
            pixdim,
            ..base
        }
    }
}
