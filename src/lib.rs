//! # volume-reorient
//!
//! This crate normalizes and restores the spatial orientation of 3D medical
//! volumes such as scans and their segmentation masks.
//!
//! A [`Volume`] is a voxel array plus an affine mapping voxel indices to
//! physical RAS+ coordinates. Its orientation is named by a three-letter
//! [`AxisCode`] (for example `LAS`: Left, Anterior, Superior) and handled
//! internally as an [`OrientationTransform`]: for each output axis, the input
//! axis it comes from and whether it is traversed in reverse.
//!
//! Reorientation only permutes and flips axes. Voxel values are never
//! resampled or interpolated, and the affine is updated so every voxel keeps
//! its physical position.
//!
//! Three workflows are built on one composition primitive:
//!  - to-canonical: any volume to LAS (or another target code)
//!  - restore: an LAS volume back to a reference volume's own orientation
//!  - restore assuming canonical: the same, taking the reference to be LAS
//!    without checking; the reference's true code is still reported
//!
//! Volumes are read from NIfTI-1 files or DICOM series directories and
//! written as NIfTI-1. NIfTI samples keep their stored type through an
//! [`AnyVolume`], and the input's header fields are carried to the output.
//!
//! # Examples
//!
//! ## Reorienting a NIfTI volume to LAS
//!
//! ```no_run
//! # use volume_reorient::{AxisCode, VolumeLoader, VolumeWriter, pipeline};
//! let loaded = VolumeLoader::load("scan.nii.gz").expect("should have loaded volume");
//! let (las, report) =
//!     pipeline::to_canonical(&loaded.volume, AxisCode::LAS).expect("should have reoriented");
//! println!("{} -> {}", report.input_axcodes, report.output_axcodes);
//! VolumeWriter::save_any(&las, "scan_las.nii.gz", loaded.header.as_ref())
//!     .expect("should have saved volume");
//! ```
//!
//! ## Composing orientations directly
//!
//! ```
//! # use volume_reorient::{AxisCode, OrientationTransform};
//! let ras: AxisCode = "RAS".parse().unwrap();
//! let transform = ras.to_transform().compose(&AxisCode::LAS.to_transform()).unwrap();
//! assert_eq!(
//!     transform,
//!     OrientationTransform::from_pairs([(0, -1), (1, 1), (2, 1)]).unwrap()
//! );
//! ```

pub mod axcodes;
pub mod enums;
pub mod orientation;
pub mod pipeline;
pub mod reorient;
pub mod volume;
pub mod volume_loader;
pub mod volume_writer;

pub use axcodes::{AxisCode, ParseAxisCodeError};
pub use enums::{Sign, SortBy, WorldAxis};
pub use orientation::{AxisMap, OrientationError, OrientationTransform, compose};
pub use reorient::{Reorientable, Reorienter};
pub use volume::{AnyVolume, Volume, VolumeError};
pub use volume_loader::{LoadedVolume, VolumeLoader, VolumeLoaderError};
pub use volume_writer::{VolumeWriter, VolumeWriterError};
