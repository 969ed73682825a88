use crate::{
    enums::SortBy,
    volume::{AnyVolume, Volume, VolumeError},
};

use dicom::{
    object::{FileDicomObject, InMemDicomObject, open_file},
    pixeldata::{ConvertOptions, PixelDecoder, VoiLutOption},
};
use dicom_dictionary_std::tags;
use nalgebra::{Matrix4, Vector3};
use ndarray::{Array2, Array3, s};
use nifti::{
    DataElement, InMemNiftiVolume, IntoNdArray, NiftiError, NiftiHeader, NiftiObject, NiftiType,
    ReaderOptions,
};
use rayon::prelude::*;
use std::{fs, path::Path};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum VolumeLoaderError {
    #[error("No valid DICOM images found")]
    NoValidImages,

    #[error("Inconsistent image dimensions")]
    InconsistentDimensions,

    #[error("Missing orientation or spacing information")]
    MissingGeometry,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DICOM error: {0}")]
    Dicom(#[from] dicom::object::ReadError),

    #[error("NIfTI error: {0}")]
    Nifti(#[from] nifti::NiftiError),

    #[error("Malformed volume: {0}")]
    Volume(#[from] VolumeError),
}

/// Plane geometry shared by every slice of a DICOM series, in LPS.
#[derive(Debug, Clone, Copy)]
struct SeriesGeometry {
    row_direction: Vector3<f64>,
    column_direction: Vector3<f64>,
    /// Distance between rows, then between columns
    pixel_spacing: (f64, f64),
    slice_thickness: Option<f64>,
}

impl SeriesGeometry {
    fn normal(&self) -> Vector3<f64> {
        self.row_direction.cross(&self.column_direction)
    }
}

struct DecodedSlice {
    order: Option<f32>,
    position: Option<Vector3<f64>>,
    image: Array2<f32>,
}

/// A volume together with the NIfTI header it was read with, if any.
#[derive(Debug, Clone)]
pub struct LoadedVolume {
    pub volume: AnyVolume,
    /// `None` for DICOM series
    pub header: Option<NiftiHeader>,
}

pub struct VolumeLoader;

impl VolumeLoader {
    /// Load a volume from `path`: a directory is read as a DICOM series, any
    /// other path as a NIfTI-1 file (`.nii` or `.nii.gz`).
    pub fn load(path: impl AsRef<Path>) -> Result<LoadedVolume, VolumeLoaderError> {
        let path = path.as_ref();
        let loaded = if path.is_dir() {
            LoadedVolume {
                volume: Self::load_from_directory(path, SortBy::default())?.into(),
                header: None,
            }
        } else {
            Self::load_nifti(path)?
        };
        info!(
            path = %path.display(),
            shape = ?loaded.volume.shape(),
            samples = loaded.volume.sample_type(),
            "loaded volume"
        );
        Ok(loaded)
    }

    /// Load a NIfTI-1 file in its stored sample type.
    ///
    /// Files with a non-trivial `scl_slope`/`scl_inter` are scaled on load and
    /// become floating point: `f32` for samples of up to 16 bits, `f64` above.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, is not NIfTI, has an
    /// unsupported datatype, is not 3D or its affine is singular
    pub fn load_nifti(path: impl AsRef<Path>) -> Result<LoadedVolume, VolumeLoaderError> {
        let object = ReaderOptions::new().read_file(path.as_ref())?;
        let header = object.header().clone();
        let affine = Self::header_affine(&header);
        let datatype = header.data_type()?;
        let scaled = header.scl_slope != 0.0 && (header.scl_slope != 1.0 || header.scl_inter != 0.0);
        let samples = if scaled {
            object.into_volume()
        } else {
            // An identity slope is still applied through f32, which would
            // round 32 and 64 bit integers.
            InMemNiftiVolume::from_raw_fields(
                header.dim,
                datatype,
                0.0,
                0.0,
                object.into_volume().into_raw_data(),
                header.endianness,
            )?
        };

        let volume = match (datatype, scaled) {
            (NiftiType::Float64, _)
            | (NiftiType::Int32 | NiftiType::Uint32 | NiftiType::Int64 | NiftiType::Uint64, true) => {
                Self::nifti_samples::<f64>(samples, affine)?.into()
            }
            (NiftiType::Float32, _)
            | (NiftiType::Uint8 | NiftiType::Int8 | NiftiType::Uint16 | NiftiType::Int16, true) => {
                Self::nifti_samples::<f32>(samples, affine)?.into()
            }
            (NiftiType::Uint8, false) => Self::nifti_samples::<u8>(samples, affine)?.into(),
            (NiftiType::Int8, false) => Self::nifti_samples::<i8>(samples, affine)?.into(),
            (NiftiType::Uint16, false) => Self::nifti_samples::<u16>(samples, affine)?.into(),
            (NiftiType::Int16, false) => Self::nifti_samples::<i16>(samples, affine)?.into(),
            (NiftiType::Uint32, false) => Self::nifti_samples::<u32>(samples, affine)?.into(),
            (NiftiType::Int32, false) => Self::nifti_samples::<i32>(samples, affine)?.into(),
            (NiftiType::Uint64, false) => Self::nifti_samples::<u64>(samples, affine)?.into(),
            (NiftiType::Int64, false) => Self::nifti_samples::<i64>(samples, affine)?.into(),
            (other, _) => return Err(NiftiError::UnsupportedDataType(other).into()),
        };
        debug!(?datatype, scaled, "decoded NIfTI samples");

        Ok(LoadedVolume {
            volume,
            header: Some(header),
        })
    }

    fn nifti_samples<T: DataElement>(
        samples: InMemNiftiVolume,
        affine: Matrix4<f64>,
    ) -> Result<Volume<T>, VolumeLoaderError> {
        Ok(Volume::from_dyn(samples.into_ndarray::<T>()?, affine)?)
    }

    /// Voxel-to-world affine stored in a NIfTI header: the sform when present,
    /// then the qform, then plain voxel scaling.
    pub fn header_affine(header: &NiftiHeader) -> Matrix4<f64> {
        let pixdim = header.pixdim.map(f64::from);
        if header.sform_code > 0 {
            let [x, y, z] = [header.srow_x, header.srow_y, header.srow_z].map(|row| row.map(f64::from));
            #[rustfmt::skip]
            let affine = Matrix4::new(
                x[0], x[1], x[2], x[3],
                y[0], y[1], y[2], y[3],
                z[0], z[1], z[2], z[3],
                0.0, 0.0, 0.0, 1.0,
            );
            affine
        } else if header.qform_code > 0 {
            let b = f64::from(header.quatern_b);
            let c = f64::from(header.quatern_c);
            let d = f64::from(header.quatern_d);
            let a = (1.0 - (b * b + c * c + d * d)).max(0.0).sqrt();
            let qfac = if pixdim[0] < 0.0 { -1.0 } else { 1.0 };

            let (dx, dy, dz) = (pixdim[1], pixdim[2], pixdim[3] * qfac);
            #[rustfmt::skip]
            let affine = Matrix4::new(
                (a * a + b * b - c * c - d * d) * dx, 2.0 * (b * c - a * d) * dy, 2.0 * (b * d + a * c) * dz, f64::from(header.quatern_x),
                2.0 * (b * c + a * d) * dx, (a * a + c * c - b * b - d * d) * dy, 2.0 * (c * d - a * b) * dz, f64::from(header.quatern_y),
                2.0 * (b * d - a * c) * dx, 2.0 * (c * d + a * b) * dy, (a * a + d * d - b * b - c * c) * dz, f64::from(header.quatern_z),
                0.0, 0.0, 0.0, 1.0,
            );
            affine
        } else {
            Matrix4::from_diagonal(&nalgebra::Vector4::new(pixdim[1], pixdim[2], pixdim[3], 1.0))
        }
    }

    /// Load a volume from DICOM objects
    ///
    /// # Arguments
    ///
    /// * `dicom_objects` - Slice of DICOM file objects
    /// * `sort_by` - Method to sort the slices
    ///
    /// # Errors
    ///
    /// Returns error if no valid images found, dimensions are inconsistent or
    /// the series carries no orientation and spacing
    pub fn load_from_dicom_objects(
        dicom_objects: &[FileDicomObject<InMemDicomObject>],
        sort_by: SortBy,
    ) -> Result<Volume<f32>, VolumeLoaderError> {
        let geometry =
            Self::get_geometry(dicom_objects).ok_or(VolumeLoaderError::MissingGeometry)?;

        let mut slices: Vec<_> = dicom_objects
            .par_iter()
            .filter_map(|dicom_object| Self::extract_slice(dicom_object, &sort_by, &geometry))
            .collect();

        if slices.is_empty() {
            return Err(VolumeLoaderError::NoValidImages);
        }

        Self::sort_slices(&mut slices, sort_by);
        Self::validate_dimensions(&slices)?;

        let affine = Self::build_affine(&slices, &geometry);
        let volume_array = Self::build_volume_array(&slices);
        debug!(slices = slices.len(), "assembled DICOM series");

        Ok(Volume::new(volume_array, affine)?)
    }

    /// Load a volume from file paths
    pub fn load_from_file_paths(
        paths: &[impl AsRef<Path>],
        sort_by: SortBy,
    ) -> Result<Volume<f32>, VolumeLoaderError> {
        let objects: Result<Vec<_>, _> =
            paths.iter().map(|path| open_file(path.as_ref())).collect();

        Self::load_from_dicom_objects(&objects?, sort_by)
    }

    /// Load a volume from a directory containing .dcm files
    pub fn load_from_directory(
        path: impl AsRef<Path>,
        sort_by: SortBy,
    ) -> Result<Volume<f32>, VolumeLoaderError> {
        let paths: Vec<_> = fs::read_dir(path.as_ref())?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .and_then(|s| s.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("dcm"))
            })
            .collect();

        if paths.is_empty() {
            return Err(VolumeLoaderError::NoValidImages);
        }

        Self::load_from_file_paths(&paths, sort_by)
    }

    fn extract_slice(
        dicom_object: &FileDicomObject<InMemDicomObject>,
        sort_by: &SortBy,
        geometry: &SeriesGeometry,
    ) -> Option<DecodedSlice> {
        let position = Self::get_position(dicom_object);
        let order = Self::get_sort_order(dicom_object, sort_by, position, geometry)?;
        let image = Self::decode_image(dicom_object)?;
        Some(DecodedSlice {
            order,
            position,
            image,
        })
    }

    fn get_position(dicom_object: &FileDicomObject<InMemDicomObject>) -> Option<Vector3<f64>> {
        let pos = dicom_object
            .element(tags::IMAGE_POSITION_PATIENT)
            .ok()?
            .to_multi_float32()
            .ok()?;
        match pos.as_slice() {
            &[x, y, z, ..] => Some(Vector3::new(x, y, z).cast::<f64>()),
            _ => None,
        }
    }

    fn get_sort_order(
        dicom_object: &FileDicomObject<InMemDicomObject>,
        sort_by: &SortBy,
        position: Option<Vector3<f64>>,
        geometry: &SeriesGeometry,
    ) -> Option<Option<f32>> {
        match sort_by {
            SortBy::ImagePositionPatient => {
                let position = position?;
                Some(Some(position.dot(&geometry.normal()) as f32))
            }
            SortBy::TablePosition => {
                let pos = dicom_object
                    .element(tags::TABLE_POSITION)
                    .ok()?
                    .to_float32()
                    .ok();
                Some(pos)
            }
            SortBy::InstanceNumber => {
                let num = dicom_object
                    .element(tags::INSTANCE_NUMBER)
                    .ok()?
                    .to_int::<i32>()
                    .ok()
                    .map(|n| n as f32);
                Some(num)
            }
            SortBy::None => Some(Some(0.0)),
        }
    }

    /// Stored values after the modality rescale only, so CT keeps its
    /// Hounsfield units and no window is applied.
    fn decode_image(dicom_object: &FileDicomObject<InMemDicomObject>) -> Option<Array2<f32>> {
        let pixel_data = dicom_object.decode_pixel_data().ok()?;
        let options = ConvertOptions::new().with_voi_lut(VoiLutOption::Identity);
        pixel_data
            .to_ndarray_with_options::<f32>(&options)
            .ok()
            .map(|arr| arr.slice_move(s![0, .., .., 0]))
    }

    fn sort_slices(slices: &mut [DecodedSlice], sort_by: SortBy) {
        if !matches!(sort_by, SortBy::None) {
            slices.sort_by(|a, b| {
                a.order
                    .partial_cmp(&b.order)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }
    }

    fn validate_dimensions(slices: &[DecodedSlice]) -> Result<(), VolumeLoaderError> {
        let first_dim = slices[0].image.dim();
        if slices.iter().any(|slice| slice.image.dim() != first_dim) {
            return Err(VolumeLoaderError::InconsistentDimensions);
        }
        Ok(())
    }

    fn build_volume_array(slices: &[DecodedSlice]) -> Array3<f32> {
        let (height, width) = slices[0].image.dim();
        let depth = slices.len();
        let mut volume = Array3::<f32>::zeros((depth, height, width));

        for (i, slice) in slices.iter().enumerate() {
            volume
                .slice_mut(s![i, .., ..])
                .assign(&slice.image);
        }

        volume
    }

    /// Affine for an array laid out `(slice, row, column)`, converted from
    /// DICOM's LPS patient frame to RAS.
    fn build_affine(slices: &[DecodedSlice], geometry: &SeriesGeometry) -> Matrix4<f64> {
        let (row_spacing, column_spacing) = geometry.pixel_spacing;
        let first = slices[0].position.unwrap_or_else(Vector3::zeros);

        let fallback_step = geometry.normal() * geometry.slice_thickness.unwrap_or(1.0);
        let slice_step = match (slices.first(), slices.last()) {
            (Some(head), Some(tail)) if slices.len() > 1 => match (head.position, tail.position) {
                (Some(a), Some(b)) if (b - a).norm() > f64::EPSILON => {
                    (b - a) / (slices.len() - 1) as f64
                }
                _ => fallback_step,
            },
            _ => fallback_step,
        };

        let mut affine = Matrix4::<f64>::identity();
        affine.fixed_view_mut::<3, 1>(0, 0).copy_from(&slice_step);
        affine
            .fixed_view_mut::<3, 1>(0, 1)
            .copy_from(&(geometry.column_direction * row_spacing));
        affine
            .fixed_view_mut::<3, 1>(0, 2)
            .copy_from(&(geometry.row_direction * column_spacing));
        affine.fixed_view_mut::<3, 1>(0, 3).copy_from(&first);

        let lps_to_ras = Matrix4::from_diagonal(&nalgebra::Vector4::new(-1.0, -1.0, 1.0, 1.0));
        lps_to_ras * affine
    }

    fn get_geometry(dicom_objects: &[FileDicomObject<InMemDicomObject>]) -> Option<SeriesGeometry> {
        dicom_objects.iter().find_map(|dicom_object| {
            let orientation = dicom_object
                .element(tags::IMAGE_ORIENTATION_PATIENT)
                .ok()?
                .to_multi_float32()
                .ok()?;

            let pixel_spacing = dicom_object
                .element(tags::PIXEL_SPACING)
                .ok()?
                .to_multi_float32()
                .ok()?;

            let slice_thickness = dicom_object
                .element(tags::SLICE_THICKNESS)
                .ok()
                .and_then(|element| element.to_float32().ok())
                .map(f64::from);

            let (&[rx, ry, rz, cx, cy, cz, ..], &[row_spacing, column_spacing, ..]) =
                (&orientation[..], &pixel_spacing[..])
            else {
                return None;
            };

            Some(SeriesGeometry {
                row_direction: Vector3::new(rx, ry, rz).cast::<f64>(),
                column_direction: Vector3::new(cx, cy, cz).cast::<f64>(),
                pixel_spacing: (f64::from(row_spacing), f64::from(column_spacing)),
                slice_thickness,
            })
        })
    }
}
