use nalgebra::Matrix4;
use ndarray::Array3;
use nifti::NiftiHeader;
use tempfile::tempdir;
use volume_reorient::pipeline::{self, ErrorKind, Report, RestoreTarget, Workflow};
use volume_reorient::{AnyVolume, AxisCode, Reorientable, Volume, VolumeLoader, VolumeWriter};

/// Affine whose axes run as `code`, with spacing 1, 2, 3 and an offset origin.
fn affine_with_code(code: &str) -> Matrix4<f64> {
    let code: AxisCode = code.parse().unwrap();
    let mut affine = Matrix4::identity();
    affine.fixed_view_mut::<3, 3>(0, 0).fill(0.0);
    for (axis, map) in code.to_transform().maps().iter().enumerate() {
        affine[(map.source, axis)] = map.sign.as_f64() * (axis as f64 + 1.0);
    }
    affine[(0, 3)] = 12.5;
    affine[(1, 3)] = -8.0;
    affine[(2, 3)] = 3.0;
    affine
}

/// Volume whose axes run as `code`, holding a ramp of values.
fn volume_with_code(code: &str) -> Volume {
    let data = Array3::from_shape_fn((4, 3, 2), |(i, j, k)| (i * 100 + j * 10 + k) as f32);
    Volume::new(data, affine_with_code(code)).unwrap()
}

#[test]
fn nifti_round_trip_keeps_data_and_affine() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("volume.nii.gz");
    let volume = volume_with_code("PIR");

    VolumeWriter::save(&volume, &path).unwrap();
    let loaded = VolumeLoader::load(&path).unwrap();

    assert_eq!(loaded.volume.axcodes().unwrap().to_string(), "PIR");
    assert_eq!(loaded.volume, AnyVolume::F32(volume));
}

#[test]
fn save_leaves_only_the_target_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("volume.nii");
    VolumeWriter::save(&volume_with_code("LAS"), &path).unwrap();

    let names: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name())
        .collect();
    assert_eq!(names, vec![std::ffi::OsString::from("volume.nii")]);
}

#[test]
fn dotted_output_names_hold_the_full_image() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("scan.nii");
    VolumeWriter::save(&volume_with_code("RAS"), &input).unwrap();

    for name in ["case.001.nii", "case.001.nii.gz"] {
        let output = dir.path().join(name);
        pipeline::run_to_canonical(&input, &output, AxisCode::LAS).unwrap();
        let loaded = VolumeLoader::load(&output).unwrap();
        assert_eq!(loaded.volume.shape(), [4, 3, 2]);
        assert_eq!(loaded.volume.axcodes().unwrap(), AxisCode::LAS);
    }
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 3);
}

#[test]
fn float64_samples_survive_reorientation() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("fine.nii.gz");
    let output = dir.path().join("fine_las.nii.gz");
    let data =
        Array3::from_shape_fn((4, 3, 2), |(i, j, k)| 0.1 + (i * 6 + j * 2 + k) as f64 * 1e-9);
    let volume = Volume::new(data, affine_with_code("RAS")).unwrap();
    VolumeWriter::save(&volume, &input).unwrap();

    pipeline::run_to_canonical(&input, &output, AxisCode::LAS).unwrap();

    assert_eq!(NiftiHeader::from_file(&output).unwrap().datatype, 64);
    let AnyVolume::F64(las) = VolumeLoader::load(&output).unwrap().volume else {
        panic!("expected f64 samples");
    };
    // RAS to LAS reverses the first axis only.
    assert_eq!(las.data()[[0, 1, 1]], volume.data()[[3, 1, 1]]);
    assert_eq!(las.data()[[3, 2, 0]], volume.data()[[0, 2, 0]]);
    assert_eq!(las.data()[[3, 0, 0]], 0.1);
}

#[test]
fn large_int32_labels_survive_restore() {
    let dir = tempdir().unwrap();
    let reference = dir.path().join("orig.nii");
    let las = dir.path().join("las.nii");
    let restored = dir.path().join("restored.nii");

    let labels =
        Array3::from_shape_fn((4, 3, 2), |(i, j, k)| (1 << 24) + 1 + (i * 6 + j * 2 + k) as i32);
    let original = Volume::new(labels, affine_with_code("RAI")).unwrap();
    VolumeWriter::save(&original, &reference).unwrap();

    pipeline::run_to_canonical(&reference, &las, AxisCode::LAS).unwrap();
    pipeline::run_restore(&las, &reference, &restored, RestoreTarget::ReferenceNative).unwrap();

    assert_eq!(NiftiHeader::from_file(&restored).unwrap().datatype, 8);
    assert_eq!(
        VolumeLoader::load(&restored).unwrap().volume,
        AnyVolume::I32(original)
    );
}

#[test]
fn input_header_fields_reach_the_output() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("scan.nii.gz");
    let output = dir.path().join("scan_las.nii.gz");
    let mut header = NiftiHeader {
        sform_code: 4,
        xyzt_units: 10,
        ..NiftiHeader::default()
    };
    header.set_description_str("spleen ct").unwrap();
    VolumeWriter::save_with_header(&volume_with_code("RAS"), &input, Some(&header)).unwrap();

    pipeline::run_to_canonical(&input, &output, AxisCode::LAS).unwrap();

    let written = NiftiHeader::from_file(&output).unwrap();
    assert_eq!(written.sform_code, 4);
    assert_eq!(written.qform_code, 0);
    assert_eq!(written.xyzt_units, 10);
    assert_eq!(&written.descrip[..9], b"spleen ct");
}

#[test]
fn to_canonical_then_restore_reproduces_original() {
    let dir = tempdir().unwrap();
    let original = dir.path().join("orig.nii.gz");
    let las = dir.path().join("las.nii.gz");
    let restored = dir.path().join("restored.nii.gz");
    let volume = volume_with_code("RAI");
    VolumeWriter::save(&volume, &original).unwrap();

    let report = pipeline::run_to_canonical(&original, &las, AxisCode::LAS).unwrap();
    let Report::ToCanonical(report) = report else {
        panic!("expected a to-canonical report");
    };
    assert_eq!(report.input_axcodes.to_string(), "RAI");
    assert_eq!(report.output_axcodes, AxisCode::LAS);
    assert_eq!(
        VolumeLoader::load(&las).unwrap().volume.axcodes().unwrap(),
        AxisCode::LAS
    );

    let report = pipeline::run(
        Workflow::Restore {
            las_input: &las,
            reference: &original,
            target: RestoreTarget::ReferenceNative,
        },
        &restored,
    )
    .unwrap();
    let Report::Restore(report) = report else {
        panic!("expected a restore report");
    };
    assert_eq!(report.las_axcodes, AxisCode::LAS);
    assert_eq!(report.restored_axcodes.to_string(), "RAI");
    assert_eq!(report.restored_axcodes, report.reference_axcodes);

    let back = VolumeLoader::load(&restored).unwrap();
    assert_eq!(back.volume, AnyVolume::F32(volume));
}

#[test]
fn restore_assuming_canonical_keeps_las_layout() {
    let dir = tempdir().unwrap();
    let reference = dir.path().join("ref.nii");
    let las = dir.path().join("las.nii");
    let output = dir.path().join("out.nii");
    VolumeWriter::save(&volume_with_code("RAS"), &reference).unwrap();
    VolumeWriter::save(&volume_with_code("LAS"), &las).unwrap();

    let report =
        pipeline::run_restore(&las, &reference, &output, RestoreTarget::AssumeCanonical).unwrap();
    let Report::Restore(report) = report else {
        panic!("expected a restore report");
    };
    assert_eq!(report.reference_axcodes, AxisCode::RAS);
    assert_eq!(report.target_axcodes, AxisCode::LAS);
    assert_eq!(report.restored_axcodes, AxisCode::LAS);
    assert!(report.mismatch());
}

#[test]
fn missing_input_is_an_io_error_and_writes_nothing() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("out.nii.gz");
    let err = pipeline::run(
        Workflow::ToCanonical {
            input: &dir.path().join("absent.nii"),
            target: AxisCode::LAS,
        },
        &output,
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
    assert!(!output.exists());
}

#[test]
fn unknown_datatype_is_a_format_error() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("broken.nii");
    let output = dir.path().join("out.nii");
    VolumeWriter::save(&volume_with_code("LAS"), &input).unwrap();

    // `datatype` sits at byte 70 of the NIfTI-1 header.
    let mut bytes = std::fs::read(&input).unwrap();
    bytes[70..72].copy_from_slice(&999i16.to_ne_bytes());
    std::fs::write(&input, bytes).unwrap();

    let err = pipeline::run_to_canonical(&input, &output, AxisCode::LAS).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Format);
    assert!(!output.exists());
}
