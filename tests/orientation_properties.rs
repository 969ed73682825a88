use std::collections::BTreeSet;

use nalgebra::Matrix4;
use ndarray::Array3;
use proptest::prelude::*;
use volume_reorient::{AxisMap, OrientationError, OrientationTransform, Sign, Volume};

const PERMUTATIONS: [[usize; 3]; 6] = [
    [0, 1, 2],
    [0, 2, 1],
    [1, 0, 2],
    [1, 2, 0],
    [2, 0, 1],
    [2, 1, 0],
];

fn transform_strategy() -> impl Strategy<Value = OrientationTransform> {
    (0usize..6, prop::array::uniform3(any::<bool>())).prop_map(|(perm, flips)| {
        let sources = PERMUTATIONS[perm];
        let maps = [0, 1, 2].map(|k| {
            let sign = if flips[k] { Sign::Reverse } else { Sign::Forward };
            AxisMap::new(sources[k], sign)
        });
        OrientationTransform::new(maps).unwrap()
    })
}

/// An affine close to the orientation `ornt`, with per-axis scaling, a small
/// off-axis tilt and a translation.
fn affine_strategy() -> impl Strategy<Value = Matrix4<f64>> {
    (
        transform_strategy(),
        prop::array::uniform3(0.5f64..3.0),
        prop::array::uniform9(-0.1f64..0.1),
        prop::array::uniform3(-100.0f64..100.0),
    )
        .prop_map(|(ornt, scales, tilt, offset)| {
            let mut affine = Matrix4::identity();
            for axis in 0..3 {
                for row in 0..3 {
                    affine[(row, axis)] = tilt[row * 3 + axis] * scales[axis];
                }
                let map = ornt[axis];
                affine[(map.source, axis)] = map.sign.as_f64() * scales[axis];
                affine[(axis, 3)] = offset[axis];
            }
            affine
        })
}

fn volume_strategy() -> impl Strategy<Value = Volume<i32>> {
    (1usize..5, 1usize..5, 1usize..5, affine_strategy()).prop_map(|(a, b, c, affine)| {
        let n = (a * b * c) as i32;
        let data = Array3::from_shape_vec((a, b, c), (0..n).collect()).unwrap();
        Volume::new(data, affine).unwrap()
    })
}

fn assert_affine_close(left: &Matrix4<f64>, right: &Matrix4<f64>) {
    for (l, r) in left.iter().zip(right.iter()) {
        assert!((l - r).abs() <= 1e-9 * (1.0 + r.abs()), "{left} != {right}");
    }
}

proptest! {
    #[test]
    fn reorient_round_trip_is_identity(volume in volume_strategy(), x in transform_strategy()) {
        let there = volume.as_reoriented(&x);
        let back = there.as_reoriented(&x.inverse());
        prop_assert_eq!(back.data(), volume.data());
        assert_affine_close(back.affine(), volume.affine());
    }

    #[test]
    fn composed_transform_reaches_target(volume in volume_strategy(), target in transform_strategy()) {
        let source = volume.orientation().unwrap();
        let out = volume.as_reoriented(&source.compose(&target).unwrap());
        prop_assert_eq!(out.orientation().unwrap(), target);
    }

    #[test]
    fn output_shape_follows_sources(volume in volume_strategy(), x in transform_strategy()) {
        let shape = volume.shape();
        let out = volume.as_reoriented(&x);
        prop_assert_eq!(out.shape(), x.maps().map(|map| shape[map.source]));
    }

    #[test]
    fn physical_positions_are_preserved(volume in volume_strategy(), x in transform_strategy()) {
        let out = volume.as_reoriented(&x);
        let shape = volume.shape();
        for ((i, j, k), value) in out.data().indexed_iter() {
            // Values are unique ramps, so the source voxel is recoverable.
            let flat = *value as usize;
            let old = [flat / (shape[1] * shape[2]), (flat / shape[2]) % shape[1], flat % shape[2]];
            let new_world = out.voxel_to_world([i, j, k]);
            let old_world = volume.voxel_to_world(old);
            for axis in 0..3 {
                prop_assert!((new_world[axis] - old_world[axis]).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn fuzzed_affines_yield_permutations(entries in prop::array::uniform9(-10.0f64..10.0)) {
        let mut affine = Matrix4::identity();
        for (i, value) in entries.iter().enumerate() {
            affine[(i / 3, i % 3)] = *value;
        }
        match OrientationTransform::from_affine(&affine) {
            Ok(ornt) => {
                let sources: BTreeSet<_> = ornt.maps().iter().map(|map| map.source).collect();
                prop_assert_eq!(sources, BTreeSet::from([0, 1, 2]));
            }
            Err(err) => prop_assert!(matches!(err, OrientationError::Degenerate { .. }), "expected Degenerate error, got {:?}", err),
        }
    }

    #[test]
    fn compose_with_itself_is_identity(s in transform_strategy()) {
        prop_assert!(s.compose(&s).unwrap().is_identity());
    }
}
