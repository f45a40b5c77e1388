use burn::tensor::Tensor;
use burn_ndarray::NdArray;
use hyseg_core::geometry::{Point3, Spacing3};
use hyseg_core::image::{GridExtent, Image};
use proptest::prelude::*;

type Backend = NdArray<f32>;

proptest! {
    #[test]
    fn test_coordinate_roundtrip(
        ox in -100.0f64..100.0, oy in -100.0f64..100.0, oz in -100.0f64..100.0,
        sx in 0.1f64..5.0, sy in 0.1f64..5.0, sz in 0.1f64..5.0,
        px in -50.0f64..50.0, py in -50.0f64..50.0, pz in -50.0f64..50.0
    ) {
        let device = Default::default();
        // Use minimal data tensor as we don't access it
        let data = Tensor::<Backend, 3>::zeros([2, 2, 2], &device);
        let image = Image::new(data, Point3::new(ox, oy, oz), Spacing3::new(sx, sy, sz));

        let point = Point3::new(px, py, pz);
        let index = image.physical_to_index(&point);
        let recovered = image.index_to_physical(&index);

        prop_assert!((point.x - recovered.x).abs() < 1e-9, "X mismatch: {} vs {}", point.x, recovered.x);
        prop_assert!((point.y - recovered.y).abs() < 1e-9, "Y mismatch: {} vs {}", point.y, recovered.y);
        prop_assert!((point.z - recovered.z).abs() < 1e-9, "Z mismatch: {} vs {}", point.z, recovered.z);
    }

    #[test]
    fn test_index_coords_roundtrip(
        w in 1usize..20, h in 1usize..20, d in 1usize..20,
        seed in 0usize..10_000
    ) {
        let extent = GridExtent::new(w, h, d);
        let idx = seed % extent.len();
        let [x, y, z] = extent.coords(idx);
        prop_assert!(x < w && y < h && z < d);
        prop_assert_eq!(extent.index(x, y, z), idx);
    }

    #[test]
    fn test_neighbors_are_symmetric(
        w in 1usize..8, h in 1usize..8, d in 1usize..8,
        seed in 0usize..10_000
    ) {
        let extent = GridExtent::new(w, h, d);
        let idx = seed % extent.len();
        for n in extent.neighbors(idx) {
            prop_assert!(extent.neighbors(n).any(|m| m == idx));
        }
    }
}
