//! Tensor primitive tests: channel ordering of the skip concat, pooling and
//! upsampling contracts, and property checks over random buffers.

use minunet_core::conv2d::conv2d;
use minunet_core::model::ConvLayer;
use minunet_core::tensor::{
    avg_pool_2x, concat_channels, nearest_upsample_2x, silu, ActivationTensor,
};
use proptest::prelude::*;

// ── Concat ordering ──────────────────────────────────────────────────

#[test]
fn test_concat_channel_order() {
    let a = ActivationTensor::from_nested(&[
        vec![vec![1.0; 2]; 2],
        vec![vec![2.0; 2]; 2],
    ])
    .unwrap();
    let b = ActivationTensor::from_nested(&[
        vec![vec![3.0; 2]; 2],
        vec![vec![4.0; 2]; 2],
    ])
    .unwrap();

    let out = concat_channels(&a, &b).unwrap();
    assert_eq!(out.shape(), (4, 2, 2));
    for (c, expected) in [1.0, 2.0, 3.0, 4.0].into_iter().enumerate() {
        assert!(
            out.channel(c).iter().all(|&v| v == expected),
            "channel {c} should be filled with {expected}"
        );
    }

    // Swapping operands swaps the halves.
    let swapped = concat_channels(&b, &a).unwrap();
    assert_eq!(swapped.channel(0), &[3.0; 4]);
    assert_eq!(swapped.channel(3), &[2.0; 4]);
}

#[test]
fn test_concat_feeds_decoder_kernels_by_index() {
    // A decoder that only reads input channel 2 must see the skip's first channel.
    let up = ActivationTensor::filled(2, 2, 2, 10.0);
    let skip = ActivationTensor::from_nested(&[
        vec![vec![0.5, 0.5], vec![0.5, 0.5]],
        vec![vec![9.0, 9.0], vec![9.0, 9.0]],
    ])
    .unwrap();
    let mut decoder = ConvLayer::zeros("decoder_conv", 4, 1);
    decoder.kernels[2][1][1] = 1.0;
    let out = conv2d(&concat_channels(&up, &skip).unwrap(), &decoder).unwrap();
    assert_eq!(out.channel(0), &[0.5; 4]);
}

// ── Pool / upsample ──────────────────────────────────────────────────

#[test]
fn test_pool_then_upsample_is_blockwise_mean() {
    let x = ActivationTensor::from_vec(1, 2, 2, vec![1.0, 3.0, 5.0, 7.0]).unwrap();
    let round_trip = nearest_upsample_2x(&avg_pool_2x(&x).unwrap()).unwrap();
    assert_eq!(round_trip.channel(0), &[4.0; 4]);
}

#[test]
fn test_pool_keeps_channels_separate() {
    let x = ActivationTensor::from_nested(&[
        vec![vec![1.0, 1.0], vec![1.0, 1.0]],
        vec![vec![-2.0, 0.0], vec![0.0, 2.0]],
    ])
    .unwrap();
    let out = avg_pool_2x(&x).unwrap();
    assert_eq!(out.data(), &[1.0, 0.0]);
}

#[test]
fn test_pool_rejects_odd_width_only() {
    let x = ActivationTensor::zeros(2, 2, 5);
    assert!(avg_pool_2x(&x).unwrap_err().is_shape_mismatch());
}

#[test]
fn test_operators_reject_inconsistent_extents() {
    // Serialized tensors can lie about their dims.
    let forged: ActivationTensor = serde_json::from_str(
        r#"{"channels":2,"height":2,"width":2,"data":[0.0,1.0,2.0]}"#,
    )
    .unwrap();
    assert!(silu(&forged).is_err());
    assert!(avg_pool_2x(&forged).is_err());
    assert!(nearest_upsample_2x(&forged).is_err());
    assert!(concat_channels(&forged, &ActivationTensor::zeros(1, 2, 2)).is_err());
    assert!(conv2d(&forged, &ConvLayer::zeros("x", 2, 1)).is_err());
}

// ── Properties ───────────────────────────────────────────────────────

fn tensor_strategy() -> impl Strategy<Value = ActivationTensor> {
    (1usize..4, 1usize..4, 1usize..4).prop_flat_map(|(c, h, w)| {
        prop::collection::vec(-50.0f32..50.0, c * (2 * h) * (2 * w))
            .prop_map(move |data| ActivationTensor::from_vec(c, 2 * h, 2 * w, data).unwrap())
    })
}

proptest! {
    #[test]
    fn prop_silu_finite_and_shape_preserving(x in tensor_strategy()) {
        let out = silu(&x).unwrap();
        prop_assert_eq!(out.shape(), x.shape());
        prop_assert!(out.data().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn prop_silu_follows_formula_at_large_magnitude(x in tensor_strategy()) {
        // Inputs span ±50, well past where a saturating sigmoid would cut off.
        let out = silu(&x).unwrap();
        for (&v, &y) in x.data().iter().zip(out.data()) {
            prop_assert_eq!(y, v / (1.0 + (-v).exp()));
        }
    }

    #[test]
    fn prop_upsample_then_pool_is_identity_on_small_ints(
        data in prop::collection::vec(-8i32..8, 4)
    ) {
        let x = ActivationTensor::from_vec(1, 2, 2, data.iter().map(|&v| v as f32).collect()).unwrap();
        let back = avg_pool_2x(&nearest_upsample_2x(&x).unwrap()).unwrap();
        prop_assert_eq!(back, x);
    }

    #[test]
    fn prop_pool_halves_dims(x in tensor_strategy()) {
        let (c, h, w) = x.shape();
        let pooled = avg_pool_2x(&x).unwrap();
        prop_assert_eq!(pooled.shape(), (c, h / 2, w / 2));
        let up = nearest_upsample_2x(&pooled).unwrap();
        prop_assert_eq!(up.shape(), (c, h, w));
    }

    #[test]
    fn prop_concat_sizes_add(a in tensor_strategy(), extra in 1usize..3) {
        let (_, h, w) = a.shape();
        let b = ActivationTensor::filled(extra, h, w, 1.0);
        let out = concat_channels(&a, &b).unwrap();
        prop_assert_eq!(out.channels(), a.channels() + extra);
        prop_assert_eq!(&out.data()[..a.numel()], a.data());
    }
}
