//! Parameter initialization: Xavier-scaled Gaussian weights, zero biases.
//!
//! Gaussian samples come from the Box–Muller transform over two uniform draws
//! in the open interval (0, 1). The generator is always supplied by the caller,
//! so a seeded `StdRng` reproduces a model exactly.

use std::f32::consts::PI;

use rand::distributions::Open01;
use rand::Rng;

use crate::error::{Result, UNetError};
use crate::model::{BlockProjection, ConvLayer, Kernel3x3, LinearLayer, TimeEmbeddingMlp};

/// Taps in one 3×3 kernel.
pub const KERNEL_AREA: usize = 9;

/// Xavier/Glorot standard deviation: sqrt(2 / (fan_in + fan_out)).
pub fn xavier_std(fan_in: usize, fan_out: usize) -> f32 {
    (2.0 / (fan_in + fan_out) as f32).sqrt()
}

/// Box–Muller: sqrt(-2 ln u1) * cos(2π u2) * std.
///
/// `u1` must lie in (0, 1]; zero (or NaN) would push -inf/NaN into the weights.
pub fn box_muller(u1: f32, u2: f32, std: f32) -> Result<f32> {
    if !(u1 > 0.0 && u1 <= 1.0) {
        return Err(UNetError::InitializationSingularity { u1 });
    }
    Ok((-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos() * std)
}

/// One N(0, std²) sample. `Open01` never yields an endpoint.
pub fn sample_gaussian<R: Rng + ?Sized>(rng: &mut R, std: f32) -> Result<f32> {
    let u1: f32 = rng.sample(Open01);
    let u2: f32 = rng.sample(Open01);
    box_muller(u1, u2, std)
}

/// Conv layer with fan_in = in·9, fan_out = out·9. Kernels are drawn in
/// (out, in, row, col) order. No projection is attached.
pub fn create_conv_layer<R: Rng + ?Sized>(
    name: &str,
    in_channels: usize,
    out_channels: usize,
    rng: &mut R,
) -> Result<ConvLayer> {
    let std = xavier_std(in_channels * KERNEL_AREA, out_channels * KERNEL_AREA);
    let mut kernels = Vec::with_capacity(in_channels * out_channels);
    for _ in 0..in_channels * out_channels {
        let mut kernel: Kernel3x3 = [[0.0; 3]; 3];
        for row in kernel.iter_mut() {
            for tap in row.iter_mut() {
                *tap = sample_gaussian(rng, std)?;
            }
        }
        kernels.push(kernel);
    }
    Ok(ConvLayer {
        name: name.to_string(),
        in_channels,
        out_channels,
        kernels,
        bias: vec![0.0; out_channels],
        projection: None,
    })
}

/// Dense layer, weights row-major [output_dim, input_dim].
pub fn create_linear_layer<R: Rng + ?Sized>(
    input_dim: usize,
    output_dim: usize,
    rng: &mut R,
) -> Result<LinearLayer> {
    let std = xavier_std(input_dim, output_dim);
    let weights = (0..input_dim * output_dim)
        .map(|_| sample_gaussian(rng, std))
        .collect::<Result<Vec<f32>>>()?;
    Ok(LinearLayer {
        input_dim,
        output_dim,
        weights,
        bias: vec![0.0; output_dim],
    })
}

pub fn create_block_projection<R: Rng + ?Sized>(
    embedding_dim: usize,
    output_dim: usize,
    rng: &mut R,
) -> Result<BlockProjection> {
    create_linear_layer(embedding_dim, output_dim, rng).map(BlockProjection)
}

/// 1 → hidden_dim → embedding_dim.
pub fn create_time_embedding_mlp<R: Rng + ?Sized>(
    hidden_dim: usize,
    embedding_dim: usize,
    rng: &mut R,
) -> Result<TimeEmbeddingMlp> {
    Ok(TimeEmbeddingMlp {
        hidden_layer: create_linear_layer(1, hidden_dim, rng)?,
        output_layer: create_linear_layer(hidden_dim, embedding_dim, rng)?,
    })
}
