//! Noise-level conditioning: sigma → c_noise → shared MLP embedding →
//! per-block channel offsets.
//!
//! c_noise = 0.25 · ln(max(sigma, 1e-6))
//! hidden  = silu(W_h · [c_noise] + b_h)        [H]
//! embed   = W_o · hidden + b_o                 [E]
//! offset  = W_p · embed + b_p                  [block out_channels]
//!
//! The offset is broadcast over every spatial position of the block output.

use tracing::warn;

use crate::error::{Result, UNetError};
use crate::model::{BlockProjection, LinearLayer, TimeEmbeddingMlp};
use crate::tensor::{silu_f32, ActivationTensor};

/// Floor applied to sigma before the log.
pub const CNOISE_EPS: f32 = 1e-6;

/// Noise-level transform. Total over all f32: zero, negative and NaN sigma
/// all clamp to `CNOISE_EPS`.
pub fn cnoise(sigma: f32) -> f32 {
    0.25 * sigma.max(CNOISE_EPS).ln()
}

/// y[o] = bias[o] + Σ_i w[o, i] · x[i].
pub fn linear(x: &[f32], layer: &LinearLayer) -> Result<Vec<f32>> {
    layer.validate("linear")?;
    if x.len() != layer.input_dim {
        return Err(UNetError::LengthMismatch {
            op: "linear",
            expected: layer.input_dim,
            found: x.len(),
        });
    }
    Ok((0..layer.output_dim)
        .map(|o| {
            let mut acc = layer.bias[o];
            for (i, &xi) in x.iter().enumerate() {
                acc += layer.weight(o, i) * xi;
            }
            acc
        })
        .collect())
}

/// Returns (hidden, embedding). Only the hidden layer is activated.
pub fn run_time_embedding_mlp(c_noise: f32, mlp: &TimeEmbeddingMlp) -> Result<(Vec<f32>, Vec<f32>)> {
    let hidden: Vec<f32> = linear(&[c_noise], &mlp.hidden_layer)?
        .into_iter()
        .map(silu_f32)
        .collect();
    let embedding = linear(&hidden, &mlp.output_layer)?;
    Ok((hidden, embedding))
}

/// The per-channel offset vector a block adds for this embedding.
pub fn block_conditioning(embedding: &[f32], projection: &BlockProjection) -> Result<Vec<f32>> {
    linear(embedding, &projection.0)
}

/// tensor'[c, h, w] = tensor[c, h, w] + offsets[c].
///
/// Channels past the end of `offsets` get 0. The model wiring never produces
/// a short vector; hitting this path is logged.
pub fn add_channel_offsets(tensor: &ActivationTensor, offsets: &[f32]) -> Result<ActivationTensor> {
    tensor.check_extents()?;
    let (channels, height, width) = tensor.shape();
    if offsets.len() < channels {
        warn!(
            channels,
            offsets = offsets.len(),
            "conditioning vector shorter than channel count; padding with zeros"
        );
    }
    Ok(ActivationTensor::from_fn(channels, height, width, |c, h, w| {
        tensor.get(c, h, w) + offsets.get(c).copied().unwrap_or(0.0)
    }))
}

/// Project the embedding and add it to every spatial position of `tensor`.
pub fn apply_block_conditioning(
    tensor: &ActivationTensor,
    embedding: &[f32],
    projection: &BlockProjection,
) -> Result<ActivationTensor> {
    let offsets = block_conditioning(embedding, projection)?;
    add_channel_offsets(tensor, &offsets)
}
