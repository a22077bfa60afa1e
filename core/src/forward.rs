//! Full forward pass: c_noise → MLP → input conv → encoder → pool →
//! bottleneck → upsample → skip concat → decoder → output conv.
//!
//! Every stage output is kept in `ForwardPassState` so the viewer can draw
//! the whole trace. Conditioned blocks add their offset after SiLU:
//!   x = silu(conv(x)) + proj(embedding)
//! The output conv has neither activation nor conditioning.

use rand::Rng;
use serde::Serialize;
use tracing::debug;

use crate::conditioning::{add_channel_offsets, block_conditioning, cnoise, run_time_embedding_mlp};
use crate::conv2d::conv2d;
use crate::error::Result;
use crate::model::{ConvLayer, TinyUNet};
use crate::tensor::{avg_pool_2x, concat_channels, nearest_upsample_2x, silu, ActivationTensor};

/// Pipeline position of a recorded tensor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Input,
    AfterInputConv,
    AfterEncoder,
    AfterDownsample,
    AfterBottleneck,
    AfterUpsample,
    AfterSkipConcat,
    AfterDecoder,
    Output,
}

impl Stage {
    pub const ALL: [Stage; 9] = [
        Stage::Input,
        Stage::AfterInputConv,
        Stage::AfterEncoder,
        Stage::AfterDownsample,
        Stage::AfterBottleneck,
        Stage::AfterUpsample,
        Stage::AfterSkipConcat,
        Stage::AfterDecoder,
        Stage::Output,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Stage::Input => "input",
            Stage::AfterInputConv => "after_input_conv",
            Stage::AfterEncoder => "after_encoder",
            Stage::AfterDownsample => "after_downsample",
            Stage::AfterBottleneck => "after_bottleneck",
            Stage::AfterUpsample => "after_upsample",
            Stage::AfterSkipConcat => "after_skip_concat",
            Stage::AfterDecoder => "after_decoder",
            Stage::Output => "output",
        }
    }
}

/// Offsets each conditioned block added. None where the layer has no projection.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct BlockConditioning {
    pub input_conv: Option<Vec<f32>>,
    pub encoder: Option<Vec<f32>>,
    pub bottleneck: Option<Vec<f32>>,
    pub decoder: Option<Vec<f32>>,
}

/// Everything one forward pass computed. Owned by the caller; the model is
/// never written.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ForwardPassState {
    pub sigma: f32,
    pub c_noise: f32,
    /// MLP hidden activations: [H]
    pub hidden: Vec<f32>,
    /// Shared noise embedding: [E]
    pub embedding: Vec<f32>,
    pub conditioning: BlockConditioning,

    pub input: ActivationTensor,
    pub after_input_conv: ActivationTensor,
    /// Also the skip tensor.
    pub after_encoder: ActivationTensor,
    pub after_downsample: ActivationTensor,
    pub after_bottleneck: ActivationTensor,
    pub after_upsample: ActivationTensor,
    /// [upsampled channels ++ skip channels]
    pub after_skip_concat: ActivationTensor,
    pub after_decoder: ActivationTensor,
    /// Predicted noise, same shape as `input`.
    pub output: ActivationTensor,
}

impl ForwardPassState {
    pub fn stage(&self, stage: Stage) -> &ActivationTensor {
        match stage {
            Stage::Input => &self.input,
            Stage::AfterInputConv => &self.after_input_conv,
            Stage::AfterEncoder => &self.after_encoder,
            Stage::AfterDownsample => &self.after_downsample,
            Stage::AfterBottleneck => &self.after_bottleneck,
            Stage::AfterUpsample => &self.after_upsample,
            Stage::AfterSkipConcat => &self.after_skip_concat,
            Stage::AfterDecoder => &self.after_decoder,
            Stage::Output => &self.output,
        }
    }

    /// The nine recorded tensors in pipeline order.
    pub fn stages(&self) -> [(Stage, &ActivationTensor); 9] {
        Stage::ALL.map(|s| (s, self.stage(s)))
    }
}

fn record(stage: Stage, tensor: &ActivationTensor) {
    debug!(stage = stage.label(), shape = ?tensor.shape(), "forward stage");
}

/// silu(conv(x)), plus the projected embedding when the layer has one.
fn conv_block(
    x: &ActivationTensor,
    layer: &ConvLayer,
    embedding: &[f32],
) -> Result<(ActivationTensor, Option<Vec<f32>>)> {
    let activated = silu(&conv2d(x, layer)?)?;
    match &layer.projection {
        Some(projection) => {
            let offsets = block_conditioning(embedding, projection)?;
            let conditioned = add_channel_offsets(&activated, &offsets)?;
            Ok((conditioned, Some(offsets)))
        }
        None => Ok((activated, None)),
    }
}

/// Run the fixed pipeline on `input` at noise level `sigma`.
///
/// Fails with a shape error if `input` does not have the model's input
/// channel count or has odd spatial dims.
pub fn forward_pass(model: &TinyUNet, input: ActivationTensor, sigma: f32) -> Result<ForwardPassState> {
    // Stage 0: noise embedding
    let c_noise = cnoise(sigma);
    let (hidden, embedding) = run_time_embedding_mlp(c_noise, &model.time_embed_mlp)?;
    record(Stage::Input, &input);

    // Stage 1: input conv
    let (after_input_conv, input_offsets) = conv_block(&input, &model.input_conv, &embedding)?;
    record(Stage::AfterInputConv, &after_input_conv);

    // Stage 2: encoder (kept for the skip)
    let (after_encoder, encoder_offsets) = conv_block(&after_input_conv, &model.encoder_conv, &embedding)?;
    record(Stage::AfterEncoder, &after_encoder);

    // Stage 3: downsample
    let after_downsample = avg_pool_2x(&after_encoder)?;
    record(Stage::AfterDownsample, &after_downsample);

    // Stage 4: bottleneck at half resolution
    let (after_bottleneck, bottleneck_offsets) =
        conv_block(&after_downsample, &model.bottleneck_conv, &embedding)?;
    record(Stage::AfterBottleneck, &after_bottleneck);

    // Stage 5: upsample back
    let after_upsample = nearest_upsample_2x(&after_bottleneck)?;
    record(Stage::AfterUpsample, &after_upsample);

    // Stage 6: skip connection, upsampled channels first
    let after_skip_concat = concat_channels(&after_upsample, &after_encoder)?;
    record(Stage::AfterSkipConcat, &after_skip_concat);

    // Stage 7: decoder
    let (after_decoder, decoder_offsets) = conv_block(&after_skip_concat, &model.decoder_conv, &embedding)?;
    record(Stage::AfterDecoder, &after_decoder);

    // Stage 8: output projection, raw
    let output = conv2d(&after_decoder, &model.output_conv)?;
    record(Stage::Output, &output);

    Ok(ForwardPassState {
        sigma,
        c_noise,
        hidden,
        embedding,
        conditioning: BlockConditioning {
            input_conv: input_offsets,
            encoder: encoder_offsets,
            bottleneck: bottleneck_offsets,
            decoder: decoder_offsets,
        },
        input,
        after_input_conv,
        after_encoder,
        after_downsample,
        after_bottleneck,
        after_upsample,
        after_skip_concat,
        after_decoder,
        output,
    })
}

// ── Demo inputs ─────────────────────────────────────────────────────

/// Height and width of the demo inputs.
pub const SAMPLE_SIZE: usize = 2;

/// The fixed 1×2×2 gradient [[0.1, 0.4], [0.6, 0.9]].
pub fn create_sample_input() -> ActivationTensor {
    ActivationTensor::from_fn(1, SAMPLE_SIZE, SAMPLE_SIZE, |_, h, w| {
        [[0.1, 0.4], [0.6, 0.9]][h][w]
    })
}

/// A 1×2×2 input with values uniform in [0, 1).
pub fn create_random_input<R: Rng + ?Sized>(rng: &mut R) -> ActivationTensor {
    ActivationTensor::from_fn(1, SAMPLE_SIZE, SAMPLE_SIZE, |_, _, _| rng.gen::<f32>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::UNetConfig;

    #[test]
    fn test_forward_output_shape() {
        let model = TinyUNet::from_seed(&UNetConfig::reference(), 42).unwrap();
        let state = forward_pass(&model, create_sample_input(), 1.0).unwrap();
        assert_eq!(state.output.shape(), (1, 2, 2));
        assert!(state.output.data().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_forward_deterministic() {
        let model = TinyUNet::from_seed(&UNetConfig::reference(), 42).unwrap();
        let a = forward_pass(&model, create_sample_input(), 0.5).unwrap();
        let b = forward_pass(&model, create_sample_input(), 0.5).unwrap();
        assert_eq!(a, b, "Forward pass should be deterministic");
    }

    #[test]
    fn test_stages_in_pipeline_order() {
        let model = TinyUNet::from_seed(&UNetConfig::reference(), 1).unwrap();
        let state = forward_pass(&model, create_sample_input(), 2.0).unwrap();
        let labels: Vec<&str> = state.stages().iter().map(|(s, _)| s.label()).collect();
        assert_eq!(labels.first(), Some(&"input"));
        assert_eq!(labels.last(), Some(&"output"));
        assert_eq!(labels.len(), 9);
        assert_eq!(state.stage(Stage::AfterEncoder), &state.after_encoder);
    }

    #[test]
    fn test_output_conv_unconditioned() {
        let model = TinyUNet::from_seed(&UNetConfig::reference(), 3).unwrap();
        let state = forward_pass(&model, create_sample_input(), 1.0).unwrap();
        assert!(state.conditioning.input_conv.is_some());
        assert!(state.conditioning.decoder.is_some());
        let expected = conv2d(&state.after_decoder, &model.output_conv).unwrap();
        assert_eq!(state.output, expected);
    }

    #[test]
    fn test_sample_input_values() {
        let x = create_sample_input();
        assert_eq!(x.shape(), (1, 2, 2));
        assert_eq!(x.data(), &[0.1, 0.4, 0.6, 0.9]);
    }
}
