//! Tiny U-Net configuration, layer types and parameter accounting.
//!
//! Reference network (channels 1→2→2→2→1, MLP 1→4→8):
//!   input_conv       1 → 2   + projection 8 → 2
//!   encoder_conv     2 → 2   + projection 8 → 2
//!   bottleneck_conv  2 → 2   + projection 8 → 2   (half resolution)
//!   decoder_conv     4 → 2   + projection 8 → 2   (upsampled ++ skip)
//!   output_conv      2 → 1   no projection
//!
//! A model is built once and then only read. "New weights" means building a
//! new `TinyUNet`, never editing one.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, UNetError};
use crate::init::{
    create_block_projection, create_conv_layer, create_time_embedding_mlp, KERNEL_AREA,
};

/// Model configuration. Layer widths all derive from it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UNetConfig {
    /// Channels of the image (and of the predicted noise).
    pub in_channels: usize,
    /// Width of every internal block.
    pub base_channels: usize,
    /// Noise-embedding MLP hidden width (H).
    pub hidden_dim: usize,
    /// Shared embedding width (E) fed to every block projection.
    pub embedding_dim: usize,
}

impl UNetConfig {
    /// The configuration the inspector ships with.
    pub fn reference() -> Self {
        UNetConfig {
            in_channels: 1,
            base_channels: 2,
            hidden_dim: 4,
            embedding_dim: 8,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let dims = [
            ("in_channels", self.in_channels),
            ("base_channels", self.base_channels),
            ("hidden_dim", self.hidden_dim),
            ("embedding_dim", self.embedding_dim),
        ];
        for (label, value) in dims {
            if value == 0 {
                return Err(UNetError::InvalidConfig(format!("{label} must be positive")));
            }
        }
        Ok(())
    }
}

impl Default for UNetConfig {
    fn default() -> Self {
        Self::reference()
    }
}

/// 3×3 kernel, indexed [row][col].
pub type Kernel3x3 = [[f32; 3]; 3];

/// Dense layer: y[o] = bias[o] + Σ_i weights[o * input_dim + i] · x[i].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinearLayer {
    pub input_dim: usize,
    pub output_dim: usize,
    /// Row-major [output_dim, input_dim].
    pub weights: Vec<f32>,
    pub bias: Vec<f32>,
}

impl LinearLayer {
    pub fn zeros(input_dim: usize, output_dim: usize) -> Self {
        LinearLayer {
            input_dim,
            output_dim,
            weights: vec![0.0; input_dim * output_dim],
            bias: vec![0.0; output_dim],
        }
    }

    #[inline]
    pub fn weight(&self, o: usize, i: usize) -> f32 {
        self.weights[o * self.input_dim + i]
    }

    pub fn num_params(&self) -> usize {
        self.input_dim * self.output_dim + self.output_dim
    }

    pub fn validate(&self, name: &str) -> Result<()> {
        if self.weights.len() != self.input_dim * self.output_dim {
            return Err(UNetError::InvalidLayer {
                name: name.to_string(),
                reason: format!(
                    "{} weights for {}x{}",
                    self.weights.len(),
                    self.output_dim,
                    self.input_dim
                ),
            });
        }
        if self.bias.len() != self.output_dim {
            return Err(UNetError::InvalidLayer {
                name: name.to_string(),
                reason: format!("bias length {} != output_dim {}", self.bias.len(), self.output_dim),
            });
        }
        Ok(())
    }
}

/// Maps the shared noise embedding to one additive offset per output channel
/// of the owning conv block.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockProjection(pub LinearLayer);

impl BlockProjection {
    pub fn zeros(embedding_dim: usize, output_dim: usize) -> Self {
        BlockProjection(LinearLayer::zeros(embedding_dim, output_dim))
    }

    pub fn embedding_dim(&self) -> usize {
        self.0.input_dim
    }

    pub fn output_dim(&self) -> usize {
        self.0.output_dim
    }

    pub fn num_params(&self) -> usize {
        self.0.num_params()
    }
}

/// Same-size 3×3 convolution block with an optional noise projection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConvLayer {
    /// Diagnostic only.
    pub name: String,
    pub in_channels: usize,
    pub out_channels: usize,
    /// `kernels[oc * in_channels + ic]`.
    pub kernels: Vec<Kernel3x3>,
    pub bias: Vec<f32>,
    pub projection: Option<BlockProjection>,
}

impl ConvLayer {
    pub fn zeros(name: &str, in_channels: usize, out_channels: usize) -> Self {
        ConvLayer {
            name: name.to_string(),
            in_channels,
            out_channels,
            kernels: vec![[[0.0; 3]; 3]; in_channels * out_channels],
            bias: vec![0.0; out_channels],
            projection: None,
        }
    }

    /// Attach a projection. Its output width must equal `out_channels`.
    pub fn with_projection(mut self, projection: BlockProjection) -> Result<Self> {
        if projection.output_dim() != self.out_channels {
            return Err(UNetError::InvalidLayer {
                name: self.name,
                reason: format!(
                    "projection emits {} values for {} channels",
                    projection.output_dim(),
                    self.out_channels
                ),
            });
        }
        self.projection = Some(projection);
        Ok(self)
    }

    #[inline]
    pub fn kernel(&self, oc: usize, ic: usize) -> &Kernel3x3 {
        &self.kernels[oc * self.in_channels + ic]
    }

    /// Kernel weights plus biases; the projection is counted separately.
    pub fn num_params(&self) -> usize {
        self.out_channels * self.in_channels * KERNEL_AREA + self.out_channels
    }

    pub fn validate(&self) -> Result<()> {
        if self.kernels.len() != self.in_channels * self.out_channels {
            return Err(UNetError::InvalidLayer {
                name: self.name.clone(),
                reason: format!(
                    "{} kernels for {} in x {} out",
                    self.kernels.len(),
                    self.in_channels,
                    self.out_channels
                ),
            });
        }
        if self.bias.len() != self.out_channels {
            return Err(UNetError::InvalidLayer {
                name: self.name.clone(),
                reason: format!("bias length {} != out_channels {}", self.bias.len(), self.out_channels),
            });
        }
        if let Some(projection) = &self.projection {
            projection.0.validate(&format!("{}.projection", self.name))?;
            if projection.output_dim() != self.out_channels {
                return Err(UNetError::InvalidLayer {
                    name: self.name.clone(),
                    reason: format!(
                        "projection emits {} values for {} channels",
                        projection.output_dim(),
                        self.out_channels
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Shared noise-embedding MLP: 1 → H (SiLU) → E.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimeEmbeddingMlp {
    pub hidden_layer: LinearLayer,
    pub output_layer: LinearLayer,
}

impl TimeEmbeddingMlp {
    pub fn zeros(hidden_dim: usize, embedding_dim: usize) -> Self {
        TimeEmbeddingMlp {
            hidden_layer: LinearLayer::zeros(1, hidden_dim),
            output_layer: LinearLayer::zeros(hidden_dim, embedding_dim),
        }
    }

    pub fn hidden_dim(&self) -> usize {
        self.hidden_layer.output_dim
    }

    pub fn embedding_dim(&self) -> usize {
        self.output_layer.output_dim
    }

    pub fn num_params(&self) -> usize {
        self.hidden_layer.num_params() + self.output_layer.num_params()
    }
}

/// The whole network. Read-only once built; share it behind `&` or `Arc`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TinyUNet {
    pub config: UNetConfig,
    pub time_embed_mlp: TimeEmbeddingMlp,
    pub input_conv: ConvLayer,
    pub encoder_conv: ConvLayer,
    pub bottleneck_conv: ConvLayer,
    pub decoder_conv: ConvLayer,
    pub output_conv: ConvLayer,
}

impl TinyUNet {
    /// Draw a fresh model from `rng`. Draw order is fixed (MLP, then each conv
    /// followed by its projection), so a seeded generator reproduces it.
    pub fn new<R: Rng + ?Sized>(cfg: &UNetConfig, rng: &mut R) -> Result<Self> {
        cfg.validate()?;
        let c = cfg.base_channels;
        let e = cfg.embedding_dim;

        let time_embed_mlp = create_time_embedding_mlp(cfg.hidden_dim, e, rng)?;
        let block = |name: &str, cin: usize, cout: usize, rng: &mut R| -> Result<ConvLayer> {
            let conv = create_conv_layer(name, cin, cout, rng)?;
            conv.with_projection(create_block_projection(e, cout, rng)?)
        };
        let input_conv = block("input_conv", cfg.in_channels, c, &mut *rng)?;
        let encoder_conv = block("encoder_conv", c, c, &mut *rng)?;
        let bottleneck_conv = block("bottleneck_conv", c, c, &mut *rng)?;
        let decoder_conv = block("decoder_conv", 2 * c, c, &mut *rng)?;
        let output_conv = create_conv_layer("output_conv", c, cfg.in_channels, &mut *rng)?;

        let model = TinyUNet {
            config: cfg.clone(),
            time_embed_mlp,
            input_conv,
            encoder_conv,
            bottleneck_conv,
            decoder_conv,
            output_conv,
        };
        info!(
            params = count_parameters(&model),
            base_channels = c,
            embedding_dim = e,
            "initialized tiny unet"
        );
        Ok(model)
    }

    /// Reproducible construction from a `u64` seed.
    pub fn from_seed(cfg: &UNetConfig, seed: u64) -> Result<Self> {
        Self::new(cfg, &mut StdRng::seed_from_u64(seed))
    }

    /// Same wiring as `new`, every parameter 0. Projections are still
    /// attached so conditioning runs (and adds nothing).
    pub fn zeros(cfg: &UNetConfig) -> Result<Self> {
        cfg.validate()?;
        let c = cfg.base_channels;
        let e = cfg.embedding_dim;
        let block = |name: &str, cin: usize, cout: usize| {
            ConvLayer::zeros(name, cin, cout).with_projection(BlockProjection::zeros(e, cout))
        };
        Ok(TinyUNet {
            config: cfg.clone(),
            time_embed_mlp: TimeEmbeddingMlp::zeros(cfg.hidden_dim, e),
            input_conv: block("input_conv", cfg.in_channels, c)?,
            encoder_conv: block("encoder_conv", c, c)?,
            bottleneck_conv: block("bottleneck_conv", c, c)?,
            decoder_conv: block("decoder_conv", 2 * c, c)?,
            output_conv: ConvLayer::zeros("output_conv", c, cfg.in_channels),
        })
    }

    /// The five conv layers in pipeline order.
    pub fn conv_layers(&self) -> [&ConvLayer; 5] {
        [
            &self.input_conv,
            &self.encoder_conv,
            &self.bottleneck_conv,
            &self.decoder_conv,
            &self.output_conv,
        ]
    }

    /// Check every layer and the channel wiring between them. Needed for
    /// hand-edited or deserialized models; `new` and `zeros` always pass.
    pub fn validate(&self) -> Result<()> {
        let mlp = &self.time_embed_mlp;
        mlp.hidden_layer.validate("time_embed_mlp.hidden_layer")?;
        mlp.output_layer.validate("time_embed_mlp.output_layer")?;
        if mlp.hidden_layer.input_dim != 1 || mlp.output_layer.input_dim != mlp.hidden_dim() {
            return Err(UNetError::InvalidLayer {
                name: "time_embed_mlp".to_string(),
                reason: "layers must chain 1 -> hidden -> embedding".to_string(),
            });
        }
        for layer in self.conv_layers() {
            layer.validate()?;
            if let Some(p) = &layer.projection {
                if p.embedding_dim() != mlp.embedding_dim() {
                    return Err(UNetError::InvalidLayer {
                        name: layer.name.clone(),
                        reason: format!(
                            "projection reads {} values, embedding has {}",
                            p.embedding_dim(),
                            mlp.embedding_dim()
                        ),
                    });
                }
            }
        }
        let chain = [
            (&self.input_conv, &self.encoder_conv, self.input_conv.out_channels),
            (&self.encoder_conv, &self.bottleneck_conv, self.encoder_conv.out_channels),
            (
                &self.bottleneck_conv,
                &self.decoder_conv,
                self.bottleneck_conv.out_channels + self.encoder_conv.out_channels,
            ),
            (&self.decoder_conv, &self.output_conv, self.decoder_conv.out_channels),
        ];
        for (from, to, feeds) in chain {
            if to.in_channels != feeds {
                return Err(UNetError::InvalidLayer {
                    name: to.name.clone(),
                    reason: format!("expects {} channels, {} feeds {}", to.in_channels, from.name, feeds),
                });
            }
        }
        Ok(())
    }
}

/// Fresh reference model seeded from OS entropy. The "new weights" action.
pub fn create_tiny_unet() -> Result<TinyUNet> {
    TinyUNet::new(&UNetConfig::reference(), &mut StdRng::from_entropy())
}

// ── Parameter accounting ────────────────────────────────────────────

/// Total learnable scalars the forward pass reads.
pub fn count_parameters(model: &TinyUNet) -> usize {
    let convs: usize = model
        .conv_layers()
        .iter()
        .map(|layer| layer.num_params() + layer.projection.as_ref().map_or(0, |p| p.num_params()))
        .sum();
    model.time_embed_mlp.num_params() + convs
}

/// Per-component counts for the inspector's parameter panel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ParameterBreakdown {
    pub entries: Vec<(String, usize)>,
}

impl ParameterBreakdown {
    pub fn of(model: &TinyUNet) -> Self {
        let mut entries = vec![
            ("time_embed_mlp.hidden_layer".to_string(), model.time_embed_mlp.hidden_layer.num_params()),
            ("time_embed_mlp.output_layer".to_string(), model.time_embed_mlp.output_layer.num_params()),
        ];
        for layer in model.conv_layers() {
            if let Some(p) = &layer.projection {
                entries.push((format!("{}.projection", layer.name), p.num_params()));
            }
        }
        for layer in model.conv_layers() {
            entries.push((layer.name.clone(), layer.num_params()));
        }
        ParameterBreakdown { entries }
    }

    pub fn get(&self, name: &str) -> Option<usize> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, count)| *count)
    }

    pub fn total(&self) -> usize {
        self.entries.iter().map(|(_, count)| count).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_config_valid() {
        assert!(UNetConfig::reference().validate().is_ok());
        assert_eq!(UNetConfig::default(), UNetConfig::reference());
    }

    #[test]
    fn test_config_rejects_zero_dims() {
        let cfg = UNetConfig { hidden_dim: 0, ..UNetConfig::reference() };
        assert!(matches!(cfg.validate(), Err(UNetError::InvalidConfig(_))));
        assert!(TinyUNet::from_seed(&cfg, 1).is_err());
    }

    #[test]
    fn test_reference_parameter_count() {
        let model = TinyUNet::from_seed(&UNetConfig::reference(), 42).unwrap();
        assert_eq!(count_parameters(&model), 309);
    }

    #[test]
    fn test_zeros_has_same_count() {
        let cfg = UNetConfig::reference();
        let zeros = TinyUNet::zeros(&cfg).unwrap();
        assert_eq!(count_parameters(&zeros), 309);
        assert!(zeros.validate().is_ok());
    }

    #[test]
    fn test_output_conv_has_no_projection() {
        let model = TinyUNet::from_seed(&UNetConfig::reference(), 5).unwrap();
        assert!(model.output_conv.projection.is_none());
        for layer in &model.conv_layers()[..4] {
            assert!(layer.projection.is_some(), "{} should be conditioned", layer.name);
        }
    }

    #[test]
    fn test_from_seed_reproducible() {
        let cfg = UNetConfig::reference();
        let a = TinyUNet::from_seed(&cfg, 42).unwrap();
        let b = TinyUNet::from_seed(&cfg, 42).unwrap();
        let c = TinyUNet::from_seed(&cfg, 43).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_with_projection_rejects_wrong_width() {
        let conv = ConvLayer::zeros("enc", 2, 2);
        let err = conv.with_projection(BlockProjection::zeros(8, 3)).unwrap_err();
        assert!(matches!(err, UNetError::InvalidLayer { .. }));
    }

    #[test]
    fn test_validate_catches_broken_wiring() {
        let mut model = TinyUNet::zeros(&UNetConfig::reference()).unwrap();
        model.decoder_conv = ConvLayer::zeros("decoder_conv", 2, 2);
        assert!(model.validate().is_err());
    }

    #[test]
    fn test_validate_catches_missing_kernel() {
        let mut model = TinyUNet::zeros(&UNetConfig::reference()).unwrap();
        model.encoder_conv.kernels.pop();
        assert!(model.encoder_conv.validate().is_err());
        assert!(model.validate().is_err());
    }

    #[test]
    fn test_kernel_indexing() {
        let mut conv = ConvLayer::zeros("dec", 4, 2);
        conv.kernels[1 * 4 + 3][0][2] = 7.0;
        assert_eq!(conv.kernel(1, 3)[0][2], 7.0);
        assert_eq!(conv.kernel(0, 3)[0][2], 0.0);
    }
}
