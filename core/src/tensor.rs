//! Rank-3 activation buffer and the structural operators the U-Net is built from.
//!
//! Layout is channel-major, row-major inside a channel: index = (c * H + h) * W + w.
//! Every operator is a free function that validates its inputs, leaves them
//! untouched and returns a freshly allocated tensor.

use serde::{Deserialize, Serialize};
use crate::error::{Result, Shape3, UNetError};

/// Channels × height × width buffer of f32 activations.
///
/// Dimensions are fixed at construction; there are no in-place mutators.
/// Deserialized values may still carry inconsistent extents, which is why
/// every operator calls `check_extents` first.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActivationTensor {
    channels: usize,
    height: usize,
    width: usize,
    data: Vec<f32>,
}

impl ActivationTensor {
    pub fn zeros(channels: usize, height: usize, width: usize) -> Self {
        Self::filled(channels, height, width, 0.0)
    }

    /// Every element set to `value`.
    pub fn filled(channels: usize, height: usize, width: usize, value: f32) -> Self {
        ActivationTensor {
            channels,
            height,
            width,
            data: vec![value; channels * height * width],
        }
    }

    /// Wrap a flat channel-major buffer. Fails if `data.len() != c * h * w`.
    pub fn from_vec(channels: usize, height: usize, width: usize, data: Vec<f32>) -> Result<Self> {
        let expected = channels * height * width;
        if data.len() != expected {
            return Err(UNetError::ExtentMismatch { expected, found: data.len() });
        }
        Ok(ActivationTensor { channels, height, width, data })
    }

    /// Build from `[channel][row][col]` nesting. All rows must share a width
    /// and all channels a height.
    pub fn from_nested(nested: &[Vec<Vec<f32>>]) -> Result<Self> {
        let channels = nested.len();
        let height = nested.first().map_or(0, |c| c.len());
        let width = nested.first().and_then(|c| c.first()).map_or(0, |r| r.len());
        let mut data = Vec::with_capacity(channels * height * width);
        for plane in nested {
            if plane.len() != height {
                return Err(UNetError::ExtentMismatch {
                    expected: channels * height * width,
                    found: data.len() + plane.iter().map(Vec::len).sum::<usize>(),
                });
            }
            for row in plane {
                if row.len() != width {
                    return Err(UNetError::ExtentMismatch {
                        expected: channels * height * width,
                        found: data.len() + row.len(),
                    });
                }
                data.extend_from_slice(row);
            }
        }
        Self::from_vec(channels, height, width, data)
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn shape(&self) -> Shape3 {
        (self.channels, self.height, self.width)
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn numel(&self) -> usize {
        self.data.len()
    }

    #[inline]
    fn offset(&self, c: usize, h: usize, w: usize) -> usize {
        (c * self.height + h) * self.width + w
    }

    /// Value at (channel, row, col). Panics on an out-of-range index.
    #[inline]
    pub fn get(&self, c: usize, h: usize, w: usize) -> f32 {
        debug_assert!(c < self.channels && h < self.height && w < self.width);
        self.data[self.offset(c, h, w)]
    }

    /// One channel plane as a flat `[H * W]` slice.
    pub fn channel(&self, c: usize) -> &[f32] {
        let plane = self.height * self.width;
        &self.data[c * plane..(c + 1) * plane]
    }

    /// Smallest and largest element, or None for an empty tensor.
    /// The viewer uses this to scale its color ramp.
    pub fn min_max(&self) -> Option<(f32, f32)> {
        let first = *self.data.first()?;
        Some(self.data.iter().fold((first, first), |(lo, hi), &v| (lo.min(v), hi.max(v))))
    }

    /// Confirm the declared dims match the backing buffer.
    pub fn check_extents(&self) -> Result<()> {
        let expected = self.channels * self.height * self.width;
        if self.data.len() != expected {
            return Err(UNetError::ExtentMismatch { expected, found: self.data.len() });
        }
        Ok(())
    }

    pub(crate) fn map(&self, mut f: impl FnMut(f32) -> f32) -> Self {
        ActivationTensor {
            channels: self.channels,
            height: self.height,
            width: self.width,
            data: self.data.iter().map(|&x| f(x)).collect(),
        }
    }

    /// Same dims, value computed per (c, h, w). Used by the operators below
    /// to build outputs without exposing a mutable constructor.
    pub(crate) fn from_fn(
        channels: usize,
        height: usize,
        width: usize,
        mut f: impl FnMut(usize, usize, usize) -> f32,
    ) -> Self {
        let mut data = Vec::with_capacity(channels * height * width);
        for c in 0..channels {
            for h in 0..height {
                for w in 0..width {
                    data.push(f(c, h, w));
                }
            }
        }
        ActivationTensor { channels, height, width, data }
    }
}

// ── Scalar activations ──────────────────────────────────────────────

/// Sigmoid: 1 / (1 + exp(-x)), no cutoffs. For large negative x, exp(-x)
/// overflows to inf and the result is 0; large positive x gives 1.
#[inline]
pub fn sigmoid_f32(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// SiLU (Sigmoid Linear Unit): x * sigmoid(x), computed as x / (1 + exp(-x)).
#[inline]
pub fn silu_f32(x: f32) -> f32 {
    x / (1.0 + (-x).exp())
}

// ── Tensor operators ────────────────────────────────────────────────

/// Elementwise SiLU. Shape-preserving.
pub fn silu(input: &ActivationTensor) -> Result<ActivationTensor> {
    input.check_extents()?;
    Ok(input.map(silu_f32))
}

/// 2×2 average pooling with stride 2. Height and width must both be even;
/// there is deliberately no general pooling factor.
pub fn avg_pool_2x(input: &ActivationTensor) -> Result<ActivationTensor> {
    input.check_extents()?;
    let (c, h, w) = input.shape();
    if h % 2 != 0 || w % 2 != 0 {
        return Err(UNetError::OddDimensions { op: "avg_pool_2x", height: h, width: w });
    }
    Ok(ActivationTensor::from_fn(c, h / 2, w / 2, |ch, y, x| {
        let (y0, x0) = (2 * y, 2 * x);
        (input.get(ch, y0, x0)
            + input.get(ch, y0 + 1, x0)
            + input.get(ch, y0, x0 + 1)
            + input.get(ch, y0 + 1, x0 + 1))
            / 4.0
    }))
}

/// Nearest-neighbour 2× upsampling: each pixel fills a 2×2 block.
pub fn nearest_upsample_2x(input: &ActivationTensor) -> Result<ActivationTensor> {
    input.check_extents()?;
    let (c, h, w) = input.shape();
    Ok(ActivationTensor::from_fn(c, h * 2, w * 2, |ch, y, x| input.get(ch, y / 2, x / 2)))
}

/// Stack `b`'s channels after `a`'s. Spatial dims must agree.
///
/// The order matters: the decoder's kernels are indexed by input channel,
/// so channels [0, a.channels) are the upsampled path and the rest the skip.
pub fn concat_channels(a: &ActivationTensor, b: &ActivationTensor) -> Result<ActivationTensor> {
    a.check_extents()?;
    b.check_extents()?;
    if a.height != b.height || a.width != b.width {
        return Err(UNetError::SpatialMismatch {
            op: "concat_channels",
            left: (a.height, a.width),
            right: (b.height, b.width),
        });
    }
    let mut data = Vec::with_capacity(a.numel() + b.numel());
    data.extend_from_slice(&a.data);
    data.extend_from_slice(&b.data);
    Ok(ActivationTensor {
        channels: a.channels + b.channels,
        height: a.height,
        width: a.width,
        data,
    })
}
