//! Same-size 3×3 convolution, stride 1, zero padding of 1.
//!
//! out[oc, h, w] = bias[oc] + Σ_ic Σ_kh Σ_kw K[oc, ic][kh][kw] · x[ic, h+kh-1, w+kw-1]
//!
//! Taps that fall outside the input contribute 0, so output H×W equals input H×W.
//! No activation here: the block's SiLU is applied by the caller.

use crate::error::{Result, UNetError};
use crate::model::ConvLayer;
use crate::tensor::ActivationTensor;

pub fn conv2d(input: &ActivationTensor, layer: &ConvLayer) -> Result<ActivationTensor> {
    input.check_extents()?;
    layer.validate()?;
    let (channels, height, width) = input.shape();
    if channels != layer.in_channels {
        return Err(UNetError::ShapeMismatch {
            op: "conv2d",
            expected: (layer.in_channels, height, width),
            found: input.shape(),
        });
    }

    Ok(ActivationTensor::from_fn(layer.out_channels, height, width, |oc, h, w| {
        let mut acc = layer.bias[oc];
        for ic in 0..layer.in_channels {
            let kernel = layer.kernel(oc, ic);
            for kh in 0..3 {
                // Source row in input coordinates; -1 and `height` are padding.
                let y = h as isize + kh as isize - 1;
                if y < 0 || y >= height as isize {
                    continue;
                }
                for kw in 0..3 {
                    let x = w as isize + kw as isize - 1;
                    if x < 0 || x >= width as isize {
                        continue;
                    }
                    acc += kernel[kh][kw] * input.get(ic, y as usize, x as usize);
                }
            }
        }
        acc
    }))
}
