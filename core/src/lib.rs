//! Numeric core of a tiny diffusion U-Net inspector.
//!
//! A fixed encoder → bottleneck → decoder network with one skip connection
//! and EDM-style noise conditioning. Every weight is plain f32 data and every
//! forward pass returns the full trace of intermediate tensors, so a viewer
//! can render exactly what the network computes.
//!
//! Entry points: [`create_tiny_unet`], [`forward_pass`], [`count_parameters`],
//! [`create_sample_input`] / [`create_random_input`].

pub mod error;
pub mod tensor;
pub mod conv2d;
pub mod init;
pub mod model;
pub mod conditioning;
pub mod forward;
pub mod session;

pub use error::{Result, UNetError};
pub use forward::{create_random_input, create_sample_input, forward_pass, ForwardPassState, Stage};
pub use model::{count_parameters, create_tiny_unet, TinyUNet, UNetConfig};
pub use session::Inspector;
pub use tensor::ActivationTensor;
