//! Inspector session: the model the viewer is currently showing.
//!
//! The session owns the RNG and an `Arc<TinyUNet>`. "New weights" builds a
//! whole new model and swaps the `Arc`; anyone still holding the previous
//! `Arc` keeps reading a complete, unchanged model. Forward passes only need
//! `&TinyUNet`, so any number of them can run against one model at once.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;

use crate::error::Result;
use crate::forward::{create_random_input, create_sample_input, forward_pass, ForwardPassState};
use crate::model::{count_parameters, ParameterBreakdown, TinyUNet, UNetConfig};
use crate::tensor::ActivationTensor;

pub struct Inspector {
    config: UNetConfig,
    rng: StdRng,
    model: Arc<TinyUNet>,
    /// Bumped on every successful regenerate.
    generation: u64,
}

impl Inspector {
    /// Seeded session: the same seed yields the same sequence of models.
    pub fn new(config: UNetConfig, seed: u64) -> Result<Self> {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    pub fn from_entropy(config: UNetConfig) -> Result<Self> {
        Self::with_rng(config, StdRng::from_entropy())
    }

    fn with_rng(config: UNetConfig, mut rng: StdRng) -> Result<Self> {
        let model = Arc::new(TinyUNet::new(&config, &mut rng)?);
        Ok(Inspector { config, rng, model, generation: 0 })
    }

    pub fn config(&self) -> &UNetConfig {
        &self.config
    }

    /// Shared handle to the current model.
    pub fn model(&self) -> Arc<TinyUNet> {
        Arc::clone(&self.model)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Replace the model with freshly drawn weights. On error the current
    /// model stays in place.
    pub fn regenerate(&mut self) -> Result<Arc<TinyUNet>> {
        let fresh = Arc::new(TinyUNet::new(&self.config, &mut self.rng)?);
        self.model = fresh;
        self.generation += 1;
        info!(generation = self.generation, "regenerated weights");
        Ok(self.model())
    }

    /// Forward pass against the current model.
    pub fn trace(&self, input: ActivationTensor, sigma: f32) -> Result<ForwardPassState> {
        forward_pass(&self.model, input, sigma)
    }

    pub fn trace_sample(&self, sigma: f32) -> Result<ForwardPassState> {
        self.trace(create_sample_input(), sigma)
    }

    /// Draws the input from the session RNG, so it advances the weight stream too.
    pub fn trace_random(&mut self, sigma: f32) -> Result<ForwardPassState> {
        let input = create_random_input(&mut self.rng);
        self.trace(input, sigma)
    }

    pub fn parameter_count(&self) -> usize {
        count_parameters(&self.model)
    }

    pub fn parameter_breakdown(&self) -> ParameterBreakdown {
        ParameterBreakdown::of(&self.model)
    }
}
