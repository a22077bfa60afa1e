//! PyO3 bindings for the tiny U-Net core.
//!
//! Thin wrapper: every number is computed in Rust. Tensors cross the boundary
//! as `(shape, flat_data)` pairs in channel-major order.

use std::sync::Arc;

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::PyDict;

use minunet_core::forward::{
    create_random_input as rust_random_input, create_sample_input as rust_sample_input,
    forward_pass as rust_forward_pass, ForwardPassState as RustState, Stage,
};
use minunet_core::model::{
    count_parameters as rust_count_parameters, ParameterBreakdown, TinyUNet as RustUNet,
    UNetConfig as RustConfig,
};
use minunet_core::session::Inspector as RustInspector;
use minunet_core::tensor::ActivationTensor;
use minunet_core::UNetError;

type FlatTensor = ((usize, usize, usize), Vec<f32>);

fn to_py_err(e: UNetError) -> PyErr {
    PyValueError::new_err(e.to_string())
}

fn flatten(t: &ActivationTensor) -> FlatTensor {
    (t.shape(), t.data().to_vec())
}

fn unflatten(shape: (usize, usize, usize), data: Vec<f32>) -> PyResult<ActivationTensor> {
    let (c, h, w) = shape;
    ActivationTensor::from_vec(c, h, w, data).map_err(to_py_err)
}

fn breakdown_dict<'py>(py: Python<'py>, breakdown: &ParameterBreakdown) -> PyResult<Bound<'py, PyDict>> {
    let dict = PyDict::new(py);
    for (name, count) in &breakdown.entries {
        dict.set_item(name, *count)?;
    }
    Ok(dict)
}

// ── UNetConfig ───────────────────────────────────────────────────────

#[pyclass(frozen)]
struct UNetConfig {
    inner: RustConfig,
}

#[pymethods]
impl UNetConfig {
    #[new]
    #[pyo3(signature = (in_channels=1, base_channels=2, hidden_dim=4, embedding_dim=8))]
    fn new(in_channels: usize, base_channels: usize, hidden_dim: usize, embedding_dim: usize) -> PyResult<Self> {
        let inner = RustConfig { in_channels, base_channels, hidden_dim, embedding_dim };
        inner.validate().map_err(to_py_err)?;
        Ok(UNetConfig { inner })
    }

    #[getter]
    fn in_channels(&self) -> usize { self.inner.in_channels }
    #[getter]
    fn base_channels(&self) -> usize { self.inner.base_channels }
    #[getter]
    fn hidden_dim(&self) -> usize { self.inner.hidden_dim }
    #[getter]
    fn embedding_dim(&self) -> usize { self.inner.embedding_dim }
}

// ── TinyUNet ─────────────────────────────────────────────────────────

#[pyclass(frozen)]
struct TinyUNet {
    inner: Arc<RustUNet>,
}

#[pymethods]
impl TinyUNet {
    #[staticmethod]
    fn from_seed(cfg: &UNetConfig, seed: u64) -> PyResult<Self> {
        let model = RustUNet::from_seed(&cfg.inner, seed).map_err(to_py_err)?;
        Ok(TinyUNet { inner: Arc::new(model) })
    }

    fn num_params(&self) -> usize {
        rust_count_parameters(&self.inner)
    }

    /// Per-component counts, e.g. {"input_conv": 20, "input_conv.projection": 18, ...}.
    fn parameter_breakdown<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyDict>> {
        breakdown_dict(py, &ParameterBreakdown::of(&self.inner))
    }

    /// Kernels of one conv layer as [out][in][3][3] nested lists.
    fn get_kernels(&self, layer: &str) -> PyResult<Vec<Vec<Vec<Vec<f32>>>>> {
        let conv = self
            .inner
            .conv_layers()
            .into_iter()
            .find(|l| l.name == layer)
            .ok_or_else(|| PyValueError::new_err(format!("unknown layer {layer:?}")))?;
        Ok((0..conv.out_channels)
            .map(|oc| {
                (0..conv.in_channels)
                    .map(|ic| conv.kernel(oc, ic).iter().map(|row| row.to_vec()).collect())
                    .collect()
            })
            .collect())
    }
}

// ── ForwardPassState ─────────────────────────────────────────────────

#[pyclass(frozen)]
struct ForwardPassState {
    inner: RustState,
}

#[pymethods]
impl ForwardPassState {
    #[getter]
    fn sigma(&self) -> f32 { self.inner.sigma }
    #[getter]
    fn c_noise(&self) -> f32 { self.inner.c_noise }
    #[getter]
    fn hidden(&self) -> Vec<f32> { self.inner.hidden.clone() }
    #[getter]
    fn embedding(&self) -> Vec<f32> { self.inner.embedding.clone() }

    /// Per-block channel offsets: {"input_conv": [..], "encoder": [..], ...}.
    /// A block without a projection maps to None.
    #[getter]
    fn conditioning<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyDict>> {
        let c = &self.inner.conditioning;
        let dict = PyDict::new(py);
        dict.set_item("input_conv", c.input_conv.clone())?;
        dict.set_item("encoder", c.encoder.clone())?;
        dict.set_item("bottleneck", c.bottleneck.clone())?;
        dict.set_item("decoder", c.decoder.clone())?;
        Ok(dict)
    }

    #[getter]
    fn output(&self) -> FlatTensor { flatten(&self.inner.output) }

    /// Stage labels in pipeline order.
    #[staticmethod]
    fn stage_names() -> Vec<&'static str> {
        Stage::ALL.iter().map(|s| s.label()).collect()
    }

    /// All nine stages: {"input": (shape, data), ..., "output": (shape, data)}.
    fn stages<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyDict>> {
        let dict = PyDict::new(py);
        for (stage, tensor) in self.inner.stages() {
            dict.set_item(stage.label(), flatten(tensor))?;
        }
        Ok(dict)
    }
}

// ── Inspector ────────────────────────────────────────────────────────

#[pyclass]
struct Inspector {
    inner: RustInspector,
}

#[pymethods]
impl Inspector {
    #[new]
    #[pyo3(signature = (cfg, seed=None))]
    fn new(cfg: &UNetConfig, seed: Option<u64>) -> PyResult<Self> {
        let inner = match seed {
            Some(seed) => RustInspector::new(cfg.inner.clone(), seed),
            None => RustInspector::from_entropy(cfg.inner.clone()),
        }
        .map_err(to_py_err)?;
        Ok(Inspector { inner })
    }

    #[getter]
    fn generation(&self) -> u64 {
        self.inner.generation()
    }

    fn model(&self) -> TinyUNet {
        TinyUNet { inner: self.inner.model() }
    }

    fn regenerate(&mut self) -> PyResult<TinyUNet> {
        let inner = self.inner.regenerate().map_err(to_py_err)?;
        Ok(TinyUNet { inner })
    }

    fn trace_sample(&self, sigma: f32) -> PyResult<ForwardPassState> {
        let inner = self.inner.trace_sample(sigma).map_err(to_py_err)?;
        Ok(ForwardPassState { inner })
    }

    fn trace_random(&mut self, sigma: f32) -> PyResult<ForwardPassState> {
        let inner = self.inner.trace_random(sigma).map_err(to_py_err)?;
        Ok(ForwardPassState { inner })
    }

    fn parameter_count(&self) -> usize {
        self.inner.parameter_count()
    }
}

// ── Free functions ───────────────────────────────────────────────────

/// Reference model with fresh entropy-seeded weights.
#[pyfunction]
fn create_tiny_unet() -> PyResult<TinyUNet> {
    let model = minunet_core::create_tiny_unet().map_err(to_py_err)?;
    Ok(TinyUNet { inner: Arc::new(model) })
}

#[pyfunction]
fn forward_pass(
    py: Python<'_>,
    model: &TinyUNet,
    shape: (usize, usize, usize),
    data: Vec<f32>,
    sigma: f32,
) -> PyResult<ForwardPassState> {
    let input = unflatten(shape, data)?;
    let model = Arc::clone(&model.inner);
    let inner = py
        .allow_threads(move || rust_forward_pass(&model, input, sigma))
        .map_err(to_py_err)?;
    Ok(ForwardPassState { inner })
}

#[pyfunction]
fn count_parameters(model: &TinyUNet) -> usize {
    rust_count_parameters(&model.inner)
}

#[pyfunction]
fn create_sample_input() -> FlatTensor {
    flatten(&rust_sample_input())
}

/// Uniform [0, 1) input from a seeded generator.
#[pyfunction]
fn create_random_input(seed: u64) -> FlatTensor {
    use rand::SeedableRng;
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    flatten(&rust_random_input(&mut rng))
}

// ── Module ───────────────────────────────────────────────────────────

#[pymodule]
fn minunet(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<UNetConfig>()?;
    m.add_class::<TinyUNet>()?;
    m.add_class::<ForwardPassState>()?;
    m.add_class::<Inspector>()?;
    m.add_function(wrap_pyfunction!(create_tiny_unet, m)?)?;
    m.add_function(wrap_pyfunction!(forward_pass, m)?)?;
    m.add_function(wrap_pyfunction!(count_parameters, m)?)?;
    m.add_function(wrap_pyfunction!(create_sample_input, m)?)?;
    m.add_function(wrap_pyfunction!(create_random_input, m)?)?;
    Ok(())
}
