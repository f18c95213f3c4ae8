use log::debug;
use ndarray::{Array1, Array2, Array4, Axis};
use serde_json::Value;

use super::backend::{declared_input_size, InferenceBackend};
use super::utils::softmax_in_place;
use crate::artifact::ModelArtifact;
use crate::error::PipelineError;

/// Pure-ndarray forward pass for sequential layers-model artifacts.
///
/// The topology is the Keras `Sequential` config found under
/// `model_config.config.layers` (TF.js export) or `config.layers`. Weights are
/// bound to layers by their `"<layer_name>/<weight>"` names.
#[derive(Debug)]
pub struct LayersInterpreter {
    layers: Vec<Layer>,
    input_size: Option<(u32, u32)>,
    num_classes: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Padding {
    Valid,
    Same,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Activation {
    Linear,
    Relu,
    Relu6,
    Sigmoid,
    Tanh,
    Softmax,
}

#[derive(Debug)]
enum Layer {
    Rescaling {
        scale: f32,
        offset: f32,
    },
    Conv2D {
        kernel: Array4<f32>,
        bias: Option<Array1<f32>>,
        strides: (usize, usize),
        padding: Padding,
        activation: Activation,
    },
    MaxPooling2D {
        pool: (usize, usize),
        strides: (usize, usize),
        padding: Padding,
    },
    AveragePooling2D {
        pool: (usize, usize),
        strides: (usize, usize),
        padding: Padding,
    },
    GlobalAveragePooling2D,
    Flatten,
    Dense {
        kernel: Array2<f32>,
        bias: Option<Array1<f32>>,
        activation: Activation,
    },
    BatchNormalization {
        /// Folded `gamma / sqrt(var + eps)`
        scale: Array1<f32>,
        /// Folded `beta - mean * scale`
        shift: Array1<f32>,
    },
    Activation(Activation),
}

/// Intermediate value flowing between layers.
enum Activations {
    /// NHWC feature maps
    Spatial(Array4<f32>),
    /// (batch, features)
    Flat(Array2<f32>),
}

fn inference_err(msg: impl Into<String>) -> PipelineError {
    PipelineError::Inference(msg.into())
}

fn layer_list(topology: &Value) -> Result<&Vec<Value>, PipelineError> {
    ["/model_config/config/layers", "/config/layers", "/layers"]
        .iter()
        .find_map(|pointer| topology.pointer(pointer).and_then(Value::as_array))
        .ok_or_else(|| {
            PipelineError::ArtifactCorrupt("topology does not describe a sequential layer list".into())
        })
}

fn config_pair(config: &Value, key: &str, default: (usize, usize)) -> (usize, usize) {
    match config.get(key) {
        Some(Value::Array(values)) if values.len() == 2 => {
            let a = values[0].as_u64().map(|v| v as usize).unwrap_or(default.0);
            let b = values[1].as_u64().map(|v| v as usize).unwrap_or(default.1);
            (a, b)
        }
        Some(Value::Number(n)) => {
            let v = n.as_u64().map(|v| v as usize).unwrap_or(default.0);
            (v, v)
        }
        _ => default,
    }
}

fn parse_padding(config: &Value) -> Result<Padding, PipelineError> {
    match config.get("padding").and_then(Value::as_str).unwrap_or("valid") {
        "valid" => Ok(Padding::Valid),
        "same" => Ok(Padding::Same),
        other => Err(inference_err(format!("unsupported padding '{}'", other))),
    }
}

fn parse_activation(name: Option<&str>) -> Result<Activation, PipelineError> {
    match name.unwrap_or("linear") {
        "linear" => Ok(Activation::Linear),
        "relu" => Ok(Activation::Relu),
        "relu6" => Ok(Activation::Relu6),
        "sigmoid" => Ok(Activation::Sigmoid),
        "tanh" => Ok(Activation::Tanh),
        "softmax" => Ok(Activation::Softmax),
        other => Err(inference_err(format!("unsupported activation '{}'", other))),
    }
}

/// Decoded weights keyed by full name, in manifest order.
struct WeightTable {
    weights: Vec<(String, Vec<usize>, Vec<f32>)>,
}

impl WeightTable {
    fn from_artifact(artifact: &ModelArtifact) -> Result<Self, PipelineError> {
        let mut weights = Vec::with_capacity(artifact.weight_specs.len());
        for (spec, bytes) in artifact.weights()? {
            weights.push((spec.name.clone(), spec.shape.clone(), spec.decode(bytes)?));
        }
        Ok(Self { weights })
    }

    /// Finds `<layer>/<key>`, also accepting names nested under an outer scope.
    fn find(&self, layer: &str, key: &str) -> Option<(&[usize], &[f32])> {
        let exact = format!("{}/{}", layer, key);
        let nested = format!("/{}", exact);
        self.weights
            .iter()
            .find(|(name, _, _)| {
                let name = name.strip_suffix(":0").unwrap_or(name);
                name == exact || name.ends_with(&nested)
            })
            .map(|(_, shape, values)| (shape.as_slice(), values.as_slice()))
    }

    fn require(&self, layer: &str, key: &str) -> Result<(&[usize], &[f32]), PipelineError> {
        self.find(layer, key)
            .ok_or_else(|| inference_err(format!("missing weight '{}/{}'", layer, key)))
    }

    fn vector(&self, layer: &str, key: &str, len: usize) -> Result<Option<Array1<f32>>, PipelineError> {
        match self.find(layer, key) {
            None => Ok(None),
            Some((_, values)) if values.len() == len => Ok(Some(Array1::from(values.to_vec()))),
            Some((_, values)) => Err(inference_err(format!(
                "weight '{}/{}' has {} values, expected {}",
                layer,
                key,
                values.len(),
                len
            ))),
        }
    }
}

impl LayersInterpreter {
    pub fn from_artifact(artifact: &ModelArtifact) -> Result<Self, PipelineError> {
        let table = WeightTable::from_artifact(artifact)?;
        let mut layers = Vec::new();
        let mut input_size = None;
        let mut num_classes = None;

        for entry in layer_list(&artifact.topology)? {
            let class_name = entry
                .get("class_name")
                .or_else(|| entry.get("className"))
                .and_then(Value::as_str)
                .ok_or_else(|| PipelineError::ArtifactCorrupt("layer without class_name".into()))?;
            let config = entry.get("config").cloned().unwrap_or(Value::Null);
            let name = config.get("name").and_then(Value::as_str).unwrap_or(class_name);

            if input_size.is_none() {
                input_size = ["batch_input_shape", "batch_shape"]
                    .iter()
                    .find_map(|key| config.get(*key).and_then(declared_input_size));
            }

            let layer = match class_name {
                "InputLayer" | "Dropout" | "SpatialDropout2D" => continue,
                "Rescaling" => Layer::Rescaling {
                    scale: config.get("scale").and_then(Value::as_f64).unwrap_or(1.0) as f32,
                    offset: config.get("offset").and_then(Value::as_f64).unwrap_or(0.0) as f32,
                },
                "Conv2D" => {
                    let (shape, values) = table.require(name, "kernel")?;
                    if shape.len() != 4 {
                        return Err(inference_err(format!("conv kernel '{}' must be 4-D", name)));
                    }
                    let kernel = Array4::from_shape_vec(
                        (shape[0], shape[1], shape[2], shape[3]),
                        values.to_vec(),
                    )
                    .map_err(|e| inference_err(format!("conv kernel '{}': {}", name, e)))?;
                    let bias = table.vector(name, "bias", shape[3])?;
                    Layer::Conv2D {
                        kernel,
                        bias,
                        strides: config_pair(&config, "strides", (1, 1)),
                        padding: parse_padding(&config)?,
                        activation: parse_activation(config.get("activation").and_then(Value::as_str))?,
                    }
                }
                "MaxPooling2D" | "AveragePooling2D" => {
                    let pool = config_pair(&config, "pool_size", (2, 2));
                    let strides = config_pair(&config, "strides", pool);
                    let padding = parse_padding(&config)?;
                    if class_name == "MaxPooling2D" {
                        Layer::MaxPooling2D { pool, strides, padding }
                    } else {
                        Layer::AveragePooling2D { pool, strides, padding }
                    }
                }
                "GlobalAveragePooling2D" => Layer::GlobalAveragePooling2D,
                "Flatten" => Layer::Flatten,
                "Dense" => {
                    let (shape, values) = table.require(name, "kernel")?;
                    if shape.len() != 2 {
                        return Err(inference_err(format!("dense kernel '{}' must be 2-D", name)));
                    }
                    let kernel = Array2::from_shape_vec((shape[0], shape[1]), values.to_vec())
                        .map_err(|e| inference_err(format!("dense kernel '{}': {}", name, e)))?;
                    let bias = table.vector(name, "bias", shape[1])?;
                    num_classes = Some(shape[1]);
                    Layer::Dense {
                        kernel,
                        bias,
                        activation: parse_activation(config.get("activation").and_then(Value::as_str))?,
                    }
                }
                "BatchNormalization" => {
                    let (shape, _) = table.require(name, "moving_mean")?;
                    let channels = shape.iter().product();
                    let mean = table
                        .vector(name, "moving_mean", channels)?
                        .unwrap_or_else(|| Array1::zeros(channels));
                    let variance = table
                        .vector(name, "moving_variance", channels)?
                        .ok_or_else(|| inference_err(format!("missing weight '{}/moving_variance'", name)))?;
                    let gamma = table
                        .vector(name, "gamma", channels)?
                        .unwrap_or_else(|| Array1::ones(channels));
                    let beta = table
                        .vector(name, "beta", channels)?
                        .unwrap_or_else(|| Array1::zeros(channels));
                    let epsilon = config.get("epsilon").and_then(Value::as_f64).unwrap_or(1e-3) as f32;
                    let scale = &gamma / &variance.mapv(|v| (v + epsilon).sqrt());
                    let shift = &beta - &(&mean * &scale);
                    Layer::BatchNormalization { scale, shift }
                }
                "Activation" | "ReLU" | "Softmax" => {
                    let activation = match class_name {
                        "ReLU" => Activation::Relu,
                        "Softmax" => Activation::Softmax,
                        _ => parse_activation(config.get("activation").and_then(Value::as_str))?,
                    };
                    Layer::Activation(activation)
                }
                other => {
                    return Err(inference_err(format!("unsupported layer type '{}'", other)));
                }
            };
            debug!("Prepared layer '{}' ({})", name, class_name);
            layers.push(layer);
        }

        if layers.is_empty() {
            return Err(PipelineError::ArtifactCorrupt("topology has no layers".into()));
        }

        Ok(Self {
            layers,
            input_size,
            num_classes,
        })
    }
}

impl InferenceBackend for LayersInterpreter {
    fn name(&self) -> &'static str {
        "layers-interpreter"
    }

    fn input_size(&self) -> Option<(u32, u32)> {
        self.input_size
    }

    fn num_classes(&self) -> Option<usize> {
        self.num_classes
    }

    fn forward(&self, input: Array4<f32>) -> Result<Vec<f32>, PipelineError> {
        // Each layer consumes the previous activations, so every intermediate
        // tensor is dropped as soon as the next one exists.
        let mut current = Activations::Spatial(input);
        for layer in &self.layers {
            current = layer.apply(current)?;
        }
        match current {
            Activations::Flat(output) if output.nrows() == 1 => Ok(output.row(0).to_vec()),
            Activations::Flat(output) => Err(inference_err(format!(
                "expected a single output row, got {}",
                output.nrows()
            ))),
            Activations::Spatial(_) => Err(inference_err(
                "model output is still spatial; add Flatten or global pooling",
            )),
        }
    }
}

/// Output length and leading padding for one spatial dimension.
fn output_dim(input: usize, window: usize, stride: usize, padding: Padding) -> Result<(usize, usize), PipelineError> {
    if window == 0 || stride == 0 {
        return Err(inference_err("window and stride must be positive"));
    }
    match padding {
        Padding::Valid => {
            if input < window {
                return Err(inference_err(format!(
                    "window {} does not fit input dimension {}",
                    window, input
                )));
            }
            Ok(((input - window) / stride + 1, 0))
        }
        Padding::Same => {
            let out = (input + stride - 1) / stride;
            let total = ((out - 1) * stride + window).saturating_sub(input);
            Ok((out, total / 2))
        }
    }
}

fn apply_activation_flat(mut x: Array2<f32>, activation: Activation) -> Array2<f32> {
    match activation {
        Activation::Softmax => {
            for row in x.rows_mut() {
                softmax_in_place(row);
            }
        }
        other => x.mapv_inplace(|v| scalar_activation(v, other)),
    }
    x
}

fn scalar_activation(v: f32, activation: Activation) -> f32 {
    match activation {
        Activation::Linear | Activation::Softmax => v,
        Activation::Relu => v.max(0.0),
        Activation::Relu6 => v.clamp(0.0, 6.0),
        Activation::Sigmoid => 1.0 / (1.0 + (-v).exp()),
        Activation::Tanh => v.tanh(),
    }
}

fn apply_activation_spatial(mut x: Array4<f32>, activation: Activation) -> Array4<f32> {
    match activation {
        Activation::Softmax => {
            for lane in x.lanes_mut(Axis(3)) {
                softmax_in_place(lane);
            }
        }
        other => x.mapv_inplace(|v| scalar_activation(v, other)),
    }
    x
}

fn conv2d(
    x: &Array4<f32>,
    kernel: &Array4<f32>,
    bias: Option<&Array1<f32>>,
    strides: (usize, usize),
    padding: Padding,
) -> Result<Array4<f32>, PipelineError> {
    let (batch, height, width, channels) = x.dim();
    let (kh, kw, kc, filters) = kernel.dim();
    if kc != channels {
        return Err(inference_err(format!(
            "conv expects {} input channels, got {}",
            kc, channels
        )));
    }
    let (out_h, pad_top) = output_dim(height, kh, strides.0, padding)?;
    let (out_w, pad_left) = output_dim(width, kw, strides.1, padding)?;

    let mut out = Array4::<f32>::zeros((batch, out_h, out_w, filters));
    for b in 0..batch {
        for oy in 0..out_h {
            for ox in 0..out_w {
                for ky in 0..kh {
                    let iy = (oy * strides.0 + ky) as isize - pad_top as isize;
                    if iy < 0 || iy >= height as isize {
                        continue;
                    }
                    for kx in 0..kw {
                        let ix = (ox * strides.1 + kx) as isize - pad_left as isize;
                        if ix < 0 || ix >= width as isize {
                            continue;
                        }
                        for c in 0..channels {
                            let v = x[[b, iy as usize, ix as usize, c]];
                            for f in 0..filters {
                                out[[b, oy, ox, f]] += v * kernel[[ky, kx, c, f]];
                            }
                        }
                    }
                }
                if let Some(bias) = bias {
                    for f in 0..filters {
                        out[[b, oy, ox, f]] += bias[f];
                    }
                }
            }
        }
    }
    Ok(out)
}

fn pool2d(
    x: &Array4<f32>,
    pool: (usize, usize),
    strides: (usize, usize),
    padding: Padding,
    max: bool,
) -> Result<Array4<f32>, PipelineError> {
    let (batch, height, width, channels) = x.dim();
    let (out_h, pad_top) = output_dim(height, pool.0, strides.0, padding)?;
    let (out_w, pad_left) = output_dim(width, pool.1, strides.1, padding)?;

    let mut out = Array4::<f32>::zeros((batch, out_h, out_w, channels));
    for b in 0..batch {
        for oy in 0..out_h {
            for ox in 0..out_w {
                for c in 0..channels {
                    let mut acc = if max { f32::NEG_INFINITY } else { 0.0 };
                    let mut count = 0usize;
                    for py in 0..pool.0 {
                        let iy = (oy * strides.0 + py) as isize - pad_top as isize;
                        if iy < 0 || iy >= height as isize {
                            continue;
                        }
                        for px in 0..pool.1 {
                            let ix = (ox * strides.1 + px) as isize - pad_left as isize;
                            if ix < 0 || ix >= width as isize {
                                continue;
                            }
                            let v = x[[b, iy as usize, ix as usize, c]];
                            if max {
                                acc = acc.max(v);
                            } else {
                                acc += v;
                            }
                            count += 1;
                        }
                    }
                    out[[b, oy, ox, c]] = if count == 0 {
                        0.0
                    } else if max {
                        acc
                    } else {
                        acc / count as f32
                    };
                }
            }
        }
    }
    Ok(out)
}

impl Layer {
    fn apply(&self, input: Activations) -> Result<Activations, PipelineError> {
        match (self, input) {
            (Layer::Rescaling { scale, offset }, Activations::Spatial(mut x)) => {
                x.mapv_inplace(|v| v * scale + offset);
                Ok(Activations::Spatial(x))
            }
            (Layer::Rescaling { scale, offset }, Activations::Flat(mut x)) => {
                x.mapv_inplace(|v| v * scale + offset);
                Ok(Activations::Flat(x))
            }
            (
                Layer::Conv2D {
                    kernel,
                    bias,
                    strides,
                    padding,
                    activation,
                },
                Activations::Spatial(x),
            ) => {
                let out = conv2d(&x, kernel, bias.as_ref(), *strides, *padding)?;
                Ok(Activations::Spatial(apply_activation_spatial(out, *activation)))
            }
            (Layer::MaxPooling2D { pool, strides, padding }, Activations::Spatial(x)) => {
                Ok(Activations::Spatial(pool2d(&x, *pool, *strides, *padding, true)?))
            }
            (Layer::AveragePooling2D { pool, strides, padding }, Activations::Spatial(x)) => {
                Ok(Activations::Spatial(pool2d(&x, *pool, *strides, *padding, false)?))
            }
            (Layer::GlobalAveragePooling2D, Activations::Spatial(x)) => {
                let pooled = x
                    .mean_axis(Axis(1))
                    .and_then(|rows| rows.mean_axis(Axis(1)))
                    .ok_or_else(|| inference_err("cannot pool an empty feature map"))?;
                Ok(Activations::Flat(pooled))
            }
            (Layer::Flatten, Activations::Spatial(x)) => {
                let (batch, h, w, c) = x.dim();
                let flat = Array2::from_shape_vec((batch, h * w * c), x.iter().cloned().collect())
                    .map_err(|e| inference_err(format!("flatten failed: {}", e)))?;
                Ok(Activations::Flat(flat))
            }
            (Layer::Flatten, flat @ Activations::Flat(_)) => Ok(flat),
            (Layer::Dense { kernel, bias, activation }, Activations::Flat(x)) => {
                if x.ncols() != kernel.nrows() {
                    return Err(inference_err(format!(
                        "dense layer expects {} features, got {}",
                        kernel.nrows(),
                        x.ncols()
                    )));
                }
                let mut out = x.dot(kernel);
                if let Some(bias) = bias {
                    out += bias;
                }
                Ok(Activations::Flat(apply_activation_flat(out, *activation)))
            }
            (Layer::BatchNormalization { scale, shift }, Activations::Spatial(mut x)) => {
                if x.dim().3 != scale.len() {
                    return Err(inference_err("batch normalization channel mismatch"));
                }
                for mut lane in x.lanes_mut(Axis(3)) {
                    lane.zip_mut_with(scale, |v, s| *v *= s);
                    lane += shift;
                }
                Ok(Activations::Spatial(x))
            }
            (Layer::BatchNormalization { scale, shift }, Activations::Flat(mut x)) => {
                if x.ncols() != scale.len() {
                    return Err(inference_err("batch normalization feature mismatch"));
                }
                x *= scale;
                x += shift;
                Ok(Activations::Flat(x))
            }
            (Layer::Activation(activation), Activations::Spatial(x)) => {
                Ok(Activations::Spatial(apply_activation_spatial(x, *activation)))
            }
            (Layer::Activation(activation), Activations::Flat(x)) => {
                Ok(Activations::Flat(apply_activation_flat(x, *activation)))
            }
            (layer, Activations::Flat(_)) => Err(inference_err(format!(
                "{} needs spatial input but received flat features",
                layer.kind()
            ))),
            (layer, Activations::Spatial(_)) => Err(inference_err(format!(
                "{} needs flat input; add Flatten or global pooling first",
                layer.kind()
            ))),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Layer::Rescaling { .. } => "Rescaling",
            Layer::Conv2D { .. } => "Conv2D",
            Layer::MaxPooling2D { .. } => "MaxPooling2D",
            Layer::AveragePooling2D { .. } => "AveragePooling2D",
            Layer::GlobalAveragePooling2D => "GlobalAveragePooling2D",
            Layer::Flatten => "Flatten",
            Layer::Dense { .. } => "Dense",
            Layer::BatchNormalization { .. } => "BatchNormalization",
            Layer::Activation(_) => "Activation",
        }
    }
}
