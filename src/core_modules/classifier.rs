// THEORY:
// The `classifier` module is the seam between the tiling pipeline and the
// pre-trained network that actually judges tiles. The pipeline never depends
// on the network's internal architecture — it only sees the single-method
// `Classifier` trait, a pure capability mapping a feature vector to a pair of
// class scores.
//
// Key architectural principles:
// 1.  **External Contract on Ordering**: `flatten_tile` lays pixels out in
//     row-major order, top-to-bottom, single luma channel, raw 0..255 values
//     as f32. The network was trained against exactly this layout, so the
//     ordering is an external contract, not an internal free choice.
// 2.  **Fail Fast on Length**: A feature vector whose length disagrees with
//     the network's input layer is a systemic calibration bug (the grid
//     configuration and the trained network disagree), not bad input data.
//     It is reported as `ClassifierInput` and treated as fatal by the batch
//     layer. There are no retries.
// 3.  **Stateless Inference**: `activate` is a pure function of its input, so
//     a loaded network is safely shared read-only across worker tasks.

use crate::core_modules::tile::tile::Tile;
use crate::error::InspectError;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// The two class scores produced for every tile: (probability OK,
/// probability Not-OK).
pub type ClassScores = (f32, f32);

/// A pure capability mapping a fixed-length feature vector to class scores.
pub trait Classifier: Send + Sync {
    fn activate(&self, features: &[f32]) -> Result<ClassScores, InspectError>;
}

/// Flattens a tile into the feature vector layout the network was trained on:
/// row-major, top-to-bottom, one f32 per luma value.
pub fn flatten_tile(tile: &Tile) -> Vec<f32> {
    tile.pixels.iter().map(|&value| value as f32).collect()
}

/// The activation function applied to a layer's weighted sums.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Sigmoid,
    Tanh,
    Linear,
}

impl Activation {
    fn apply(self, x: f32) -> f32 {
        match self {
            Activation::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            Activation::Tanh => x.tanh(),
            Activation::Linear => x,
        }
    }
}

/// One fully-connected layer: `weights[j]` holds the incoming weights of
/// output neuron `j`, paired with `biases[j]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Layer {
    pub weights: Vec<Vec<f32>>,
    pub biases: Vec<f32>,
    pub activation: Activation,
}

impl Layer {
    fn forward(&self, input: &[f32]) -> Vec<f32> {
        self.weights
            .iter()
            .zip(&self.biases)
            .map(|(neuron_weights, bias)| {
                let sum: f32 = neuron_weights
                    .iter()
                    .zip(input)
                    .map(|(weight, value)| weight * value)
                    .sum();
                self.activation.apply(sum + bias)
            })
            .collect()
    }

    fn output_size(&self) -> usize {
        self.weights.len()
    }
}

/// A serialized feed-forward network definition, loaded once at startup.
///
/// The on-disk form is JSON: an input size plus an ordered list of
/// fully-connected layers. The final layer must produce exactly two scores,
/// interpreted as (probability OK, probability Not-OK).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedForwardNetwork {
    pub input_size: usize,
    pub layers: Vec<Layer>,
}

impl FeedForwardNetwork {
    /// Loads and validates a network definition from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, InspectError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(InspectError::NotFound(path.to_path_buf()));
        }
        let reader = BufReader::new(File::open(path)?);
        let network: FeedForwardNetwork = serde_json::from_reader(reader)
            .map_err(|e| InspectError::Network(format!("{}: {e}", path.display())))?;
        network.validate()?;
        Ok(network)
    }

    /// Checks that the layer shapes chain together and that the output layer
    /// yields exactly the two expected class scores.
    pub fn validate(&self) -> Result<(), InspectError> {
        if self.layers.is_empty() {
            return Err(InspectError::Network("network has no layers".into()));
        }

        let mut expected_inputs = self.input_size;
        for (index, layer) in self.layers.iter().enumerate() {
            if layer.weights.len() != layer.biases.len() {
                return Err(InspectError::Network(format!(
                    "layer {index}: {} weight rows but {} biases",
                    layer.weights.len(),
                    layer.biases.len()
                )));
            }
            for (neuron, neuron_weights) in layer.weights.iter().enumerate() {
                if neuron_weights.len() != expected_inputs {
                    return Err(InspectError::Network(format!(
                        "layer {index}, neuron {neuron}: expected {expected_inputs} weights, \
                         found {}",
                        neuron_weights.len()
                    )));
                }
            }
            expected_inputs = layer.output_size();
        }

        if expected_inputs != 2 {
            return Err(InspectError::Network(format!(
                "output layer yields {expected_inputs} scores, expected 2 (OK / Not-OK)"
            )));
        }
        Ok(())
    }
}

impl Classifier for FeedForwardNetwork {
    fn activate(&self, features: &[f32]) -> Result<ClassScores, InspectError> {
        if features.len() != self.input_size {
            return Err(InspectError::ClassifierInput {
                expected: self.input_size,
                actual: features.len(),
            });
        }

        let mut current = features.to_vec();
        for layer in &self.layers {
            current = layer.forward(&current);
        }

        match current.as_slice() {
            [ok, not_ok] => Ok((*ok, *not_ok)),
            other => Err(InspectError::Network(format!(
                "output layer yielded {} scores, expected 2 (OK / Not-OK)",
                other.len()
            ))),
        }
    }
}
