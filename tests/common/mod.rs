#![allow(dead_code)]

use std::fs;
use std::io::Cursor;
use std::path::Path;

use image::{ImageFormat, Rgb, RgbImage};
use serde_json::json;

/// Class order of the fixture model: red leaves, green leaves, blue leaves
pub const LABELS: [&str; 3] = ["Tomato___Late_blight", "Tomato___healthy", "Potato___Early_blight"];

pub const INPUT_SIZE: u32 = 8;

/// Dense kernel (3 in, 3 out) followed by its bias, little-endian f32.
///
/// The kernel is `5 * identity`, so after global pooling each colour channel
/// drives its own class.
pub fn weight_bytes() -> Vec<u8> {
    let mut values = Vec::with_capacity(12);
    for row in 0..3 {
        for col in 0..3 {
            values.push(if row == col { 5.0f32 } else { 0.0 });
        }
    }
    values.extend_from_slice(&[0.0f32, 0.0, 0.0]);
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub fn topology() -> serde_json::Value {
    json!({
        "class_name": "Sequential",
        "config": {
            "name": "leaf_classifier",
            "layers": [
                { "class_name": "InputLayer", "config": { "name": "input", "batch_input_shape": [null, INPUT_SIZE, INPUT_SIZE, 3] } },
                { "class_name": "GlobalAveragePooling2D", "config": { "name": "pool" } },
                { "class_name": "Dense", "config": { "name": "head", "units": 3, "activation": "softmax" } }
            ]
        }
    })
}

/// Writes a manifest whose single weight group spans `paths`.
pub fn write_manifest(dir: &Path, paths: &[String]) {
    let manifest = json!({
        "format": "layers-model",
        "generatedBy": "fixture",
        "modelTopology": topology(),
        "weightsManifest": [{
            "paths": paths,
            "weights": [
                { "name": "head/kernel", "shape": [3, 3], "dtype": "float32" },
                { "name": "head/bias", "shape": [3], "dtype": "float32" }
            ]
        }]
    });
    fs::write(dir.join("model.json"), serde_json::to_vec_pretty(&manifest).unwrap()).unwrap();
}

pub fn write_labels(dir: &Path) {
    fs::write(dir.join("labels.json"), serde_json::to_vec(&LABELS).unwrap()).unwrap();
}

/// Writes the full fixture model, splitting the weights over `shards` files.
pub fn write_model(dir: &Path, shards: usize) {
    let bytes = weight_bytes();
    let chunk = bytes.len().div_ceil(shards);
    let mut paths = Vec::new();
    for (i, part) in bytes.chunks(chunk).enumerate() {
        let name = format!("group1-shard{}of{}.bin", i + 1, shards);
        fs::write(dir.join(&name), part).unwrap();
        paths.push(name);
    }
    write_manifest(dir, &paths);
    write_labels(dir);
}

pub fn solid_image(width: u32, height: u32, rgb: [u8; 3], format: ImageFormat) -> Vec<u8> {
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(rgb)))
        .write_to(&mut Cursor::new(&mut bytes), format)
        .unwrap();
    bytes
}

pub fn red_leaf() -> Vec<u8> {
    solid_image(32, 24, [255, 0, 0], ImageFormat::Png)
}

pub fn green_leaf() -> Vec<u8> {
    solid_image(16, 16, [0, 255, 0], ImageFormat::Png)
}

/// Writes an `onnx` model whose single shard is not a valid ONNX graph.
pub fn write_garbage_onnx_model(dir: &Path) {
    let garbage = b"definitely not a protobuf graph".to_vec();
    let manifest = json!({
        "format": "onnx",
        "modelTopology": {},
        "weightsManifest": [{
            "paths": ["model.onnx.bin"],
            "weights": [{ "name": "graph", "shape": [garbage.len()], "dtype": "uint8" }]
        }]
    });
    fs::write(dir.join("model.json"), manifest.to_string()).unwrap();
    fs::write(dir.join("model.onnx.bin"), garbage).unwrap();
    write_labels(dir);
}
