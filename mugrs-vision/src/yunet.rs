//! YuNet detector post-processing
//!
//! YuNet (2023mar) is anchor-free. For each stride (8, 16, 32) it emits four
//! named heads over an `(input / stride)^2` grid:
//! - `cls_<s>`: [1, N, 1] classification score
//! - `obj_<s>`: [1, N, 1] objectness score
//! - `bbox_<s>`: [1, N, 4] (dx, dy, log w, log h) in stride units
//! - `kps_<s>`: [1, N, 10] five landmark offsets in stride units
//!
//! Decoding for grid cell (row r, col c):
//! score = sqrt(clamp(cls) * clamp(obj))
//! cx = (c + dx) * stride, cy = (r + dy) * stride
//! w = exp(log w) * stride, h = exp(log h) * stride

use std::collections::HashMap;

use anyhow::{Context, Result};

pub const STRIDES: [usize; 3] = [8, 16, 32];

/// Raw tensor as extracted from the session: shape and flat data.
pub type Tensor = (Vec<i64>, Vec<f32>);

#[derive(Debug, Clone)]
pub struct RawDetection {
    pub bbox: [f32; 4], // x, y, w, h in input-canvas pixels
    pub score: f32,
    pub landmarks: [f32; 10],
}

/// The four heads for one stride, validated against the grid size.
#[derive(Debug, Clone)]
pub struct Head {
    pub stride: usize,
    pub cls: Vec<f32>,
    pub obj: Vec<f32>,
    pub bbox: Vec<f32>,
    pub kps: Vec<f32>,
}

impl Head {
    pub fn cells(&self) -> usize {
        self.cls.len()
    }
}

fn take_head(
    outputs: &HashMap<String, Tensor>,
    name: &str,
    cells: usize,
    width: usize,
) -> Result<Vec<f32>> {
    let (shape, data) = outputs
        .get(name)
        .with_context(|| format!("missing output {name}"))?;
    let expected = [1, cells as i64, width as i64];
    if shape.as_slice() != expected {
        anyhow::bail!("unexpected shape for {name}: {shape:?}, expected {expected:?}");
    }
    Ok(data.clone())
}

/// Group named session outputs into one [`Head`] per stride.
pub fn collect_heads(outputs: &HashMap<String, Tensor>, input_size: usize) -> Result<Vec<Head>> {
    STRIDES
        .iter()
        .map(|&stride| {
            let side = input_size / stride;
            let cells = side * side;
            Ok(Head {
                stride,
                cls: take_head(outputs, &format!("cls_{stride}"), cells, 1)?,
                obj: take_head(outputs, &format!("obj_{stride}"), cells, 1)?,
                bbox: take_head(outputs, &format!("bbox_{stride}"), cells, 4)?,
                kps: take_head(outputs, &format!("kps_{stride}"), cells, 10)?,
            })
        })
        .collect()
}

/// Combine classification and objectness into a detection score.
pub fn score(cls: f32, obj: f32) -> f32 {
    (cls.clamp(0.0, 1.0) * obj.clamp(0.0, 1.0)).sqrt()
}

/// Decode every grid cell scoring at least `score_threshold`.
pub fn decode(heads: &[Head], input_size: usize, score_threshold: f32) -> Vec<RawDetection> {
    let mut detections = Vec::new();

    for head in heads {
        let side = input_size / head.stride;
        let stride = head.stride as f32;

        for idx in 0..head.cells() {
            let s = score(head.cls[idx], head.obj[idx]);
            if s < score_threshold {
                continue;
            }
            let row = (idx / side) as f32;
            let col = (idx % side) as f32;

            let b = &head.bbox[idx * 4..idx * 4 + 4];
            let cx = (col + b[0]) * stride;
            let cy = (row + b[1]) * stride;
            let w = b[2].exp() * stride;
            let h = b[3].exp() * stride;

            let k = &head.kps[idx * 10..idx * 10 + 10];
            let mut landmarks = [0.0f32; 10];
            for n in 0..5 {
                landmarks[n * 2] = (k[n * 2] + col) * stride;
                landmarks[n * 2 + 1] = (k[n * 2 + 1] + row) * stride;
            }

            detections.push(RawDetection {
                bbox: [cx - w / 2.0, cy - h / 2.0, w, h],
                score: s,
                landmarks,
            });
        }
    }

    detections
}
