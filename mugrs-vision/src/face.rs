use std::collections::HashMap;

use crate::yunet;
use anyhow::Result;
use image::{DynamicImage, GenericImageView};
use ndarray::Array4;
use ort::{session::Session, value::Value};

/// YuNet's fixed input side.
pub const INPUT_SIZE: u32 = 640;

/// Detection result in original image pixels
#[derive(Debug, Clone)]
pub struct Detection {
    pub bbox: [f32; 4], // x, y, w, h
    pub score: f32,
    pub landmarks: [f32; 10], // 5 points: x1,y1,...,x5,y5
}

/// How an image was scaled and padded onto the square detector canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

impl Letterbox {
    pub fn fit(width: u32, height: u32, target: u32) -> Self {
        let scale = target as f32 / width.max(height) as f32;
        let new_w = (width as f32 * scale) as u32;
        let new_h = (height as f32 * scale) as u32;
        Self {
            scale,
            offset_x: ((target - new_w) / 2) as f32,
            offset_y: ((target - new_h) / 2) as f32,
        }
    }

    /// Map a canvas x coordinate back onto the source image.
    pub fn unmap_x(&self, x: f32) -> f32 {
        (x - self.offset_x) / self.scale
    }

    pub fn unmap_y(&self, y: f32) -> f32 {
        (y - self.offset_y) / self.scale
    }

    fn unmap(&self, raw: yunet::RawDetection) -> Detection {
        let mut landmarks = [0.0f32; 10];
        for i in 0..5 {
            landmarks[i * 2] = self.unmap_x(raw.landmarks[i * 2]);
            landmarks[i * 2 + 1] = self.unmap_y(raw.landmarks[i * 2 + 1]);
        }
        Detection {
            bbox: [
                self.unmap_x(raw.bbox[0]),
                self.unmap_y(raw.bbox[1]),
                raw.bbox[2] / self.scale,
                raw.bbox[3] / self.scale,
            ],
            score: raw.score,
            landmarks,
        }
    }
}

/// Pad the image onto a square canvas and pack it as a planar BGR tensor.
fn prepare_input(img: &DynamicImage) -> Result<(Array4<f32>, Letterbox)> {
    let (width, height) = img.dimensions();
    let lb = Letterbox::fit(width, height, INPUT_SIZE);

    let resized = img.resize_exact(
        (width as f32 * lb.scale) as u32,
        (height as f32 * lb.scale) as u32,
        image::imageops::FilterType::Triangle,
    );
    let mut canvas = DynamicImage::new_rgb8(INPUT_SIZE, INPUT_SIZE);
    image::imageops::overlay(&mut canvas, &resized, lb.offset_x as i64, lb.offset_y as i64);
    let rgb = canvas.to_rgb8();

    let side = INPUT_SIZE as usize;
    let plane = side * side;
    let mut data = vec![0.0f32; 3 * plane];
    for (i, px) in rgb.pixels().enumerate() {
        data[i] = px[2] as f32;
        data[plane + i] = px[1] as f32;
        data[2 * plane + i] = px[0] as f32;
    }

    Ok((Array4::from_shape_vec((1, 3, side, side), data)?, lb))
}

/// Detect faces in an image, best score first.
pub fn detect_faces(
    session: &mut Session,
    img: &DynamicImage,
    score_threshold: f32,
    nms_threshold: f32,
) -> Result<Vec<Detection>> {
    let (input, lb) = prepare_input(img)?;
    let input_tensor = Value::from_array(input)?;
    let outputs = session.run(ort::inputs![input_tensor])?;

    let mut tensors: HashMap<String, yunet::Tensor> = HashMap::new();
    for (name, output) in outputs.iter() {
        let (shape, data) = output.try_extract_tensor::<f32>()?;
        tensors.insert(
            name.to_string(),
            (shape.iter().copied().collect(), data.to_vec()),
        );
    }

    let heads = yunet::collect_heads(&tensors, INPUT_SIZE as usize)?;
    let detections: Vec<Detection> = yunet::decode(&heads, INPUT_SIZE as usize, score_threshold)
        .into_iter()
        .map(|raw| lb.unmap(raw))
        .collect();

    log::debug!("yunet: {} candidates above {score_threshold}", detections.len());

    Ok(nms(&detections, nms_threshold))
}

/// Non-maximum suppression. The result is sorted by descending score.
pub fn nms(detections: &[Detection], iou_threshold: f32) -> Vec<Detection> {
    let mut sorted = detections.to_vec();
    sorted.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut keep: Vec<Detection> = Vec::with_capacity(sorted.len());
    for det in sorted {
        if keep
            .iter()
            .all(|k| compute_iou(&k.bbox, &det.bbox) <= iou_threshold)
        {
            keep.push(det);
        }
    }
    keep
}

fn compute_iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = (a[0] + a[2]).min(b[0] + b[2]);
    let y2 = (a[1] + a[3]).min(b[1] + b[3]);

    if x2 <= x1 || y2 <= y1 {
        return 0.0;
    }

    let inter = (x2 - x1) * (y2 - y1);
    inter / (a[2] * a[3] + b[2] * b[3] - inter)
}
