//! YOLOv8 detection head decoding.
//!
//! The exported head is `[1, 4 + classes, anchors]`: rows 0-3 hold the box
//! centre and size in letterboxed input pixels, the remaining rows hold one
//! score per class. Some exports transpose it to `[1, anchors, 4 + classes]`;
//! both layouts are accepted. The class count comes from the configuration,
//! so the row axis is the one of length `4 + num_classes`.

use pcos_core::config::DetectorConfig;
use pcos_core::inference::{BoundingBox, InferenceError, InferenceResult};

use crate::preprocess::Letterbox;

/// Decode raw head output into boxes in source-image pixels.
pub fn decode_detections(
    output: &[f32],
    shape: &[usize],
    params: &DetectorConfig,
    letterbox: &Letterbox,
) -> InferenceResult<Vec<BoundingBox>> {
    let rows = 4 + params.num_classes;
    let (anchors, transposed) = match shape {
        [1, a, b] if *a == rows => (*b, false),
        [1, a, b] if *b == rows => (*a, true),
        other => {
            return Err(InferenceError::InvalidOutput(format!(
                "unexpected detector output shape {:?}, expected {} rows for {} classes",
                other, rows, params.num_classes
            )))
        }
    };
    if output.len() != rows * anchors {
        return Err(InferenceError::InvalidOutput(format!(
            "detector output has {} values, shape {:?} needs {}",
            output.len(),
            shape,
            rows * anchors
        )));
    }

    let at = |row: usize, anchor: usize| {
        if transposed {
            output[anchor * rows + row]
        } else {
            output[row * anchors + anchor]
        }
    };

    let mut candidates = Vec::new();
    for anchor in 0..anchors {
        let (class_id, confidence) = (4..rows)
            .map(|row| (row - 4, at(row, anchor)))
            .fold((0, f32::NEG_INFINITY), |best, cur| if cur.1 > best.1 { cur } else { best });

        if !(confidence >= params.confidence_threshold) {
            continue;
        }

        let (cx, cy, w, h) = (at(0, anchor), at(1, anchor), at(2, anchor), at(3, anchor));
        let (x1, y1) = letterbox.to_source(cx - w / 2.0, cy - h / 2.0);
        let (x2, y2) = letterbox.to_source(cx + w / 2.0, cy + h / 2.0);

        candidates.push(BoundingBox {
            x1,
            y1,
            x2,
            y2,
            confidence,
            class_id: class_id as u32,
        });
    }

    let kept = non_max_suppression(candidates, params.iou_threshold, params.max_detections);
    tracing::debug!(kept = kept.len(), "decoded detector output");
    Ok(kept)
}

/// Greedy per-class NMS, highest confidence first.
pub fn non_max_suppression(
    mut boxes: Vec<BoundingBox>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<BoundingBox> {
    boxes.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut kept: Vec<BoundingBox> = Vec::new();
    for candidate in boxes {
        if kept.len() >= max_detections {
            break;
        }
        let suppressed = kept
            .iter()
            .any(|k| k.class_id == candidate.class_id && k.iou(&candidate) > iou_threshold);
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}
