use super::Detection;

/// Greedy non-maximum suppression.
///
/// Candidates are visited in descending confidence (stable, so equal scores
/// keep their input order). A candidate survives unless its IoU with an
/// already kept box exceeds `iou_threshold`. Returns indices into
/// `detections`, in the visiting order.
///
/// Quadratic in the candidate count, which stays small after the confidence
/// filter.
pub fn suppress(detections: &[Detection], iou_threshold: f32) -> Vec<usize> {
    let mut order: Vec<usize> = (0..detections.len()).collect();
    order.sort_by(|&a, &b| {
        detections[b]
            .confidence
            .total_cmp(&detections[a].confidence)
    });

    let mut kept: Vec<usize> = Vec::with_capacity(order.len());
    for i in order {
        let candidate = &detections[i].bbox;
        let overlaps = kept
            .iter()
            .any(|&k| detections[k].bbox.iou(candidate) > iou_threshold);
        if !overlaps {
            kept.push(i);
        }
    }

    tracing::trace!(
        candidates = detections.len(),
        kept = kept.len(),
        "Suppression complete"
    );

    kept
}
