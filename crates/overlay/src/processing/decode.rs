use crate::backend::RawOutput;
use crate::config::{OutputFormat, SelectionMode};
use crate::error::DecodeError;
use letterbox::BoundingBox;
use ndarray::{Axis, Ix3};

/// Values per candidate in the flat layout: `x, y, w, h, confidence, class`.
pub const FLAT_STRIDE: usize = 6;

/// A leading value in `[0, MAX_COUNT_PREFIX]` is read as a detection count.
pub const MAX_COUNT_PREFIX: f32 = 50.0;

const CONFIDENCE_OFFSET: usize = 4;
const CLASS_OFFSET: usize = 5;

/// Candidate detection in detector-input space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub class_id: Option<u32>,
}

/// How a flat buffer was interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlatLayout {
    /// First value is an explicit count; groups start at offset 1.
    CountPrefixed { count: usize },
    /// No usable count; groups with a plausible confidence were picked out.
    Scanned { accepted: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputLayout {
    Flat(FlatLayout),
    Structured { channels: usize, anchors: usize },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RejectCounts {
    pub low_confidence: usize,
    pub nan_coordinates: usize,
    pub degenerate: usize,
    pub outside_canvas: usize,
}

impl RejectCounts {
    pub fn total(&self) -> usize {
        self.low_confidence + self.nan_coordinates + self.degenerate + self.outside_canvas
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Decoded {
    /// `None` when the buffer was too short to hold a single group.
    pub layout: Option<OutputLayout>,
    pub candidates: Vec<Detection>,
    pub rejected: RejectCounts,
}

/// Turns raw engine output into candidate detections.
#[derive(Debug, Clone)]
pub struct TensorDecoder {
    input_size: u32,
    confidence_threshold: f32,
    format: OutputFormat,
    selection: SelectionMode,
}

impl TensorDecoder {
    pub fn new(input_size: u32, confidence_threshold: f32) -> Self {
        Self {
            input_size,
            confidence_threshold,
            format: OutputFormat::Flat,
            selection: SelectionMode::All,
        }
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_selection(mut self, selection: SelectionMode) -> Self {
        self.selection = selection;
        self
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Pin an `Auto` format against the engine's declared output shape.
    /// Declarations with dynamic dimensions stay `Auto` and are resolved per
    /// output instead.
    pub fn bind_declared_shape(&mut self, declared: &[i64]) -> OutputFormat {
        if self.format == OutputFormat::Auto && declared.iter().all(|&d| d >= 0) {
            let shape: Vec<usize> = declared.iter().map(|&d| d as usize).collect();
            self.format = OutputFormat::Auto.resolve(&shape);
        }
        self.format
    }

    pub fn decode(&self, raw: &RawOutput) -> Result<Decoded, DecodeError> {
        let mut decoded = match self.format.resolve(raw.shape()) {
            OutputFormat::Structured => self.decode_structured(raw)?,
            _ => self.decode_flat(&raw.values()),
        };

        if self.selection == SelectionMode::Best {
            keep_best(&mut decoded.candidates);
        }

        match decoded.layout {
            Some(layout) => tracing::debug!(
                layout = ?layout,
                candidates = decoded.candidates.len(),
                rejected = decoded.rejected.total(),
                "Decoded raw output"
            ),
            None => tracing::debug!(len = raw.values().len(), "Raw output too short to decode"),
        }

        Ok(decoded)
    }

    /// Decode the flat `[1, N]` layout.
    pub fn decode_flat(&self, values: &[f32]) -> Decoded {
        let Some(layout) = classify_flat(values) else {
            return Decoded::default();
        };

        let offsets: Vec<usize> = match layout {
            FlatLayout::CountPrefixed { count } => {
                (0..count).map(|i| 1 + i * FLAT_STRIDE).collect()
            }
            FlatLayout::Scanned { accepted } => scan_groups(values).take(accepted).collect(),
        };

        let mut decoded = Decoded {
            layout: Some(OutputLayout::Flat(layout)),
            ..Decoded::default()
        };

        for offset in offsets {
            let group = &values[offset..offset + FLAT_STRIDE];
            let class_id = class_from_value(group[CLASS_OFFSET]);
            if let Some(det) = self.accept(
                [group[0], group[1], group[2], group[3]],
                group[CONFIDENCE_OFFSET],
                class_id,
                &mut decoded.rejected,
            ) {
                decoded.candidates.push(det);
            }
        }

        decoded
    }

    /// Structured `[batch, channels, anchors]` output: batch 0 only, each
    /// anchor column is `x, y, w, h` followed by per-class scores.
    fn decode_structured(&self, raw: &RawOutput) -> Result<Decoded, DecodeError> {
        let view = raw
            .tensor()
            .view()
            .into_dimensionality::<Ix3>()
            .map_err(|_| DecodeError::NotRank3(raw.shape().to_vec()))?;

        let (batch, channels, anchors) = view.dim();
        if batch == 0 {
            return Err(DecodeError::EmptyBatch);
        }
        if channels < 5 {
            return Err(DecodeError::TooFewChannels(channels));
        }

        let first = view.index_axis(Axis(0), 0);
        let mut decoded = Decoded {
            layout: Some(OutputLayout::Structured { channels, anchors }),
            ..Decoded::default()
        };

        for column in first.columns() {
            let (best_class, confidence) = column
                .iter()
                .skip(CONFIDENCE_OFFSET)
                .copied()
                .enumerate()
                .fold((0usize, f32::NEG_INFINITY), |best, (class, score)| {
                    if score > best.1 { (class, score) } else { best }
                });
            let class_id = (channels > 5).then_some(best_class as u32);

            if let Some(det) = self.accept(
                [column[0], column[1], column[2], column[3]],
                confidence,
                class_id,
                &mut decoded.rejected,
            ) {
                decoded.candidates.push(det);
            }
        }

        Ok(decoded)
    }

    /// Validate one centre-form candidate and convert it to a corner-form box
    /// in detector-input space.
    fn accept(
        &self,
        [x, y, w, h]: [f32; 4],
        confidence: f32,
        class_id: Option<u32>,
        rejected: &mut RejectCounts,
    ) -> Option<Detection> {
        // Inclusive bound.
        if confidence.is_nan() || confidence < self.confidence_threshold {
            rejected.low_confidence += 1;
            return None;
        }

        if [x, y, w, h].iter().any(|v| v.is_nan()) {
            tracing::trace!("Skipping candidate with NaN coordinates");
            rejected.nan_coordinates += 1;
            return None;
        }

        let normalized = [x, y, w, h].iter().all(|v| v.abs() <= 1.0);
        let mut bbox = BoundingBox::from_center(x, y, w, h);
        if normalized {
            bbox = bbox.scale(self.input_size as f32);
        }

        if bbox.is_degenerate() {
            tracing::trace!(?bbox, "Skipping degenerate box");
            rejected.degenerate += 1;
            return None;
        }

        let size = self.input_size as f32;
        if bbox.x2 <= 0.0 || bbox.y2 <= 0.0 || bbox.x1 >= size || bbox.y1 >= size {
            tracing::trace!(?bbox, "Skipping box outside the input canvas");
            rejected.outside_canvas += 1;
            return None;
        }

        Some(Detection {
            bbox,
            confidence,
            class_id,
        })
    }
}

/// Decide how to read a flat buffer. `None` if it cannot hold one group.
///
/// The candidate count is capped at `(len - 1) / FLAT_STRIDE` on both paths.
pub fn classify_flat(values: &[f32]) -> Option<FlatLayout> {
    if values.len() < FLAT_STRIDE {
        return None;
    }

    let cap = (values.len() - 1) / FLAT_STRIDE;
    let first = values[0];

    if (0.0..=MAX_COUNT_PREFIX).contains(&first) {
        let count = first as usize;
        if count > cap {
            tracing::warn!(count, cap, "Detection count exceeds buffer, limiting");
        }
        Some(FlatLayout::CountPrefixed {
            count: count.min(cap),
        })
    } else {
        let accepted = scan_groups(values).count().min(cap);
        Some(FlatLayout::Scanned { accepted })
    }
}

/// Offsets of stride-aligned groups whose confidence lies in `(0, 1]`.
fn scan_groups(values: &[f32]) -> impl Iterator<Item = usize> + '_ {
    (0..values.len())
        .step_by(FLAT_STRIDE)
        .take_while(move |&i| i + CLASS_OFFSET < values.len())
        .filter(move |&i| {
            let confidence = values[i + CONFIDENCE_OFFSET];
            confidence > 0.0 && confidence <= 1.0
        })
}

fn class_from_value(value: f32) -> Option<u32> {
    (value.is_finite() && value >= 0.0).then(|| value as u32)
}

/// Reduce to the single highest-confidence candidate, earliest on ties.
fn keep_best(candidates: &mut Vec<Detection>) {
    let best = candidates
        .iter()
        .enumerate()
        .fold(None::<(usize, f32)>, |best, (i, det)| match best {
            Some((_, conf)) if det.confidence <= conf => best,
            _ => Some((i, det.confidence)),
        });

    if let Some((index, _)) = best {
        let chosen = candidates[index];
        candidates.clear();
        candidates.push(chosen);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{ArrayD, IxDyn};

    fn decoder() -> TensorDecoder {
        TensorDecoder::new(640, 0.5)
    }

    /// Count-prefixed buffer padded to `len` with zeros.
    fn count_prefixed(groups: &[[f32; 6]], len: usize) -> Vec<f32> {
        let mut values = vec![groups.len() as f32];
        for g in groups {
            values.extend_from_slice(g);
        }
        values.resize(len.max(values.len()), 0.0);
        values
    }

    #[test]
    fn test_too_short_buffer_is_empty_not_error() {
        for len in 0..FLAT_STRIDE {
            let values = vec![0.9; len];
            let decoded = decoder().decode(&RawOutput::from_flat(values)).unwrap();
            assert!(decoded.candidates.is_empty());
            assert_eq!(decoded.layout, None);
        }
    }

    #[test]
    fn test_count_prefix_with_three_valid_groups() {
        let values = count_prefixed(
            &[
                [0.2, 0.2, 0.1, 0.1, 0.9, 0.0],
                [0.5, 0.5, 0.2, 0.2, 0.8, 1.0],
                [0.8, 0.8, 0.1, 0.1, 0.7, 2.0],
            ],
            300,
        );
        let decoded = decoder().decode_flat(&values);

        assert_eq!(
            decoded.layout,
            Some(OutputLayout::Flat(FlatLayout::CountPrefixed { count: 3 }))
        );
        assert_eq!(decoded.candidates.len(), 3);
        assert_eq!(decoded.candidates[1].class_id, Some(1));
    }

    #[test]
    fn test_encounter_order_is_preserved() {
        let values = count_prefixed(
            &[
                [0.2, 0.2, 0.1, 0.1, 0.6, 0.0],
                [0.5, 0.5, 0.2, 0.2, 0.9, 0.0],
            ],
            13,
        );
        let decoded = decoder().decode_flat(&values);
        let confidences: Vec<f32> = decoded.candidates.iter().map(|d| d.confidence).collect();
        assert_eq!(confidences, vec![0.6, 0.9]);
    }

    #[test]
    fn test_count_prefix_is_truncated_toward_zero() {
        let mut values = count_prefixed(&[[0.5, 0.5, 0.2, 0.2, 0.9, 0.0]; 2], 13);
        values[0] = 1.7;
        assert_eq!(
            classify_flat(&values),
            Some(FlatLayout::CountPrefixed { count: 1 })
        );
    }

    #[test]
    fn test_count_is_capped_by_buffer_length() {
        // Claims 50 detections but only holds (13 - 1) / 6 = 2 groups.
        let mut values = count_prefixed(&[[0.5, 0.5, 0.2, 0.2, 0.9, 0.0]; 2], 13);
        values[0] = 50.0;

        assert_eq!(
            classify_flat(&values),
            Some(FlatLayout::CountPrefixed { count: 2 })
        );
        assert_eq!(decoder().decode_flat(&values).candidates.len(), 2);
    }

    #[test]
    fn test_zero_count_yields_nothing() {
        let values = count_prefixed(&[], 300);
        let decoded = decoder().decode_flat(&values);
        assert!(decoded.candidates.is_empty());
        assert_eq!(
            decoded.layout,
            Some(OutputLayout::Flat(FlatLayout::CountPrefixed { count: 0 }))
        );
    }

    #[test]
    fn test_scanning_path_when_first_value_is_not_a_count() {
        // First value 320 is pixel-space x, so no count prefix.
        let values = vec![
            320.0, 320.0, 100.0, 100.0, 0.9, 0.0, // accepted
            0.0, 0.0, 0.0, 0.0, 0.0, 0.0, // conf 0: skipped by scan
            100.0, 100.0, 50.0, 50.0, 0.7, 3.0, // accepted
            0.0, // trailing value
        ];
        let decoded = decoder().decode_flat(&values);

        assert_eq!(
            decoded.layout,
            Some(OutputLayout::Flat(FlatLayout::Scanned { accepted: 2 }))
        );
        assert_eq!(decoded.candidates.len(), 2);
        assert_eq!(
            decoded.candidates[0].bbox,
            BoundingBox::new(270.0, 270.0, 370.0, 370.0)
        );
        assert_eq!(decoded.candidates[1].class_id, Some(3));
    }

    #[test]
    fn test_scanning_ignores_implausible_confidence() {
        let values = vec![
            -3.0, 320.0, 100.0, 100.0, 1.5, 0.0, // conf > 1
            300.0, 300.0, 40.0, 40.0, 0.95, 0.0, // accepted
            0.0,
        ];
        assert_eq!(
            classify_flat(&values),
            Some(FlatLayout::Scanned { accepted: 1 })
        );
    }

    #[test]
    fn test_scanning_is_capped_by_buffer_length() {
        // Two full groups but no spare value: cap = (12 - 1) / 6 = 1.
        let values = vec![
            300.0, 300.0, 40.0, 40.0, 0.9, 0.0, //
            200.0, 200.0, 40.0, 40.0, 0.9, 0.0,
        ];
        assert_eq!(
            classify_flat(&values),
            Some(FlatLayout::Scanned { accepted: 1 })
        );
        assert_eq!(decoder().decode_flat(&values).candidates.len(), 1);
    }

    #[test]
    fn test_confidence_threshold_is_inclusive() {
        let values = count_prefixed(
            &[
                [0.5, 0.5, 0.2, 0.2, 0.5, 0.0],
                [0.5, 0.5, 0.2, 0.2, 0.49, 0.0],
            ],
            13,
        );
        let decoded = decoder().decode_flat(&values);
        assert_eq!(decoded.candidates.len(), 1);
        assert_eq!(decoded.candidates[0].confidence, 0.5);
        assert_eq!(decoded.rejected.low_confidence, 1);
    }

    #[test]
    fn test_nan_confidence_is_rejected() {
        let values = count_prefixed(&[[0.5, 0.5, 0.2, 0.2, f32::NAN, 0.0]], 7);
        let decoded = decoder().decode_flat(&values);
        assert!(decoded.candidates.is_empty());
        assert_eq!(decoded.rejected.low_confidence, 1);
    }

    #[test]
    fn test_nan_coordinates_are_rejected() {
        let values = count_prefixed(&[[0.5, f32::NAN, 0.2, 0.2, 0.9, 0.0]], 7);
        let decoded = decoder().decode_flat(&values);
        assert!(decoded.candidates.is_empty());
        assert_eq!(decoded.rejected.nan_coordinates, 1);
    }

    #[test]
    fn test_normalized_coordinates_are_scaled() {
        let values = count_prefixed(&[[0.5, 0.5, 0.25, 0.5, 0.9, 0.0]], 7);
        let det = decoder().decode_flat(&values).candidates[0];
        assert_eq!(det.bbox, BoundingBox::new(240.0, 160.0, 400.0, 480.0));
    }

    #[test]
    fn test_pixel_coordinates_are_kept() {
        let values = count_prefixed(&[[100.0, 200.0, 20.0, 40.0, 0.9, 0.0]], 7);
        let det = decoder().decode_flat(&values).candidates[0];
        assert_eq!(det.bbox, BoundingBox::new(90.0, 180.0, 110.0, 220.0));
    }

    #[test]
    fn test_degenerate_and_outside_boxes_are_rejected() {
        let values = count_prefixed(
            &[
                [0.5, 0.5, 0.0, 0.2, 0.9, 0.0],        // zero width
                [900.0, 300.0, 50.0, 50.0, 0.9, 0.0],  // right of canvas
                [-80.0, 300.0, 50.0, 50.0, 0.9, 0.0],  // left of canvas
                [630.0, 300.0, 50.0, 50.0, 0.9, 0.0],  // straddles edge: kept
            ],
            25,
        );
        let decoded = decoder().decode_flat(&values);

        assert_eq!(decoded.rejected.degenerate, 1);
        assert_eq!(decoded.rejected.outside_canvas, 2);
        assert_eq!(decoded.candidates.len(), 1);
        assert_eq!(decoded.candidates[0].bbox.x1, 605.0);
    }

    #[test]
    fn test_negative_class_value_has_no_class() {
        let values = count_prefixed(&[[0.5, 0.5, 0.2, 0.2, 0.9, -1.0]], 7);
        assert_eq!(decoder().decode_flat(&values).candidates[0].class_id, None);
    }

    /// `[batch, channels, anchors]` tensor from per-anchor columns of batch 0.
    fn structured(columns: &[Vec<f32>], batch: usize) -> RawOutput {
        let channels = columns[0].len();
        let anchors = columns.len();
        let mut data = vec![0.0f32; batch * channels * anchors];
        for (a, column) in columns.iter().enumerate() {
            for (c, &v) in column.iter().enumerate() {
                data[c * anchors + a] = v;
            }
        }
        RawOutput::new(
            ArrayD::from_shape_vec(IxDyn(&[batch, channels, anchors]), data).unwrap(),
        )
    }

    #[test]
    fn test_structured_single_class() {
        let raw = structured(
            &[
                vec![320.0, 320.0, 100.0, 100.0, 0.9],
                vec![100.0, 100.0, 20.0, 20.0, 0.1],
                vec![500.0, 500.0, 40.0, 40.0, 0.6],
            ],
            4,
        );
        let decoder = decoder().with_format(OutputFormat::Structured);
        let decoded = decoder.decode(&raw).unwrap();

        assert_eq!(
            decoded.layout,
            Some(OutputLayout::Structured {
                channels: 5,
                anchors: 3
            })
        );
        assert_eq!(decoded.candidates.len(), 2);
        assert_eq!(decoded.candidates[0].class_id, None);
        assert_eq!(
            decoded.candidates[1].bbox,
            BoundingBox::new(480.0, 480.0, 520.0, 520.0)
        );
    }

    #[test]
    fn test_structured_multi_class_argmax() {
        let raw = structured(
            &[
                vec![320.0, 320.0, 100.0, 100.0, 0.1, 0.8, 0.3],
                vec![100.0, 100.0, 20.0, 20.0, 0.7, 0.2, 0.1],
            ],
            1,
        );
        let decoder = decoder().with_format(OutputFormat::Structured);
        let decoded = decoder.decode(&raw).unwrap();

        assert_eq!(decoded.candidates.len(), 2);
        assert_eq!(decoded.candidates[0].class_id, Some(1));
        assert_eq!(decoded.candidates[0].confidence, 0.8);
        assert_eq!(decoded.candidates[1].class_id, Some(0));
    }

    #[test]
    fn test_structured_rejects_wrong_rank() {
        let decoder = decoder().with_format(OutputFormat::Structured);
        let err = decoder
            .decode(&RawOutput::from_flat(vec![0.0; 30]))
            .unwrap_err();
        assert!(matches!(err, DecodeError::NotRank3(_)));
    }

    #[test]
    fn test_structured_rejects_too_few_channels() {
        let raw = RawOutput::new(ArrayD::zeros(IxDyn(&[1, 4, 10])));
        let decoder = decoder().with_format(OutputFormat::Structured);
        assert!(matches!(
            decoder.decode(&raw).unwrap_err(),
            DecodeError::TooFewChannels(4)
        ));
    }

    #[test]
    fn test_best_selection_keeps_single_highest() {
        let values = count_prefixed(
            &[
                [0.2, 0.2, 0.1, 0.1, 0.7, 0.0],
                [0.5, 0.5, 0.2, 0.2, 0.9, 1.0],
                [0.8, 0.8, 0.1, 0.1, 0.9, 2.0],
            ],
            19,
        );
        let decoder = decoder().with_selection(SelectionMode::Best);
        let decoded = decoder.decode(&RawOutput::from_flat(values)).unwrap();

        assert_eq!(decoded.candidates.len(), 1);
        assert_eq!(decoded.candidates[0].class_id, Some(1), "earliest of the tie");
    }

    #[test]
    fn test_bind_declared_shape() {
        let mut flat = decoder().with_format(OutputFormat::Auto);
        assert_eq!(flat.bind_declared_shape(&[1, 300]), OutputFormat::Flat);

        let mut structured = decoder().with_format(OutputFormat::Auto);
        assert_eq!(
            structured.bind_declared_shape(&[1, 84, 8400]),
            OutputFormat::Structured
        );

        let mut dynamic = decoder().with_format(OutputFormat::Auto);
        assert_eq!(
            dynamic.bind_declared_shape(&[-1, 5, 8400]),
            OutputFormat::Auto
        );
    }
}
