/// Axis-aligned box in corner form `(x1, y1, x2, y2)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

/// Added to the IoU denominator so zero-area boxes never divide by zero.
const IOU_EPSILON: f32 = 1e-6;

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Build from centre form `(cx, cy, w, h)`.
    #[inline]
    pub fn from_center(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self {
            x1: cx - w / 2.0,
            y1: cy - h / 2.0,
            x2: cx + w / 2.0,
            y2: cy + h / 2.0,
        }
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// `x1 >= x2 || y1 >= y2`. Also true when any coordinate is NaN.
    pub fn is_degenerate(&self) -> bool {
        !(self.x1 < self.x2 && self.y1 < self.y2)
    }

    pub fn scale(&self, factor: f32) -> Self {
        Self {
            x1: self.x1 * factor,
            y1: self.y1 * factor,
            x2: self.x2 * factor,
            y2: self.y2 * factor,
        }
    }

    /// Intersection over union, `inter / (area_a + area_b - inter + 1e-6)`.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        inter / (self.area() + other.area() - inter + IOU_EPSILON)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_center() {
        let b = BoundingBox::from_center(0.5, 0.5, 0.4, 0.2);
        assert!((b.x1 - 0.3).abs() < 1e-6);
        assert!((b.y1 - 0.4).abs() < 1e-6);
        assert!((b.x2 - 0.7).abs() < 1e-6);
        assert!((b.y2 - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_iou_identical_boxes() {
        let b = BoundingBox::new(10.0, 10.0, 20.0, 20.0);
        assert!((b.iou(&b) - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_iou_disjoint_boxes() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(20.0, 20.0, 30.0, 30.0);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn test_iou_half_overlap() {
        // Overlap 5x10 = 50, union 100 + 100 - 50 = 150
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(5.0, 0.0, 15.0, 10.0);
        assert!((a.iou(&b) - 1.0 / 3.0).abs() < 1e-4);
    }

    #[test]
    fn test_iou_zero_area_is_finite() {
        let a = BoundingBox::new(5.0, 5.0, 5.0, 5.0);
        let iou = a.iou(&a);
        assert!(iou.is_finite());
        assert_eq!(iou, 0.0);
    }

    #[test]
    fn test_degenerate_detection() {
        assert!(BoundingBox::new(10.0, 0.0, 10.0, 5.0).is_degenerate());
        assert!(BoundingBox::new(0.0, 6.0, 10.0, 5.0).is_degenerate());
        assert!(BoundingBox::new(f32::NAN, 0.0, 10.0, 5.0).is_degenerate());
        assert!(!BoundingBox::new(0.0, 0.0, 10.0, 5.0).is_degenerate());
    }
}
