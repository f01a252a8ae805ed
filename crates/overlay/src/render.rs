use crate::frame::Frame;
use crate::pipeline::Overlay;
use anyhow::Context;
use image::{Rgb, RgbImage};
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect};
use std::fs;
use std::path::{Path, PathBuf};

/// Box outline colour.
pub const OVERLAY_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

/// Where annotated frames go. Failures are reported to the caller, which logs
/// them and keeps playing.
pub trait Renderer {
    fn present(&mut self, frame: &Frame, overlays: &[Overlay]) -> anyhow::Result<()>;

    /// Diagnostic shown alongside a frame that fell back to bare rendering.
    fn notice(&mut self, frame_index: u64, message: &str) {
        tracing::warn!(frame_index, notice = message, "Frame notice");
    }
}

/// Writes every presented frame as `frame_NNNNN.jpg` into a directory.
pub struct ImageFileRenderer {
    output_dir: PathBuf,
}

impl ImageFileRenderer {
    pub fn new(output_dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let output_dir = output_dir.as_ref().to_path_buf();
        fs::create_dir_all(&output_dir)
            .with_context(|| format!("Failed to create {}", output_dir.display()))?;
        Ok(Self { output_dir })
    }

    pub fn frame_path(&self, frame_index: u64) -> PathBuf {
        self.output_dir.join(format!("frame_{frame_index:05}.jpg"))
    }
}

impl Renderer for ImageFileRenderer {
    fn present(&mut self, frame: &Frame, overlays: &[Overlay]) -> anyhow::Result<()> {
        let image = annotate(frame, overlays)?;
        let path = self.frame_path(frame.index());
        image
            .save(&path)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        tracing::trace!(path = %path.display(), overlays = overlays.len(), "Frame written");
        Ok(())
    }
}

/// Copy of the frame with each overlay drawn as a hollow rectangle.
pub fn annotate(frame: &Frame, overlays: &[Overlay]) -> anyhow::Result<RgbImage> {
    let mut image = RgbImage::from_raw(frame.width(), frame.height(), frame.pixels().to_vec())
        .context("Frame buffer does not match its dimensions")?;

    for overlay in overlays {
        let bbox = &overlay.bbox;
        let width = bbox.width().round() as u32;
        let height = bbox.height().round() as u32;
        // Rect cannot be empty
        if width == 0 || height == 0 {
            continue;
        }
        let rect = Rect::at(bbox.x1.round() as i32, bbox.y1.round() as i32).of_size(width, height);
        draw_hollow_rect_mut(&mut image, rect, OVERLAY_COLOR);
    }

    Ok(image)
}
