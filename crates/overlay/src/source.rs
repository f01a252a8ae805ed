use crate::frame::Frame;
use anyhow::Context;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Decoded frames addressed by stream timestamp. `None` is end of stream.
pub trait FrameSource {
    fn frame_at(&mut self, timestamp_us: u64) -> Option<Frame>;

    /// Whether the source can deliver frames at all.
    fn is_ready(&self) -> bool {
        true
    }
}

fn slot(timestamp_us: u64, interval_us: u64) -> usize {
    (timestamp_us / interval_us.max(1)) as usize
}

/// In-memory frames, frame `n` covering `[n * interval, (n + 1) * interval)`.
#[derive(Debug, Clone)]
pub struct VecFrameSource {
    frames: Vec<Frame>,
    interval_us: u64,
}

impl VecFrameSource {
    pub fn new(frames: Vec<Frame>, interval: Duration) -> Self {
        Self {
            frames,
            interval_us: interval.as_micros() as u64,
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl FrameSource for VecFrameSource {
    fn frame_at(&mut self, timestamp_us: u64) -> Option<Frame> {
        self.frames.get(slot(timestamp_us, self.interval_us)).cloned()
    }

    fn is_ready(&self) -> bool {
        !self.frames.is_empty()
    }
}

const FRAME_PATTERNS: [&str; 3] = ["*.jpg", "*.jpeg", "*.png"];

/// A directory of still images played back in file-name order.
#[derive(Debug)]
pub struct ImageSequenceSource {
    paths: Vec<PathBuf>,
    interval_us: u64,
}

impl ImageSequenceSource {
    pub fn open(dir: impl AsRef<Path>, interval: Duration) -> anyhow::Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            anyhow::bail!("Frames directory {} does not exist", dir.display());
        }

        let options = glob::MatchOptions {
            case_sensitive: false,
            ..Default::default()
        };
        let mut paths = Vec::new();
        for pattern in FRAME_PATTERNS {
            let pattern = dir.join(pattern);
            let matches = glob::glob_with(&pattern.to_string_lossy(), options)
                .with_context(|| format!("Invalid frame pattern {}", pattern.display()))?;
            paths.extend(matches.filter_map(Result::ok));
        }
        paths.sort();
        paths.dedup();

        tracing::info!(dir = %dir.display(), frames = paths.len(), "Opened image sequence");

        Ok(Self {
            paths,
            interval_us: interval.as_micros() as u64,
        })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl FrameSource for ImageSequenceSource {
    fn frame_at(&mut self, timestamp_us: u64) -> Option<Frame> {
        let index = slot(timestamp_us, self.interval_us);
        let path = self.paths.get(index)?;

        // An unreadable file ends the stream rather than the session.
        let image = match image::open(path) {
            Ok(image) => image.to_rgb8(),
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Failed to decode frame");
                return None;
            }
        };

        let (width, height) = image.dimensions();
        match Frame::new(index as u64, width, height, image.into_raw()) {
            Ok(frame) => Some(frame),
            Err(e) => {
                tracing::error!(error = %e, "Decoded frame is malformed");
                None
            }
        }
    }

    fn is_ready(&self) -> bool {
        !self.paths.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    const INTERVAL: Duration = Duration::from_millis(100);

    #[test]
    fn test_vec_source_maps_timestamps_to_slots() {
        let frames = (0..3).map(|i| Frame::filled(i, 4, 4, [0, 0, 0])).collect();
        let mut source = VecFrameSource::new(frames, INTERVAL);

        assert!(source.is_ready());
        assert_eq!(source.frame_at(0).unwrap().index(), 0);
        assert_eq!(source.frame_at(99_999).unwrap().index(), 0);
        assert_eq!(source.frame_at(100_000).unwrap().index(), 1);
        assert_eq!(source.frame_at(250_000).unwrap().index(), 2);
        assert!(source.frame_at(300_000).is_none());
    }

    #[test]
    fn test_empty_vec_source_is_not_ready() {
        let source = VecFrameSource::new(Vec::new(), INTERVAL);
        assert!(!source.is_ready());
        assert!(source.is_empty());
    }

    #[test]
    fn test_image_sequence_plays_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        RgbImage::from_pixel(6, 4, Rgb([255, 0, 0]))
            .save(dir.path().join("b.png"))
            .unwrap();
        RgbImage::from_pixel(3, 2, Rgb([0, 0, 255]))
            .save(dir.path().join("a.png"))
            .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not a frame").unwrap();

        let mut source = ImageSequenceSource::open(dir.path(), INTERVAL).unwrap();
        assert_eq!(source.len(), 2);
        assert!(source.is_ready());

        let first = source.frame_at(0).unwrap();
        assert_eq!((first.width(), first.height()), (3, 2));
        assert_eq!(&first.pixels()[..3], &[0, 0, 255]);

        let second = source.frame_at(100_000).unwrap();
        assert_eq!(second.index(), 1);
        assert_eq!((second.width(), second.height()), (6, 4));

        assert!(source.frame_at(200_000).is_none());
    }

    #[test]
    fn test_image_sequence_matches_extensions_in_any_case() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.png", "b.PNG", "c.Jpeg", "d.JPG"] {
            RgbImage::from_pixel(2, 2, Rgb([0, 0, 0]))
                .save_with_format(dir.path().join(name), image::ImageFormat::Png)
                .unwrap();
        }
        std::fs::write(dir.path().join("e.TXT"), "not a frame").unwrap();

        let source = ImageSequenceSource::open(dir.path(), INTERVAL).unwrap();
        assert_eq!(source.len(), 4);
    }

    #[test]
    fn test_corrupt_image_ends_stream() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("000.jpg"), b"not really a jpeg").unwrap();

        let mut source = ImageSequenceSource::open(dir.path(), INTERVAL).unwrap();
        assert!(source.is_ready());
        assert!(source.frame_at(0).is_none());
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ImageSequenceSource::open(dir.path().join("absent"), INTERVAL).is_err());
    }
}
