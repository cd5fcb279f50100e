use std::sync::Arc;

use image::{Rgb, RgbImage};

use super::{FrameShape, FrameSource, Resolution, SourceError};

/// An in-memory `FrameSource` for tests. Each frame index maps (by default, the
/// identity mapping) to a "content id"; the thumbnail for a content id is a
/// deterministic solid-with-gradient fill, so two synthetic episodes can share pixel-
/// identical content at different frame offsets by giving them content maps that agree
/// on the overlapping range (see `with_content_map`), without needing real video files
/// or ffmpeg.
pub struct SyntheticSource {
    frame_count: u64,
    fps: f64,
    content_map: Arc<dyn Fn(u64) -> u64 + Send + Sync>,
}

impl SyntheticSource {
    pub fn new(frame_count: u64, fps: f64) -> Self {
        Self::with_content_map(frame_count, fps, |idx| idx)
    }

    pub fn with_content_map(
        frame_count: u64,
        fps: f64,
        content_map: impl Fn(u64) -> u64 + Send + Sync + 'static,
    ) -> Self {
        Self {
            frame_count,
            fps,
            content_map: Arc::new(content_map),
        }
    }

    fn check(&self, index: u64) -> Result<(), SourceError> {
        if index >= self.frame_count {
            Err(SourceError::IndexOutOfRange {
                index,
                frame_count: self.frame_count,
            })
        } else {
            Ok(())
        }
    }

    fn thumbnail_for(&self, index: u64, resolution: Resolution) -> RgbImage {
        pattern((self.content_map)(index), resolution)
    }
}

impl FrameSource for SyntheticSource {
    fn frame_count(&self) -> u64 {
        self.frame_count
    }

    fn fps(&self) -> f64 {
        self.fps
    }

    fn frame_shape(&self) -> FrameShape {
        FrameShape {
            height: 720,
            width: 1280,
            channels: 3,
        }
    }

    fn read_thumbnails(
        &self,
        indexes: &[u64],
        resolution: Resolution,
    ) -> Result<Vec<RgbImage>, SourceError> {
        indexes
            .iter()
            .map(|&idx| {
                self.check(idx)?;
                Ok(self.thumbnail_for(idx, resolution))
            })
            .collect()
    }

    fn read_consecutive(
        &self,
        start: u64,
        count: u64,
        resolution: Resolution,
    ) -> Result<Vec<RgbImage>, SourceError> {
        if count == 0 {
            return Ok(Vec::new());
        }
        self.check(start + count - 1)?;
        Ok((start..start + count)
            .map(|idx| self.thumbnail_for(idx, resolution))
            .collect())
    }
}

/// A cheap, deterministic splitmix64-style hash turned into a solid-with-gradient fill.
fn pattern(content_id: u64, resolution: Resolution) -> RgbImage {
    let mut z = content_id.wrapping_add(0x9E3779B97F4A7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^= z >> 31;

    let r = (z & 0xFF) as u8;
    let g = ((z >> 8) & 0xFF) as u8;
    let b = ((z >> 16) & 0xFF) as u8;

    RgbImage::from_fn(resolution.width, resolution.height, |x, y| {
        let shade = ((x + y) % 16) as u8;
        Rgb([
            r.saturating_add(shade),
            g.saturating_add(shade),
            b.saturating_add(shade),
        ])
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn identical_content_ids_produce_identical_thumbnails() {
        let res = Resolution::new(8, 8);
        let a = pattern(42, res);
        let b = pattern(42, res);
        assert_eq!(a, b);
    }

    #[test]
    fn different_content_ids_usually_differ() {
        let res = Resolution::new(8, 8);
        let a = pattern(1, res);
        let b = pattern(2, res);
        assert_ne!(a, b);
    }

    #[test]
    fn shared_content_map_aligns_two_episodes() {
        let shared_at = |offset: u64| move |idx: u64| idx.wrapping_sub(offset);
        let e1 = SyntheticSource::new(300, 24.0);
        let e2 = SyntheticSource::with_content_map(300, 24.0, shared_at(140));

        let res = Resolution::new(36, 64);
        let t1 = e1.read_thumbnails(&[60], res).unwrap();
        let t2 = e2.read_thumbnails(&[200], res).unwrap();
        assert_eq!(t1, t2);
    }

    #[test]
    fn out_of_range_index_errors() {
        let e = SyntheticSource::new(10, 24.0);
        assert!(e
            .read_thumbnails(&[10], Resolution::new(8, 8))
            .is_err());
        assert!(e
            .read_consecutive(5, 6, Resolution::new(8, 8))
            .is_err());
    }
}
