pub mod ffmpeg_source;
pub mod logger;
pub mod synthetic;
pub mod timestamp;

use image::RgbImage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameShape {
    pub height: u32,
    pub width: u32,
    pub channels: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub height: u32,
    pub width: u32,
}

impl Resolution {
    pub fn new(height: u32, width: u32) -> Self {
        Self { height, width }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("frame index {index} is out of range, frame count is {frame_count}")]
    IndexOutOfRange { index: u64, frame_count: u64 },

    #[error(transparent)]
    Other(#[from] color_eyre::eyre::Error),
}

/// Random access to the decoded frames of one episode, as fixed-size thumbnails.
/// Implementations must be safe to call concurrently from at most a handful of worker
/// threads at once (the Distance Kernel opens one decode per episode per comparison, not
/// one per frame).
pub trait FrameSource: Send + Sync {
    fn frame_count(&self) -> u64;
    fn fps(&self) -> f64;
    fn frame_shape(&self) -> FrameShape;

    /// Seeks to and decodes each index independently; output order matches `indexes`.
    fn read_thumbnails(
        &self,
        indexes: &[u64],
        resolution: Resolution,
    ) -> Result<Vec<RgbImage>, SourceError>;

    /// Decodes `count` frames in stream order starting at `start`, without reseeking
    /// between them.
    fn read_consecutive(
        &self,
        start: u64,
        count: u64,
        resolution: Resolution,
    ) -> Result<Vec<RgbImage>, SourceError>;
}

/// Area-downscales a decoded frame to a thumbnail resolution. `image` has no exact
/// equivalent to OpenCV's `INTER_AREA`; `Triangle` is the closest box-like filter it
/// ships and is what every thumbnail in this crate goes through.
pub fn make_thumbnail(frame: &RgbImage, resolution: Resolution) -> RgbImage {
    image::imageops::resize(
        frame,
        resolution.width,
        resolution.height,
        image::imageops::FilterType::Triangle,
    )
}
