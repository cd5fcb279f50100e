use std::{path::PathBuf, sync::Arc};

use image::RgbImage;

use crate::frame_source::{
    ffmpeg_source::FfmpegSource, FrameShape, FrameSource, Resolution, SourceError,
};

/// A cheap handle to a decodable video. Cloning an `Episode` clones an `Arc`, so the
/// same episode can be shared across the Distance Kernel's two decode workers and
/// across `rayon`'s per-target fan-out in `locate_episodes` without re-opening the
/// underlying file per task.
#[derive(Clone)]
pub struct Episode {
    path: PathBuf,
    source: Arc<dyn FrameSource>,
}

impl Episode {
    pub fn open(path: impl Into<PathBuf>) -> color_eyre::eyre::Result<Self> {
        let path = path.into();
        let source = FfmpegSource::open(&path)?;
        Ok(Self {
            path,
            source: Arc::new(source),
        })
    }

    pub fn from_source(path: PathBuf, source: Arc<dyn FrameSource>) -> Self {
        Self { path, source }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    pub fn frame_count(&self) -> u64 {
        self.source.frame_count()
    }

    pub fn fps(&self) -> f64 {
        self.source.fps()
    }

    pub fn frame_shape(&self) -> FrameShape {
        self.source.frame_shape()
    }

    pub fn read_thumbnails(
        &self,
        indexes: &[u64],
        resolution: Resolution,
    ) -> Result<Vec<RgbImage>, SourceError> {
        self.source.read_thumbnails(indexes, resolution)
    }

    pub fn read_consecutive(
        &self,
        start: u64,
        count: u64,
        resolution: Resolution,
    ) -> Result<Vec<RgbImage>, SourceError> {
        self.source.read_consecutive(start, count, resolution)
    }
}

impl std::fmt::Debug for Episode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Episode").field("path", &self.path).finish()
    }
}
