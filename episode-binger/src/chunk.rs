use crate::episode::Episode;

/// A half-open... really a closed `[start_frame, end_frame]` interval of frame indices
/// within one specific episode. `start_frame <= end_frame < episode.frame_count()` is
/// maintained by every constructor.
#[derive(Debug, Clone)]
pub struct Chunk {
    episode: Episode,
    start_frame: u64,
    end_frame: u64,
}

impl Chunk {
    pub fn new(episode: Episode, start_frame: u64, end_frame: u64) -> Self {
        assert!(start_frame <= end_frame);
        assert!(end_frame < episode.frame_count());
        Self {
            episode,
            start_frame,
            end_frame,
        }
    }

    pub fn episode(&self) -> &Episode {
        &self.episode
    }

    pub fn start_frame(&self) -> u64 {
        self.start_frame
    }

    pub fn end_frame(&self) -> u64 {
        self.end_frame
    }

    pub fn len(&self) -> u64 {
        self.end_frame - self.start_frame + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn seconds(&self) -> f64 {
        self.len() as f64 / self.episode.fps()
    }

    /// A chunk is an opening if it sits closer to the start of the episode than to its
    /// end, an ending otherwise.
    pub fn is_opening(&self) -> bool {
        let frame_count = self.episode.frame_count();
        self.start_frame < frame_count - self.end_frame
    }

    pub fn is_ending(&self) -> bool {
        !self.is_opening()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::frame_source::synthetic::SyntheticSource;
    use std::{path::PathBuf, sync::Arc};

    fn episode(frame_count: u64) -> Episode {
        Episode::from_source(
            PathBuf::from("synthetic"),
            Arc::new(SyntheticSource::new(frame_count, 24.0)),
        )
    }

    #[test]
    fn classifies_opening_and_ending() {
        let e = episode(1000);
        let opening = Chunk::new(e.clone(), 0, 119);
        assert!(opening.is_opening());

        let ending = Chunk::new(e, 880, 999);
        assert!(ending.is_ending());
    }

    #[test]
    fn length_and_seconds() {
        let e = episode(1000);
        let c = Chunk::new(e, 0, 23);
        assert_eq!(c.len(), 24);
        assert!((c.seconds() - 1.0).abs() < 1e-9);
    }
}
