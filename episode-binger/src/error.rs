use crate::frame_source::SourceError;

/// The error taxonomy surfaced by the content-alignment core. "No match" is
/// deliberately absent here — a finder/locator/boundary-finder that simply didn't find
/// anything returns `Option::None`, it does not produce a `CoreError`.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("episodes have mismatched frame shapes: {0:?} vs {1:?}")]
    ShapeMismatch(crate::frame_source::FrameShape, crate::frame_source::FrameShape),

    #[error("invalid search range: start={start} end={end}")]
    InvalidRange { start: u64, end: u64 },

    #[error("failed to decode a frame")]
    Decode(#[from] SourceError),

    #[error("a decode worker panicked: {0}")]
    WorkerPanic(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
