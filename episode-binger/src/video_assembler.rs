use std::fmt::Write as _;
use std::path::Path;
use std::process::Command;

use crate::chunk::Chunk;

#[derive(Debug, thiserror::Error)]
pub enum AssembleError {
    #[error("no chunks given to assemble")]
    Empty,
    #[error("failed to launch ffmpeg: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("ffmpeg exited with status {0}: {1}")]
    FfmpegFailed(std::process::ExitStatus, String),
}

/// Trims each chunk to `[start_frame/fps, (end_frame+1)/fps)` seconds and concatenates
/// the results, in order, into one output file at `output_path`. Shells out to the
/// system `ffmpeg` binary rather than driving an encode/mux pipeline through the
/// low-level C API this crate already links for decoding — see the design notes for
/// why that's out of scope here.
pub fn assemble(chunks: &[Chunk], output_path: &Path) -> Result<(), AssembleError> {
    if chunks.is_empty() {
        return Err(AssembleError::Empty);
    }

    let mut command = Command::new("ffmpeg");
    command.arg("-y");
    for chunk in chunks {
        command.arg("-i").arg(chunk.episode().path());
    }
    command
        .arg("-filter_complex")
        .arg(filter_complex(chunks))
        .arg("-map")
        .arg("[outv]")
        .arg("-map")
        .arg("[outa]")
        .arg("-preset")
        .arg("veryfast")
        .arg(output_path);

    let output = command.output()?;
    if !output.status.success() {
        return Err(AssembleError::FfmpegFailed(
            output.status,
            String::from_utf8_lossy(&output.stderr).into_owned(),
        ));
    }
    Ok(())
}

/// Builds the `trim`/`atrim` + `concat` filter graph for `chunks`, one input stream pair
/// per chunk (`ffmpeg -i` is given the same path more than once when an episode
/// contributes several chunks, exactly as the reference `ffmpeg-python` assembler opens
/// a fresh input per chunk).
fn filter_complex(chunks: &[Chunk]) -> String {
    let mut filter = String::new();
    let mut labels = String::new();
    for (i, chunk) in chunks.iter().enumerate() {
        let fps = chunk.episode().fps();
        let start = chunk.start_frame() as f64 / fps;
        let end = (chunk.end_frame() + 1) as f64 / fps;
        let _ = write!(
            filter,
            "[{i}:v]trim=start={start:.6}:end={end:.6},setpts=PTS-STARTPTS[v{i}];\
             [{i}:a]atrim=start={start:.6}:end={end:.6},asetpts=PTS-STARTPTS[a{i}];"
        );
        let _ = write!(labels, "[v{i}][a{i}]");
    }
    let _ = write!(filter, "{labels}concat=n={}:v=1:a=1[outv][outa]", chunks.len());
    filter
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::episode::Episode;
    use crate::frame_source::synthetic::SyntheticSource;
    use std::{path::PathBuf, sync::Arc};

    fn episode(path: &str) -> Episode {
        Episode::from_source(
            PathBuf::from(path),
            Arc::new(SyntheticSource::new(1000, 25.0)),
        )
    }

    #[test]
    fn filter_complex_trims_each_chunk_and_concatenates_in_order() {
        let e = episode("show.mkv");
        let chunks = vec![
            Chunk::new(e.clone(), 0, 24),
            Chunk::new(e, 500, 999),
        ];

        let graph = filter_complex(&chunks);
        assert!(graph.contains("[0:v]trim=start=0.000000:end=1.000000"));
        assert!(graph.contains("[1:v]trim=start=20.000000:end=40.000000"));
        assert!(graph.ends_with("concat=n=2:v=1:a=1[outv][outa]"));
    }

    #[test]
    fn empty_chunk_list_is_rejected_before_spawning_ffmpeg() {
        let err = assemble(&[], Path::new("out.mp4")).unwrap_err();
        assert!(matches!(err, AssembleError::Empty));
    }
}
