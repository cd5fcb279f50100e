use binge_common::bin_common::args::boundary::BoundaryArgs;

use crate::chunk::Chunk;
use crate::distance::{compute_matrix, DistanceKernel, FrameList, LoadSpec};
use crate::episode::Episode;
use crate::error::CoreResult;
use crate::frame_source::Resolution;

/// Given a seed identical-frame pair, finds the maximal shared chunk surrounding it:
/// wide diagonal scan to bracket the similar region, then a zoomed-in diagonal-mean
/// scan at each edge to pin down the exact first/last identical frame.
pub fn find_boundaries(
    kernel: &dyn DistanceKernel,
    e1: &Episode,
    e2: &Episode,
    seed: (u64, u64),
    config: &BoundaryArgs,
) -> CoreResult<Option<(Chunk, Chunk)>> {
    let resolution = {
        let (h, w) = config.distance_args.resolution();
        Resolution::new(h, w)
    };

    let half_range = config.max_frames_search_range / 2;
    let stride = (config.max_frames_search_range / config.max_probes).max(1);

    let probes1: Vec<u64> = (0..config.max_probes)
        .map(|k| clamp_probe(seed.0, half_range, k, stride, e1.frame_count()))
        .collect();
    let probes2: Vec<u64> = (0..config.max_probes)
        .map(|k| clamp_probe(seed.1, half_range, k, stride, e2.frame_count()))
        .collect();

    let spec1 = LoadSpec::new(e1.clone(), FrameList::Indexed(probes1.clone()));
    let spec2 = LoadSpec::new(e2.clone(), FrameList::Indexed(probes2.clone()));
    let wide = compute_matrix(kernel, &spec1, &spec2, resolution)?;
    let diag = wide.diagonal();

    let Some(first_similar) = diag.iter().position(|&d| d <= config.similar_threshold) else {
        return Ok(None);
    };
    let mut last_similar = first_similar;
    for (k, &d) in diag.iter().enumerate().skip(first_similar + 1) {
        if d <= config.similar_threshold {
            last_similar = k;
        } else {
            break;
        }
    }

    let Some((l1, l2)) = zoom_left(
        kernel,
        e1,
        e2,
        probes1[first_similar],
        probes2[first_similar],
        stride,
        config,
        resolution,
    )?
    else {
        return Ok(None);
    };

    let Some((u1, u2)) = zoom_right(
        kernel,
        e1,
        e2,
        probes1[last_similar],
        probes2[last_similar],
        stride,
        config,
        resolution,
    )?
    else {
        return Ok(None);
    };

    Ok(Some((
        Chunk::new(e1.clone(), l1, u1),
        Chunk::new(e2.clone(), l2, u2),
    )))
}

fn clamp_probe(seed: u64, half_range: u64, k: u64, stride: u64, frame_count: u64) -> u64 {
    let raw = (seed + k * stride).saturating_sub(half_range);
    raw.min(frame_count.saturating_sub(1))
}

#[allow(clippy::too_many_arguments)]
fn zoom_left(
    kernel: &dyn DistanceKernel,
    e1: &Episode,
    e2: &Episode,
    probe1: u64,
    probe2: u64,
    stride: u64,
    config: &BoundaryArgs,
    resolution: Resolution,
) -> CoreResult<Option<(u64, u64)>> {
    let lo1 = probe1.saturating_sub(stride);
    let lo2 = probe2.saturating_sub(stride);

    let spec1 = LoadSpec::new(
        e1.clone(),
        FrameList::Consecutive {
            start: lo1,
            count: probe1 - lo1 + 1,
        },
    );
    let spec2 = LoadSpec::new(
        e2.clone(),
        FrameList::Consecutive {
            start: lo2,
            count: probe2 - lo2 + 1,
        },
    );

    let matrix = compute_matrix(kernel, &spec1, &spec2, resolution)?;
    let diag = matrix.diagonal_means();

    let run = diag.rows().min(diag.cols());
    for i in 0..run {
        if diag.get(i, i) <= config.identical_threshold {
            return Ok(Some((lo1 + i as u64, lo2 + i as u64)));
        }
    }
    Ok(None)
}

#[allow(clippy::too_many_arguments)]
fn zoom_right(
    kernel: &dyn DistanceKernel,
    e1: &Episode,
    e2: &Episode,
    probe1: u64,
    probe2: u64,
    stride: u64,
    config: &BoundaryArgs,
    resolution: Resolution,
) -> CoreResult<Option<(u64, u64)>> {
    let hi1 = (probe1 + stride).min(e1.frame_count() - 1);
    let hi2 = (probe2 + stride).min(e2.frame_count() - 1);

    let spec1 = LoadSpec::new(
        e1.clone(),
        FrameList::Consecutive {
            start: probe1,
            count: hi1 - probe1 + 1,
        },
    )
    .reversed();
    let spec2 = LoadSpec::new(
        e2.clone(),
        FrameList::Consecutive {
            start: probe2,
            count: hi2 - probe2 + 1,
        },
    )
    .reversed();

    let matrix = compute_matrix(kernel, &spec1, &spec2, resolution)?;
    let diag = matrix.diagonal_means();

    let run = diag.rows().min(diag.cols());
    for i in 0..run {
        if diag.get(i, i) <= config.identical_threshold {
            // the loaded buffers were reversed, so local index i counts inward from
            // the far end of the window.
            return Ok(Some((hi1 - i as u64, hi2 - i as u64)));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::distance::L1Distance;
    use crate::frame_source::synthetic::SyntheticSource;
    use std::{path::PathBuf, sync::Arc};

    fn episode_with_shared_window(
        frame_count: u64,
        shared: std::ops::Range<u64>,
        offset: i64,
    ) -> Episode {
        Episode::from_source(
            PathBuf::from("e"),
            Arc::new(SyntheticSource::with_content_map(frame_count, 24.0, move |idx| {
                if shared.contains(&idx) {
                    (idx as i64 + offset) as u64
                } else {
                    idx + 1_000_000
                }
            })),
        )
    }

    #[test]
    fn finds_shared_chunk_boundaries_around_a_seed() {
        let e1 = episode_with_shared_window(2000, 600..900, 0);
        let e2 = episode_with_shared_window(2000, 600..900, 0);

        let mut config = BoundaryArgs::default();
        config.distance_args = config.distance_args.thumb_height(8).thumb_width(8);
        config.max_frames_search_range = 400;
        config.max_probes = 40;

        let result = find_boundaries(&L1Distance, &e1, &e2, (750, 750), &config)
            .unwrap()
            .expect("a shared chunk should be found");

        assert!(result.0.start_frame() <= 620);
        assert!(result.0.end_frame() >= 850);
    }

    #[test]
    fn no_similar_region_yields_none() {
        let e1 = Episode::from_source(
            PathBuf::from("e1"),
            Arc::new(SyntheticSource::new(2000, 24.0)),
        );
        let e2 = Episode::from_source(
            PathBuf::from("e2"),
            Arc::new(SyntheticSource::with_content_map(2000, 24.0, |idx| idx + 777_777)),
        );

        let mut config = BoundaryArgs::default();
        config.distance_args = config.distance_args.thumb_height(8).thumb_width(8);
        config.max_frames_search_range = 400;
        config.max_probes = 40;

        let result = find_boundaries(&L1Distance, &e1, &e2, (750, 750), &config).unwrap();
        assert!(result.is_none());
    }
}
