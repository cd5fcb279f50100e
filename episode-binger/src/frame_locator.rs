use binge_common::bin_common::args::locator::LocatorArgs;
use binge_common::utils::unit_interval::UnitInterval;

use crate::distance::{compute_matrix, DistanceKernel, FrameList, LoadSpec};
use crate::episode::Episode;
use crate::error::{CoreError, CoreResult};
use crate::frame_source::Resolution;

/// The result of locating a short reference-frame window inside a search episode: the
/// index mapping for each of the `K` reference frames, and a reliability derived from
/// the worst per-frame distance along the winning diagonal.
#[derive(Debug, Clone)]
pub struct LocatorResult {
    pub mapping: Vec<(u64, u64)>,
    pub reliability: UnitInterval,
}

struct Best {
    search_frame: u64,
    diag_score: f64,
    min_frame_score: f64,
}

/// Finds where `probe_frames` consecutive frames starting at `ref_start` in
/// `reference` occur inside `search`, restricted to `search_range` (defaults to the
/// whole episode). Sweeps the search range in sections of `max_loading_frames`,
/// snapping each section's best match onto its diagonal, and re-centers once on a
/// match that looks like it might straddle two sections.
pub fn locate_frames(
    kernel: &dyn DistanceKernel,
    reference: &Episode,
    ref_start: u64,
    search: &Episode,
    search_range: Option<(u64, u64)>,
    reverse: bool,
    config: &LocatorArgs,
) -> CoreResult<Option<LocatorResult>> {
    let resolution = {
        let (h, w) = config.distance_args.resolution();
        Resolution::new(h, w)
    };

    let (range_start, range_end) = search_range.unwrap_or((0, search.frame_count()));
    if range_start >= range_end {
        return Err(CoreError::InvalidRange {
            start: range_start,
            end: range_end,
        });
    }

    let k = config.probe_frames.min(reference.frame_count() - ref_start);
    let l = config.max_loading_frames;

    let ref_spec = LoadSpec::new(
        reference.clone(),
        FrameList::Consecutive {
            start: ref_start,
            count: k,
        },
    );

    let starts = section_starts(range_start, range_end, l, reverse);

    let mut best: Option<Best> = None;
    let mut idx = 0usize;
    let mut pending_extra: Option<u64> = None;

    loop {
        let (section_start, consuming_extra) = if let Some(s) = pending_extra.take() {
            (s, true)
        } else if idx < starts.len() {
            (starts[idx], false)
        } else {
            break;
        };

        let section_len = l.min(range_end - section_start);
        if section_len == 0 {
            if !consuming_extra {
                idx += 1;
            }
            continue;
        }

        let search_spec = LoadSpec::new(
            search.clone(),
            FrameList::Consecutive {
                start: section_start,
                count: section_len,
            },
        );
        let matrix = compute_matrix(kernel, &ref_spec, &search_spec, resolution)?;
        let diag_means = matrix.diagonal_means();

        let Some((i_star, j_star, _)) = diag_means.min_unexcluded() else {
            if !consuming_extra {
                idx += 1;
            }
            continue;
        };

        let shift = i_star.min(j_star);
        let check_i = i_star - shift;
        let check_j = j_star - shift;
        let diag_score = diag_means.get(check_i, check_j);

        let run = i_star - check_i + 1;
        let min_frame_score = (0..run)
            .map(|d| matrix.get(check_i + d, check_j + d))
            .fold(f64::INFINITY, f64::min);

        let search_frame = section_start + check_j as u64;

        let improved = best
            .as_ref()
            .map(|b| diag_score < b.diag_score && min_frame_score < b.min_frame_score)
            .unwrap_or(true);

        if improved {
            best = Some(Best {
                search_frame,
                diag_score,
                min_frame_score,
            });

            // check_i != 0 means the best diagonal didn't start at this section's
            // first reference frame, i.e. the true match may straddle this section and
            // the previous/next one. Re-center once on it.
            if check_i != 0 && !consuming_extra {
                let half = l / 2;
                let center = search_frame.saturating_sub(half).max(range_start);
                pending_extra = Some(center);
            }
        }

        let early_exit =
            diag_score <= config.identical_threshold || min_frame_score < config.min_frame_early_exit;

        if !consuming_extra {
            idx += 1;
        }

        if early_exit {
            break;
        }
    }

    let Some(best) = best else {
        return Ok(None);
    };

    let mapping = (0..k)
        .map(|d| (ref_start + d, best.search_frame + d))
        .collect();

    Ok(Some(LocatorResult {
        mapping,
        reliability: UnitInterval::clamped(1.0 - best.min_frame_score),
    }))
}

fn section_starts(range_start: u64, range_end: u64, section_len: u64, reverse: bool) -> Vec<u64> {
    let mut starts = Vec::new();
    if !reverse {
        let mut s = range_start;
        while s < range_end {
            starts.push(s);
            s += section_len;
        }
    } else {
        let mut s = range_end;
        while s > range_start {
            let start = s.saturating_sub(section_len).max(range_start);
            starts.push(start);
            if start == range_start {
                break;
            }
            s = start;
        }
    }
    starts
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::distance::L1Distance;
    use crate::frame_source::synthetic::SyntheticSource;
    use std::{path::PathBuf, sync::Arc};

    fn shared_episodes(frame_count: u64, shift: i64) -> (Episode, Episode) {
        let reference = Episode::from_source(
            PathBuf::from("ref"),
            Arc::new(SyntheticSource::new(frame_count, 24.0)),
        );
        let search = Episode::from_source(
            PathBuf::from("search"),
            Arc::new(SyntheticSource::with_content_map(frame_count, 24.0, move |idx| {
                (idx as i64 - shift).max(0) as u64
            })),
        );
        (reference, search)
    }

    #[test]
    fn locates_a_known_window() {
        let (reference, search) = shared_episodes(2000, -300);
        let mut config = LocatorArgs::default();
        config.distance_args = config.distance_args.thumb_height(8).thumb_width(8);
        config.max_loading_frames = 200;

        let result = locate_frames(&L1Distance, &reference, 60, &search, None, false, &config)
            .unwrap()
            .expect("should locate the window");

        assert_eq!(result.mapping[0], (60, 360));
        assert!(result.reliability.get() >= 0.9);
    }

    #[test]
    fn locates_in_reverse_from_the_end() {
        let (reference, search) = shared_episodes(2000, -300);
        let mut config = LocatorArgs::default();
        config.distance_args = config.distance_args.thumb_height(8).thumb_width(8);
        config.max_loading_frames = 200;

        let result = locate_frames(&L1Distance, &reference, 1980, &search, None, true, &config)
            .unwrap()
            .expect("should locate the window even scanning in reverse");

        assert_eq!(result.mapping[0].1, 1980 + 300);
    }

    #[test]
    fn invalid_range_is_a_precondition_error() {
        let (reference, search) = shared_episodes(2000, 0);
        let config = LocatorArgs::default();
        let err = locate_frames(
            &L1Distance,
            &reference,
            0,
            &search,
            Some((100, 50)),
            false,
            &config,
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::InvalidRange { .. }));
    }
}
