use std::collections::HashSet;

use rand::Rng;

use binge_common::bin_common::args::finder::FinderArgs;

use crate::distance::{compute_matrix, DistanceKernel, FrameList, LoadSpec};
use crate::episode::Episode;
use crate::error::CoreResult;
use crate::frame_source::Resolution;

/// A rectangular search window: frame index `init1..final1` on the first episode
/// paired against `init2..final2` on the second. Bounds are exclusive on the high end.
#[derive(Clone, Copy, Debug)]
pub struct SearchWindow {
    pub init1: u64,
    pub final1: u64,
    pub init2: u64,
    pub final2: u64,
}

impl SearchWindow {
    pub fn whole(e1: &Episode, e2: &Episode) -> Self {
        Self {
            init1: 0,
            final1: e1.frame_count(),
            init2: 0,
            final2: e2.frame_count(),
        }
    }
}

/// Outcome of one blind search. `identical` is the confirmed match (if any);
/// `best_effort` is the globally lowest-distance pair seen along the way, kept
/// separate so the caller decides whether to fall back to it rather than the finder
/// silently upgrading a weak match to a strong one.
#[derive(Debug, Clone)]
pub struct FinderResult {
    pub identical: Option<(u64, u64)>,
    pub best_effort: Option<(u64, u64, f64)>,
}

/// Recursive stochastic search for one pair of temporally aligned identical frames
/// between `e1` and `e2`, restricted to `window`. `exclusion` is threaded through by
/// the caller across repeated calls on the same episode pair: entries in it can never
/// be (re-)returned as the confirmed match, which is how `Algorithm Manager::
/// find_common_chunk` forces a different seed on retry.
pub fn find_identical_frames(
    kernel: &dyn DistanceKernel,
    e1: &Episode,
    e2: &Episode,
    window: SearchWindow,
    exclusion: &mut Vec<(u64, u64)>,
    config: &FinderArgs,
    rng: &mut impl Rng,
) -> CoreResult<FinderResult> {
    let mut best_match: Option<(u64, u64, f64)> = None;
    let identical = recursive(
        kernel,
        e1,
        e2,
        window,
        config.max_reshuffles,
        exclusion,
        &mut best_match,
        config,
        rng,
    )?;
    Ok(FinderResult {
        identical,
        best_effort: best_match,
    })
}

#[allow(clippy::too_many_arguments)]
fn recursive(
    kernel: &dyn DistanceKernel,
    e1: &Episode,
    e2: &Episode,
    window: SearchWindow,
    max_reshuffles: u32,
    exclusion: &mut Vec<(u64, u64)>,
    best_match: &mut Option<(u64, u64, f64)>,
    config: &FinderArgs,
    rng: &mut impl Rng,
) -> CoreResult<Option<(u64, u64)>> {
    let resolution = {
        let (h, w) = config.distance_args.resolution();
        Resolution::new(h, w)
    };

    let span1 = window.final1.saturating_sub(window.init1);
    let span2 = window.final2.saturating_sub(window.init2);
    if span1 == 0 || span2 == 0 {
        return Ok(None);
    }

    let subsamples = config.num_subsamples as u64;
    let len1 = (span1 / subsamples).max(1);
    let len2 = (span2 / subsamples).max(1);
    let max_offset_combinations = len1 * len2;

    let mut used_offsets: HashSet<(u64, u64)> = HashSet::new();
    let mut reshuffle = 0;

    while reshuffle < max_reshuffles && (used_offsets.len() as u64) < max_offset_combinations {
        reshuffle += 1;

        let (offset1, offset2) = loop {
            let candidate = (rng.gen_range(0..len1), rng.gen_range(0..len2));
            if used_offsets.insert(candidate) {
                break candidate;
            }
            if (used_offsets.len() as u64) >= max_offset_combinations {
                return Ok(None);
            }
        };

        let e1_list: Vec<u64> = (0..subsamples)
            .map(|k| window.init1 + k * len1 + offset1)
            .filter(|&idx| idx < e1.frame_count())
            .collect();
        let e2_list: Vec<u64> = (0..subsamples)
            .map(|k| window.init2 + k * len2 + offset2)
            .filter(|&idx| idx < e2.frame_count())
            .collect();

        if e1_list.is_empty() || e2_list.is_empty() {
            continue;
        }

        let spec1 = LoadSpec::new(e1.clone(), FrameList::Indexed(e1_list.clone()));
        let spec2 = LoadSpec::new(e2.clone(), FrameList::Indexed(e2_list.clone()));
        let mut matrix = compute_matrix(kernel, &spec1, &spec2, resolution)?;

        let mut num_zoom_ins = 0u32;

        'shuffle: loop {
            let Some((i, j, d)) = matrix.min_unexcluded() else {
                break 'shuffle;
            };
            let global_pair = (e1_list[i], e2_list[j]);
            let blacklisted = exclusion.contains(&global_pair);

            if !blacklisted && best_match.map(|(_, _, bd)| d < bd).unwrap_or(true) {
                *best_match = Some((global_pair.0, global_pair.1, d));
            }

            if d <= config.identical_threshold {
                let refined = refine(kernel, e1, e2, global_pair, config, resolution)?;
                if !exclusion.contains(&refined) {
                    exclusion.push(refined);
                    return Ok(Some(refined));
                }
                matrix.mark_excluded(i, j);
                break 'shuffle;
            } else if d <= config.similar_threshold {
                if num_zoom_ins < 1 {
                    num_zoom_ins += 1;
                    let sub_window = zoom_window(e1, e2, global_pair, len1, len2);
                    if let Some(found) = recursive(
                        kernel,
                        e1,
                        e2,
                        sub_window,
                        1,
                        exclusion,
                        best_match,
                        config,
                        rng,
                    )? {
                        return Ok(Some(found));
                    }
                }
                matrix.mark_excluded(i, j);
            } else {
                break 'shuffle;
            }
        }
    }

    Ok(None)
}

fn zoom_window(
    e1: &Episode,
    e2: &Episode,
    pair: (u64, u64),
    len1: u64,
    len2: u64,
) -> SearchWindow {
    SearchWindow {
        init1: pair.0.saturating_sub(len1 / 2),
        final1: (pair.0 + len1 / 2 + 1).min(e1.frame_count()),
        init2: pair.1.saturating_sub(len2 / 2),
        final2: (pair.1 + len2 / 2 + 1).min(e2.frame_count()),
    }
}

/// Snaps a candidate identical pair onto the best nearby diagonal: builds a small
/// consecutive window around the pair on each axis, computes the diagonal-mean matrix
/// over it, and returns the episode indices of its global minimum. This rejects
/// single-frame coincidences (e.g. two unrelated dark frames) in favor of cells that
/// start a long run of genuinely low distances.
fn refine(
    kernel: &dyn DistanceKernel,
    e1: &Episode,
    e2: &Episode,
    pair: (u64, u64),
    config: &FinderArgs,
    resolution: Resolution,
) -> CoreResult<(u64, u64)> {
    let window = config.refinement_window as u64;

    let lo1 = pair.0.saturating_sub(window);
    let hi1 = (pair.0 + window).min(e1.frame_count() - 1);
    let lo2 = pair.1.saturating_sub(window);
    let hi2 = (pair.1 + window).min(e2.frame_count() - 1);

    let spec1 = LoadSpec::new(
        e1.clone(),
        FrameList::Consecutive {
            start: lo1,
            count: hi1 - lo1 + 1,
        },
    );
    let spec2 = LoadSpec::new(
        e2.clone(),
        FrameList::Consecutive {
            start: lo2,
            count: hi2 - lo2 + 1,
        },
    );

    let matrix = compute_matrix(kernel, &spec1, &spec2, resolution)?;
    let diag = matrix.diagonal_means();
    let (i, j, _) = diag.min_unexcluded().expect("window is never empty");
    Ok((lo1 + i as u64, lo2 + j as u64))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::distance::L1Distance;
    use crate::frame_source::synthetic::SyntheticSource;
    use rand::SeedableRng;
    use std::{path::PathBuf, sync::Arc};

    fn aligned_episodes(frame_count: u64, shared_at: u64) -> (Episode, Episode) {
        let e1 = Episode::from_source(
            PathBuf::from("e1"),
            Arc::new(SyntheticSource::new(frame_count, 24.0)),
        );
        let e2 = Episode::from_source(
            PathBuf::from("e2"),
            Arc::new(SyntheticSource::with_content_map(frame_count, 24.0, move |idx| {
                idx.wrapping_sub(shared_at)
            })),
        );
        (e1, e2)
    }

    #[test]
    fn finds_an_identical_pair_when_content_is_shared() {
        let (e1, e2) = aligned_episodes(300, 140);
        let mut config = FinderArgs::default();
        config.distance_args = config.distance_args.thumb_height(8).thumb_width(8);
        let mut exclusion = Vec::new();
        let mut rng = rand::rngs::SmallRng::seed_from_u64(1);

        let result = find_identical_frames(
            &L1Distance,
            &e1,
            &e2,
            SearchWindow::whole(&e1, &e2),
            &mut exclusion,
            &config,
            &mut rng,
        )
        .unwrap();

        let (i1, i2) = result.identical.expect("should find a confirmed match");
        assert_eq!(i2 as i64 - i1 as i64, 140);
        assert_eq!(exclusion.len(), 1);
    }

    #[test]
    fn exclusion_list_forces_a_different_match_on_retry() {
        let (e1, e2) = aligned_episodes(300, 140);
        let mut config = FinderArgs::default();
        config.distance_args = config.distance_args.thumb_height(8).thumb_width(8);
        let mut exclusion = Vec::new();
        let mut rng = rand::rngs::SmallRng::seed_from_u64(7);

        let first = find_identical_frames(
            &L1Distance,
            &e1,
            &e2,
            SearchWindow::whole(&e1, &e2),
            &mut exclusion,
            &config,
            &mut rng,
        )
        .unwrap();
        assert!(first.identical.is_some());

        let second = find_identical_frames(
            &L1Distance,
            &e1,
            &e2,
            SearchWindow::whole(&e1, &e2),
            &mut exclusion,
            &config,
            &mut rng,
        )
        .unwrap();
        // every frame in this fixture is identical content, so a second call must not
        // return the pair already in the exclusion list.
        if let Some(pair) = second.identical {
            assert_ne!(pair, (first.identical.unwrap().0, first.identical.unwrap().1));
        }
    }
}
