use rand::Rng;
use rayon::prelude::*;

use binge_common::bin_common::args::manager::ManagerArgs;

use crate::boundary_finder::find_boundaries;
use crate::chunk::Chunk;
use crate::distance::DistanceKernel;
use crate::episode::Episode;
use crate::error::{CoreError, CoreResult};
use crate::frame_locator::locate_frames;
use crate::identical_frame_finder::{find_identical_frames, SearchWindow};

/// Composes the Identical-Frame Finder, Boundary Finder and Frame Locator into the
/// three operations the orchestration layer drives.
pub struct AlgorithmManager<K: DistanceKernel> {
    kernel: K,
    config: ManagerArgs,
}

/// The outcome of locating one reference chunk inside one target episode.
#[derive(Debug, Clone, Default)]
pub struct LocateOutcome {
    pub opening: Option<Chunk>,
    pub ending: Option<Chunk>,
}

impl<K: DistanceKernel> AlgorithmManager<K> {
    pub fn new(kernel: K, config: ManagerArgs) -> Self {
        Self { kernel, config }
    }

    pub fn config(&self) -> &ManagerArgs {
        &self.config
    }

    /// Blindly searches for a shared chunk between `e1` and `e2`, retrying with an
    /// accumulating exclusion list up to `max_retries` times and rejecting any chunk
    /// shorter than `min_chunk_seconds` on either side.
    pub fn find_common_chunk(
        &self,
        e1: &Episode,
        e2: &Episode,
        from: (u64, u64),
        to: Option<(u64, u64)>,
        rng: &mut impl Rng,
    ) -> CoreResult<Option<(Chunk, Chunk)>> {
        let shape1 = e1.frame_shape();
        let shape2 = e2.frame_shape();
        if shape1 != shape2 {
            return Err(CoreError::ShapeMismatch(shape1, shape2));
        }

        let (to1, to2) = to.unwrap_or((e1.frame_count(), e2.frame_count()));
        let window = SearchWindow {
            init1: from.0,
            final1: to1,
            init2: from.1,
            final2: to2,
        };

        let mut exclusion = Vec::new();

        for _ in 0..self.config.max_retries {
            let found = find_identical_frames(
                &self.kernel,
                e1,
                e2,
                window,
                &mut exclusion,
                &self.config.finder_args,
                rng,
            )?;

            // The finder distinguishes a confirmed match from its best-effort guess so
            // the caller can decide; this manager mirrors the reference
            // implementation's behavior of always falling back to the best-effort
            // pair when nothing crossed the identical threshold.
            let Some(seed) = found
                .identical
                .or_else(|| found.best_effort.map(|(a, b, _)| (a, b)))
            else {
                continue;
            };

            let Some((c1, c2)) =
                find_boundaries(&self.kernel, e1, e2, seed, &self.config.boundary_args)?
            else {
                continue;
            };

            let min_frames1 = (self.config.min_chunk_seconds as f64 * e1.fps()).round() as u64;
            let min_frames2 = (self.config.min_chunk_seconds as f64 * e2.fps()).round() as u64;
            if c1.len() >= min_frames1 && c2.len() >= min_frames2 {
                return Ok(Some((c1, c2)));
            }
        }

        Ok(None)
    }

    /// Re-locates `chunk` (taken from `chunk.episode()`) inside `episode`, by locating
    /// its first and last `probe_frames` consecutive frames and stitching the
    /// resulting endpoints into a new chunk. `search_range` restricts where the start
    /// window is looked for; the end window is always scoped to just after the
    /// located start, within twice the original chunk's length, to avoid matching a
    /// spurious later recurrence of similar content.
    pub fn find_chunk_in_episode(
        &self,
        episode: &Episode,
        chunk: &Chunk,
        search_range: Option<(u64, u64)>,
        reverse: bool,
    ) -> CoreResult<Option<Chunk>> {
        let locator = &self.config.locator_args;
        let k = locator.probe_frames.min(chunk.len());

        let start_result = locate_frames(
            &self.kernel,
            chunk.episode(),
            chunk.start_frame(),
            episode,
            search_range,
            reverse,
            locator,
        )?;
        let Some(start_result) = start_result else {
            return Ok(None);
        };
        if start_result.reliability < self.config.min_reliability {
            return Ok(None);
        }

        let end_ref_start = chunk.end_frame().saturating_sub(k - 1);
        let located_start = start_result.mapping[0].1;
        let scoped_end_range = (
            located_start,
            (located_start + 2 * chunk.len()).min(episode.frame_count()),
        );

        let end_result = locate_frames(
            &self.kernel,
            chunk.episode(),
            end_ref_start,
            episode,
            Some(scoped_end_range),
            reverse,
            locator,
        )?;
        let Some(end_result) = end_result else {
            return Ok(None);
        };
        if end_result.reliability < self.config.min_reliability {
            return Ok(None);
        }

        let new_start = start_result.mapping.first().unwrap().1;
        let new_end = end_result.mapping.last().unwrap().1;
        if new_start > new_end {
            return Ok(None);
        }

        Ok(Some(Chunk::new(episode.clone(), new_start, new_end)))
    }

    /// Locates a reference episode's opening and/or ending inside one target episode.
    /// The ending search, if an opening was also found, is scoped to start right after
    /// it so the two can never overlap.
    pub fn locate_episode(
        &self,
        target: &Episode,
        ref_opening: Option<&Chunk>,
        ref_ending: Option<&Chunk>,
    ) -> CoreResult<LocateOutcome> {
        let opening = match ref_opening {
            Some(chunk) => self.find_chunk_in_episode(target, chunk, None, false)?,
            None => None,
        };

        let ending_range = opening
            .as_ref()
            .map(|o| (o.end_frame() + 1, target.frame_count()));
        let ending = match ref_ending {
            Some(chunk) => self.find_chunk_in_episode(target, chunk, ending_range, true)?,
            None => None,
        };

        Ok(LocateOutcome { opening, ending })
    }
}

impl<K: DistanceKernel> AlgorithmManager<K> {
    /// Runs `locate_episode` over every target in parallel. A target whose search
    /// errors out (decode failure, precondition failure) is logged and reported with
    /// empty results rather than aborting the whole batch — other targets are
    /// independent units of work.
    pub fn locate_episodes(
        &self,
        targets: &[Episode],
        ref_opening: Option<&Chunk>,
        ref_ending: Option<&Chunk>,
    ) -> Vec<(Episode, LocateOutcome)>
    where
        K: Sync,
    {
        targets
            .par_iter()
            .map(|target| {
                let outcome = self
                    .locate_episode(target, ref_opening, ref_ending)
                    .unwrap_or_else(|e| {
                        log::warn!("failed to locate chunks in {:?}: {e}", target.path());
                        LocateOutcome::default()
                    });
                (target.clone(), outcome)
            })
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::distance::L1Distance;
    use crate::frame_source::synthetic::SyntheticSource;
    use rand::SeedableRng;
    use std::{path::PathBuf, sync::Arc};

    fn episode_with_content_map(
        frame_count: u64,
        content_map: impl Fn(u64) -> u64 + Send + Sync + 'static,
    ) -> Episode {
        Episode::from_source(
            PathBuf::from("e"),
            Arc::new(SyntheticSource::with_content_map(frame_count, 24.0, content_map)),
        )
    }

    fn small_config() -> ManagerArgs {
        let mut config = ManagerArgs::default();
        config.finder_args.distance_args =
            config.finder_args.distance_args.thumb_height(8).thumb_width(8);
        config.boundary_args.distance_args =
            config.boundary_args.distance_args.thumb_height(8).thumb_width(8);
        config.locator_args.distance_args =
            config.locator_args.distance_args.thumb_height(8).thumb_width(8);
        config.boundary_args.max_frames_search_range = 400;
        config.boundary_args.max_probes = 40;
        config.locator_args.max_loading_frames = 200;
        config.min_chunk_seconds = 4;
        config
    }

    #[test]
    fn find_common_chunk_locates_a_shared_segment() {
        let e1 = episode_with_content_map(2000, |idx| {
            if (600..900).contains(&idx) {
                idx
            } else {
                idx + 10_000_000
            }
        });
        let e2 = episode_with_content_map(2000, |idx| {
            if (600..900).contains(&idx) {
                idx
            } else {
                idx + 20_000_000
            }
        });

        let manager = AlgorithmManager::new(L1Distance, small_config());
        let mut rng = rand::rngs::SmallRng::seed_from_u64(3);

        let (c1, c2) = manager
            .find_common_chunk(&e1, &e2, (0, 0), None, &mut rng)
            .unwrap()
            .expect("a common chunk should be found");

        assert!(c1.start_frame() <= 620 && c1.end_frame() >= 850);
        assert_eq!(c1.start_frame(), c2.start_frame());
    }

    #[test]
    fn find_chunk_in_episode_round_trips() {
        let reference = episode_with_content_map(1000, |idx| idx);
        let chunk = Chunk::new(reference.clone(), 60, 179);

        let target = episode_with_content_map(1000, |idx| idx);

        let manager = AlgorithmManager::new(L1Distance, small_config());
        let located = manager
            .find_chunk_in_episode(&target, &chunk, None, false)
            .unwrap()
            .expect("should relocate the same chunk");

        assert!((located.start_frame() as i64 - 60).abs() <= 2);
        assert!((located.end_frame() as i64 - 179).abs() <= 2);
    }
}
