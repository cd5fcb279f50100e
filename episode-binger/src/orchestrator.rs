use std::path::Path;

use color_eyre::eyre::{eyre, Result};
use rand::seq::SliceRandom;
use rand::Rng;

use binge_common::bin_common::termination::Cookie;

use crate::algorithm_manager::AlgorithmManager;
use crate::catalog::Catalog;
use crate::chunk::Chunk;
use crate::distance::DistanceKernel;
use crate::episode::Episode;
use crate::error::CoreResult;
use crate::video_assembler;

fn random_pair(episodes: &[Episode], rng: &mut impl Rng) -> (Episode, Episode) {
    let mut indexes: Vec<usize> = (0..episodes.len()).collect();
    indexes.shuffle(rng);
    (episodes[indexes[0]].clone(), episodes[indexes[1]].clone())
}

/// Picks two random episodes and alternates blind `find_common_chunk` calls — first
/// unconstrained, then scoped to after a found opening or before a found ending — until
/// both a shared opening and a shared ending have been classified by `Chunk::is_opening`.
/// A fresh random pair is swapped in after `max_consecutive_failures` fruitless attempts
/// in a row. Returns `false` without doing anything if fewer than two episodes are given,
/// or if `cookie` signals termination before a result is reached.
pub fn find_opening_ending<K: DistanceKernel>(
    manager: &AlgorithmManager<K>,
    catalog: &mut Catalog,
    episodes: &[Episode],
    rng: &mut impl Rng,
    cookie: &Cookie,
) -> CoreResult<bool> {
    if episodes.len() < 2 {
        return Ok(false);
    }

    let (mut e1, mut e2) = random_pair(episodes, rng);
    let mut opening: Option<(Chunk, Chunk)> = None;
    let mut ending: Option<(Chunk, Chunk)> = None;
    let mut consecutive_failures = 0u32;

    loop {
        if opening.is_some() && ending.is_some() {
            break;
        }
        if cookie.is_terminating() {
            return Ok(false);
        }

        let (from, to) = match (&opening, &ending) {
            (None, None) => ((0, 0), None),
            (Some(o), None) => ((o.0.end_frame() + 1, o.1.end_frame() + 1), None),
            (None, Some(e)) => ((0, 0), Some((e.0.start_frame(), e.1.start_frame()))),
            (Some(_), Some(_)) => unreachable!("loop exits once both sides are found"),
        };

        let found = manager.find_common_chunk(&e1, &e2, from, to, rng)?;

        let Some((c1, c2)) = found else {
            consecutive_failures += 1;
            if consecutive_failures > manager.config().max_consecutive_failures {
                log::debug!("no chunk found after {consecutive_failures} attempts, rerolling episode pair");
                let pair = random_pair(episodes, rng);
                e1 = pair.0;
                e2 = pair.1;
                opening = None;
                ending = None;
                consecutive_failures = 0;
            }
            continue;
        };
        consecutive_failures = 0;

        if c1.is_opening() || c2.is_opening() {
            opening = Some((c1, c2));
        } else {
            ending = Some((c1, c2));
        }
    }

    let (o1, o2) = opening.expect("loop only exits once both sides are found");
    let (n1, n2) = ending.expect("loop only exits once both sides are found");

    catalog.set_opening(e1.path(), &o1);
    catalog.set_opening(e2.path(), &o2);
    catalog.set_ending(e1.path(), &n1);
    catalog.set_ending(e2.path(), &n2);

    Ok(true)
}

/// Picks a random fully-located reference episode from the catalog and propagates its
/// opening/ending to every currently unlocated episode, via `AlgorithmManager::
/// locate_episodes`. A no-op if no fully-located reference exists yet.
pub fn locate_opening_ending_every_episode<K>(
    manager: &AlgorithmManager<K>,
    catalog: &mut Catalog,
    episodes: &[Episode],
    rng: &mut impl Rng,
) -> Result<()>
where
    K: DistanceKernel + Sync,
{
    let Some(reference_path) = catalog.random_fully_located_episode(rng).cloned() else {
        return Ok(());
    };
    let reference_entry = catalog
        .entry(&reference_path)
        .cloned()
        .expect("path just came from the catalog");
    let reference_episode = find_episode(episodes, &reference_path)?;

    let ref_opening = reference_entry
        .opening
        .map(|r| r.into_chunk(reference_episode.clone()));
    let ref_ending = reference_entry
        .ending
        .map(|r| r.into_chunk(reference_episode));

    let unlocated_paths = catalog.unlocated_episodes();
    let targets: Vec<Episode> = episodes
        .iter()
        .filter(|e| unlocated_paths.iter().any(|p| p.as_path() == e.path()))
        .cloned()
        .collect();

    let results = manager.locate_episodes(&targets, ref_opening.as_ref(), ref_ending.as_ref());

    for (episode, outcome) in results {
        if let Some(opening) = outcome.opening {
            catalog.set_opening(episode.path(), &opening);
        }
        if let Some(ending) = outcome.ending {
            catalog.set_ending(episode.path(), &ending);
        }
    }

    Ok(())
}

/// Picks a random located opening and a random located ending (independently, so they
/// need not come from the same episode), then concatenates: the opening, every loaded
/// episode's body with its own located opening/ending sliced out (the raw prefix/suffix
/// is kept untouched for episodes that were never located), and finally the ending.
pub fn create_macro_episode(
    catalog: &Catalog,
    episodes: &[Episode],
    output_path: &Path,
    rng: &mut impl Rng,
) -> Result<()> {
    let opening_path = catalog
        .random_fully_located_episode(rng)
        .cloned()
        .ok_or_else(|| eyre!("no fully located episode available to take an opening from"))?;
    let ending_path = catalog
        .random_fully_located_episode(rng)
        .cloned()
        .ok_or_else(|| eyre!("no fully located episode available to take an ending from"))?;

    let opening_entry = catalog.entry(&opening_path).expect("path came from the catalog");
    let ending_entry = catalog.entry(&ending_path).expect("path came from the catalog");

    let opening = opening_entry
        .opening
        .expect("fully located episode has an opening")
        .into_chunk(find_episode(episodes, &opening_path)?);
    let ending = ending_entry
        .ending
        .expect("fully located episode has an ending")
        .into_chunk(find_episode(episodes, &ending_path)?);

    let mut chunks = Vec::new();
    chunks.push(opening);

    for path in catalog.episode_paths() {
        let episode = find_episode(episodes, path)?;
        let entry = catalog.entry(path).expect("path came from the catalog");
        let frame_count = episode.frame_count();

        match (entry.opening, entry.ending) {
            (Some(o), Some(e)) => {
                push_range(&mut chunks, &episode, 0, o.start_frame);
                push_range(&mut chunks, &episode, o.end_frame + 1, e.start_frame);
                push_range(&mut chunks, &episode, e.end_frame + 1, frame_count);
            }
            (Some(o), None) => {
                push_range(&mut chunks, &episode, 0, o.start_frame);
                push_range(&mut chunks, &episode, o.end_frame + 1, frame_count);
            }
            (None, Some(e)) => {
                push_range(&mut chunks, &episode, 0, e.start_frame);
                push_range(&mut chunks, &episode, e.end_frame + 1, frame_count);
            }
            (None, None) => {
                push_range(&mut chunks, &episode, 0, frame_count);
            }
        }
    }

    chunks.push(ending);

    video_assembler::assemble(&chunks, output_path)?;
    Ok(())
}

/// Pushes `Chunk::new(episode, start, end_exclusive - 1)` when that range is non-empty;
/// silently drops ranges that would be empty or invalid (a located chunk flush against
/// an episode boundary, or against the other located chunk) instead of constructing a
/// zero-or-negative-length chunk.
fn push_range(chunks: &mut Vec<Chunk>, episode: &Episode, start: u64, end_exclusive: u64) {
    if end_exclusive > start {
        chunks.push(Chunk::new(episode.clone(), start, end_exclusive - 1));
    }
}

fn find_episode(episodes: &[Episode], path: &Path) -> Result<Episode> {
    episodes
        .iter()
        .find(|e| e.path() == path)
        .cloned()
        .ok_or_else(|| eyre!("episode {} referenced by the catalog was not loaded", path.display()))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::catalog::FrameRange;
    use crate::distance::L1Distance;
    use crate::frame_source::synthetic::SyntheticSource;
    use binge_common::bin_common::args::manager::ManagerArgs;
    use rand::SeedableRng;
    use std::{path::PathBuf, sync::Arc};

    fn episode(path: &str, frame_count: u64) -> Episode {
        Episode::from_source(
            PathBuf::from(path),
            Arc::new(SyntheticSource::new(frame_count, 24.0)),
        )
    }

    #[test]
    fn create_macro_episode_fails_clearly_without_a_located_episode() {
        let catalog = Catalog::new();
        let episodes = vec![episode("a.mkv", 1000)];
        let mut rng = rand::rngs::SmallRng::seed_from_u64(0);
        let err = create_macro_episode(&catalog, &episodes, Path::new("out.mp4"), &mut rng)
            .unwrap_err();
        assert!(err.to_string().contains("no fully located episode"));
    }

    #[test]
    fn push_range_skips_empty_or_flush_boundaries() {
        let e = episode("a.mkv", 1000);
        let mut chunks = Vec::new();
        push_range(&mut chunks, &e, 0, 0);
        push_range(&mut chunks, &e, 5, 5);
        assert!(chunks.is_empty());
        push_range(&mut chunks, &e, 0, 10);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].end_frame(), 9);
    }

    #[test]
    fn locate_opening_ending_every_episode_is_a_noop_without_a_reference() {
        let mut catalog = Catalog::new();
        catalog.add_episode(PathBuf::from("a.mkv"));
        let episodes = vec![episode("a.mkv", 1000)];
        let manager = AlgorithmManager::new(L1Distance, ManagerArgs::default());
        let mut rng = rand::rngs::SmallRng::seed_from_u64(0);

        locate_opening_ending_every_episode(&manager, &mut catalog, &episodes, &mut rng).unwrap();
        assert!(catalog.entry(Path::new("a.mkv")).unwrap().is_unlocated());
    }

    #[test]
    fn frame_range_round_trips_into_a_chunk() {
        let e = episode("a.mkv", 1000);
        let range = FrameRange { start_frame: 10, end_frame: 99 };
        let chunk = range.into_chunk(e);
        assert_eq!(chunk.start_frame(), 10);
        assert_eq!(chunk.end_frame(), 99);
    }
}
