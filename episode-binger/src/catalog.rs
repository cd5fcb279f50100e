use std::collections::HashMap;
use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::chunk::Chunk;
use crate::episode::Episode;

/// An episode's located opening/ending, stored as plain frame-index pairs rather than
/// `Chunk`s — a `Chunk` owns a live `Episode` handle (and its decode resources), which
/// has no business surviving a save/load round trip through disk. Serializes as a
/// `[start, end]` two-element array, per the catalog's on-disk schema, rather than a
/// `{"start_frame":...,"end_frame":...}` object.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "(u64, u64)", from = "(u64, u64)")]
pub struct FrameRange {
    pub start_frame: u64,
    pub end_frame: u64,
}

impl FrameRange {
    pub fn from_chunk(chunk: &Chunk) -> Self {
        Self {
            start_frame: chunk.start_frame(),
            end_frame: chunk.end_frame(),
        }
    }

    pub fn into_chunk(self, episode: Episode) -> Chunk {
        Chunk::new(episode, self.start_frame, self.end_frame)
    }
}

impl From<FrameRange> for (u64, u64) {
    fn from(range: FrameRange) -> Self {
        (range.start_frame, range.end_frame)
    }
}

impl From<(u64, u64)> for FrameRange {
    fn from((start_frame, end_frame): (u64, u64)) -> Self {
        Self { start_frame, end_frame }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CatalogEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opening: Option<FrameRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ending: Option<FrameRange>,
}

impl CatalogEntry {
    pub fn is_fully_located(&self) -> bool {
        self.opening.is_some() && self.ending.is_some()
    }

    pub fn is_located(&self) -> bool {
        self.opening.is_some() || self.ending.is_some()
    }

    pub fn is_unlocated(&self) -> bool {
        self.opening.is_none() && self.ending.is_none()
    }
}

/// Holds the path and located-chunk results for every episode discovered in a run, in
/// discovery order, and persists them to the on-disk catalog JSON.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Catalog {
    episode_order: Vec<PathBuf>,
    episodes: HashMap<PathBuf, CatalogEntry>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `path` if it isn't already present; a no-op otherwise, so discovery
    /// can be re-run against an existing catalog without losing earlier results.
    pub fn add_episode(&mut self, path: PathBuf) {
        if !self.episodes.contains_key(&path) {
            self.episode_order.push(path.clone());
            self.episodes.insert(path, CatalogEntry::default());
        }
    }

    pub fn set_opening(&mut self, path: &Path, chunk: &Chunk) {
        self.entry_mut(path).opening = Some(FrameRange::from_chunk(chunk));
    }

    pub fn set_ending(&mut self, path: &Path, chunk: &Chunk) {
        self.entry_mut(path).ending = Some(FrameRange::from_chunk(chunk));
    }

    fn entry_mut(&mut self, path: &Path) -> &mut CatalogEntry {
        self.episodes
            .get_mut(path)
            .expect("episode must be added to the catalog before its chunks are set")
    }

    pub fn entry(&self, path: &Path) -> Option<&CatalogEntry> {
        self.episodes.get(path)
    }

    pub fn episode_paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.episode_order.iter()
    }

    pub fn len(&self) -> usize {
        self.episode_order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.episode_order.is_empty()
    }

    pub fn unlocated_episodes(&self) -> Vec<&PathBuf> {
        self.filter_by(CatalogEntry::is_unlocated)
    }

    pub fn located_episodes(&self) -> Vec<&PathBuf> {
        self.filter_by(CatalogEntry::is_located)
    }

    pub fn fully_located_episodes(&self) -> Vec<&PathBuf> {
        self.filter_by(CatalogEntry::is_fully_located)
    }

    fn filter_by(&self, pred: impl Fn(&CatalogEntry) -> bool) -> Vec<&PathBuf> {
        self.episode_order
            .iter()
            .filter(|p| self.episodes.get(*p).map(&pred).unwrap_or(false))
            .collect()
    }

    /// A random fully-located episode, used to pick the reference opening/ending a
    /// run starts from.
    pub fn random_fully_located_episode(&self, rng: &mut impl Rng) -> Option<&PathBuf> {
        self.fully_located_episodes().choose(rng).copied()
    }

    pub fn load(path: &Path) -> color_eyre::eyre::Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    pub fn save(&self, path: &Path) -> color_eyre::eyre::Result<()> {
        let data = serde_json::to_string_pretty(self)?;
        std::fs::write(path, data)?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::frame_source::synthetic::SyntheticSource;
    use rand::SeedableRng;
    use std::sync::Arc;

    fn episode(path: &str) -> Episode {
        Episode::from_source(
            PathBuf::from(path),
            Arc::new(SyntheticSource::new(1000, 24.0)),
        )
    }

    #[test]
    fn queries_classify_episodes_by_location_state() {
        let mut catalog = Catalog::new();
        catalog.add_episode(PathBuf::from("a.mkv"));
        catalog.add_episode(PathBuf::from("b.mkv"));
        catalog.add_episode(PathBuf::from("c.mkv"));

        let a = episode("a.mkv");
        catalog.set_opening(Path::new("a.mkv"), &Chunk::new(a.clone(), 0, 99));
        catalog.set_ending(Path::new("a.mkv"), &Chunk::new(a, 900, 999));

        let b = episode("b.mkv");
        catalog.set_opening(Path::new("b.mkv"), &Chunk::new(b, 0, 99));

        assert_eq!(catalog.fully_located_episodes(), vec![&PathBuf::from("a.mkv")]);
        assert_eq!(
            catalog.located_episodes(),
            vec![&PathBuf::from("a.mkv"), &PathBuf::from("b.mkv")]
        );
        assert_eq!(catalog.unlocated_episodes(), vec![&PathBuf::from("c.mkv")]);

        let mut rng = rand::rngs::SmallRng::seed_from_u64(0);
        assert_eq!(
            catalog.random_fully_located_episode(&mut rng),
            Some(&PathBuf::from("a.mkv"))
        );
    }

    #[test]
    fn save_and_load_round_trips_through_json() {
        let mut catalog = Catalog::new();
        catalog.add_episode(PathBuf::from("a.mkv"));
        catalog.add_episode(PathBuf::from("b.mkv"));

        let a = episode("a.mkv");
        catalog.set_opening(Path::new("a.mkv"), &Chunk::new(a.clone(), 0, 49));
        catalog.set_ending(Path::new("a.mkv"), &Chunk::new(a, 950, 999));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        catalog.save(&path).unwrap();

        let loaded = Catalog::load(&path).unwrap();
        assert_eq!(
            loaded.episode_paths().collect::<Vec<_>>(),
            vec![&PathBuf::from("a.mkv"), &PathBuf::from("b.mkv")]
        );
        let entry = loaded.entry(Path::new("a.mkv")).unwrap();
        assert_eq!(entry.opening, Some(FrameRange { start_frame: 0, end_frame: 49 }));
        assert_eq!(entry.ending, Some(FrameRange { start_frame: 950, end_frame: 999 }));
        assert!(loaded.entry(Path::new("b.mkv")).unwrap().is_unlocated());
    }

    #[test]
    fn frame_range_serializes_as_a_two_element_array() {
        let range = FrameRange { start_frame: 60, end_frame: 179 };
        assert_eq!(serde_json::to_string(&range).unwrap(), "[60,179]");
        assert_eq!(serde_json::from_str::<FrameRange>("[60,179]").unwrap(), range);
    }
}
