use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{self, Context};
use rand::SeedableRng;

use binge_common::bin_common::args::manager::ManagerArgs;
use binge_common::bin_common::init::{init_eyre, init_logger};
use binge_common::bin_common::termination::Cookie;
use binge_common::utils::fsutils::all_files;
use binge_common::utils::unit_interval::UnitInterval;

use episode_binger::algorithm_manager::AlgorithmManager;
use episode_binger::catalog::Catalog;
use episode_binger::distance::{DistanceKernel, L1Distance, L2Distance};
use episode_binger::episode::Episode;
use episode_binger::orchestrator::{
    create_macro_episode, find_opening_ending, locate_opening_ending_every_episode,
};

/// Finds the recurring opening/ending shared across a serialized video collection and
/// assembles a single macro-episode bracketed by one retained opening and one retained
/// ending.
///
/// This uses rayon (for `locate`) and scoped threads (for every distance computation),
/// so the `RAYON_NUM_THREADS` environment variable might be of interest.
///
/// Only the handful of tunables most worth adjusting from the command line are exposed
/// here directly; the full per-layer configuration (`ManagerArgs` and its nested
/// `Finder`/`Boundary`/`Locator`/`Distance` args) is reachable from library code, where
/// each layer's resolution and thresholds can differ independently.
#[derive(Parser, Debug)]
#[command()]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Thumbnail height used for pixel-distance comparisons, applied to every layer
    #[arg(long, default_value_t = 36)]
    thumb_height: u32,

    /// Thumbnail width used for pixel-distance comparisons, applied to every layer
    #[arg(long, default_value_t = 64)]
    thumb_width: u32,

    /// Minimum chunk length, in seconds, for a common chunk to be accepted
    #[arg(long, default_value_t = 30)]
    min_chunk_seconds: u64,

    /// Number of (finder, boundary-finder) retries before find_common_chunk gives up
    #[arg(long, default_value_t = 3)]
    max_retries: u32,

    /// Minimum reliability required from the frame locator to accept a located chunk
    #[arg(long, default_value_t = UnitInterval::new(0.90).unwrap())]
    min_reliability: UnitInterval,

    /// Pixel-distance aggregation used throughout the content-alignment engine
    #[arg(long, value_enum, default_value_t = KernelChoice::L1)]
    kernel: KernelChoice,

    /// Path to the on-disk catalog of located openings/endings
    #[arg(long, short = 'c', default_value = "./catalog.json")]
    catalog_file: PathBuf,

    /// Directories containing the episode video files. Not walked recursively.
    #[arg(long, short = 'e', required = true, num_args = 1..)]
    episodes_dir: Vec<PathBuf>,

    /// A file to additionally write the logs to
    #[arg(long)]
    logfile: Option<PathBuf>,
}

impl Cli {
    fn manager_args(&self) -> ManagerArgs {
        let mut args = ManagerArgs::default()
            .min_chunk_seconds(self.min_chunk_seconds)
            .max_retries(self.max_retries)
            .min_reliability(self.min_reliability);
        args.finder_args.distance_args = args
            .finder_args
            .distance_args
            .thumb_height(self.thumb_height)
            .thumb_width(self.thumb_width);
        args.boundary_args.distance_args = args
            .boundary_args
            .distance_args
            .thumb_height(self.thumb_height)
            .thumb_width(self.thumb_width);
        args.locator_args.distance_args = args
            .locator_args
            .distance_args
            .thumb_height(self.thumb_height)
            .thumb_width(self.thumb_width);
        args
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum KernelChoice {
    L1,
    L2,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Blindly discover a shared opening and ending between two random episodes and
    /// store them in the catalog.
    Discover,
    /// Propagate a fully-located reference episode's opening/ending to every other
    /// episode in the catalog.
    Locate,
    /// Build the macro-episode from whatever openings/endings the catalog has located.
    Assemble {
        /// Where to write the assembled macro-episode
        #[arg(long, short = 'o')]
        output: PathBuf,
    },
    /// Run discover, locate and assemble in sequence.
    Run {
        /// Where to write the assembled macro-episode
        #[arg(long, short = 'o')]
        output: PathBuf,
    },
}

fn main() -> eyre::Result<()> {
    init_eyre()?;
    let cli = Cli::parse();
    init_logger(cli.logfile.as_deref())?;

    let manager_args = cli.manager_args();
    let cookie = Cookie::new().wrap_err("failed to install the termination handler")?;

    match cli.kernel {
        KernelChoice::L1 => run(AlgorithmManager::new(L1Distance, manager_args), &cli, &cookie),
        KernelChoice::L2 => run(AlgorithmManager::new(L2Distance, manager_args), &cli, &cookie),
    }
}

fn run<K: DistanceKernel + Sync>(
    manager: AlgorithmManager<K>,
    cli: &Cli,
    cookie: &Cookie,
) -> eyre::Result<()> {
    let mut catalog = load_or_create_catalog(&cli.catalog_file)?;
    let episodes = discover_episodes(&cli.episodes_dir, &mut catalog)?;
    let mut rng = rand::rngs::SmallRng::from_entropy();

    match &cli.command {
        Command::Discover => {
            run_discover(&manager, &mut catalog, &episodes, &mut rng, cookie)?;
        }
        Command::Locate => {
            run_locate(&manager, &mut catalog, &episodes, &mut rng)?;
        }
        Command::Assemble { output } => {
            run_assemble(&catalog, &episodes, output, &mut rng)?;
        }
        Command::Run { output } => {
            run_discover(&manager, &mut catalog, &episodes, &mut rng, cookie)?;
            catalog.save(&cli.catalog_file).wrap_err("failed to save the catalog")?;
            run_locate(&manager, &mut catalog, &episodes, &mut rng)?;
            catalog.save(&cli.catalog_file).wrap_err("failed to save the catalog")?;
            run_assemble(&catalog, &episodes, output, &mut rng)?;
            return Ok(());
        }
    }

    catalog.save(&cli.catalog_file).wrap_err("failed to save the catalog")?;
    Ok(())
}

fn load_or_create_catalog(path: &std::path::Path) -> eyre::Result<Catalog> {
    if path.exists() {
        log::info!("Loading catalog from {}", path.display());
        Catalog::load(path).wrap_err("failed to load the catalog")
    } else {
        log::info!("No catalog found at {}, starting a fresh one", path.display());
        Ok(Catalog::new())
    }
}

fn discover_episodes(
    dirs: &[PathBuf],
    catalog: &mut Catalog,
) -> eyre::Result<Vec<Episode>> {
    log::info!("Finding episode files in: {dirs:?}");
    let paths: Vec<PathBuf> = all_files(dirs)?;
    log::info!("Found {} files", paths.len());

    let mut episodes = Vec::with_capacity(paths.len());
    for path in paths {
        let episode = Episode::open(&path)
            .wrap_err_with(|| format!("failed to open episode at {}", path.display()))?;
        catalog.add_episode(path);
        episodes.push(episode);
    }
    Ok(episodes)
}

fn run_discover<K: DistanceKernel + Sync>(
    manager: &AlgorithmManager<K>,
    catalog: &mut Catalog,
    episodes: &[Episode],
    rng: &mut impl rand::Rng,
    cookie: &Cookie,
) -> eyre::Result<()> {
    log::info!("Discovering a shared opening/ending among {} episodes", episodes.len());
    let found = find_opening_ending(manager, catalog, episodes, rng, cookie)
        .wrap_err("failed while discovering a shared opening/ending")?;
    if found {
        log::info!("Discovered a shared opening and ending");
    } else {
        log::warn!("Did not discover a shared opening/ending (too few episodes, or interrupted)");
    }
    Ok(())
}

fn run_locate<K: DistanceKernel + Sync>(
    manager: &AlgorithmManager<K>,
    catalog: &mut Catalog,
    episodes: &[Episode],
    rng: &mut impl rand::Rng,
) -> eyre::Result<()> {
    log::info!(
        "Locating the reference opening/ending across {} unlocated episodes",
        catalog.unlocated_episodes().len()
    );
    locate_opening_ending_every_episode(manager, catalog, episodes, rng)
        .wrap_err("failed while locating chunks across episodes")
}

fn run_assemble(
    catalog: &Catalog,
    episodes: &[Episode],
    output: &std::path::Path,
    rng: &mut impl rand::Rng,
) -> eyre::Result<()> {
    log::info!("Assembling the macro-episode at {}", output.display());
    create_macro_episode(catalog, episodes, output, rng)
        .wrap_err("failed to assemble the macro-episode")
}
