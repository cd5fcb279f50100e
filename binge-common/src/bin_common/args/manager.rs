use crate::args;
use crate::utils::unit_interval::UnitInterval;

use super::{boundary::Boundary, finder::Finder, locator::Locator};

args! {
    #[derive(Clone, Debug)]
    Manager {
        "Minimum chunk length, in seconds, for a common chunk to be accepted"
        min_chunk_seconds: u64 = 30;

        "Number of (finder, boundary-finder) retries before find_common_chunk gives up"
        max_retries: u32 = 3;

        "Minimum reliability required from the frame locator to accept a located chunk"
        min_reliability: UnitInterval = UnitInterval::new(0.90).unwrap();

        "Number of consecutive failed chunk searches before find_opening_ending rerolls its episode pair"
        max_consecutive_failures: u32 = 20;

        finder_args: Finder;
        boundary_args: Boundary;
        locator_args: Locator;
    }
}
