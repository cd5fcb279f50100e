use crate::args;

use super::distance::Distance;

args! {
    #[derive(Clone, Debug)]
    Locator {
        "Number of consecutive reference frames used to identify a chunk boundary"
        probe_frames: u64 = 5;

        "Number of search-episode frames loaded per scan section"
        max_loading_frames: u64 = 500;

        "Diagonal-mean distance at or below which a section match exits the scan early"
        identical_threshold: f64 = 0.01;

        "Minimum per-frame distance at or below which a section match exits the scan early"
        min_frame_early_exit: f64 = 0.01;

        distance_args: Distance;
    }
}
