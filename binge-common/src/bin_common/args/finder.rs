use crate::args;

use super::distance::Distance;

args! {
    #[derive(Clone, Debug)]
    Finder {
        "Number of evenly-spaced probe frames sampled from each axis per shuffle"
        num_subsamples: u32 = 50;

        "Maximum number of reshuffles tried before giving up on a search window"
        max_reshuffles: u32 = 20;

        "Distance at or below which a probe pair is worth zooming in on"
        similar_threshold: f64 = 0.10;

        "Distance at or below which a probe pair is accepted as identical"
        identical_threshold: f64 = 0.01;

        "Half-width of the window used to refine an identical candidate onto its best diagonal"
        refinement_window: u32 = 50;

        distance_args: Distance;
    }
}
