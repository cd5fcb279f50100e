use crate::args;

use super::distance::Distance;

args! {
    #[derive(Clone, Debug)]
    Boundary {
        "Width in frames of the wide diagonal scan around a seed, split across both episodes"
        max_frames_search_range: u64 = 4320;

        "Number of probes taken across the wide diagonal scan"
        max_probes: u64 = 100;

        "Distance at or below which a wide-scan probe pair counts as similar"
        similar_threshold: f64 = 0.10;

        "Distance at or below which a zoomed-in diagonal cell counts as identical"
        identical_threshold: f64 = 0.01;

        distance_args: Distance;
    }
}
