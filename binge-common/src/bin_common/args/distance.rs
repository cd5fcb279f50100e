use crate::args;

args! {
    #[derive(Clone, Debug)]
    Distance {
        "Thumbnail height used for pixel-distance comparisons"
        thumb_height: u32 = 36;

        "Thumbnail width used for pixel-distance comparisons"
        thumb_width: u32 = 64;
    }
}

impl DistanceArgs {
    pub fn resolution(&self) -> (u32, u32) {
        (self.thumb_height, self.thumb_width)
    }
}
