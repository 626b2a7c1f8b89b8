//! Layer modules assembled from the mixer building blocks.

pub mod compom;
