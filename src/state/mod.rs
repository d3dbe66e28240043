//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `SeenSet`: which items and image URLs the run has already recorded

mod seen_set;

pub use seen_set::{RecordedImage, RecordOutcome, SeenSet};
