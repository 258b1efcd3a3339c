//! Turns validated claims and fetched posts into a recipient's stories.

pub mod annotator;
pub mod dedup;
pub mod handlers;
pub mod pipeline;
pub mod topic_matcher;
