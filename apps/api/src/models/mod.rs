pub mod claims;
pub mod post;
pub mod story;
