//! Progress storage and its HTTP surface
//!
//! `files` owns classification, filenames, and directory access; `strategy`
//! decides which file a save lands in; `retention` caps files per owner;
//! `handlers` exposes the whole thing over HTTP.

pub mod files;
pub mod handlers;
pub mod retention;
pub mod strategy;

pub use files::{Classification, FileStore};
pub use strategy::{SaveStrategy, SaveTarget};
