//! Fetch arXiv articles, tidy their LaTeX, and translate them through a
//! bounded concurrent mapper that falls back to the original article when a
//! transform fails or runs out of time.

pub mod apis;
pub mod article;
pub mod config;
pub mod dates;
pub mod format;
pub mod mapping;
pub mod search;
pub mod translate;

pub use article::Article;
pub use mapping::{amap, amap_async, MapError, MapOptions, Mapped, Outcome, Provenance, Transform};
