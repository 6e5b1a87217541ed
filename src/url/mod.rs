//! URL handling module
//!
//! This module provides URL normalization, the total canonical form used by
//! the ledger for deduplication, and domain extraction for the rate limiter.

mod domain;
mod normalize;

// Re-export main functions
pub use domain::{domain_or_unknown, extract_domain};
pub use normalize::{canonical, normalize_url};
