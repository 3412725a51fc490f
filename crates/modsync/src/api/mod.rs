//! Remote catalog access
//!
//! [`CatalogClient`] is the seam the engine talks to; [`ModIoApi`] implements
//! it over a mod.io-style REST API.

pub mod client;
pub mod types;

pub use client::{CatalogClient, ModIoApi};
pub use types::{Pagination, RequestFilter, RequestPage};
