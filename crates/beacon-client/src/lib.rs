//! Galaxy Beacon Client - HTTP client for the Galaxy API.
//!
//! [`GalaxyClient`] implements [`beacon_core::traits::PlatformClient`]:
//! account check, export history lookup, owner preferences, paged dataset
//! listings and streaming downloads.

pub mod galaxy;

pub use galaxy::GalaxyClient;
