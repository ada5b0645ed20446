//! File-backed persistence for custom light levels.
//!
//! Two on-disk region formats, one file per 32x32-chunk region:
//!
//! - [`vldb`]: variable-length light source records with material names. The
//!   primary format, fronted by the write-back [`cache::RegionCache`].
//! - [`nls`]: fixed nibble sections holding luminance only.
//!
//! Both may be gzip'd ([`container`]) and are interchangeable through
//! [`backend::RegionBackend`]. [`world::LightWorld`] routes positions to the
//! right region.

pub mod backend;
pub mod cache;
pub mod config;
pub mod container;
pub mod error;
pub mod nls;
pub mod vldb;
pub mod world;

pub use error::{Result, StoreError};
