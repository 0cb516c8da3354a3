//! # Route Modules
//!
//! - [`api`]: collection management JSON endpoints
//! - [`index`]: collection index and live redirect
//! - [`replay`]: replay paths and the root-collection fallback

pub mod api;
pub mod index;
pub mod replay;
