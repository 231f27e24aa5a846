//! seismomap - styled earthquake map layers from USGS GeoJSON feeds.
//!
//! Fetches one or more earthquake feeds concurrently, turns each event into a
//! marker with a magnitude-scaled radius, a fill color from a [`ColorScale`]
//! and a popup payload, and derives the matching legend from the same scale.
//! Drawing is left to whatever consumes the resulting [`RenderDocument`].
//!
//! [`ColorScale`]: scale::ColorScale
//! [`RenderDocument`]: pipeline::RenderDocument

pub mod client;
pub mod config;
pub mod errors;
pub mod models;
pub mod output;
pub mod pipeline;
pub mod scale;
pub mod server;
pub mod styler;
