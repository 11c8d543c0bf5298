//! Core library for playlist-finder: find which of your playlists hold a track.
pub mod api;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod env_file;
pub mod error;
pub mod finder;
pub mod matcher;
pub mod models;
pub mod pagination;
pub mod session;
pub mod tokens;
