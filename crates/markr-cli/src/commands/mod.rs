//! Command handlers

pub mod bookmark;
pub mod config;
pub mod decorations;
pub mod status;
