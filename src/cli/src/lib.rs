//! Kiln CLI - build-time container image metadata tools.

pub mod commands;
pub mod logging;
