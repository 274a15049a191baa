#![doc = "holoviz-tutorial-core: core logic for the HoloViz tutorial tooling."]

//! This crate holds everything the `holoviz-tutorial` binary does:
//! packaging the tutorial into a zip, fetching its datasets and checking the
//! installed package versions against `pixi.toml`.
//!
//! # Usage
//! The CLI crate only parses arguments and configuration and calls into the
//! modules below. Tests exercise them directly.

pub mod archive;
pub mod config;
pub mod contract;
pub mod download;
pub mod extract;
pub mod version_check;
