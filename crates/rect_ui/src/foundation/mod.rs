//! Foundation module - core utilities and types
//!
//! This module provides the fundamental pieces the UI core is built on:
//! - Math types and the node transform
//! - Generation-checked handles into the world arenas
//! - Logging utilities

pub mod math;
pub mod collections;
pub mod logging;
