//! Mock reader implementation for testing and development.
//!
//! This module provides a simulated reader that can be controlled
//! programmatically without requiring physical hardware.

pub mod reader;

pub use reader::{MockReader, MockReaderHandle, MockReaderStats};
