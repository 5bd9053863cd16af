//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises the line service against
//! mock adapters.  No controller, printer or real clock is required.

mod line_service_tests;
mod mock_hw;
