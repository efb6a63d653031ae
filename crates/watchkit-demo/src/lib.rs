#![forbid(unsafe_code)]

//! Example observable object and scripted scenarios for `watchkit`.
//!
//! - [`suspect::Suspect`]: an object whose getters and setters feed a
//!   [`watchkit::Registrar`].
//! - [`scenario`]: runs tracking scripts over suspects and reports the
//!   notifications observed after each step.
//! - [`cli`]: argument parsing for the `watchkit-demo` binary.

pub mod cli;
pub mod scenario;
pub mod suspect;

pub use scenario::{Scenario, ScenarioReport, Step};
pub use suspect::Suspect;
