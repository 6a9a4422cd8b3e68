//! Stub collaborators and factories shared by unit and integration tests.
//! Not part of the public API surface.

mod support;

pub use support::*;
