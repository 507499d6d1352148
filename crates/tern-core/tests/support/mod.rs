//! Shared fixtures for tern-core integration tests.
#![allow(dead_code)]

pub mod fakes;
pub mod fixtures;
pub mod git;
