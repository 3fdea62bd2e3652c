//! Shared test helpers for `tidemark-core` integration tests.
//!
//! Lightweight mocks so orchestration tests can focus on behaviour instead
//! of storage details.

#![allow(dead_code)]

pub mod jobs;
pub mod stores;
