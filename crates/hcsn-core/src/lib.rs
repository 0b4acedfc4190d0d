//! Rewrite engine, ξ field dynamics and run orchestration for the HCSN
//! simulator.
//!
//! This crate owns the accept/reject cycle that drives the causal
//! hypergraph: propose a local rewrite, measure, accept or roll back, and on
//! commit let the ξ influence field and its memories react.
//!
//! # Modules
//!
//! - [`acceptance`] -- The clamped multiplicative acceptance model.
//! - [`cluster`] -- ξ-clusters, per-cluster Ω memory and ξ–ξ link memory.
//! - [`config`] -- Configuration loading from `hcsn-config.yaml` into
//!   strongly-typed structs.
//! - [`engine`] -- The [`RewriteEngine`] step cycle and forced injections.
//! - [`export`] -- JSON-lines logs and the append-only run archive.
//! - [`field`] -- The ξ field and its [`FieldEvolution`] strategies.
//! - [`geometry`] -- Inter-cluster distance memories behind
//!   [`GeometryTracker`].
//! - [`runner`] -- Bounded and goal-conditioned run loops.
//!
//! [`RewriteEngine`]: engine::RewriteEngine
//! [`FieldEvolution`]: field::FieldEvolution
//! [`GeometryTracker`]: geometry::GeometryTracker

pub mod acceptance;
pub mod cluster;
pub mod config;
pub mod engine;
pub mod export;
pub mod field;
pub mod geometry;
pub mod runner;
