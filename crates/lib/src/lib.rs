//! mbuild-lib: Core engine for mbuild
//!
//! This crate provides the building blocks of the meta-build orchestrator:
//! - `PhaseGraph`: per-module phase ordering and recovery routing
//! - `PhaseExecutor`: walks a module's phases, resuming from persisted state
//! - `BuildStateStore`: per-module progress records (file or memory backed)
//! - `sysdeps`: system dependency matching, reconciliation and install planning
//! - `ModuleSet`: declarative module definitions loaded from TOML

pub mod config;
pub mod consts;
pub mod execute;
pub mod module;
pub mod moduleset;
pub mod phase;
pub mod platform;
pub mod state;
pub mod sysdeps;
pub mod version;
