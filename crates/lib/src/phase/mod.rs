//! Module phases: the graph structure and the built-in per-type templates.

pub mod graph;
pub mod module_type;

pub use graph::{Phase, PhaseGraph, PhaseGraphError};
pub use module_type::{BUILD, CHECKOUT, CONFIGURE, INSTALL, INSTALL_DEPENDENCIES, ModuleType};
