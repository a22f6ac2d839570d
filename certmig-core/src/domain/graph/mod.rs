// certmig-core/src/domain/graph/mod.rs

pub mod dependency;

pub use dependency::{BreakPoint, CycleReport, GraphSolver, SchemaAnalysis};
