// certmig-core/src/ports/mod.rs

pub mod store;

pub use store::{
    GraphEdge, GraphNode, GraphStore, RelationalStore, WriteStrategy, DEFAULT_TRAVERSAL_DEPTH,
};
