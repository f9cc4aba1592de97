// Page document model observed by the content engine.

pub mod document;

pub use document::{Document, MutationRecord, Node, NodeId, NodeType, ObserverId};
