//! Vector database adapters.

pub mod milvus;
