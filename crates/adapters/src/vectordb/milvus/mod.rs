//! Milvus REST adapter modules.

mod error;
mod rest;
mod schema;

pub use rest::{MilvusRestConfig, MilvusRestVectorDb};
