pub mod classify;
pub mod vector_document;

pub use classify::*;
pub use vector_document::*;
