pub mod assistants;
pub mod files;
pub mod vector_stores;
