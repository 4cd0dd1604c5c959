pub mod context;
pub mod engine;
pub mod expansion;
pub mod multi_query;
pub mod scoring;
pub mod snapshot;
pub mod themes;
pub mod vector_index;
