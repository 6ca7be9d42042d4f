pub mod aggregation;
pub mod catalog;
pub mod engine;
pub mod field_type;
pub mod filter;
pub mod logical;
pub mod predicate;
pub mod processor;
pub mod record;
pub mod schema;
pub mod text_range;
