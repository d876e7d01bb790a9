pub mod contracts;
pub mod error;
pub mod handler_factory;
pub mod jwt;
pub mod profile;
pub mod query_features;
pub mod ratings;
