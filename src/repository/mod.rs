pub mod document;
pub mod entity;
pub mod errors;
pub mod memory;
pub mod populate;
pub mod postgres;
pub mod reviews;
