use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Not found")]
    NotFound,
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Invalid input data. {0}")]
    Validation(String),
    #[error("Duplicate field value {value} for ({fields}). Please use another value!")]
    Duplicate { fields: String, value: String },
    #[error("{0}")]
    InvalidQuery(String),
}
