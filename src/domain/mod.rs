pub mod booking;
pub mod review;
pub mod tour;
pub mod user;

use serde::{de::DeserializeOwned, Serialize};
use validator::{Validate, ValidationErrors};

use crate::repository::document::{Collection, Document};

/// A typed document kind stored in one collection.
pub trait Entity: Serialize + DeserializeOwned + Validate + Send + Sync + 'static {
    /// Envelope key for a single document.
    const NAME: &'static str;
    /// Envelope key for a list.
    const PLURAL: &'static str;
    /// Stripped from every client payload before decoding.
    const READ_ONLY: &'static [&'static str];

    fn collection() -> &'static Collection;

    /// Normalizes derived fields before validation.
    fn prepare(&mut self) {}

    /// Adds virtual fields to an outgoing document.
    fn decorate(_doc: &mut Document) {}
}

pub fn validation_message(errors: &ValidationErrors) -> String {
    let mut messages = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| match &e.message {
                Some(message) => message.to_string(),
                None => format!("Invalid value for {field} ({})", e.code),
            })
        })
        .collect::<Vec<_>>();
    messages.sort();
    messages.join(". ")
}
