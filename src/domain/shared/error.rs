//! Domain errors

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Invalid phone number: {0}")]
    InvalidPhoneNumber(String),

    #[error("Invalid dial info: {0}")]
    InvalidDialInfo(String),

    #[error("Invalid prompt template: {0}")]
    InvalidTemplate(String),
}
