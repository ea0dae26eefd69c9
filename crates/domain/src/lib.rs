pub mod comments;
pub mod error;
pub mod event;
pub mod ports;
pub mod recommend;
pub mod saved;
pub mod user;
pub mod util;

pub type DomainResult<T> = Result<T, error::DomainError>;
