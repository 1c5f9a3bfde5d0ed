pub mod chat;
pub mod classify;
pub mod download;
pub mod error;
pub mod events;
pub mod history;
pub mod prompt;
pub mod styles;

pub use error::ContractError;
