//! Session state and conversation flow for the PALMS assistant client.
//!
//! [`SessionState`] remembers the session id, history, model and files in a
//! [`LocalStore`]; [`Conversation`] drives a [`palms_api::ChatClient`] send
//! and records the exchange.

pub mod conversation;
pub mod session;
pub mod store;

pub use conversation::Conversation;
pub use session::SessionState;
pub use store::{LocalStore, StoreError};
