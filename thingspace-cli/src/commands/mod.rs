//! CLI command implementations.

pub mod clear;
pub mod inspect;
pub mod summary;

pub use clear::clear_store;
pub use inspect::{list_actions, list_holders, list_invalid, list_things, show_thing};
pub use summary::summary;
