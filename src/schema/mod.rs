pub mod chain;
pub mod condition;
pub mod context;
pub mod event;
pub mod relationship;
pub mod template;
