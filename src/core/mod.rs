pub mod analyzer;
pub mod chains;
pub mod composer;
pub mod config;
pub mod dependency;
pub mod effects;
pub mod library;
pub mod markov;
pub mod pipeline;
pub mod placeholder;
pub mod relationships;
pub mod rules;
pub mod selector;
