pub mod deploy;
pub mod env;
pub mod graph;
pub mod stack;
pub mod validate;
