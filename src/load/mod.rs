//! Everything that comes from outside: configuration, command line
//! expressions, the statement API and chat triggers

pub mod config;
pub mod error;
pub mod monobank;
pub mod parse;
pub mod trigger;
