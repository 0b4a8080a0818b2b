//! Output: terminal tables, chat messages and exported files

pub mod export;
pub mod notify;
pub mod summary;
pub mod table;
