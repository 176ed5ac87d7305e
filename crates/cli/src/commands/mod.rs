//! CLI Commands

pub mod remote;
pub mod vault;
