//! Process and signal helpers shared by the library and the CLI.

pub mod process_group;
pub mod process_guard;
