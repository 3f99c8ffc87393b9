pub mod daemon_proc;
pub mod errors;
pub mod render;
