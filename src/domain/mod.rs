pub mod digest;
pub mod state_machine;
pub mod types;
