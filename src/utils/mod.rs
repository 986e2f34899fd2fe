pub mod error;
pub mod system;
