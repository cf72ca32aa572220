pub mod memorydb;
pub mod supportapi;
