pub mod clients;
pub mod permits;
