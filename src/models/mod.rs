pub mod group;
pub mod message;
