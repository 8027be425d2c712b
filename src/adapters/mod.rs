pub mod mail;
pub mod memory;
pub mod redis;
