pub mod chain;
pub mod client;
pub mod wallet;
