//! Unionchain node: the consensus driver, message handlers and service
//! wiring over the core / storage / network crates.

pub mod consensus;
pub mod genesis;
pub mod handlers;
pub mod service;
pub mod settings;

pub use handlers::ChainState;
pub use service::NodeService;
