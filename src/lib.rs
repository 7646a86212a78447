pub mod applier;
pub mod client_driver;
pub mod codec;
pub mod config;
pub mod crypto;
pub mod keystore;
pub mod pool;
pub mod registry;
pub mod server;
pub mod session;
pub mod transport;
pub mod types;

pub use applier::{PeerApplier, WgCommand};
pub use client_driver::ClientDriver;
pub use config::{ClientConfig, ServerConfig};
pub use crypto::Identity;
pub use pool::AddressPool;
pub use registry::PeerRegistry;
pub use server::Coordinator;
pub use session::{Session, SessionShared, SessionState};
pub use types::{ControlMessage, MacAddr, MessageKind};
