#![doc = include_str!("../README.md")]

#[macro_use]
extern crate tracing;

pub mod chain;
pub mod config;
pub mod credentials;
pub mod error;
pub mod flags;
pub mod generator;
pub mod rpc;
pub mod status;

mod key_exchange;
mod secret;
mod secure_bind;

pub use chain::{Authenticator, ChainInit, Credential, CredentialChain};
pub use config::SchannelPolicy;
pub use credentials::{MachineAccount, SecureChannelType};
pub use error::{Error, Result};
pub use flags::NegotiateFlags;
pub use generator::{Generator, GeneratorState, KeyExchangeGenerator, SecureBindGenerator};
pub use key_exchange::initiate_key_exchange;
pub use rpc::{AuthLevel, AuthType, InterfaceId, RpcRequest, RpcResponse, Transport};
pub use secret::Secret;
pub use secure_bind::initiate_authenticated_bind;
pub use status::{NtStatus, WError};
