pub mod abi;
pub mod account_loader;
pub mod authenticator;
pub mod authorization;
pub mod cancellation;
pub mod chain;
pub mod credential;
pub mod delegation;
pub mod execution;

pub use authenticator::{Authenticator, SoftwareAuthenticator};
pub use cancellation::CancellationToken;
pub use chain::{
    ChainClient, HttpChainClient, MockChainClient, PollDelay, RpcTransport, UreqTransport,
    YieldingDelay,
};
