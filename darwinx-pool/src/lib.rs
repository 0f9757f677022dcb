//! DarwinX pool backend: Stratum v1 session engine, block template
//! management, coinbase/merkle assembly, and the share/round ledger.

pub mod address;
pub mod api;
pub mod api_client;
pub mod codec;
pub mod coinbase;
pub mod config;
pub mod extranonce2;
pub mod job;
pub mod ledger;
pub mod merkle;
pub mod rpc;
pub mod scorer;
pub mod server;
pub mod stratum;
pub mod submitter;
pub mod template;
pub mod tracing;
pub mod types;
pub mod u256;
pub mod vardiff;
