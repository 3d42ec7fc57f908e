extern crate serde;

#[macro_use]
extern crate serde_derive;

#[macro_use]
extern crate serde_json;

pub mod rpc_client;

pub use rpc_client::{
    parse_hex_quantity, to_hex_quantity, EthRpc, RpcError, TransactionReceipt, TransactionRequest,
};
