// Wire protocol between the coordinator and its clients.

pub mod jsonrpc;
pub mod rpc_methods;
