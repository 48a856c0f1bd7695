// JSON-RPC server: method dispatch over the coordinator's Unix socket.

pub mod methods;
pub mod unix;
