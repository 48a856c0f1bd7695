// Consistent exit codes for kzrnote-ctl.
//
//   0  = success
//   1  = general error
//   2  = usage/argument error
//   10 = coordinator not running

use std::process;

use kzrnote_common::protocol::jsonrpc::{self, INVALID_ARGUMENT, INVALID_PARAMS};

use crate::client::coordinator_unavailable;

/// Named exit codes for the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    Error = 1,
    Usage = 2,
    NotRunning = 10,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Map an anyhow error to an exit code by inspecting the error chain.
    pub fn from_error(err: &anyhow::Error) -> Self {
        if coordinator_unavailable(err) {
            return Self::NotRunning;
        }
        for cause in err.chain() {
            if let Some(rpc_err) = cause.downcast_ref::<RpcError>() {
                return Self::from_rpc_code(rpc_err.code);
            }
        }
        Self::Error
    }

    /// A rejected argument (bad URI, unknown command) is the caller's input.
    pub fn from_rpc_code(code: i32) -> Self {
        match code {
            INVALID_ARGUMENT | INVALID_PARAMS => Self::Usage,
            _ => Self::Error,
        }
    }
}

impl From<ExitCode> for process::ExitCode {
    fn from(code: ExitCode) -> Self {
        process::ExitCode::from(code.code() as u8)
    }
}

/// A JSON-RPC error carried in an `anyhow::Error` chain.
#[derive(Debug)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

impl From<jsonrpc::RpcError> for RpcError {
    fn from(error: jsonrpc::RpcError) -> Self {
        Self { code: error.code, message: error.describe() }
    }
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RPC error {}: {}", self.code, self.message)
    }
}

impl std::error::Error for RpcError {}
