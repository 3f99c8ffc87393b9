//! JSON-RPC method registration.

use jsonrpsee::types::{ErrorObjectOwned, Params};
use serde::de::DeserializeOwned;

use crate::error::CoreError;
use crate::rpc::ErrorData;

pub mod daemon;
pub mod groups;

/// JSON-RPC error object carrying the machine-readable code in `data.code`.
pub fn to_rpc_error(err: CoreError) -> ErrorObjectOwned {
  let code = err.code();
  ErrorObjectOwned::owned(code.rpc_code(), err.to_string(), Some(ErrorData { code }))
}

/// Parse request params, reporting a malformed envelope as INVALID_REQUEST.
pub fn parse_params<T: DeserializeOwned>(params: &Params<'_>) -> Result<T, ErrorObjectOwned> {
  params.parse::<T>().map_err(|err| {
    let detail = err
      .data()
      .map(|d| d.get().trim_matches('"').to_string())
      .unwrap_or_else(|| err.message().to_string());
    to_rpc_error(CoreError::invalid(format!("invalid params: {detail}")))
  })
}
