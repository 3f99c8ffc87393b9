use std::sync::Arc;
use std::time::Duration;

use jsonrpsee::core::RpcResult;
use jsonrpsee::server::RpcModule;
use jsonrpsee::types::Params;
use serde_json::Value;
use tracing::debug;

use super::{parse_params, to_rpc_error};
use crate::daemon::DaemonContext;
use crate::group::{GROUP_METHODS, GroupRequest};
use crate::permission::Caller;
use crate::rpc::{AttachParams, ControlRequest};

/// Upper bound for a `ledger.read_from` long-poll.
const MAX_WAIT_MS: u64 = 30_000;

/// Register group.attach, group.list and every group-scoped operation.
pub fn register(module: &mut RpcModule<DaemonContext>) {
  module
    .register_method(
      "group.attach",
      |params, ctx: &DaemonContext, _ext| -> RpcResult<Value> {
        let p: AttachParams = parse_params(&params)?;
        let result = ctx.groups.attach(p).map_err(to_rpc_error)?;
        Ok(serde_json::json!(result))
      },
    )
    .expect("register group.attach");

  module
    .register_method(
      "group.list",
      |_params, ctx: &DaemonContext, _ext| -> RpcResult<Value> {
        Ok(serde_json::json!(ctx.groups.list()))
      },
    )
    .expect("register group.list");

  for method in GROUP_METHODS {
    let method: &'static str = *method;
    module
      .register_async_method(method, move |params, ctx, _ext| {
        call_group(ctx, method, params)
      })
      .unwrap_or_else(|e| panic!("register {method}: {e}"));
  }
}

async fn call_group(
  ctx: Arc<DaemonContext>,
  method: &'static str,
  params: Params<'static>,
) -> RpcResult<Value> {
  let req: ControlRequest = parse_params(&params)?;
  let caller = Caller::from_external(&req.by).map_err(to_rpc_error)?;
  let wait_ms = req
    .args
    .get("wait_ms")
    .and_then(Value::as_u64)
    .unwrap_or(0)
    .min(MAX_WAIT_MS);
  let request = GroupRequest::parse(method, req.args).map_err(to_rpc_error)?;
  let handle = ctx.groups.get(&req.group_id).map_err(to_rpc_error)?;
  debug!(
    event = "rpc_call",
    method,
    group_id = %req.group_id,
    by = %caller
  );

  if !matches!(request, GroupRequest::LedgerReadFrom { .. }) || wait_ms == 0 {
    return handle.call(caller, request).await.map_err(to_rpc_error);
  }

  // Long-poll: subscribe before the first read so nothing slips in between.
  let mut live = handle.subscribe();
  let page = handle
    .call(caller.clone(), request.clone())
    .await
    .map_err(to_rpc_error)?;
  let empty = page
    .get("events")
    .and_then(Value::as_array)
    .is_none_or(|events| events.is_empty());
  if !empty {
    return Ok(page);
  }
  match tokio::time::timeout(Duration::from_millis(wait_ms), live.recv()).await {
    Ok(_) => handle.call(caller, request).await.map_err(to_rpc_error),
    Err(_) => Ok(page),
  }
}
