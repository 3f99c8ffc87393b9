use cccc_core::rpc::{AttachParams, AttachResult, GroupInfo};
use serde_json::{Value, json};

use crate::args::{AttachArgs, StateArgs};
use crate::commands::Ctx;
use crate::util::errors::fail;

pub fn attach(ctx: &Ctx, a: AttachArgs) {
  let path = a.path.unwrap_or_else(|| {
    std::env::current_dir()
      .map(|p| p.display().to_string())
      .unwrap_or_else(|_| ".".to_string())
  });
  let params = AttachParams {
    path,
    title: a.title,
  };
  let result = match ctx.rt.block_on(ctx.client.group_attach(params)) {
    Ok(r) => r,
    Err(e) => fail("attach", &e),
  };
  ctx.emit(json!(result), |r: AttachResult| {
    if r.created {
      println!("attached: {} (new group)", r.group_id);
    } else {
      println!("attached: {}", r.group_id);
    }
  });
}

pub fn state(ctx: &Ctx, a: StateArgs) {
  let value: Value = match a.state {
    Some(state) => ctx.call(
      "state",
      &a.scope,
      "group.set_state",
      json!({ "state": state.as_str() }),
    ),
    None => ctx.call("state", &a.scope, "group.show", json!({})),
  };
  ctx.emit(value, |g: GroupInfo| {
    println!("{} ({}): {}", g.title, g.group_id, g.state);
    if let Some(foreman) = g.foreman {
      println!("foreman: {foreman}");
    }
    println!("actors: {}, last event: {}", g.actors.len(), g.last_event_id);
  });
}
