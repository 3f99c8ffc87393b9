use cccc_core::rpc::{ActorInfo, LifecycleResult};
use serde_json::{Value, json};

use crate::args::{ActorArgs, ActorSubcommand};
use crate::commands::Ctx;
use crate::util::render::actor_line;

pub fn run(ctx: &Ctx, a: ActorArgs) {
  let scope = &a.scope;
  let lifecycle = |action: &str, method: &str, actor_id: String| {
    let value: Value = ctx.call(action, scope, method, json!({ "actor_id": actor_id }));
    ctx.emit(value, |r: LifecycleResult| {
      let state = serde_json::to_value(r.lifecycle)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default();
      println!("{}: {state}", r.actor_id);
    });
  };

  match a.command {
    ActorSubcommand::Add(add) => {
      let mut args = json!({
        "actor_id": add.actor_id,
        "runtime": add.runtime,
        "runner": add.runner.as_str(),
      });
      if !add.command.is_empty() {
        args["command"] = json!(add.command);
      }
      if let Some(cwd) = add.cwd {
        args["cwd"] = json!(cwd);
      }
      let value: Value = ctx.call("actor add", scope, "actor.add", args);
      ctx.emit(value, |info: ActorInfo| println!("{}", actor_line(&info)));
    }
    ActorSubcommand::Start { actor_id } => lifecycle("actor start", "actor.start", actor_id),
    ActorSubcommand::Stop { actor_id } => lifecycle("actor stop", "actor.stop", actor_id),
    ActorSubcommand::Restart { actor_id } => lifecycle("actor restart", "actor.restart", actor_id),
    ActorSubcommand::Remove { actor_id } => lifecycle("actor remove", "actor.remove", actor_id),
    ActorSubcommand::List => {
      let value: Value = ctx.call("actor list", scope, "actor.list", json!({}));
      ctx.emit(value, |actors: Vec<ActorInfo>| {
        println!(
          "{:<16} {:<8} {:<10} {:<9} {}",
          "ACTOR", "ROLE", "RUNTIME", "RUNNER", "STATE"
        );
        for actor in &actors {
          println!("{}", actor_line(actor));
        }
      });
    }
  }
}
