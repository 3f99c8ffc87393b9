use cccc_core::domain::event::{Event, EventBody, Priority};
use cccc_core::rpc::ActorInfo;
use yansi::Paint;

/// One-line description of an event body, without id or author.
pub fn summary(event: &Event) -> String {
  match &event.body {
    EventBody::ChatMessage(msg) => {
      let mut s = format!("→ {}: {}", msg.to.join(","), msg.text);
      if let Some(reply_to) = msg.reply_to {
        s = format!("(reply to {reply_to}) {s}");
      }
      if msg.priority == Priority::Attention {
        s.push_str(" [attention]");
      }
      s
    }
    EventBody::SystemNotify(n) => {
      let kind = serde_json::to_value(n.kind)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default();
      format!("→ {} ({kind}): {}", n.to, n.text)
    }
    EventBody::ChatRead(r) => format!("read up to {}", r.event_id),
    EventBody::ChatAck(a) => format!("acked {}", a.event_id),
    EventBody::ChatDelivered(d) => format!("delivered {:?} to {}", d.event_ids, d.actor_id),
    EventBody::ActorAdded(a) => format!("added {} ({}, {})", a.actor_id, a.runtime, a.runner),
    EventBody::ActorStarted(a) | EventBody::ActorRemoved(a) => a.actor_id.clone(),
    EventBody::ActorStopped(a) => a.actor_id.clone(),
    EventBody::ActorCrashed(a) => match a.exit_code {
      Some(code) => format!("{} exited with {code}", a.actor_id),
      None => a.actor_id.clone(),
    },
    EventBody::ActorUpdated(a) => format!("{} enabled={}", a.actor_id, a.enabled),
    EventBody::GroupCreated(g) => format!("{} at {}", g.title, g.scope),
    EventBody::GroupSetState(s) => s.state.to_string(),
    EventBody::GroupStart(r) | EventBody::GroupStop(r) => r.actors.join(","),
    EventBody::GroupSettings(_) | EventBody::ContextSync(_) => String::new(),
  }
}

pub fn event_line(event: &Event) -> String {
  format!(
    "{:>5} {} {:<14} {}",
    event.id.dim(),
    event.by.bold(),
    event.kind().to_string().cyan(),
    summary(event)
  )
}

pub fn actor_line(actor: &ActorInfo) -> String {
  let role = serde_json::to_value(actor.role)
    .ok()
    .and_then(|v| v.as_str().map(str::to_string))
    .unwrap_or_default();
  let lifecycle = serde_json::to_value(actor.lifecycle)
    .ok()
    .and_then(|v| v.as_str().map(str::to_string))
    .unwrap_or_default();
  format!(
    "{:<16} {:<8} {:<10} {:<9} {}{}",
    actor.actor_id,
    role,
    actor.runtime,
    actor.runner,
    lifecycle,
    if actor.enabled { "" } else { " (disabled)" }
  )
}
