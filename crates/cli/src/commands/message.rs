use cccc_core::rpc::{AckStatus, InboxList, LedgerPage, MarkReadResult, SendResult};
use serde_json::{Value, json};

use crate::args::{AckArgs, InboxArgs, ReadArgs, ReplyArgs, SendArgs, TailArgs};
use crate::commands::Ctx;
use crate::util::render::event_line;

fn priority(attention: bool) -> &'static str {
  if attention { "attention" } else { "normal" }
}

fn print_sent(r: SendResult) {
  println!("sent #{} to {}", r.event.id, r.recipients.join(", "));
  if !r.unresolved.is_empty() {
    eprintln!("warning: unresolved targets: {}", r.unresolved.join(", "));
  }
}

pub fn send(ctx: &Ctx, a: SendArgs) {
  let value: Value = ctx.call(
    "send",
    &a.scope,
    "message.send",
    json!({ "to": a.to, "text": a.text, "priority": priority(a.attention) }),
  );
  ctx.emit(value, print_sent);
}

pub fn reply(ctx: &Ctx, a: ReplyArgs) {
  let value: Value = ctx.call(
    "reply",
    &a.scope,
    "message.reply",
    json!({
      "reply_to": a.reply_to,
      "to": a.to,
      "text": a.text,
      "priority": priority(a.attention)
    }),
  );
  ctx.emit(value, print_sent);
}

pub fn inbox(ctx: &Ctx, a: InboxArgs) {
  let value: Value = ctx.call("inbox", &a.scope, "inbox.list", json!({ "limit": a.limit }));
  ctx.emit(value, |list: InboxList| {
    if list.events.is_empty() {
      println!("inbox empty (read up to {})", list.cursor);
    }
    for event in &list.events {
      println!("{}", event_line(event));
    }
  });
}

pub fn read(ctx: &Ctx, a: ReadArgs) {
  let value: Value = match a.event_id {
    Some(event_id) if !a.all => ctx.call(
      "read",
      &a.scope,
      "inbox.mark_read",
      json!({ "event_id": event_id }),
    ),
    _ => ctx.call("read", &a.scope, "inbox.mark_all_read", json!({})),
  };
  ctx.emit(value, |r: MarkReadResult| {
    println!("{} read up to {}", r.actor_id, r.cursor);
  });
}

pub fn ack(ctx: &Ctx, a: AckArgs) {
  let value: Value = ctx.call(
    "ack",
    &a.scope,
    "message.ack",
    json!({ "event_id": a.event_id }),
  );
  ctx.emit(value, |s: AckStatus| {
    let pending: Vec<&str> = s
      .acks
      .iter()
      .filter(|(_, done)| !**done)
      .map(|(who, _)| who.as_str())
      .collect();
    if s.fully_acked {
      println!("#{} fully acknowledged", s.event_id);
    } else {
      println!("#{} waiting on {}", s.event_id, pending.join(", "));
    }
  });
}

pub fn tail(ctx: &Ctx, a: TailArgs) {
  let value: Value = ctx.call("tail", &a.scope, "ledger.tail", json!({ "n": a.n }));
  ctx.emit(value, |page: LedgerPage| {
    for event in &page.events {
      println!("{}", event_line(event));
    }
  });
}
