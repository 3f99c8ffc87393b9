/// Text written into a recipient's terminal for one message.
pub fn format_envelope(sender: &str, recipient: &str, text: &str, reply_to: Option<u64>) -> String {
  match reply_to {
    Some(id) => format!("[cccc] {sender} → {recipient} (reply to {id}): {text}"),
    None => format!("[cccc] {sender} → {recipient}: {text}"),
  }
}
