use crate::monitor::conversation::{Conversation, Message, Role};

const CHARS_PER_TOKEN: usize = 4;

/// Parse a raw log into a conversation. Never fails: input that is not a
/// JSON conversation object goes through the line-oriented text scanner,
/// and a log with no role markers yields an empty conversation.
pub fn parse(raw: &str) -> Conversation {
    match serde_json::from_str::<Conversation>(raw) {
        Ok(conv) => conv,
        Err(_) => parse_text(raw),
    }
}

fn role_prefix(line: &str) -> Option<(Role, &str)> {
    for (prefix, role) in [("user:", Role::User), ("assistant:", Role::Assistant)] {
        let Some(head) = line.get(..prefix.len()) else {
            continue;
        };
        if head.eq_ignore_ascii_case(prefix) {
            return Some((role, line[prefix.len()..].trim_start()));
        }
    }
    None
}

fn parse_text(raw: &str) -> Conversation {
    let mut messages = Vec::new();
    let mut current: Option<Message> = None;

    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some((role, rest)) = role_prefix(line) {
            if let Some(done) = current.take() {
                messages.push(done);
            }
            current = Some(Message::new(role, rest));
        } else if let Some(open) = current.as_mut() {
            open.content.push('\n');
            open.content.push_str(line);
        }
    }

    if let Some(done) = current {
        messages.push(done);
    }
    Conversation { messages }
}

/// Rough token estimate: a quarter of each message's character count,
/// floored per message. Not calibrated against any tokenizer.
pub fn count_tokens(conv: &Conversation) -> u64 {
    conv.messages
        .iter()
        .map(|m| (m.content.chars().count() / CHARS_PER_TOKEN) as u64)
        .sum()
}
