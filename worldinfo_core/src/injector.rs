//! Injector - splices selected lore into the outgoing message list.
//!
//! The input message array is never mutated; callers get a new list back so
//! they can diff and log exactly what was injected.

use lorebook::{ChatMessage, EntryPosition, InsertionStrategy, Role};

use crate::ranker::RankedEntry;

/// Build a new message list with lore inserted around the system message.
///
/// `Before` prepends one synthetic system message immediately before the
/// character/system message, `After` appends one immediately after it
/// (before the first user turn). `Mixed` splits entries by their own
/// `position`; entry-level `Mixed` lands in the before bucket. With no
/// system message present, lore goes at the front of the list.
pub fn inject(
    messages: &[ChatMessage],
    ranked: &[RankedEntry],
    strategy: InsertionStrategy,
) -> Vec<ChatMessage> {
    let (before, after) = split_buckets(ranked, strategy);
    let before_msg = bucket_message(&before);
    let after_msg = bucket_message(&after);

    if before_msg.is_none() && after_msg.is_none() {
        return messages.to_vec();
    }

    let mut out = Vec::with_capacity(messages.len() + 2);
    match messages.iter().position(|m| m.role == Role::System) {
        Some(anchor) => {
            out.extend(messages[..anchor].iter().cloned());
            out.extend(before_msg);
            out.push(messages[anchor].clone());
            out.extend(after_msg);
            out.extend(messages[anchor + 1..].iter().cloned());
        }
        None => {
            out.extend(before_msg);
            out.extend(after_msg);
            out.extend(messages.iter().cloned());
        }
    }
    out
}

/// Partition ranked entries into before/after buckets, preserving rank
/// order within each bucket.
fn split_buckets<'a>(
    ranked: &'a [RankedEntry],
    strategy: InsertionStrategy,
) -> (Vec<&'a RankedEntry>, Vec<&'a RankedEntry>) {
    match strategy {
        InsertionStrategy::Before => (ranked.iter().collect(), Vec::new()),
        InsertionStrategy::After => (Vec::new(), ranked.iter().collect()),
        InsertionStrategy::Mixed => {
            ranked.iter().partition(|r| r.position != EntryPosition::After)
        }
    }
}

/// Concatenate a bucket's lore into one synthetic system message, with
/// entry separators normalized to a blank line.
fn bucket_message(bucket: &[&RankedEntry]) -> Option<ChatMessage> {
    if bucket.is_empty() {
        return None;
    }
    let content = bucket
        .iter()
        .map(|r| r.content.trim())
        .filter(|c| !c.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");
    if content.is_empty() {
        return None;
    }
    Some(ChatMessage::system(content))
}
