//! Interleaving Engine
//!
//! Merges a message's (partially revealed) text with its tool calls into an
//! ordered list of fragments.
//!
//! Rules:
//! - A call's effective index is its locked index, else its current index,
//!   else unknown (sorted last).
//! - A card with a known index appears only once the reveal cursor has reached
//!   it, so cards never run ahead of the prose they follow.
//! - A card with an unknown index appears only after the message has finished
//!   streaming and revealing.
//! - The first finite index seen for a call is locked for the life of the
//!   [`Interleaver`], so a card never moves once shown.

use std::collections::HashMap;

use crate::state::{ToolCall, ToolCallId};

/// One piece of rendered output
#[derive(Clone, Debug, PartialEq)]
pub enum Fragment {
    /// A run of revealed text
    Text(String),
    /// A tool card
    Tool(ToolCall),
}

/// Per-message layout with index locking
#[derive(Debug, Default)]
pub struct Interleaver {
    locked: HashMap<ToolCallId, usize>,
}

impl Interleaver {
    /// Create an interleaver with no locked indices
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locked index of a call, if any
    #[must_use]
    pub fn locked_index(&self, id: &ToolCallId) -> Option<usize> {
        self.locked.get(id).copied()
    }

    /// Lay out `text` with `calls`
    ///
    /// `revealed` is the number of characters currently shown. `finished`
    /// means the message stopped streaming and its reveal completed.
    pub fn layout(
        &mut self,
        text: &str,
        revealed: usize,
        calls: &[ToolCall],
        finished: bool,
    ) -> Vec<Fragment> {
        for call in calls {
            if let Some(index) = call.insert_index {
                self.locked.entry(call.id.clone()).or_insert(index);
            }
        }

        let total = text.chars().count();
        let revealed = revealed.min(total);

        let mut ordered: Vec<(Option<usize>, &ToolCall)> = calls
            .iter()
            .map(|call| (self.locked_index(&call.id), call))
            .collect();
        ordered.sort_by_key(|(index, _)| index.unwrap_or(usize::MAX));

        let mut fragments = Vec::new();
        let mut cursor = 0;

        for (index, call) in ordered {
            let anchor = match index {
                Some(index) if revealed >= index => index,
                // Past the end of the text: only once everything is shown
                Some(index) if finished => index.min(total),
                None if finished => total,
                _ => break,
            };

            push_text(&mut fragments, text, cursor, anchor);
            cursor = cursor.max(anchor);
            fragments.push(Fragment::Tool(call.clone()));
        }

        push_text(&mut fragments, text, cursor, revealed);
        fragments
    }
}

fn push_text(fragments: &mut Vec<Fragment>, text: &str, start: usize, end: usize) {
    if end <= start {
        return;
    }
    let slice = char_slice(text, start, end);
    if !slice.is_empty() {
        fragments.push(Fragment::Text(slice.to_string()));
    }
}

/// Slice `text` by character offsets
#[must_use]
pub fn char_slice(text: &str, start: usize, end: usize) -> &str {
    let byte_at = |n: usize| text.char_indices().nth(n).map_or(text.len(), |(b, _)| b);
    let (start, end) = (byte_at(start), byte_at(end));
    &text[start..end.max(start)]
}
