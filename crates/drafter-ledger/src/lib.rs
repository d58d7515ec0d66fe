//! Query ledger: the append/edit protocol governing a conversation's query
//! sequence.
//!
//! A conversation starts empty and becomes active on the first append; soft
//! deletion is a store-level flag, not a ledger state. Entries are never
//! removed, only appended or edited in place, and insertion order is the
//! sole ordering signal.
//!
//! Callers own persistence: both operations mutate the conversation in
//! memory, and the full updated sequence is written back in a single store
//! update afterwards. Nothing is persisted half-way.

use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

use drafter_types::models::{Conversation, Query};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("query {0} not found in conversation")]
    QueryNotFound(Uuid),
}

/// Append a new query/response pair to the conversation.
///
/// The entry's numeric id is the sequence length at append time (0-based);
/// its uuid is fresh and is the identifier edits are addressed by. Returns a
/// clone of the appended entry.
pub fn append(
    conversation: &mut Conversation,
    text: impl Into<String>,
    response: impl Into<String>,
) -> Query {
    let entry = Query {
        id: conversation.queries.len() as i64,
        uuid: Uuid::new_v4(),
        query: text.into(),
        response: response.into(),
        created_at: Utc::now(),
        updated_at: None,
        is_affected: None,
    };
    conversation.queries.push(entry.clone());
    entry
}

/// Edit the entry with the given uuid in place and flag every entry at a
/// strictly later position as affected.
///
/// "Later" means sequence position at the time of the edit; the affected
/// marker propagates positionally, never by id or timestamp. Entries at or
/// before the edited position keep whatever marker they already carry, and
/// a marker that is already true is never cleared. Returns the edited
/// position.
pub fn edit(
    conversation: &mut Conversation,
    target: Uuid,
    new_text: impl Into<String>,
    new_response: impl Into<String>,
) -> Result<usize, LedgerError> {
    let position = conversation
        .queries
        .iter()
        .position(|q| q.uuid == target)
        .ok_or(LedgerError::QueryNotFound(target))?;

    let entry = &mut conversation.queries[position];
    entry.query = new_text.into();
    entry.response = new_response.into();
    entry.updated_at = Some(Utc::now());

    for later in conversation.queries.iter_mut().skip(position + 1) {
        later.is_affected = Some(true);
    }

    Ok(position)
}
