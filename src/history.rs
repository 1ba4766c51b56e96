//! Per-user recommendation history.
//!
//! Once a track has been recommended to a user it is filtered out of that
//! user's later results. The outer map lock is only held long enough to find
//! or create a user's entry; appends then lock that entry alone, so requests
//! for different users do not contend.

use log::trace;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

type UserHistory = Arc<Mutex<Vec<String>>>;

#[derive(Debug, Default)]
pub struct HistoryStore {
    users: Mutex<HashMap<String, UserHistory>>,
}

impl HistoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, user_id: &str) -> UserHistory {
        let mut users = self.users.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(users.entry(user_id.to_string()).or_default())
    }

    /// Append `track_ids` to `user_id`'s history, in order.
    pub fn record<'a>(&self, user_id: &str, track_ids: impl IntoIterator<Item = &'a str>) {
        let entry = self.entry(user_id);
        let mut history = entry.lock().unwrap_or_else(PoisonError::into_inner);
        let before = history.len();
        history.extend(track_ids.into_iter().map(str::to_string));
        trace!("History for {user_id}: {} -> {} ids", before, history.len());
    }

    /// Snapshot of everything recommended to `user_id` so far.
    #[must_use]
    pub fn lookup(&self, user_id: &str) -> Vec<String> {
        let entry = {
            let users = self.users.lock().unwrap_or_else(PoisonError::into_inner);
            users.get(user_id).map(Arc::clone)
        };
        entry.map_or_else(Vec::new, |history| {
            history.lock().unwrap_or_else(PoisonError::into_inner).clone()
        })
    }

    /// Number of users with any history.
    #[must_use]
    pub fn user_count(&self) -> usize {
        self.users.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
