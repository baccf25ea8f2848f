//! Per-session conversation memory.
//!
//! Each session keeps a bounded window of its most recent turns. Sessions
//! idle for longer than the configured timeout are dropped on access.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::debug;
use uuid::Uuid;

use crate::error::ChatError;

/// One question and the answer given to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub user: String,
    pub bot: String,
}

impl Turn {
    pub fn new(user: impl Into<String>, bot: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            bot: bot.into(),
        }
    }

    fn render_into(&self, out: &mut String) {
        out.push_str("\nUser: ");
        out.push_str(&self.user);
        out.push_str("\nBot: ");
        out.push_str(&self.bot);
        out.push('\n');
    }
}

// =============================================================================
// SessionMemory
// =============================================================================

/// Ring buffer of the last `capacity` turns of one session.
#[derive(Debug, Clone)]
pub struct SessionMemory {
    turns: VecDeque<Turn>,
    capacity: usize,
    last_active: Instant,
}

impl SessionMemory {
    pub fn new(capacity: usize) -> Self {
        Self {
            turns: VecDeque::with_capacity(capacity),
            capacity,
            last_active: Instant::now(),
        }
    }

    /// Append a turn, evicting the oldest one when full.
    pub fn push(&mut self, turn: Turn) {
        self.last_active = Instant::now();
        if self.capacity == 0 {
            return;
        }
        while self.turns.len() >= self.capacity {
            self.turns.pop_front();
        }
        self.turns.push_back(turn);
    }

    /// Chronological rendering, `"\nUser: ..\nBot: ..\n"` per turn.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for turn in &self.turns {
            turn.render_into(&mut out);
        }
        out
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_active)
    }
}

// =============================================================================
// MemoryStore
// =============================================================================

/// Session id to memory map shared by all requests.
///
/// The inner lock is only held for map operations, never across an await.
#[derive(Debug)]
pub struct MemoryStore {
    sessions: Mutex<HashMap<Uuid, SessionMemory>>,
    capacity: usize,
    idle_timeout: Duration,
}

impl MemoryStore {
    pub fn new(capacity: usize, session_timeout_minutes: u32) -> Self {
        Self::with_idle_timeout(
            capacity,
            Duration::from_secs(u64::from(session_timeout_minutes) * 60),
        )
    }

    pub fn with_idle_timeout(capacity: usize, idle_timeout: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            capacity,
            idle_timeout,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<Uuid, SessionMemory>>, ChatError> {
        self.sessions
            .lock()
            .map_err(|e| ChatError::Session(format!("session lock poisoned: {}", e)))
    }

    /// Rendered memory for a session; empty for unknown or expired sessions.
    pub fn render(&self, session_id: Uuid) -> Result<String, ChatError> {
        let mut sessions = self.lock()?;
        self.evict_expired_locked(&mut sessions);
        Ok(sessions
            .get(&session_id)
            .map(SessionMemory::render)
            .unwrap_or_default())
    }

    /// Record a completed turn. Returns the number of turns now held.
    pub fn append(&self, session_id: Uuid, turn: Turn) -> Result<usize, ChatError> {
        let mut sessions = self.lock()?;
        self.evict_expired_locked(&mut sessions);
        let memory = sessions
            .entry(session_id)
            .or_insert_with(|| SessionMemory::new(self.capacity));
        memory.push(turn);
        Ok(memory.len())
    }

    /// Forget a session. Unknown ids are ignored.
    pub fn clear(&self, session_id: Uuid) -> Result<(), ChatError> {
        if self.lock()?.remove(&session_id).is_some() {
            debug!(%session_id, "Session memory cleared");
        }
        Ok(())
    }

    fn evict_expired_locked(&self, sessions: &mut HashMap<Uuid, SessionMemory>) {
        let now = Instant::now();
        let before = sessions.len();
        sessions.retain(|_, memory| memory.idle_for(now) <= self.idle_timeout);
        let removed = before - sessions.len();
        if removed > 0 {
            debug!(removed, "Expired sessions evicted");
        }
    }
}
