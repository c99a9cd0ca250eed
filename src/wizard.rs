//! The manual match entry wizard: one in-memory session per initiating user, collecting ten players one at a time.

use {
    dashmap::{
        DashMap,
        mapref::entry::Entry,
    },
    tokio::time::Instant,
    crate::{
        prelude::*,
        submission::{
            MATCH_SIZE,
            MatchSubmission,
            PlayerEntry,
            TeamLabel,
        },
    },
};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub(crate) enum Error {
    #[error("a match entry session is already in progress")]
    SessionConflict,
    #[error("no match entry session is in progress")]
    SessionNotFound,
    #[error("all {size} players have already been entered", size = MATCH_SIZE)]
    SessionFull,
    #[error("only {collected} of {size} players have been entered", size = MATCH_SIZE)]
    Incomplete {
        collected: usize,
    },
}

#[derive(Debug)]
struct Session {
    scope: GuildId,
    winning_team: TeamLabel,
    entries: Vec<PlayerEntry>,
    last_activity: Instant,
}

/// Progress reported after each accepted entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Progress {
    /// Index of the next slot to fill, equal to the number of entries collected so far.
    pub(crate) next_index: usize,
    /// The team the accepted entry was assigned to.
    pub(crate) team: TeamLabel,
}

impl Progress {
    pub(crate) fn is_ready(&self) -> bool {
        self.next_index == MATCH_SIZE
    }
}

/// Live wizard sessions keyed by initiator.
///
/// Every operation locks only the map shard holding its key, so different initiators do not
/// contend while operations on the same initiator are serialized.
#[derive(Debug, Default)]
pub(crate) struct SessionStore {
    sessions: DashMap<UserId, Session>,
}

impl SessionStore {
    pub(crate) fn start(&self, initiator: UserId, scope: GuildId, winning_team: TeamLabel) -> Result<(), Error> {
        match self.sessions.entry(initiator) {
            Entry::Occupied(_) => Err(Error::SessionConflict),
            Entry::Vacant(entry) => {
                entry.insert(Session {
                    scope,
                    winning_team,
                    entries: Vec::with_capacity(MATCH_SIZE),
                    last_activity: Instant::now(),
                });
                log::debug!("started match entry session for {initiator} in {scope}");
                Ok(())
            }
        }
    }

    /// Appends an entry. Its team is determined by its slot, whatever the caller put there.
    pub(crate) fn submit_entry(&self, initiator: UserId, mut entry: PlayerEntry) -> Result<Progress, Error> {
        let mut session = self.sessions.get_mut(&initiator).ok_or(Error::SessionNotFound)?;
        let slot = session.entries.len();
        if slot >= MATCH_SIZE { return Err(Error::SessionFull) }
        entry.team = TeamLabel::for_slot(slot);
        let team = entry.team;
        session.entries.push(entry);
        session.last_activity = Instant::now();
        Ok(Progress { next_index: slot + 1, team })
    }

    /// Removes a complete session and turns it into a submission.
    ///
    /// An incomplete session is left untouched so the remaining entries can still be added.
    pub(crate) fn assemble(&self, initiator: UserId) -> Result<MatchSubmission, Error> {
        match self.sessions.entry(initiator) {
            Entry::Vacant(_) => Err(Error::SessionNotFound),
            Entry::Occupied(entry) => {
                let collected = entry.get().entries.len();
                if collected < MATCH_SIZE { return Err(Error::Incomplete { collected }) }
                let Session { scope, winning_team, entries, .. } = entry.remove();
                Ok(MatchSubmission { scope, winning_team, entries })
            }
        }
    }

    /// Drops the initiator's session, if any. Returns whether there was one.
    pub(crate) fn cancel(&self, initiator: UserId) -> bool {
        self.sessions.remove(&initiator).is_some()
    }

    pub(crate) fn progress(&self, initiator: UserId) -> Option<usize> {
        self.sessions.get(&initiator).map(|session| session.entries.len())
    }

    /// Drops sessions without activity for at least `max_idle`. Returns how many were dropped.
    pub(crate) fn evict_idle(&self, max_idle: Duration) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, session| session.last_activity.elapsed() < max_idle);
        before.saturating_sub(self.sessions.len())
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::submission::tests::entry,
    };

    const ALICE: UserId = UserId::new(1);
    const BOB: UserId = UserId::new(2);
    const SCOPE: GuildId = GuildId::new(500);

    #[test]
    fn second_start_conflicts() {
        let store = SessionStore::default();
        store.start(ALICE, SCOPE, TeamLabel::TeamA).unwrap();
        assert_eq!(store.start(ALICE, SCOPE, TeamLabel::TeamB), Err(Error::SessionConflict));
        // other initiators are unaffected
        store.start(BOB, SCOPE, TeamLabel::TeamB).unwrap();
        assert!(store.cancel(ALICE));
        store.start(ALICE, SCOPE, TeamLabel::TeamB).unwrap();
    }

    #[test]
    fn entries_need_a_session() {
        let store = SessionStore::default();
        assert_eq!(store.submit_entry(ALICE, entry("x", TeamLabel::TeamA, 0, 0, 0)), Err(Error::SessionNotFound));
        assert_eq!(store.assemble(ALICE), Err(Error::SessionNotFound));
        assert!(!store.cancel(ALICE));
    }

    #[test]
    fn teams_follow_slot_order() {
        let store = SessionStore::default();
        store.start(ALICE, SCOPE, TeamLabel::TeamB).unwrap();
        for slot in 0..MATCH_SIZE {
            // the caller's team is deliberately the opposite of the expected one
            let claimed = if slot < 5 { TeamLabel::TeamB } else { TeamLabel::TeamA };
            let progress = store.submit_entry(ALICE, entry(&format!("p{slot}"), claimed, 1, 1, 1)).unwrap();
            assert_eq!(progress.next_index, slot + 1);
            assert_eq!(progress.is_ready(), slot == MATCH_SIZE - 1);
        }
        assert_eq!(store.submit_entry(ALICE, entry("extra", TeamLabel::TeamA, 0, 0, 0)), Err(Error::SessionFull));
        let submission = store.assemble(ALICE).unwrap();
        assert_eq!(submission.scope, SCOPE);
        assert_eq!(submission.winning_team, TeamLabel::TeamB);
        assert_eq!(submission.entries.len(), MATCH_SIZE);
        assert!(submission.entries[..5].iter().all(|entry| entry.team == TeamLabel::TeamA));
        assert!(submission.entries[5..].iter().all(|entry| entry.team == TeamLabel::TeamB));
        assert_eq!(submission.entries[3].account_name, "p3");
        // assembling consumed the session
        assert_eq!(store.progress(ALICE), None);
        store.start(ALICE, SCOPE, TeamLabel::TeamA).unwrap();
    }

    #[test]
    fn incomplete_sessions_are_kept() {
        let store = SessionStore::default();
        store.start(ALICE, SCOPE, TeamLabel::TeamA).unwrap();
        store.submit_entry(ALICE, entry("p0", TeamLabel::TeamA, 1, 1, 1)).unwrap();
        assert_eq!(store.assemble(ALICE), Err(Error::Incomplete { collected: 1 }));
        assert_eq!(store.progress(ALICE), Some(1));
    }

    #[test]
    fn idle_sessions_are_evicted() {
        let store = SessionStore::default();
        store.start(ALICE, SCOPE, TeamLabel::TeamA).unwrap();
        assert_eq!(store.evict_idle(Duration::from_secs(3600)), 0);
        assert_eq!(store.evict_idle(Duration::ZERO), 1);
        assert_eq!(store.progress(ALICE), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_entries_are_not_lost() {
        let store = Arc::new(SessionStore::default());
        store.start(ALICE, SCOPE, TeamLabel::TeamA).unwrap();
        let handles = (0..MATCH_SIZE).map(|slot| {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.submit_entry(ALICE, entry(&format!("p{slot}"), TeamLabel::TeamA, 0, 0, 0)) })
        }).collect_vec();
        let mut indices = Vec::default();
        for handle in handles {
            indices.push(handle.await.unwrap().unwrap().next_index);
        }
        indices.sort_unstable();
        assert_eq!(indices, (1..=MATCH_SIZE).collect_vec());
        assert_eq!(store.assemble(ALICE).unwrap().entries.len(), MATCH_SIZE);
    }
}
