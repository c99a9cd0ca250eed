//! Submissions waiting for their owner to confirm them.

use {
    std::{
        future::Future,
        num::NonZero,
        sync::atomic::{
            AtomicU64,
            Ordering,
        },
    },
    dashmap::{
        DashMap,
        mapref::entry::Entry,
    },
    tokio::time::Instant,
    crate::{
        prelude::*,
        submission::MatchSubmission,
    },
};

const CONFIRM_PREFIX: &str = "match_confirm_";
const DISCARD_PREFIX: &str = "match_discard_";

/// Identifies one pending submission. Buttons carry it so presses on an outdated message or by
/// another user can be told apart from the owner confirming the current submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Ticket {
    pub(crate) user: UserId,
    nonce: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Decision {
    Confirm,
    Discard,
}

impl Ticket {
    pub(crate) fn custom_id(&self, decision: Decision) -> String {
        let prefix = match decision {
            Decision::Confirm => CONFIRM_PREFIX,
            Decision::Discard => DISCARD_PREFIX,
        };
        format!("{prefix}{}_{}", self.user, self.nonce)
    }

    /// Decodes a button custom ID. `None` if it is not a confirmation button.
    pub(crate) fn parse(custom_id: &str) -> Option<(Decision, Self)> {
        let (decision, rest) = if let Some(rest) = custom_id.strip_prefix(CONFIRM_PREFIX) {
            (Decision::Confirm, rest)
        } else {
            (Decision::Discard, custom_id.strip_prefix(DISCARD_PREFIX)?)
        };
        let (user, nonce) = rest.split_once('_')?;
        Some((decision, Self {
            user: UserId::from(user.parse::<NonZero<u64>>().ok()?),
            nonce: nonce.parse().ok()?,
        }))
    }
}

#[derive(Debug)]
struct Pending {
    nonce: u64,
    submission: MatchSubmission,
    created: Instant,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum ConfirmError<E> {
    #[error("there is no match waiting for confirmation")]
    NothingPending,
    /// The submission was put back so confirming again retries it.
    #[error(transparent)]
    Failed(E),
}

#[derive(Debug, Default)]
pub(crate) struct PendingConfirmations {
    pending: DashMap<UserId, Pending>,
    next_nonce: AtomicU64,
}

impl PendingConfirmations {
    /// Stores a submission for `user`, replacing one that was never confirmed.
    pub(crate) fn insert(&self, user: UserId, submission: MatchSubmission) -> Ticket {
        let nonce = self.next_nonce.fetch_add(1, Ordering::Relaxed);
        let previous = self.pending.insert(user, Pending { nonce, submission, created: Instant::now() });
        if previous.is_some() {
            log::info!("replaced unconfirmed match of {user}");
        }
        Ticket { user, nonce }
    }

    /// Removes the submission `ticket` refers to, if it is still the user's current one.
    fn take(&self, ticket: Ticket) -> Option<MatchSubmission> {
        self.pending.remove_if(&ticket.user, |_, pending| pending.nonce == ticket.nonce).map(|(_, pending)| pending.submission)
    }

    /// Puts a submission back after a failed confirmation, unless a newer one has arrived meanwhile.
    fn restore(&self, ticket: Ticket, submission: MatchSubmission) {
        if let Entry::Vacant(entry) = self.pending.entry(ticket.user) {
            entry.insert(Pending { nonce: ticket.nonce, submission, created: Instant::now() });
        }
    }

    pub(crate) fn discard(&self, ticket: Ticket) -> bool {
        self.take(ticket).is_some()
    }

    /// Takes the submission `ticket` refers to and hands it to `commit`. If `commit` fails, the
    /// submission is restored under the same ticket so the same buttons retry it.
    pub(crate) async fn confirm<T, E, F, Fut>(&self, ticket: Ticket, commit: F) -> Result<T, ConfirmError<E>>
    where
        F: FnOnce(MatchSubmission) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let submission = self.take(ticket).ok_or(ConfirmError::NothingPending)?;
        match commit(submission.clone()).await {
            Ok(value) => Ok(value),
            Err(e) => {
                self.restore(ticket, submission);
                Err(ConfirmError::Failed(e))
            }
        }
    }

    pub(crate) fn evict_idle(&self, max_idle: Duration) -> usize {
        let before = self.pending.len();
        self.pending.retain(|_, pending| pending.created.elapsed() < max_idle);
        before.saturating_sub(self.pending.len())
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::submission::{
            TeamLabel,
            tests::submission,
        },
    };

    const USER: UserId = UserId::new(7);

    #[tokio::test]
    async fn failed_confirmation_restores_the_submission() {
        let pending = PendingConfirmations::default();
        let original = submission(GuildId::new(500), TeamLabel::TeamA);
        let ticket = pending.insert(USER, original.clone());
        let result = pending.confirm(ticket, |_| async { Err::<(), _>("database unavailable") }).await;
        assert!(matches!(result, Err(ConfirmError::Failed("database unavailable"))));
        // the same buttons retry it
        assert_eq!(pending.take(ticket), Some(original));
    }

    #[tokio::test]
    async fn successful_confirmation_consumes_the_submission() {
        let pending = PendingConfirmations::default();
        let ticket = pending.insert(USER, submission(GuildId::new(500), TeamLabel::TeamB));
        let winner = pending.confirm(ticket, |submission| async move { Ok::<_, ()>(submission.winning_team) }).await.unwrap();
        assert_eq!(winner, TeamLabel::TeamB);
        assert!(matches!(pending.confirm(ticket, |_| async { Ok::<(), ()>(()) }).await, Err(ConfirmError::NothingPending)));
    }

    #[tokio::test]
    async fn outdated_tickets_leave_the_current_submission_alone() {
        let pending = PendingConfirmations::default();
        let old = pending.insert(USER, submission(GuildId::new(500), TeamLabel::TeamA));
        let current_submission = submission(GuildId::new(500), TeamLabel::TeamB);
        let current = pending.insert(USER, current_submission.clone());
        assert_ne!(old, current);
        assert!(matches!(pending.confirm(old, |_| async { Ok::<(), ()>(()) }).await, Err(ConfirmError::NothingPending)));
        assert!(!pending.discard(old));
        assert_eq!(pending.take(current), Some(current_submission));
    }

    #[test]
    fn restore_does_not_clobber_a_newer_submission() {
        let pending = PendingConfirmations::default();
        let older = Ticket { user: USER, nonce: 99 };
        let newer = submission(GuildId::new(500), TeamLabel::TeamB);
        let ticket = pending.insert(USER, newer.clone());
        pending.restore(older, submission(GuildId::new(500), TeamLabel::TeamA));
        assert_eq!(pending.take(ticket), Some(newer));
    }

    #[test]
    fn discard_and_evict() {
        let pending = PendingConfirmations::default();
        let ticket = pending.insert(USER, submission(GuildId::new(500), TeamLabel::TeamA));
        assert!(pending.discard(ticket));
        assert!(!pending.discard(ticket));
        pending.insert(USER, submission(GuildId::new(500), TeamLabel::TeamA));
        assert_eq!(pending.evict_idle(Duration::ZERO), 1);
    }

    #[test]
    fn tickets_survive_custom_ids() {
        let ticket = Ticket { user: USER, nonce: 42 };
        assert_eq!(ticket.custom_id(Decision::Confirm), "match_confirm_7_42");
        assert_eq!(Ticket::parse(&ticket.custom_id(Decision::Confirm)), Some((Decision::Confirm, ticket)));
        assert_eq!(Ticket::parse(&ticket.custom_id(Decision::Discard)), Some((Decision::Discard, ticket)));
        assert_eq!(Ticket::parse("match_confirm"), None);
        assert_eq!(Ticket::parse("match_confirm_0_1"), None);
        assert_eq!(Ticket::parse("ranking_sort_KDA_500"), None);
    }
}
