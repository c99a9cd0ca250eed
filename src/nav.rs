//! Button custom IDs that carry leaderboard view state between otherwise stateless interactions.
//!
//! Formats, with fields separated by `_`:
//!
//! * sort selection: `sort_rank_<CRITERION>_<scope>`
//! * pagination: `page_rank_<CRITERION>_<scope>_<page>_<next|prev>`
//!
//! Criterion names contain underscores themselves, so decoding takes the fixed-width fields off the right
//! and joins whatever remains in the middle back together as the criterion name.

use {
    std::num::NonZero,
    crate::{
        prelude::*,
        ranking::RankingCriterion,
    },
};

const SORT_PREFIX: &str = "sort_rank_";
const PAGE_PREFIX: &str = "page_rank_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PageAction {
    Next,
    Prev,
}

impl PageAction {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Next => "next",
            Self::Prev => "prev",
        }
    }

    /// The page this action leads to from `current`, never below 1.
    pub(crate) fn target(&self, current: usize) -> usize {
        match self {
            Self::Next => current.saturating_add(1),
            Self::Prev => current.saturating_sub(1).max(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SortToken {
    pub(crate) criterion: RankingCriterion,
    pub(crate) scope: GuildId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PageToken {
    pub(crate) criterion: RankingCriterion,
    pub(crate) scope: GuildId,
    pub(crate) current_page: usize,
    pub(crate) action: PageAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NavToken {
    Sort(SortToken),
    Page(PageToken),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub(crate) enum DecodeError {
    #[error("not a leaderboard token")]
    Prefix,
    #[error("leaderboard token is missing fields")]
    MissingField,
    #[error("unknown ranking criterion {0:?}")]
    Criterion(String),
    #[error("invalid scope id {0:?}")]
    Scope(String),
    #[error("invalid page number {0:?}")]
    Page(String),
    #[error("unknown page action {0:?}")]
    Action(String),
    #[error("leaderboard token for {token} used in {guild:?}")]
    OtherScope {
        token: GuildId,
        guild: Option<GuildId>,
    },
}

impl SortToken {
    pub(crate) fn encode(&self) -> String {
        format!("{SORT_PREFIX}{}_{}", self.criterion.name(), self.scope)
    }
}

impl PageToken {
    pub(crate) fn encode(&self) -> String {
        format!("{PAGE_PREFIX}{}_{}_{}_{}", self.criterion.name(), self.scope, self.current_page, self.action.as_str())
    }

    /// The page the user asked for.
    pub(crate) fn target_page(&self) -> usize {
        self.action.target(self.current_page)
    }
}

fn parse_criterion(fields: &[&str]) -> Result<RankingCriterion, DecodeError> {
    if fields.is_empty() { return Err(DecodeError::MissingField) }
    let name = fields.join("_");
    name.parse().map_err(|()| DecodeError::Criterion(name))
}

fn parse_scope(field: &str) -> Result<GuildId, DecodeError> {
    field.parse::<NonZero<u64>>()
        .map(GuildId::from)
        .map_err(|_| DecodeError::Scope(field.to_owned()))
}

impl FromStr for SortToken {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, DecodeError> {
        let rest = s.strip_prefix(SORT_PREFIX).ok_or(DecodeError::Prefix)?;
        let fields = rest.split('_').collect_vec();
        let Some((scope, criterion)) = fields.split_last() else { return Err(DecodeError::MissingField) };
        Ok(Self {
            criterion: parse_criterion(criterion)?,
            scope: parse_scope(scope)?,
        })
    }
}

impl FromStr for PageToken {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, DecodeError> {
        let rest = s.strip_prefix(PAGE_PREFIX).ok_or(DecodeError::Prefix)?;
        let fields = rest.split('_').collect_vec();
        let [criterion @ .., scope, page, action] = &fields[..] else { return Err(DecodeError::MissingField) };
        Ok(Self {
            criterion: parse_criterion(criterion)?,
            scope: parse_scope(scope)?,
            current_page: page.parse().map_err(|_| DecodeError::Page((*page).to_owned()))?,
            action: match *action {
                "next" => PageAction::Next,
                "prev" => PageAction::Prev,
                _ => return Err(DecodeError::Action((*action).to_owned())),
            },
        })
    }
}

impl NavToken {
    /// Whether a custom ID belongs to the leaderboard at all, before attempting to decode it.
    pub(crate) fn is_nav(custom_id: &str) -> bool {
        custom_id.starts_with(SORT_PREFIX) || custom_id.starts_with(PAGE_PREFIX)
    }

    /// The criterion, scope and page to render, provided the token belongs to `guild`.
    pub(crate) fn view_in(self, guild: Option<GuildId>) -> Result<(RankingCriterion, GuildId, usize), DecodeError> {
        let (criterion, scope, page) = match self {
            Self::Sort(SortToken { criterion, scope }) => (criterion, scope, 1),
            Self::Page(token) => (token.criterion, token.scope, token.target_page()),
        };
        if guild != Some(scope) { return Err(DecodeError::OtherScope { token: scope, guild }) }
        Ok((criterion, scope, page))
    }
}

impl FromStr for NavToken {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, DecodeError> {
        if s.starts_with(SORT_PREFIX) {
            s.parse().map(Self::Sort)
        } else {
            s.parse().map(Self::Page)
        }
    }
}
