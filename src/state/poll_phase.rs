//! Poll phase definitions for the orchestrator loop
//!
//! One poll cycle walks these phases in order and then starts over. The only
//! shortcut is an unreachable index page, which goes straight to `Sleep`.

use std::fmt;

/// The phase the poller is currently in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PollPhase {
    /// Fetching and parsing the index page
    FetchIndex,

    /// Finishing the previous comment crawl, then diffing the index against
    /// the ledger and retiring vanished items
    Reconcile,

    /// Spawning one item pipeline per new item
    Dispatch,

    /// Waiting for every dispatched pipeline to finish
    AwaitCompletion,

    /// Rewriting ledger positions to match the index order
    Renumber,

    /// Handing the new items to the background comment crawl
    CrawlComments,

    /// Waiting out the poll interval
    Sleep,
}

impl PollPhase {
    /// Returns the phase that normally follows this one
    pub fn next(&self) -> Self {
        match self {
            Self::FetchIndex => Self::Reconcile,
            Self::Reconcile => Self::Dispatch,
            Self::Dispatch => Self::AwaitCompletion,
            Self::AwaitCompletion => Self::Renumber,
            Self::Renumber => Self::CrawlComments,
            Self::CrawlComments => Self::Sleep,
            Self::Sleep => Self::FetchIndex,
        }
    }

    /// Returns true if the poller may move from this phase to `to`
    ///
    /// Besides the normal successor, `FetchIndex -> Sleep` is allowed so a
    /// failed index fetch can skip the cycle without touching the ledger.
    pub fn can_transition_to(&self, to: PollPhase) -> bool {
        self.next() == to || matches!((self, to), (Self::FetchIndex, Self::Sleep))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FetchIndex => "fetch_index",
            Self::Reconcile => "reconcile",
            Self::Dispatch => "dispatch",
            Self::AwaitCompletion => "await_completion",
            Self::Renumber => "renumber",
            Self::CrawlComments => "crawl_comments",
            Self::Sleep => "sleep",
        }
    }
}

impl fmt::Display for PollPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
