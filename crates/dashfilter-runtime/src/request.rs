#![forbid(unsafe_code)]

//! Per-panel query supersession.
//!
//! Every query issued for a panel gets a [`RequestTicket`] carrying a
//! [`CancellationToken`]. Issuing a newer query for the same panel cancels
//! the older ticket, and [`RequestLedger::accept`] refuses responses for any
//! ticket that is no longer current. A slow response to an old filter state
//! can therefore never overwrite a newer one.
//!
//! ```
//! use std::sync::Arc;
//! use dashfilter_core::{AugmentedQuery, BaseQuery, PanelId};
//! use dashfilter_runtime::request::RequestLedger;
//!
//! # fn query(v: &str) -> Arc<AugmentedQuery> {
//! #     Arc::new(AugmentedQuery {
//! #         base: BaseQuery::new(PanelId::new(1), v),
//! #         color_scheme: None,
//! #         label_colors: Default::default(),
//! #         shared_label_colors: Default::default(),
//! #         extra_filters: Vec::new(),
//! #         extra_form_data: Default::default(),
//! #         applied_filter_ids: Vec::new(),
//! #     })
//! # }
//! let mut ledger = RequestLedger::new();
//! let old = ledger.issue(PanelId::new(1), query("a"));
//! let new = ledger.issue(PanelId::new(1), query("b"));
//! assert!(old.token().is_cancelled());
//! assert!(!ledger.accept(&old));
//! assert!(ledger.accept(&new));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashfilter_core::{AugmentedQuery, PanelId};
use rustc_hash::FxHashMap;

/// A cloneable cancellation flag observed by whoever executes a query.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

/// The control handle that triggers cancellation.
///
/// Dropping the source does not cancel its tokens.
#[derive(Debug)]
pub struct CancellationSource {
    cancelled: Arc<AtomicBool>,
}

impl CancellationSource {
    #[must_use]
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Obtain a token that observes this source's state.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        CancellationToken {
            cancelled: Arc::clone(&self.cancelled),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancellationSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationToken {
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Handle for one issued panel query.
#[derive(Debug, Clone)]
pub struct RequestTicket {
    panel: PanelId,
    seq: u64,
    query: Arc<AugmentedQuery>,
    token: CancellationToken,
}

impl RequestTicket {
    #[must_use]
    pub fn panel(&self) -> PanelId {
        self.panel
    }

    /// Monotonic issue number across all panels.
    #[must_use]
    pub fn seq(&self) -> u64 {
        self.seq
    }

    #[must_use]
    pub fn query(&self) -> &Arc<AugmentedQuery> {
        &self.query
    }

    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

#[derive(Debug)]
struct InFlight {
    ticket: RequestTicket,
    source: CancellationSource,
}

/// Tracks the one current query per panel.
#[derive(Debug, Default)]
pub struct RequestLedger {
    next_seq: u64,
    in_flight: FxHashMap<PanelId, InFlight>,
}

impl RequestLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a query for `panel`, superseding any in-flight one.
    ///
    /// Re-issuing the very same query object (`Arc::ptr_eq`) while it is in
    /// flight returns the existing ticket instead of a new request.
    pub fn issue(&mut self, panel: PanelId, query: Arc<AugmentedQuery>) -> RequestTicket {
        if let Some(current) = self.in_flight.get(&panel) {
            if Arc::ptr_eq(&current.ticket.query, &query) {
                return current.ticket.clone();
            }
            current.source.cancel();
            tracing::debug!(
                target: "dashfilter.engine",
                panel = %panel,
                superseded = current.ticket.seq,
                "superseding in-flight query"
            );
        }
        self.next_seq += 1;
        let source = CancellationSource::new();
        let ticket = RequestTicket {
            panel,
            seq: self.next_seq,
            query,
            token: source.token(),
        };
        self.in_flight.insert(
            panel,
            InFlight {
                ticket: ticket.clone(),
                source,
            },
        );
        ticket
    }

    /// Whether a response for `ticket` may be applied. Completes the ticket.
    pub fn accept(&mut self, ticket: &RequestTicket) -> bool {
        let current = self
            .in_flight
            .get(&ticket.panel)
            .is_some_and(|f| f.ticket.seq == ticket.seq && !f.source.is_cancelled());
        if current {
            self.in_flight.remove(&ticket.panel);
        } else {
            tracing::debug!(
                target: "dashfilter.engine",
                panel = %ticket.panel,
                seq = ticket.seq,
                "dropping superseded response"
            );
        }
        current
    }

    /// Cancel the in-flight query for `panel`, if any.
    pub fn cancel(&mut self, panel: PanelId) -> bool {
        match self.in_flight.remove(&panel) {
            Some(flight) => {
                flight.source.cancel();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, flight) in self.in_flight.drain() {
            flight.source.cancel();
        }
    }

    #[must_use]
    pub fn is_in_flight(&self, panel: PanelId) -> bool {
        self.in_flight.contains_key(&panel)
    }

    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }
}
