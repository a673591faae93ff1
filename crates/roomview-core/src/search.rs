/// Scope a search runs over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    /// The current room only.
    Room,
    /// All joined rooms.
    All,
}

/// One matched event returned by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    /// Event ID of the match.
    pub event_id: String,
    /// Room the match belongs to.
    pub room_id: String,
    /// Display-ready body of the match.
    pub body: String,
}

/// One server response batch, tagged with the search it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchBatch {
    /// Search ID the batch was requested under.
    pub search_id: u64,
    /// Matches in server order.
    pub results: Vec<SearchResult>,
    /// Matched strings reported by the server for highlighting.
    pub highlights: Vec<String>,
    /// Total result count, when the server reports one.
    pub count: Option<u64>,
    /// Token for the next batch; absent when results are exhausted.
    pub next_batch: Option<String>,
}

/// Whether a batch was applied or discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchDisposition {
    /// The batch matched the current search and was merged.
    Accepted,
    /// The batch belongs to a superseded search; discarded silently.
    Stale,
}

/// Accumulates result batches for the current search, discarding responses
/// from searches that have since been superseded.
#[derive(Debug, Clone, Default)]
pub struct SearchSession {
    current_id: u64,
    term: String,
    scope: Option<SearchScope>,
    results: Vec<SearchResult>,
    highlights: Vec<String>,
    count: Option<u64>,
    next_batch: Option<String>,
    in_progress: bool,
}

impl SearchSession {
    /// Session with no search started.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a fresh search, superseding any outstanding one, and return the
    /// ID its batches must carry.
    pub fn begin(&mut self, term: impl Into<String>, scope: SearchScope) -> u64 {
        self.current_id += 1;
        self.term = term.into();
        self.scope = Some(scope);
        self.results.clear();
        self.highlights.clear();
        self.count = None;
        self.next_batch = None;
        self.in_progress = true;
        self.current_id
    }

    /// Mark a follow-up batch request (next-batch pagination) as started.
    pub fn mark_request_started(&mut self) {
        self.in_progress = true;
    }

    /// Mark the outstanding request as failed; accumulated results stay.
    pub fn mark_request_failed(&mut self) {
        self.in_progress = false;
    }

    /// Merge one response batch. Batches tagged with a superseded search ID
    /// are discarded without touching the session.
    pub fn accept_batch(&mut self, batch: SearchBatch) -> BatchDisposition {
        if batch.search_id != self.current_id {
            return BatchDisposition::Stale;
        }

        self.in_progress = false;
        self.merge_highlights(batch.highlights);
        self.results.extend(batch.results);
        self.count = batch.count;
        self.next_batch = batch.next_batch;
        BatchDisposition::Accepted
    }

    /// Current search ID.
    pub fn current_id(&self) -> u64 {
        self.current_id
    }

    /// Term of the current search.
    pub fn term(&self) -> &str {
        &self.term
    }

    /// Scope of the current search, when one has started.
    pub fn scope(&self) -> Option<SearchScope> {
        self.scope
    }

    /// Accumulated matches in arrival order.
    pub fn results(&self) -> &[SearchResult] {
        &self.results
    }

    /// Merged highlight terms, longest first.
    pub fn highlights(&self) -> &[String] {
        &self.highlights
    }

    /// Server-reported total count, when known.
    pub fn count(&self) -> Option<u64> {
        self.count
    }

    /// Whether a batch request is outstanding.
    pub fn in_progress(&self) -> bool {
        self.in_progress
    }

    /// Whether more batches can be fetched.
    pub fn can_paginate(&self) -> bool {
        self.next_batch.is_some()
    }

    /// Token for the next batch, when present.
    pub fn next_batch(&self) -> Option<&str> {
        self.next_batch.as_deref()
    }

    // Union of old and new highlight terms, stably sorted longest first so
    // overlapping highlights favour the more specific term. Falls back to
    // the literal search term when the server reports none.
    fn merge_highlights(&mut self, incoming: Vec<String>) {
        for highlight in incoming {
            if !self.highlights.contains(&highlight) {
                self.highlights.push(highlight);
            }
        }

        self.highlights.sort_by(|a, b| b.len().cmp(&a.len()));

        if self.highlights.is_empty() && !self.term.is_empty() {
            self.highlights.push(self.term.clone());
        }
    }
}
