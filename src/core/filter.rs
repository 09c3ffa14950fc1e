//! Query filtering over the rule list.
//!
//! Matching itself is a pure function; `RuleFilter` wraps it in a worker
//! task so that filtering hundreds of rules never stalls the caller.
//! Every submitted query is evaluated, but delivery is last-result-wins:
//! the watch slot only ever holds the most recent result.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use crate::core::rule::Rule;

/// Select the rules matching `query`, preserving input order.
///
/// An empty query returns every rule. Otherwise a rule matches when its
/// package name or display name contains the query case-insensitively, or,
/// with `debuggable` set, when the decimal form of its uid contains it.
pub fn filter_rules(rules: &[Rule], query: &str, debuggable: bool) -> Vec<Rule> {
    if query.is_empty() {
        return rules.to_vec();
    }

    let query = query.to_lowercase();
    rules
        .iter()
        .filter(|rule| {
            rule.package_name.to_lowercase().contains(&query)
                || rule
                    .display_name
                    .as_ref()
                    .is_some_and(|name| name.to_lowercase().contains(&query))
                || (debuggable && rule.uid.to_string().contains(&query))
        })
        .cloned()
        .collect()
}

struct FilterRequest {
    rules: Arc<Vec<Rule>>,
    query: String,
}

/// One published filter outcome.
#[derive(Debug, Clone, Default)]
pub struct FilterResult {
    /// Increments once per evaluated request; 0 until the first result.
    pub generation: u64,
    /// The query this result answers.
    pub query: String,
    pub rules: Vec<Rule>,
}

/// Asynchronous rule filter with last-result-wins delivery.
///
/// Requests carry an immutable snapshot of the rule list, so the worker
/// never shares mutable state with the engine. Dropping the handle closes
/// the request queue and ends the worker task.
pub struct RuleFilter {
    requests: mpsc::UnboundedSender<FilterRequest>,
    results: watch::Receiver<FilterResult>,
}

impl RuleFilter {
    /// Spawn the filter worker on the current tokio runtime.
    pub fn spawn(debuggable: bool) -> Self {
        let (request_tx, mut request_rx) = mpsc::unbounded_channel::<FilterRequest>();
        let (result_tx, result_rx) = watch::channel(FilterResult::default());

        tokio::spawn(async move {
            let mut generation: u64 = 0;
            while let Some(request) = request_rx.recv().await {
                let rules = filter_rules(&request.rules, &request.query, debuggable);
                generation += 1;
                // Send fails only when every receiver is gone; the worker
                // keeps draining so senders never observe a closed queue
                // before the handle is dropped.
                let _ = result_tx.send(FilterResult {
                    generation,
                    query: request.query,
                    rules,
                });
            }
            tracing::debug!("Filter worker stopped after {generation} requests");
        });

        Self {
            requests: request_tx,
            results: result_rx,
        }
    }

    /// Queue a query against the given rule snapshot. Returns immediately;
    /// the result arrives on the watch channel.
    pub fn submit(&self, rules: Arc<Vec<Rule>>, query: impl Into<String>) {
        let request = FilterRequest {
            rules,
            query: query.into(),
        };
        if self.requests.send(request).is_err() {
            tracing::warn!("Filter worker is gone, dropping query");
        }
    }

    /// A receiver over published results. Each received value replaces the
    /// previous one, so a reader that falls behind only ever sees the
    /// latest result.
    pub fn results(&self) -> watch::Receiver<FilterResult> {
        self.results.clone()
    }
}
