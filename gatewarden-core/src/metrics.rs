//! Metric descriptions for the gate's counters

use metrics::describe_counter;

/// Register descriptions with the installed recorder.
pub fn init_metrics() {
    describe_counter!("gate.credentials.minted", "Invite credentials minted");
    describe_counter!("gate.joins.admitted", "Arrivals classified legitimate");
    describe_counter!("gate.joins.expelled", "Arrivals classified illegitimate");
    describe_counter!("gate.throttle.penalties", "Spam penalties applied");
    describe_counter!("store.documents.written", "Persisted document rewrites");
}
