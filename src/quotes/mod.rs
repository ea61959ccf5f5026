//! Quote extraction engine: rules, extraction, per-message reconciliation and
//! the history backfill built on top of it.

pub mod backfill;
pub mod extract;
pub mod patterns;
pub mod reconcile;

pub use backfill::{BackfillReport, BackfillRequest, BackfillScanner, ScanOutcome};
pub use extract::{extract_quote, ExtractedQuote};
pub use patterns::{ExtractionRule, GroupMapping, RuleSet};
pub use reconcile::{QuoteState, ReconcileAction, Reconciler, Reconciliation, Trigger};
