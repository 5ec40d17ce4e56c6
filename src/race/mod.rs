//! Race start-list pipeline
//!
//! Aggregator → (Navigator → Extractor → equipment normalizer) per division.

mod aggregator;
pub mod equipment;
mod extractor;
mod navigator;
mod types;

#[cfg(test)]
pub(crate) mod fake;

pub use aggregator::{
    division_url, AggregateReport, DivisionAggregator, DivisionFailure, EventInfo,
};
pub use equipment::{normalize, normalize_opt};
pub use extractor::{DivisionMeta, EntrantExtractor, Extraction, RowFingerprint, ROW_FINGERPRINTS};
pub use navigator::{ConsentStrategy, Navigator, PageHandle, CONSENT_STRATEGIES};
pub use types::{placeholder_driver, Division, Entrant, Equipment, Event, NO_QUOTE_ODDS};
