pub mod browser;
pub mod classifier;
pub mod config;
pub mod delay_manager;
pub mod extractor;
pub mod http_browser;
pub mod logger;
pub mod notifier;
pub mod posting;
pub mod sources;
pub mod store;
pub mod sweeper;

#[cfg(test)]
pub(crate) mod testing;

// Exporting types for convenience
pub use browser::{Browser, BrowserError, Node};
pub use classifier::{classify, KeywordClassifier};
pub use config::Config;
pub use extractor::{extract_field, FieldSpec, SelectorSpec};
pub use http_browser::HttpBrowser;
pub use posting::{canonical_id, Candidate, Posting, SearchTask};
pub use sources::{JobSource, SearchReport, SelectorAdapter, SourceError, SourceProfile};
pub use store::PostingStore;
pub use sweeper::{CancelToken, SweepSettings, SweepSummary, Sweeper};
