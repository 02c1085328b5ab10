//! Event Model & Enrichment
//!
//! イベントの型定義、生オカレンスの正規化、インメモリの
//! イベントログを提供します。

pub mod enrichment;
pub mod store;
pub mod types;

pub use enrichment::Enricher;
pub use store::EventStore;
pub use types::{
    ActorIdentity, DetectionInfo, Event, EventContext, EventTarget, EventType, RawOccurrence,
    RawRequest, RawResponse, Severity,
};
