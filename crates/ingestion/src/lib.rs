//! Notification-driven ingestion and reconciliation of weather bulletins.
//!
//! A feed receives change notifications, fetches and parses the referenced
//! documents, reconciles them into an in-memory store and keeps just enough
//! on disk to rebuild that store after a restart.
//!
//! # Architecture
//!
//! - [`store`]: the per-feed reconciliation store (merge, supersession,
//!   expiry, priority snapshots)
//! - [`coordinator`]: notification → fetch → merge, and startup replay
//! - [`persistence`]: the reference-list file and its coalescing writer
//! - [`sweeper`]: periodic expiry
//! - [`notify`]: topic patterns and the in-process notification hub
//! - [`fetch`], [`cap`], [`citypage`]: document retrieval and parsing
//! - [`feed`]: wiring all of the above into a reloadable unit
//!
//! Two record types share the pipeline: [`Alert`] (CAP warnings) and
//! [`Conditions`] (citypage current conditions).

pub mod alert;
pub mod cap;
pub mod citypage;
pub mod conditions;
pub mod coordinator;
pub mod feed;
pub mod fetch;
pub mod notify;
pub mod persistence;
pub mod record;
pub mod store;
pub mod sweeper;

// Re-exports
pub use alert::{Alert, AlertArea, Severity, Urgency};
pub use cap::{parse_cap, parse_references};
pub use citypage::parse_citypage;
pub use conditions::{
    parse_lat_long, windchill, Conditions, LatLong, StationLocation, DEFAULT_URL_TEMPLATE,
};
pub use coordinator::{IngestionCoordinator, ReplayReport};
pub use feed::{Feed, FeedConfig, DEFAULT_SWEEP_INTERVAL};
pub use fetch::{CapFetcher, CitypageFetcher, DocumentFetcher, HttpDocumentSource};
pub use notify::{NotificationClient, NotificationEvent, NotificationHub, Subscription, TopicPattern};
pub use persistence::{spawn_writer, PersistTrigger, ReferenceFile};
pub use record::{FeedPolicy, FeedRecord, MergeOutcome};
pub use store::{SharedStore, Store};
pub use sweeper::ExpirySweeper;

/// Topic pattern the alerts feed subscribes to.
pub const ALERTS_TOPIC: &str = "alerts.cap.#";
