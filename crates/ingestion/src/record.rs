//! The record contract shared by every feed.

use std::cmp::Ordering;
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::store::Store;

/// Per-feed merge policy switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedPolicy {
    /// Keep the observed portion of a conditions record when the station
    /// re-sends the same observation period; only the forecast is refreshed.
    pub reject_intra_period_updates: bool,
}

/// Result of merging one record into a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// No live record matched; the record was appended.
    Inserted,
    /// The record took the slot of the named record (a superseded bulletin,
    /// or an earlier delivery of the same identifier).
    Replaced(String),
    /// A live record already supersedes this one; nothing changed.
    Superseded { by: String },
    /// Same observation period under the reject-intra-period policy; only the
    /// forecast of the named record was refreshed.
    ForecastRefreshed(String),
}

impl MergeOutcome {
    /// Whether the store contents changed.
    pub fn changed(&self) -> bool {
        !matches!(self, MergeOutcome::Superseded { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            MergeOutcome::Inserted => "inserted",
            MergeOutcome::Replaced(_) => "replaced",
            MergeOutcome::Superseded { .. } => "superseded",
            MergeOutcome::ForecastRefreshed(_) => "forecast_refreshed",
        }
    }
}

/// A parsed bulletin that can live in a [`Store`].
pub trait FeedRecord: Clone + Debug + Serialize + Send + Sync + 'static {
    /// Feed name used for log fields, metric labels and stream event names.
    const FEED: &'static str;

    /// Opaque identifier, unique per bulletin version.
    fn identifier(&self) -> &str;

    /// Identifiers this record explicitly replaces.
    fn supersedes(&self) -> &[String];

    fn valid_from(&self) -> Option<DateTime<Utc>>;

    /// End of relevance. `None` means the record is only ever replaced,
    /// never swept.
    fn valid_until(&self) -> Option<DateTime<Utc>>;

    /// Locator used to refetch the record after a restart.
    fn source_reference(&self) -> &str;

    /// Compare presentation priority; `Greater` means `self` is shown first.
    ///
    /// The default keeps insertion order.
    fn priority_cmp(&self, _other: &Self) -> Ordering {
        Ordering::Equal
    }

    /// Apply the feed's merge policy. Feeds with a pre-merge gate override this.
    fn reconcile(store: &mut Store<Self>, incoming: Self, _policy: &FeedPolicy) -> MergeOutcome {
        store.merge(incoming)
    }
}
