//! rollgate-storefront: store integrations that rollouts drive.
//!
//! A [`StoreClient`] is the seam between the store-agnostic rollout state
//! machine and a concrete distribution channel. Two families ship here:
//!
//! - **`play`**: staged-percentage stores. Every stage is an explicit user
//!   fraction committed through a publishing edit.
//! - **`app_store`**: phased-release stores. The store advances a fixed
//!   day-based schedule on its own; Rollgate starts, pauses, resumes,
//!   halts, or completes it.
//!
//! Each family talks to a raw API trait (`PlayPublishingApi`,
//! `AppStoreConnectApi`) and maps its failures onto [`ErrorCategory`] so
//! the retry shell can decide what to do with them.

pub mod app_store;
pub mod client;
pub mod error;
pub mod play;

pub use app_store::{
    AppStoreApiError, AppStoreClient, AppStoreConnectApi, PhasedRelease, PhasedReleaseState,
};
pub use client::{StoreCall, StoreClient, StoreTarget, TrackState, TrackStatus};
pub use error::{ErrorCategory, StoreError, StoreResult};
pub use play::{
    PlayApiError, PlayPublishingApi, PlayReleaseStatus, PlayStoreClient, PlayTrackRelease,
};
