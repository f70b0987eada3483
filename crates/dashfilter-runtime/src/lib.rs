#![forbid(unsafe_code)]

//! Runtime state and derived views for the dashboard filter engine.
//!
//! # Role in the workspace
//! `dashfilter-runtime` owns everything that changes while a dashboard is
//! open. It reads layout and scope resolution from `dashfilter-layout` and
//! the data model from `dashfilter-core`.
//!
//! # Key modules
//! - [`data_mask`]: selected/applied mask store with atomic apply
//! - [`cascade`]: parent chains between native filters
//! - [`aggregate`]: native, cross, and legacy filters into one active list
//! - [`augment`]: per-panel query augmentation and its cache
//! - [`request`]: last-write-wins supersession of panel queries
//! - [`filter_set`]: saved selection matching
//! - [`engine`]: the facade tying them together
//! - [`config`]: tunables loaded from TOML or JSON
//!
//! # How it fits in the system
//! A host feeds the engine layout versions, filter configuration, and user
//! actions; it reads back augmented queries and drains [`EngineEvent`]s to
//! know which panels to refetch.

pub mod aggregate;
pub mod augment;
pub mod cascade;
pub mod config;
pub mod data_mask;
pub mod engine;
pub mod filter_set;
pub mod request;

pub use aggregate::{
    ActiveFilterEntry, ActiveFilters, AggregationInput, AggregationOptions, FilterSource,
    LegacyColumnValues, compute_active_filters, panels_requiring_refresh,
};
pub use augment::{
    AugmentationCacheStats, AugmentationSignature, QueryAugmentationCache, augment,
};
pub use cascade::CascadeResolver;
pub use config::{EngineConfig, EngineConfigError};
pub use data_mask::{AppliedSnapshot, ApplyOutcome, DataMaskStore, MaskEvent, MaskPhase};
pub use engine::{
    ActiveColumnFilter, ApplyError, ConfigurationRejected, ConfigurationReport,
    DashboardFilterEngine, EngineEvent,
};
pub use filter_set::{FilterSet, find_existing, is_duplicate, matches_applied};
pub use request::{CancellationSource, CancellationToken, RequestLedger, RequestTicket};
