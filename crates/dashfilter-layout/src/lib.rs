#![forbid(unsafe_code)]

//! Layout-side resolution for the dashboard filter engine.
//!
//! - [`LayoutIndex`] - arena index over the layout tree (descendant panels,
//!   TAB ancestors), tolerant of half-written layouts
//! - [`ScopeResolver`] - declared scope → affected panel set
//! - [`TabVisibility`] - whether a filter's panels are visible under the
//!   current [`ActiveTabs`]
//!
//! Everything here is read-only over a layout snapshot.

pub mod index;
pub mod scope;
pub mod visibility;

pub use index::{Descendants, IndexedNode, LayoutIndex, LayoutIndexCache};
pub use scope::ScopeResolver;
pub use visibility::{ActiveTabs, TabVisibility};
