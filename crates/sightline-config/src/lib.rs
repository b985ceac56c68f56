//! Sightline Config
//!
//! This crate contains the serializable task graph configuration types for Sightline.
//! These types represent graph definitions before they are validated and locked
//! by `sightline-graph`.
//!
//! Configuration is loaded from JSON documents (via the CLI, or embedded by a host
//! application). Nothing here is validated: unknown node references, malformed
//! regions and missing templates are all rejected later, at graph build time.

mod action;
mod enums;
mod geometry;
mod graph;
mod node;
mod predicate;
mod retry;

pub use action::{ActionDef, PointDef, TapTargetDef};
pub use enums::RetryBackoff;
pub use geometry::{RegionDef, ResolutionDef};
pub use graph::{DefaultsDef, GraphDef};
pub use node::{NodeDef, TargetDef, TransitionDef};
pub use predicate::{CheckDef, PredicateDef, RecognizerDef, TextFilterDef};
pub use retry::RetryDef;
