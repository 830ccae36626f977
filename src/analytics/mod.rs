//! Analytics layer over the warehouse gold views.
//!
//! # Module structure
//!
//! - [`types`]: typed cells, result tables, the global filter, error type
//! - [`predicate`]: composable, escaped WHERE clauses
//! - [`catalog`]: named query templates and the cached [`Catalog`] runner
//! - [`cache`]: TTL result cache with single-flight fetches
//! - [`transform`]: coercion, grouping, ranking, pivots, pagination, KPIs
//! - [`derive`]: null-safe statistics
//! - [`bucketing`]: month labels, user dates, default windows
//! - [`encoding`]: map color and radius
//! - [`export`]: CSV writer
//! - [`reports`]: the dashboard sections

pub mod bucketing;
pub mod cache;
pub mod catalog;
pub mod derive;
pub mod encoding;
pub mod export;
pub mod predicate;
pub mod reports;
pub mod transform;
pub mod types;

pub use cache::ResultCache;
pub use catalog::{Catalog, QuerySpec, QueryTemplate, TemplateArgs};
pub use predicate::Predicate;
pub use reports::{Report, ReportOptions, Section, SectionOutcome};
pub use types::{AnalyticsError, AnalyticsResult, FilterState, ResultTable, Value};
