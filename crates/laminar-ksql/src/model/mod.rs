//! Query model consumed by the statement compilers.
//!
//! A [`QueryModel`] is assembled once by the embedding DSL and then only
//! read. Compilers never change it; the one exception is idempotent
//! memoization of derived projection data inside [`Extras`].

mod extras;
mod projection;
mod source;

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

pub use extras::{keys, Extras};
pub use projection::{
    adapt_hub_projection, contains_aggregate, is_aggregate_call, HubOverride, HubSelection,
    MemberKind, ProjectionMember, ProjectionMetadata, WINDOW_START_RAW,
};
pub use source::{ColumnDescriptor, SourceDescriptor, SourceKind};

use crate::catalog::FunctionCatalog;
use crate::expr::Lambda;

/// Counter for model instance ids.
static MODEL_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Model-level hopping window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HoppingWindow {
    /// Window size
    pub size: Duration,
    /// Advance between window starts
    pub advance: Duration,
    /// Late-arrival grace
    pub grace: Option<Duration>,
}

impl HoppingWindow {
    /// Hopping window without grace.
    #[must_use]
    pub fn new(size: Duration, advance: Duration) -> Self {
        Self {
            size,
            advance,
            grace: None,
        }
    }

    /// Sets the grace period.
    #[must_use]
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = Some(grace);
        self
    }
}

/// Read-only description of one streaming query.
///
/// Each instance gets a process-unique id, which is what
/// [`ModelScope`](crate::ModelScope) tokens are bound to. Cloning is not
/// offered so a token can never match two distinct models.
#[derive(Debug)]
pub struct QueryModel {
    id: u64,
    sources: Vec<SourceDescriptor>,
    join_condition: Option<Lambda>,
    where_condition: Option<Lambda>,
    group_by: Option<Lambda>,
    having: Option<Lambda>,
    select: Option<Lambda>,
    windows: Vec<String>,
    hopping: Option<HoppingWindow>,
    within_seconds: Option<u64>,
    forbid_default_within: bool,
    grace_seconds: Option<u64>,
    primary_alias: bool,
    extras: Extras,
}

impl QueryModel {
    /// Starts a builder.
    #[must_use]
    pub fn builder() -> QueryModelBuilder {
        QueryModelBuilder::default()
    }

    /// Process-unique instance id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Source types in order: primary first, then the join target.
    #[must_use]
    pub fn sources(&self) -> &[SourceDescriptor] {
        &self.sources
    }

    /// Join predicate over `(o, i)`.
    #[must_use]
    pub fn join_condition(&self) -> Option<&Lambda> {
        self.join_condition.as_ref()
    }

    /// Row filter.
    #[must_use]
    pub fn where_condition(&self) -> Option<&Lambda> {
        self.where_condition.as_ref()
    }

    /// Grouping key selector.
    #[must_use]
    pub fn group_by(&self) -> Option<&Lambda> {
        self.group_by.as_ref()
    }

    /// Group filter.
    #[must_use]
    pub fn having(&self) -> Option<&Lambda> {
        self.having.as_ref()
    }

    /// Output projection.
    #[must_use]
    pub fn select(&self) -> Option<&Lambda> {
        self.select.as_ref()
    }

    /// Distinct tumbling timeframes in insertion order.
    #[must_use]
    pub fn windows(&self) -> &[String] {
        &self.windows
    }

    /// Model-level hopping window.
    #[must_use]
    pub fn hopping(&self) -> Option<&HoppingWindow> {
        self.hopping.as_ref()
    }

    /// Explicit join bound.
    #[must_use]
    pub fn within_seconds(&self) -> Option<u64> {
        self.within_seconds
    }

    /// The default join bound must not be applied.
    #[must_use]
    pub fn forbid_default_within(&self) -> bool {
        self.forbid_default_within
    }

    /// Grace period for tumbling windows.
    #[must_use]
    pub fn grace_seconds(&self) -> Option<u64> {
        self.grace_seconds
    }

    /// True when the primary source is referenced through alias `o`.
    #[must_use]
    pub fn primary_source_requires_alias(&self) -> bool {
        self.primary_alias
    }

    /// Side channel.
    #[must_use]
    pub fn extras(&self) -> &Extras {
        &self.extras
    }

    /// True when a grouping key selector is present.
    #[must_use]
    pub fn has_group_by(&self) -> bool {
        self.group_by.is_some()
    }

    /// True when a hopping window is declared.
    #[must_use]
    pub fn has_hopping(&self) -> bool {
        self.hopping.is_some()
    }

    /// True when the projection calls an aggregate anywhere.
    #[must_use]
    pub fn has_aggregates(&self, catalog: &FunctionCatalog) -> bool {
        self.select
            .as_ref()
            .is_some_and(|s| contains_aggregate(&s.body, catalog))
    }

    /// True when the result is a changelog: grouped, windowed or aggregated.
    #[must_use]
    pub fn is_aggregate_query(&self, catalog: &FunctionCatalog) -> bool {
        self.has_group_by()
            || !self.windows.is_empty()
            || self.has_hopping()
            || self.has_aggregates(catalog)
    }
}

/// Builder for [`QueryModel`].
#[derive(Debug, Default)]
pub struct QueryModelBuilder {
    sources: Vec<SourceDescriptor>,
    join_condition: Option<Lambda>,
    where_condition: Option<Lambda>,
    group_by: Option<Lambda>,
    having: Option<Lambda>,
    select: Option<Lambda>,
    projection: Option<ProjectionMetadata>,
    windows: Vec<String>,
    hopping: Option<HoppingWindow>,
    within_seconds: Option<u64>,
    forbid_default_within: bool,
    grace_seconds: Option<u64>,
    primary_alias: Option<bool>,
    extras: Extras,
}

impl QueryModelBuilder {
    /// Appends a source type.
    #[must_use]
    pub fn source(mut self, source: SourceDescriptor) -> Self {
        self.sources.push(source);
        self
    }

    /// Join target plus its predicate over `(o, i)`.
    #[must_use]
    pub fn join(mut self, target: SourceDescriptor, on: Lambda) -> Self {
        self.sources.push(target);
        self.join_condition = Some(on);
        self
    }

    /// Join predicate alone, for models whose sources are already listed.
    #[must_use]
    pub fn join_on(mut self, on: Lambda) -> Self {
        self.join_condition = Some(on);
        self
    }

    /// Row filter.
    #[must_use]
    pub fn filter(mut self, predicate: Lambda) -> Self {
        self.where_condition = Some(predicate);
        self
    }

    /// Grouping key selector.
    #[must_use]
    pub fn group_by(mut self, key: Lambda) -> Self {
        self.group_by = Some(key);
        self
    }

    /// Group filter.
    #[must_use]
    pub fn having(mut self, predicate: Lambda) -> Self {
        self.having = Some(predicate);
        self
    }

    /// Output projection.
    #[must_use]
    pub fn select(mut self, projection: Lambda) -> Self {
        self.select = Some(projection);
        self
    }

    /// Precomputed projection metadata.
    #[must_use]
    pub fn projection_metadata(mut self, meta: ProjectionMetadata) -> Self {
        self.projection = Some(meta);
        self
    }

    /// Adds a tumbling timeframe; repeats are ignored.
    #[must_use]
    pub fn window(mut self, timeframe: &str) -> Self {
        let tf = timeframe.trim();
        if !tf.is_empty() && !self.windows.iter().any(|w| w == tf) {
            self.windows.push(tf.to_string());
        }
        self
    }

    /// Adds several tumbling timeframes.
    #[must_use]
    pub fn windows<'a>(self, timeframes: impl IntoIterator<Item = &'a str>) -> Self {
        timeframes.into_iter().fold(self, Self::window)
    }

    /// Model-level hopping window.
    #[must_use]
    pub fn hopping(mut self, window: HoppingWindow) -> Self {
        self.hopping = Some(window);
        self
    }

    /// Explicit join bound.
    #[must_use]
    pub fn within(mut self, seconds: u64) -> Self {
        self.within_seconds = Some(seconds);
        self
    }

    /// Requires an explicit join bound.
    #[must_use]
    pub fn forbid_default_within(mut self) -> Self {
        self.forbid_default_within = true;
        self
    }

    /// Grace period for tumbling windows.
    #[must_use]
    pub fn grace(mut self, seconds: u64) -> Self {
        self.grace_seconds = Some(seconds);
        self
    }

    /// Forces (or suppresses) alias `o` on the primary source. Defaults to
    /// true exactly when a join target is present.
    #[must_use]
    pub fn primary_alias(mut self, required: bool) -> Self {
        self.primary_alias = Some(required);
        self
    }

    /// Adds one side-channel value.
    #[must_use]
    pub fn extra(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.extras.insert(key, value);
        self
    }

    /// Finishes the model.
    #[must_use]
    pub fn build(self) -> QueryModel {
        let mut extras = self.extras;
        if let Some(meta) = self.projection {
            extras.set_projection(meta);
        }
        let primary_alias = self.primary_alias.unwrap_or(self.sources.len() > 1);
        QueryModel {
            id: MODEL_COUNTER.fetch_add(1, Ordering::Relaxed),
            sources: self.sources,
            join_condition: self.join_condition,
            where_condition: self.where_condition,
            group_by: self.group_by,
            having: self.having,
            select: self.select,
            windows: self.windows,
            hopping: self.hopping,
            within_seconds: self.within_seconds,
            forbid_default_within: self.forbid_default_within,
            grace_seconds: self.grace_seconds,
            primary_alias,
            extras,
        }
    }
}
