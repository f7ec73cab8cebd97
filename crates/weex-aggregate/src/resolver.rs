//! Provider chain and per-query memoization

use crate::{
    AggregateError, AggregateOptions, AggregateProvider, AggregateResult, DailySummaryProvider, DegreeDayConfig,
    DegreeDayProvider, Outcome, RawArchiveProvider, VectorProvider,
};
use std::cell::RefCell;
use std::collections::HashMap;
use tracing::{debug, instrument};
use weex_core::{tag, AggregateType, Timespan, ValueTuple};
use weex_daysum::DailySummaryStore;

#[derive(Debug, Clone, Default)]
pub struct ResolverConfig {
    pub degree_days: DegreeDayConfig,
}

/// Ordered providers; earlier entries get the first chance to answer
#[derive(Default)]
pub struct ProviderRegistry {
    providers: Vec<Box<dyn AggregateProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Degree days, vector composites, daily summaries, then the raw archive
    pub fn standard(config: &ResolverConfig) -> Self {
        Self::new()
            .with_provider(DegreeDayProvider::new(config.degree_days.clone()))
            .with_provider(VectorProvider::default())
            .with_provider(DailySummaryProvider)
            .with_provider(RawArchiveProvider)
    }

    pub fn with_provider(mut self, provider: impl AggregateProvider + 'static) -> Self {
        self.register(Box::new(provider));
        self
    }

    pub fn register(&mut self, provider: Box<dyn AggregateProvider>) {
        self.providers.push(provider);
    }

    pub fn providers(&self) -> impl Iterator<Item = &dyn AggregateProvider> {
        self.providers.iter().map(|p| p.as_ref())
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.providers().map(|p| p.name()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    obs_type: String,
    span: Timespan,
    aggregate: AggregateType,
    /// Threshold as raw bits plus its unit
    val: Option<(Option<u64>, Option<String>)>,
}

impl CacheKey {
    fn new(obs_type: &str, span: Timespan, aggregate: AggregateType, options: &AggregateOptions) -> Self {
        Self {
            obs_type: obs_type.to_string(),
            span,
            aggregate,
            val: options
                .val
                .as_ref()
                .map(|v| (v.value.map(f64::to_bits), v.unit.clone())),
        }
    }
}

/// Answers aggregate queries against one store.
///
/// Results for spans that end before the day holding the newest record are
/// memoized; those days are closed and their answers cannot change while
/// records only arrive in time order.
pub struct AggregateResolver<'a> {
    store: &'a DailySummaryStore,
    registry: &'a ProviderRegistry,
    cache: RefCell<HashMap<CacheKey, ValueTuple>>,
}

impl<'a> AggregateResolver<'a> {
    pub fn new(store: &'a DailySummaryStore, registry: &'a ProviderRegistry) -> Self {
        Self {
            store,
            registry,
            cache: RefCell::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &DailySummaryStore {
        self.store
    }

    /// Resolve `aggregate` of `obs_type` over `span`, tagged with the unit and
    /// group it is expressed in
    #[instrument(skip(self, options))]
    pub fn get_aggregate(
        &self,
        obs_type: &str,
        span: Timespan,
        aggregate: AggregateType,
        options: &AggregateOptions,
    ) -> AggregateResult<ValueTuple> {
        if !self.registry.providers().any(|p| p.recognizes(self.store, obs_type)) {
            return Err(AggregateError::UnknownType(obs_type.to_string()));
        }

        let cacheable = self.is_closed(span)?;
        let key = CacheKey::new(obs_type, span, aggregate, options);
        if cacheable {
            if let Some(hit) = self.cache.borrow().get(&key) {
                debug!("Cache hit");
                return Ok(hit.clone());
            }
        }

        for provider in self.registry.providers() {
            if !provider.recognizes(self.store, obs_type) {
                continue;
            }
            match provider.get_aggregate(self.store, obs_type, span, aggregate, options)? {
                Outcome::Applicable(value) => {
                    debug!("Answered by {}", provider.name());
                    let tagged = tag(value, self.store.effective_unit_system(), obs_type, aggregate);
                    if cacheable {
                        self.cache.borrow_mut().insert(key, tagged.clone());
                    }
                    return Ok(tagged);
                }
                Outcome::NotApplicable => continue,
            }
        }

        Err(AggregateError::UnknownAggregation {
            obs_type: obs_type.to_string(),
            aggregate,
        })
    }

    /// Spans ending at or before the start of the newest record's day
    fn is_closed(&self, span: Timespan) -> AggregateResult<bool> {
        Ok(match self.store.last_timestamp()? {
            Some(last) => span.stop <= self.store.clock().archive_day_start(last),
            None => false,
        })
    }

    pub fn cached(&self) -> usize {
        self.cache.borrow().len()
    }

    pub fn clear_cache(&self) {
        self.cache.borrow_mut().clear();
    }
}
