//! Composite vector types built from a magnitude and a direction column

use crate::archive::{column_aggregate, ArchiveWindow, Extremum};
use crate::{AggregateOptions, AggregateProvider, AggregateResult, Outcome};
use tracing::instrument;
use weex_core::{AggregateType, Timespan};
use weex_daysum::DailySummaryStore;

/// A named pairing of two archive columns, such as `windvec`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorComposite {
    pub name: String,
    pub magnitude: String,
    pub direction: String,
}

impl VectorComposite {
    pub fn new(name: &str, magnitude: &str, direction: &str) -> Self {
        Self {
            name: name.to_string(),
            magnitude: magnitude.to_string(),
            direction: direction.to_string(),
        }
    }

    pub fn standard() -> Vec<Self> {
        vec![
            Self::new("windvec", "windSpeed", "windDir"),
            Self::new("windgustvec", "windGust", "windGustDir"),
        ]
    }
}

/// Answers aggregates of composite vector types by scanning the archive
#[derive(Debug, Clone)]
pub struct VectorProvider {
    composites: Vec<VectorComposite>,
}

impl VectorProvider {
    pub fn new(composites: Vec<VectorComposite>) -> Self {
        Self { composites }
    }

    fn composite(&self, store: &DailySummaryStore, obs_type: &str) -> Option<&VectorComposite> {
        let schema = store.schema();
        self.composites
            .iter()
            .find(|c| c.name == obs_type)
            .filter(|c| schema.id(&c.magnitude).is_some() && schema.id(&c.direction).is_some())
    }
}

impl Default for VectorProvider {
    fn default() -> Self {
        Self::new(VectorComposite::standard())
    }
}

impl AggregateProvider for VectorProvider {
    fn name(&self) -> &'static str {
        "vector"
    }

    fn recognizes(&self, store: &DailySummaryStore, obs_type: &str) -> bool {
        self.composite(store, obs_type).is_some()
    }

    #[instrument(skip(self, store, _options), fields(provider = self.name()))]
    fn get_aggregate(
        &self,
        store: &DailySummaryStore,
        obs_type: &str,
        span: Timespan,
        aggregate: AggregateType,
        _options: &AggregateOptions,
    ) -> AggregateResult<Outcome> {
        let Some(composite) = self.composite(store, obs_type) else {
            return Ok(Outcome::NotApplicable);
        };
        let window = ArchiveWindow::new(store, span);
        let (magnitude, direction) = (composite.magnitude.as_str(), composite.direction.as_str());

        use AggregateType::*;
        Ok(match aggregate {
            Sum => Outcome::Applicable(window.vector_tally(magnitude, direction)?.resultant()),
            Avg | VecAvg => Outcome::Applicable(window.vector_tally(magnitude, direction)?.mean_magnitude()),
            VecDir => Outcome::Applicable(window.vector_tally(magnitude, direction)?.direction()),
            MaxDir => Outcome::Applicable(
                window
                    .at_extreme(direction, magnitude, Extremum::Max)?
                    .map(|(dir, _)| dir),
            ),
            _ => column_aggregate(&window, magnitude, aggregate)?,
        })
    }
}
