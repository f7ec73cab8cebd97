//! Heating, cooling and growing degree days derived from daily temperatures

use crate::{AggregateOptions, AggregateProvider, AggregateResult, Outcome};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use weex_core::{convert_value, standard_unit, AggregateType, Timespan, UnitGroup};
use weex_daysum::DailySummaryStore;

/// Base temperatures, expressed in `unit`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DegreeDayConfig {
    pub heating_base: f64,
    pub cooling_base: f64,
    pub growing_base: f64,
    /// Temperature unit of the bases
    pub unit: String,
    /// Observation whose daily average drives the calculation
    pub temperature: String,
}

impl Default for DegreeDayConfig {
    fn default() -> Self {
        Self {
            heating_base: 65.0,
            cooling_base: 65.0,
            growing_base: 50.0,
            unit: "degree_F".to_string(),
            temperature: "outTemp".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegreeDayKind {
    Heating,
    Cooling,
    Growing,
}

impl DegreeDayKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "heatdeg" => Some(Self::Heating),
            "cooldeg" => Some(Self::Cooling),
            "growdeg" => Some(Self::Growing),
            _ => None,
        }
    }

    fn base(self, config: &DegreeDayConfig) -> f64 {
        match self {
            Self::Heating => config.heating_base,
            Self::Cooling => config.cooling_base,
            Self::Growing => config.growing_base,
        }
    }

    /// Degree days for one day with average temperature `avg`
    pub fn for_day(self, avg: f64, base: f64) -> f64 {
        match self {
            Self::Heating => (base - avg).max(0.0),
            Self::Cooling | Self::Growing => (avg - base).max(0.0),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DegreeDayProvider {
    config: DegreeDayConfig,
}

impl DegreeDayProvider {
    pub fn new(config: DegreeDayConfig) -> Self {
        Self { config }
    }

    /// Degree days of each day in `span` that has a temperature average,
    /// in the store's degree-day unit
    pub fn daily_values(
        &self,
        store: &DailySummaryStore,
        kind: DegreeDayKind,
        span: Timespan,
    ) -> AggregateResult<Vec<f64>> {
        let system = store.effective_unit_system();
        let temperature_unit = standard_unit(system, UnitGroup::Temperature);
        let base_day_unit = format!("{}_day", self.config.unit);
        let target_unit = standard_unit(system, UnitGroup::DegreeDay);
        let base = kind.base(&self.config);

        let mut values = Vec::new();
        for row in store.range(&self.config.temperature, span)? {
            let Some(avg) = row.avg() else {
                continue;
            };
            let avg = convert_value(avg, temperature_unit, &self.config.unit)?;
            values.push(convert_value(kind.for_day(avg, base), &base_day_unit, target_unit)?);
        }
        Ok(values)
    }
}

impl AggregateProvider for DegreeDayProvider {
    fn name(&self) -> &'static str {
        "degree-day"
    }

    fn recognizes(&self, _store: &DailySummaryStore, obs_type: &str) -> bool {
        DegreeDayKind::from_name(obs_type).is_some()
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
        let Some(kind) = DegreeDayKind::from_name(obs_type) else {
            return Ok(Outcome::NotApplicable);
        };
        if !matches!(aggregate, AggregateType::Sum | AggregateType::Avg)
            || !store.is_summarized(&self.config.temperature)
        {
            return Ok(Outcome::NotApplicable);
        }

        let values = self.daily_values(store, kind, span)?;
        debug!("{} days with a {} average", values.len(), self.config.temperature);
        if values.is_empty() {
            return Ok(Outcome::Applicable(None));
        }
        let total: f64 = values.iter().sum();
        Ok(Outcome::Applicable(Some(match aggregate {
            AggregateType::Sum => total,
            _ => total / values.len() as f64,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_day_values() {
        assert_eq!(DegreeDayKind::Heating.for_day(55.0, 65.0), 10.0);
        assert_eq!(DegreeDayKind::Heating.for_day(70.0, 65.0), 0.0);
        assert_eq!(DegreeDayKind::Cooling.for_day(70.0, 65.0), 5.0);
        assert_eq!(DegreeDayKind::Cooling.for_day(60.0, 65.0), 0.0);
        assert_eq!(DegreeDayKind::Growing.for_day(55.0, 50.0), 5.0);
    }

    #[test]
    fn test_names() {
        assert_eq!(DegreeDayKind::from_name("growdeg"), Some(DegreeDayKind::Growing));
        assert_eq!(DegreeDayKind::from_name("outTemp"), None);
    }

    #[test]
    fn test_config_from_partial_toml_shape() {
        let config: DegreeDayConfig = serde_json::from_str(r#"{"heating_base": 18.0, "unit": "degree_C"}"#).unwrap();
        assert_eq!(config.heating_base, 18.0);
        assert_eq!(config.growing_base, 50.0);
        assert_eq!(config.temperature, "outTemp");
    }
}
