//! Unit catalog
//!
//! Only the part of the WeeWX unit system the aggregate layer needs: which
//! group an observation belongs to, the standard unit of each group per unit
//! system, and linear conversion inside a group.

use crate::types::{AggregateType, UnitSystem, ValueTuple};

/// Unit conversion error
#[derive(Debug, thiserror::Error)]
pub enum UnitError {
    #[error("Unknown unit: {0}")]
    UnknownUnit(String),

    #[error("Cannot convert {from} to {to}")]
    IncompatibleUnits { from: String, to: String },

    #[error("Value has no unit")]
    MissingUnit,
}

/// Unit group for observation types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitGroup {
    Temperature,
    Pressure,
    Rain,
    RainRate,
    Speed,
    Direction,
    Percent,
    Radiation,
    Uv,
    DegreeDay,
    Time,
    Count,
}

impl UnitGroup {
    pub fn as_str(self) -> &'static str {
        match self {
            UnitGroup::Temperature => "group_temperature",
            UnitGroup::Pressure => "group_pressure",
            UnitGroup::Rain => "group_rain",
            UnitGroup::RainRate => "group_rainrate",
            UnitGroup::Speed => "group_speed",
            UnitGroup::Direction => "group_direction",
            UnitGroup::Percent => "group_percent",
            UnitGroup::Radiation => "group_radiation",
            UnitGroup::Uv => "group_uv",
            UnitGroup::DegreeDay => "group_degree_day",
            UnitGroup::Time => "group_time",
            UnitGroup::Count => "group_count",
        }
    }
}

/// Get unit group for an observation type
pub fn get_unit_group(obs_type: &str) -> Option<UnitGroup> {
    match obs_type {
        "outTemp" | "inTemp" | "dewpoint" | "heatindex" | "windchill" | "appTemp" => {
            Some(UnitGroup::Temperature)
        }
        t if t.starts_with("extraTemp") || t.starts_with("soilTemp") || t.starts_with("leafTemp") => {
            Some(UnitGroup::Temperature)
        }
        "barometer" | "pressure" | "altimeter" => Some(UnitGroup::Pressure),
        "rain" | "ET" => Some(UnitGroup::Rain),
        "rainRate" => Some(UnitGroup::RainRate),
        "windSpeed" | "windGust" | "wind" | "windvec" | "windgustvec" => Some(UnitGroup::Speed),
        "windDir" | "windGustDir" => Some(UnitGroup::Direction),
        "outHumidity" | "inHumidity" | "rxCheckPercent" => Some(UnitGroup::Percent),
        t if t.starts_with("extraHumid") => Some(UnitGroup::Percent),
        "radiation" => Some(UnitGroup::Radiation),
        "UV" => Some(UnitGroup::Uv),
        "heatdeg" | "cooldeg" | "growdeg" => Some(UnitGroup::DegreeDay),
        _ => None,
    }
}

/// Group of the value an aggregate of `obs_type` produces
pub fn aggregate_unit_group(obs_type: &str, aggregate: AggregateType) -> Option<UnitGroup> {
    if aggregate.is_time() {
        return Some(UnitGroup::Time);
    }
    if aggregate == AggregateType::Count || aggregate.is_day_count() {
        return Some(UnitGroup::Count);
    }
    if matches!(aggregate, AggregateType::MaxDir | AggregateType::VecDir) {
        return Some(UnitGroup::Direction);
    }
    get_unit_group(obs_type)
}

/// Standard unit of a group in a unit system
pub fn standard_unit(system: UnitSystem, group: UnitGroup) -> &'static str {
    use UnitSystem::*;
    match (group, system) {
        (UnitGroup::Temperature, Us) => "degree_F",
        (UnitGroup::Temperature, _) => "degree_C",
        (UnitGroup::DegreeDay, Us) => "degree_F_day",
        (UnitGroup::DegreeDay, _) => "degree_C_day",
        (UnitGroup::Pressure, Us) => "inHg",
        (UnitGroup::Pressure, _) => "mbar",
        (UnitGroup::Rain, Us) => "inch",
        (UnitGroup::Rain, Metric) => "cm",
        (UnitGroup::Rain, MetricWx) => "mm",
        (UnitGroup::RainRate, Us) => "inch_per_hour",
        (UnitGroup::RainRate, Metric) => "cm_per_hour",
        (UnitGroup::RainRate, MetricWx) => "mm_per_hour",
        (UnitGroup::Speed, Us) => "mile_per_hour",
        (UnitGroup::Speed, Metric) => "km_per_hour",
        (UnitGroup::Speed, MetricWx) => "meter_per_second",
        (UnitGroup::Direction, _) => "degree_compass",
        (UnitGroup::Percent, _) => "percent",
        (UnitGroup::Radiation, _) => "watt_per_meter_squared",
        (UnitGroup::Uv, _) => "uv_index",
        (UnitGroup::Time, _) => "unix_epoch",
        (UnitGroup::Count, _) => "count",
    }
}

/// `(unit, group)` names for an aggregate of `obs_type` under `system`;
/// both `None` when the type has no known group.
pub fn get_standard_unit_type(
    system: UnitSystem,
    obs_type: &str,
    aggregate: AggregateType,
) -> (Option<&'static str>, Option<&'static str>) {
    match aggregate_unit_group(obs_type, aggregate) {
        Some(group) => (Some(standard_unit(system, group)), Some(group.as_str())),
        None => (None, None),
    }
}

/// Tag a raw aggregate value with its unit and group
pub fn tag(value: Option<f64>, system: UnitSystem, obs_type: &str, aggregate: AggregateType) -> ValueTuple {
    let (unit, group) = get_standard_unit_type(system, obs_type, aggregate);
    ValueTuple::new(value, unit, group)
}

struct UnitDef {
    name: &'static str,
    group: UnitGroup,
    /// `base = value * factor + offset`
    factor: f64,
    offset: f64,
}

const fn unit(name: &'static str, group: UnitGroup, factor: f64, offset: f64) -> UnitDef {
    UnitDef {
        name,
        group,
        factor,
        offset,
    }
}

const UNITS: &[UnitDef] = &[
    unit("degree_C", UnitGroup::Temperature, 1.0, 0.0),
    unit("degree_F", UnitGroup::Temperature, 5.0 / 9.0, -32.0 * 5.0 / 9.0),
    unit("degree_K", UnitGroup::Temperature, 1.0, -273.15),
    unit("degree_C_day", UnitGroup::DegreeDay, 1.0, 0.0),
    unit("degree_F_day", UnitGroup::DegreeDay, 5.0 / 9.0, 0.0),
    unit("mbar", UnitGroup::Pressure, 1.0, 0.0),
    unit("hPa", UnitGroup::Pressure, 1.0, 0.0),
    unit("kPa", UnitGroup::Pressure, 10.0, 0.0),
    unit("inHg", UnitGroup::Pressure, 33.863_886_666_7, 0.0),
    unit("mmHg", UnitGroup::Pressure, 1.333_223_87, 0.0),
    unit("mm", UnitGroup::Rain, 1.0, 0.0),
    unit("cm", UnitGroup::Rain, 10.0, 0.0),
    unit("inch", UnitGroup::Rain, 25.4, 0.0),
    unit("mm_per_hour", UnitGroup::RainRate, 1.0, 0.0),
    unit("cm_per_hour", UnitGroup::RainRate, 10.0, 0.0),
    unit("inch_per_hour", UnitGroup::RainRate, 25.4, 0.0),
    unit("meter_per_second", UnitGroup::Speed, 1.0, 0.0),
    unit("km_per_hour", UnitGroup::Speed, 1.0 / 3.6, 0.0),
    unit("mile_per_hour", UnitGroup::Speed, 0.447_04, 0.0),
    unit("knot", UnitGroup::Speed, 1852.0 / 3600.0, 0.0),
    unit("degree_compass", UnitGroup::Direction, 1.0, 0.0),
    unit("percent", UnitGroup::Percent, 1.0, 0.0),
    unit("watt_per_meter_squared", UnitGroup::Radiation, 1.0, 0.0),
    unit("uv_index", UnitGroup::Uv, 1.0, 0.0),
    unit("unix_epoch", UnitGroup::Time, 1.0, 0.0),
    unit("count", UnitGroup::Count, 1.0, 0.0),
];

fn lookup(name: &str) -> Result<&'static UnitDef, UnitError> {
    UNITS
        .iter()
        .find(|def| def.name == name)
        .ok_or_else(|| UnitError::UnknownUnit(name.to_string()))
}

/// Convert a bare value between two units of the same group
pub fn convert_value(value: f64, from: &str, to: &str) -> Result<f64, UnitError> {
    if from == to {
        return Ok(value);
    }
    let source = lookup(from)?;
    let target = lookup(to)?;
    if source.group != target.group {
        return Err(UnitError::IncompatibleUnits {
            from: from.to_string(),
            to: to.to_string(),
        });
    }
    let base = value * source.factor + source.offset;
    Ok((base - target.offset) / target.factor)
}

/// Convert a tagged value to `target`. A null value passes through.
pub fn convert(value: &ValueTuple, target: &str) -> Result<ValueTuple, UnitError> {
    let from = value.unit.as_deref().ok_or(UnitError::MissingUnit)?;
    let target_def = lookup(target)?;
    let converted = match value.value {
        Some(v) => Some(convert_value(v, from, target)?),
        None => {
            // Still reject a cross-group request
            convert_value(0.0, from, target)?;
            None
        }
    };
    Ok(ValueTuple::new(converted, Some(target), Some(target_def.group.as_str())))
}
