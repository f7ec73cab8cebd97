//! Observation-type registry
//!
//! The set of observation types a store knows about is fixed when the store
//! is opened and only grows or shrinks through explicit schema evolution.
//! Every type gets a dense [`ObsId`] that records use to index their values.

use crate::types::{ArchiveRecord, Interval, Record, Timestamp, UnitSystem};
use crate::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Dense identifier of an observation type within one [`ObsSchema`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObsId(u16);

impl ObsId {
    pub fn from_index(index: usize) -> Self {
        Self(index as u16)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Component columns of a vector (magnitude/direction) observation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorSpec {
    pub magnitude: String,
    pub direction: String,
    /// Column tracked for the daily high (gust); defaults to the magnitude
    #[serde(default)]
    pub peak: Option<String>,
    #[serde(default)]
    pub peak_dir: Option<String>,
}

/// Resolved ids of a vector type's component columns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorIds {
    pub magnitude: ObsId,
    pub direction: ObsId,
    pub peak: ObsId,
    pub peak_dir: ObsId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ObsKind {
    /// A plain archive column
    Scalar,
    /// Composed from scalar columns; has no archive column of its own
    Vector(VectorSpec),
}

impl ObsKind {
    pub fn is_vector(&self) -> bool {
        matches!(self, ObsKind::Vector(_))
    }

    pub fn label(&self) -> &'static str {
        if self.is_vector() {
            "vector"
        } else {
            "scalar"
        }
    }
}

#[derive(Debug, Clone)]
pub struct ObsDef {
    name: String,
    kind: ObsKind,
    vector: Option<VectorIds>,
    summarized: bool,
}

impl ObsDef {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &ObsKind {
        &self.kind
    }

    pub fn is_vector(&self) -> bool {
        self.vector.is_some()
    }

    pub fn vector_ids(&self) -> Option<VectorIds> {
        self.vector
    }

    /// Whether the type has a daily summary table
    pub fn is_summarized(&self) -> bool {
        self.summarized
    }
}

/// Registry of known observation types
#[derive(Debug, Clone, Default)]
pub struct ObsSchema {
    defs: Vec<ObsDef>,
    index: HashMap<String, ObsId>,
}

/// Archive columns of the standard WeeWX schema
pub const STANDARD_COLUMNS: &[&str] = &[
    "outTemp",
    "inTemp",
    "extraTemp1",
    "outHumidity",
    "inHumidity",
    "barometer",
    "pressure",
    "altimeter",
    "windSpeed",
    "windDir",
    "windGust",
    "windGustDir",
    "rain",
    "rainRate",
    "dewpoint",
    "windchill",
    "heatindex",
    "radiation",
    "UV",
    "rxCheckPercent",
];

/// Observation type names double as SQL identifiers, so keep them plain.
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    name.len() <= 64 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl ObsSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// The WeeWX archive columns plus the `wind` vector type
    pub fn standard() -> Self {
        let mut schema = Self::new();
        for column in STANDARD_COLUMNS {
            // Names are static and valid, ids are fresh
            let _ = schema.add(column, ObsKind::Scalar);
        }
        let _ = schema.add(
            "wind",
            ObsKind::Vector(VectorSpec {
                magnitude: "windSpeed".into(),
                direction: "windDir".into(),
                peak: Some("windGust".into()),
                peak_dir: Some("windGustDir".into()),
            }),
        );
        schema
    }

    /// Register a type, or re-enable the summary of a known one.
    ///
    /// Vector components must already be registered scalar types.
    pub fn add(&mut self, name: &str, kind: ObsKind) -> CoreResult<ObsId> {
        if !is_valid_name(name) {
            return Err(CoreError::InvalidName(name.to_string()));
        }
        if let Some(id) = self.id(name) {
            let def = &mut self.defs[id.index()];
            if def.kind.is_vector() != kind.is_vector() {
                return Err(CoreError::KindMismatch {
                    expected: def.kind.label(),
                    found: kind.label(),
                });
            }
            def.summarized = true;
            return Ok(id);
        }

        let vector = match &kind {
            ObsKind::Scalar => None,
            ObsKind::Vector(spec) => Some(self.resolve_vector(spec)?),
        };
        let id = ObsId::from_index(self.defs.len());
        self.defs.push(ObsDef {
            name: name.to_string(),
            kind,
            vector,
            summarized: true,
        });
        self.index.insert(name.to_string(), id);
        Ok(id)
    }

    fn resolve_vector(&self, spec: &VectorSpec) -> CoreResult<VectorIds> {
        let column = |name: &str| -> CoreResult<ObsId> {
            let id = self.lookup(name)?;
            if self.defs[id.index()].is_vector() {
                return Err(CoreError::KindMismatch {
                    expected: "scalar",
                    found: "vector",
                });
            }
            Ok(id)
        };
        let magnitude = column(&spec.magnitude)?;
        let direction = column(&spec.direction)?;
        let peak = match &spec.peak {
            Some(name) => column(name)?,
            None => magnitude,
        };
        let peak_dir = match &spec.peak_dir {
            Some(name) => column(name)?,
            None => direction,
        };
        Ok(VectorIds {
            magnitude,
            direction,
            peak,
            peak_dir,
        })
    }

    /// Stop summarizing a type. The id stays reserved so records keep their layout.
    pub fn unsummarize(&mut self, name: &str) -> CoreResult<ObsId> {
        let id = self.lookup(name)?;
        self.defs[id.index()].summarized = false;
        Ok(id)
    }

    pub fn id(&self, name: &str) -> Option<ObsId> {
        self.index.get(name).copied()
    }

    pub fn lookup(&self, name: &str) -> CoreResult<ObsId> {
        self.id(name)
            .ok_or_else(|| CoreError::UnknownType(name.to_string()))
    }

    pub fn def(&self, id: ObsId) -> &ObsDef {
        &self.defs[id.index()]
    }

    pub fn name(&self, id: ObsId) -> &str {
        &self.defs[id.index()].name
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObsId, &ObsDef)> {
        self.defs
            .iter()
            .enumerate()
            .map(|(idx, def)| (ObsId::from_index(idx), def))
    }

    /// Scalar types, i.e. the value columns of the archive table
    pub fn columns(&self) -> impl Iterator<Item = (ObsId, &ObsDef)> {
        self.iter().filter(|(_, def)| !def.is_vector())
    }

    pub fn summarized(&self) -> impl Iterator<Item = (ObsId, &ObsDef)> {
        self.iter().filter(|(_, def)| def.summarized)
    }

    /// Build a typed record from name/value pairs
    pub fn record(
        &self,
        date_time: Timestamp,
        unit_system: UnitSystem,
        interval: Interval,
        values: &[(&str, f64)],
    ) -> CoreResult<Record> {
        let mut record = Record::new(date_time, unit_system, interval);
        for (name, value) in values {
            record.set(self.scalar(name)?, Some(*value));
        }
        Ok(record)
    }

    /// Resolve a wire-format record; every named type must be a known column
    pub fn resolve(&self, raw: &ArchiveRecord) -> CoreResult<Record> {
        let unit_system = UnitSystem::try_from(raw.us_units)?;
        let mut record = Record::new(raw.date_time, unit_system, raw.interval);
        for (name, value) in &raw.values {
            record.set(self.scalar(name)?, *value);
        }
        Ok(record)
    }

    fn scalar(&self, name: &str) -> CoreResult<ObsId> {
        let id = self.lookup(name)?;
        if self.def(id).is_vector() {
            return Err(CoreError::KindMismatch {
                expected: "scalar",
                found: "vector",
            });
        }
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_standard_schema() {
        let schema = ObsSchema::standard();
        assert_eq!(schema.columns().count(), STANDARD_COLUMNS.len());
        assert_eq!(schema.summarized().count(), STANDARD_COLUMNS.len() + 1);

        let wind = schema.lookup("wind").unwrap();
        let ids = schema.def(wind).vector_ids().unwrap();
        assert_eq!(schema.name(ids.magnitude), "windSpeed");
        assert_eq!(schema.name(ids.peak_dir), "windGustDir");
    }

    #[test]
    fn test_name_validation() {
        assert!(is_valid_name("outTemp"));
        assert!(is_valid_name("_x1"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("1abc"));
        assert!(!is_valid_name("out Temp"));
        assert!(!is_valid_name("x\";DROP TABLE archive"));

        let mut schema = ObsSchema::new();
        assert!(matches!(
            schema.add("bad-name", ObsKind::Scalar),
            Err(CoreError::InvalidName(_))
        ));
    }

    #[test]
    fn test_add_and_unsummarize_keeps_ids() {
        let mut schema = ObsSchema::standard();
        let soil = schema.add("soilTemp1", ObsKind::Scalar).unwrap();
        assert_eq!(soil.index(), schema.len() - 1);

        schema.unsummarize("soilTemp1").unwrap();
        assert!(!schema.def(soil).is_summarized());
        assert_eq!(schema.lookup("soilTemp1").unwrap(), soil);

        // Re-adding re-enables under the same id
        assert_eq!(schema.add("soilTemp1", ObsKind::Scalar).unwrap(), soil);
        assert!(schema.def(soil).is_summarized());
    }

    #[test]
    fn test_kind_change_rejected() {
        let mut schema = ObsSchema::standard();
        let spec = VectorSpec {
            magnitude: "windSpeed".into(),
            direction: "windDir".into(),
            peak: None,
            peak_dir: None,
        };
        assert!(matches!(
            schema.add("outTemp", ObsKind::Vector(spec.clone())),
            Err(CoreError::KindMismatch { .. })
        ));

        let bad = VectorSpec {
            magnitude: "nope".into(),
            ..spec
        };
        assert!(matches!(
            schema.add("gusts", ObsKind::Vector(bad)),
            Err(CoreError::UnknownType(_))
        ));
    }

    #[test]
    fn test_resolve_archive_record() {
        let schema = ObsSchema::standard();
        let mut values = BTreeMap::new();
        values.insert("outTemp".to_string(), Some(12.5));
        values.insert("rain".to_string(), None);
        let raw = ArchiveRecord {
            date_time: 1709251500,
            interval: 300,
            us_units: 16,
            values,
        };

        let record = schema.resolve(&raw).unwrap();
        assert_eq!(record.unit_system, UnitSystem::Metric);
        assert_eq!(record.get(schema.lookup("outTemp").unwrap()), Some(12.5));
        assert_eq!(record.get(schema.lookup("rain").unwrap()), None);

        let mut unknown = raw.clone();
        unknown.values.insert("lightning".to_string(), Some(1.0));
        assert!(matches!(
            schema.resolve(&unknown),
            Err(CoreError::UnknownType(name)) if name == "lightning"
        ));
    }
}
