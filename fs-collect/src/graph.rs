//! Precomputed relations between compiled units.
//!
//! The graph is produced when the units are packaged and shipped next to
//! them as a JSON manifest, so collecting never has to inspect bytecode.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use data_error::Result;

use crate::marker::DependencyMarker;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnitInfo {
    pub name: String,
    /// Origin tag; units sharing it come from the same physical source.
    pub module: Option<String>,
    /// Superclass and implemented interfaces.
    pub supertypes: Vec<String>,
    pub enclosing: Option<String>,
    pub nested: Vec<String>,
    pub field_types: Vec<String>,
    /// Provided by the runtime itself, never shipped.
    pub platform: bool,
    pub marker: Option<DependencyMarker>,
}

impl UnitInfo {
    pub fn new(name: impl Into<String>) -> Self {
        UnitInfo {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn in_module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    pub fn extends(mut self, supertype: impl Into<String>) -> Self {
        self.supertypes.push(supertype.into());
        self
    }

    pub fn enclosed_by(mut self, enclosing: impl Into<String>) -> Self {
        self.enclosing = Some(enclosing.into());
        self
    }

    pub fn with_nested(mut self, nested: impl Into<String>) -> Self {
        self.nested.push(nested.into());
        self
    }

    pub fn with_field(mut self, field_type: impl Into<String>) -> Self {
        self.field_types.push(field_type.into());
        self
    }

    pub fn platform(mut self) -> Self {
        self.platform = true;
        self
    }

    pub fn with_marker(mut self, marker: DependencyMarker) -> Self {
        self.marker = Some(marker);
        self
    }
}

#[derive(Serialize, Deserialize)]
struct Manifest {
    units: Vec<UnitInfo>,
}

#[derive(Clone, Debug, Default)]
pub struct UnitGraph {
    units: HashMap<String, UnitInfo>,
}

impl UnitGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let manifest: Manifest = serde_json::from_str(json)?;
        let mut graph = UnitGraph::new();
        for unit in manifest.units {
            graph.insert(unit);
        }
        Ok(graph)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        let graph = Self::from_json(&json)?;
        log::debug!(
            "graph: loaded {} units from {}",
            graph.len(),
            path.display()
        );
        Ok(graph)
    }

    pub fn to_json(&self) -> Result<String> {
        let mut units: Vec<UnitInfo> = self.units.values().cloned().collect();
        units.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(serde_json::to_string_pretty(&Manifest { units })?)
    }

    pub fn insert(&mut self, unit: UnitInfo) {
        self.units.insert(unit.name.clone(), unit);
    }

    pub fn get(&self, name: &str) -> Option<&UnitInfo> {
        self.units.get(name)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn marker_of(&self, name: &str) -> Option<&DependencyMarker> {
        self.get(name).and_then(|unit| unit.marker.as_ref())
    }

    pub fn module_of(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|unit| unit.module.as_deref())
    }

    /// Unknown units are assumed to belong to the runtime.
    pub fn is_platform(&self, name: &str) -> bool {
        self.get(name).map_or(true, |unit| unit.platform)
    }

    pub fn same_origin(&self, a: &str, b: &str) -> bool {
        self.module_of(a) == self.module_of(b)
    }

    /// Whether `other` is assignable from `current`, or from any unit
    /// enclosing `current`.
    pub fn depends_on(&self, current: &str, other: &str) -> bool {
        let mut seen = HashSet::new();
        let mut next = Some(current);
        while let Some(unit) = next {
            if !seen.insert(unit) {
                return false;
            }
            if self.is_assignable(unit, other) {
                return true;
            }
            next = self.get(unit).and_then(|info| info.enclosing.as_deref());
        }
        false
    }

    fn is_assignable(&self, from: &str, to: &str) -> bool {
        if from == to {
            return true;
        }
        let mut seen = HashSet::new();
        let mut stack = vec![from];
        while let Some(unit) = stack.pop() {
            if !seen.insert(unit) {
                continue;
            }
            if let Some(info) = self.get(unit) {
                for supertype in &info.supertypes {
                    if supertype == to {
                        return true;
                    }
                    stack.push(supertype);
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> UnitGraph {
        let mut graph = UnitGraph::new();
        graph.insert(UnitInfo::new("a.Base").in_module("app"));
        graph.insert(UnitInfo::new("a.Mid").in_module("app").extends("a.Base"));
        graph.insert(
            UnitInfo::new("a.Leaf")
                .in_module("app")
                .extends("a.Mid")
                .with_nested("a.Leaf$Inner"),
        );
        graph.insert(
            UnitInfo::new("a.Leaf$Inner")
                .in_module("app")
                .enclosed_by("a.Leaf"),
        );
        graph.insert(UnitInfo::new("java.lang.Object").platform());
        graph
    }

    #[test]
    fn assignability_is_transitive() {
        let graph = sample();
        assert!(graph.depends_on("a.Leaf", "a.Base"));
        assert!(graph.depends_on("a.Mid", "a.Base"));
        assert!(!graph.depends_on("a.Base", "a.Leaf"));
    }

    #[test]
    fn nested_units_follow_their_enclosing_unit() {
        let graph = sample();
        assert!(graph.depends_on("a.Leaf$Inner", "a.Leaf"));
        assert!(graph.depends_on("a.Leaf$Inner", "a.Base"));
        assert!(!graph.depends_on("a.Leaf", "a.Leaf$Inner"));
    }

    #[test]
    fn cycles_in_a_broken_manifest_terminate() {
        let mut graph = UnitGraph::new();
        graph.insert(UnitInfo::new("A").extends("B").enclosed_by("B"));
        graph.insert(UnitInfo::new("B").extends("A").enclosed_by("A"));
        assert!(graph.depends_on("A", "B"));
        assert!(!graph.depends_on("A", "C"));
    }

    #[test]
    fn unknown_units_are_platform() {
        let graph = sample();
        assert!(graph.is_platform("java.lang.Object"));
        assert!(graph.is_platform("x.Unknown"));
        assert!(!graph.is_platform("a.Base"));
        assert!(graph.same_origin("a.Base", "a.Leaf"));
    }

    #[test]
    fn manifest_survives_json() {
        let json = r#"{
            "units": [
                { "name": "a.Foo", "module": "app",
                  "marker": { "files": ["data.txt"] } },
                { "name": "a.Bar", "supertypes": ["a.Foo"],
                  "marker": { "provider": "bar-files" } }
            ]
        }"#;
        let graph = UnitGraph::from_json(json).unwrap();
        assert_eq!(graph.len(), 2);
        assert_eq!(
            graph.marker_of("a.Foo"),
            Some(&DependencyMarker::Files(vec!["data.txt".to_owned()]))
        );
        assert_eq!(
            graph.marker_of("a.Bar"),
            Some(&DependencyMarker::Provider("bar-files".to_owned()))
        );
        assert!(graph.depends_on("a.Bar", "a.Foo"));

        let again = UnitGraph::from_json(&graph.to_json().unwrap()).unwrap();
        assert_eq!(again.get("a.Bar"), graph.get("a.Bar"));
    }
}
