//! Geographic levels and the parent/child hierarchy between units

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SeriesError};

/// Geographic resolution of a unit, coarsest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeoLevel {
    National,
    State,
    District,
    Pincode,
}

impl GeoLevel {
    /// Depth below the national level
    pub fn depth(self) -> u8 {
        match self {
            GeoLevel::National => 0,
            GeoLevel::State => 1,
            GeoLevel::District => 2,
            GeoLevel::Pincode => 3,
        }
    }

    /// True when `self` is a strictly finer resolution than `other`
    pub fn is_finer_than(self, other: GeoLevel) -> bool {
        self.depth() > other.depth()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GeoLevel::National => "national",
            GeoLevel::State => "state",
            GeoLevel::District => "district",
            GeoLevel::Pincode => "pincode",
        }
    }
}

impl fmt::Display for GeoLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One parent/child edge, the serialized form of a hierarchy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyLink {
    pub parent: String,
    pub parent_level: GeoLevel,
    pub child: String,
    pub child_level: GeoLevel,
}

/// Tree of geographic units.
///
/// Each unit has exactly one level and at most one parent. Units are plain
/// identifiers so the same name may not be reused across levels.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<HierarchyLink>", into = "Vec<HierarchyLink>")]
pub struct GeoHierarchy {
    levels: BTreeMap<String, GeoLevel>,
    parents: BTreeMap<String, String>,
    children: BTreeMap<String, BTreeSet<String>>,
}

impl GeoHierarchy {
    /// Create an empty hierarchy
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a hierarchy from a list of links, failing on the first conflict
    pub fn from_links<I>(links: I) -> Result<Self>
    where
        I: IntoIterator<Item = HierarchyLink>,
    {
        let mut hierarchy = Self::new();
        for link in links {
            hierarchy.link(link)?;
        }
        Ok(hierarchy)
    }

    /// Register a parent/child edge
    pub fn link(&mut self, link: HierarchyLink) -> Result<()> {
        if !link.child_level.is_finer_than(link.parent_level) {
            return Err(SeriesError::HierarchyConflict {
                unit: link.child,
                reason: format!(
                    "child level {} is not finer than parent level {}",
                    link.child_level, link.parent_level
                ),
            });
        }
        self.register_level(&link.parent, link.parent_level)?;
        self.register_level(&link.child, link.child_level)?;

        if let Some(existing) = self.parents.get(&link.child) {
            if existing != &link.parent {
                return Err(SeriesError::HierarchyConflict {
                    unit: link.child,
                    reason: format!("already a child of {}", existing),
                });
            }
            return Ok(());
        }

        self.parents.insert(link.child.clone(), link.parent.clone());
        self.children
            .entry(link.parent)
            .or_default()
            .insert(link.child);
        Ok(())
    }

    fn register_level(&mut self, unit: &str, level: GeoLevel) -> Result<()> {
        match self.levels.get(unit) {
            Some(existing) if *existing != level => Err(SeriesError::HierarchyConflict {
                unit: unit.to_string(),
                reason: format!("registered at level {}, not {}", existing, level),
            }),
            Some(_) => Ok(()),
            None => {
                self.levels.insert(unit.to_string(), level);
                Ok(())
            }
        }
    }

    pub fn level_of(&self, unit: &str) -> Option<GeoLevel> {
        self.levels.get(unit).copied()
    }

    pub fn parent_of(&self, unit: &str) -> Option<&str> {
        self.parents.get(unit).map(String::as_str)
    }

    /// Direct children of a unit, in name order
    pub fn children_of(&self, unit: &str) -> Vec<&str> {
        self.children
            .get(unit)
            .map(|set| set.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// All descendants of `unit` that sit at `level`, in name order
    pub fn descendants_at(&self, unit: &str, level: GeoLevel) -> Vec<&str> {
        let mut found = Vec::new();
        let mut stack = vec![unit];
        while let Some(current) = stack.pop() {
            for child in self.children_of(current) {
                match self.level_of(child) {
                    Some(l) if l == level => found.push(child),
                    Some(l) if level.is_finer_than(l) => stack.push(child),
                    _ => {}
                }
            }
        }
        found.sort_unstable();
        found
    }

    /// Units sharing the parent of `unit` at the same level, excluding `unit` itself.
    ///
    /// Returns `None` when the unit has no registered parent.
    pub fn siblings_of(&self, unit: &str) -> Option<Vec<&str>> {
        let parent = self.parent_of(unit)?;
        let level = self.level_of(unit)?;
        Some(
            self.children_of(parent)
                .into_iter()
                .filter(|c| *c != unit && self.level_of(c) == Some(level))
                .collect(),
        )
    }

    /// True when no unit has been registered
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Every edge, ordered by child name
    pub fn links(&self) -> Vec<HierarchyLink> {
        self.parents
            .iter()
            .filter_map(|(child, parent)| {
                Some(HierarchyLink {
                    parent: parent.clone(),
                    parent_level: self.level_of(parent)?,
                    child: child.clone(),
                    child_level: self.level_of(child)?,
                })
            })
            .collect()
    }
}

impl From<Vec<HierarchyLink>> for GeoHierarchy {
    /// Lenient conversion used by deserialization; conflicting links are dropped.
    fn from(links: Vec<HierarchyLink>) -> Self {
        let mut hierarchy = Self::new();
        for link in links {
            let _ = hierarchy.link(link);
        }
        hierarchy
    }
}

impl From<GeoHierarchy> for Vec<HierarchyLink> {
    fn from(hierarchy: GeoHierarchy) -> Self {
        hierarchy.links()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(parent: &str, pl: GeoLevel, child: &str, cl: GeoLevel) -> HierarchyLink {
        HierarchyLink {
            parent: parent.to_string(),
            parent_level: pl,
            child: child.to_string(),
            child_level: cl,
        }
    }

    fn sample() -> GeoHierarchy {
        GeoHierarchy::from_links(vec![
            link("IN", GeoLevel::National, "MH", GeoLevel::State),
            link("IN", GeoLevel::National, "KA", GeoLevel::State),
            link("MH", GeoLevel::State, "PUNE", GeoLevel::District),
            link("MH", GeoLevel::State, "NAGPUR", GeoLevel::District),
            link("KA", GeoLevel::State, "MYSURU", GeoLevel::District),
            link("PUNE", GeoLevel::District, "411001", GeoLevel::Pincode),
        ])
        .unwrap()
    }

    #[test]
    fn test_level_ordering() {
        assert!(GeoLevel::Pincode.is_finer_than(GeoLevel::District));
        assert!(GeoLevel::State.is_finer_than(GeoLevel::National));
        assert!(!GeoLevel::State.is_finer_than(GeoLevel::State));
        assert!(!GeoLevel::National.is_finer_than(GeoLevel::District));
    }

    #[test]
    fn test_descendants_skip_intermediate_levels() {
        let h = sample();
        assert_eq!(h.descendants_at("IN", GeoLevel::District), vec!["MYSURU", "NAGPUR", "PUNE"]);
        assert_eq!(h.descendants_at("MH", GeoLevel::Pincode), vec!["411001"]);
        assert!(h.descendants_at("KA", GeoLevel::Pincode).is_empty());
    }

    #[test]
    fn test_siblings_exclude_self() {
        let h = sample();
        assert_eq!(h.siblings_of("PUNE"), Some(vec!["NAGPUR"]));
        assert_eq!(h.siblings_of("IN"), None);
    }

    #[test]
    fn test_conflicting_parent_rejected() {
        let mut h = sample();
        let err = h
            .link(link("KA", GeoLevel::State, "PUNE", GeoLevel::District))
            .unwrap_err();
        assert!(matches!(err, SeriesError::HierarchyConflict { .. }));
    }

    #[test]
    fn test_child_must_be_finer() {
        let mut h = GeoHierarchy::new();
        let err = h
            .link(link("PUNE", GeoLevel::District, "MH", GeoLevel::State))
            .unwrap_err();
        assert!(matches!(err, SeriesError::HierarchyConflict { .. }));
    }

    #[test]
    fn test_serde_as_links() {
        let h = sample();
        let json = serde_json::to_string(&h).unwrap();
        let back: GeoHierarchy = serde_json::from_str(&json).unwrap();
        assert_eq!(back, h);
    }
}
