// SPDX-License-Identifier: GPL-3.0-only

//! Filter programs and the registry booths pick them from

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Id of the identity program
pub const IDENTITY_ID: &str = "normal";

/// A named visual effect
///
/// `pixel_expression` uses CSS filter function syntax, e.g.
/// `"sepia(50%) contrast(1.2)"`. See [`FilterChain`](super::FilterChain).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterProgram {
    pub id: String,
    pub display_name: String,
    pub pixel_expression: String,
}

impl FilterProgram {
    pub fn new(id: &str, display_name: &str, pixel_expression: &str) -> Self {
        Self {
            id: id.to_string(),
            display_name: display_name.to_string(),
            pixel_expression: pixel_expression.to_string(),
        }
    }

    /// The program that leaves frames untouched
    pub fn identity() -> Self {
        Self::new(IDENTITY_ID, "Normal", "none")
    }

    pub fn is_identity(&self) -> bool {
        self.id == IDENTITY_ID
    }
}

/// Built-in programs: (id, display name, expression), in display order
const BUILTIN_PROGRAMS: &[(&str, &str, &str)] = &[
    ("grayscale", "Black & White", "grayscale(100%)"),
    ("sepia", "Sepia", "sepia(100%)"),
    ("noir", "Noir", "grayscale(100%) contrast(1.6) brightness(0.9)"),
    ("vintage", "Vintage", "sepia(50%) contrast(1.2) brightness(0.9)"),
    ("vivid", "Vivid", "saturate(1.8) contrast(1.1)"),
    ("warm", "Warm", "sepia(30%) saturate(1.4) hue-rotate(-10deg)"),
    ("cool", "Cool", "saturate(0.9) hue-rotate(20deg) brightness(1.05)"),
    ("fade", "Fade", "contrast(0.8) brightness(1.1) saturate(0.7)"),
    ("invert", "Negative", "invert(100%)"),
];

/// Ordered, immutable lookup table of filter programs
///
/// Passed into the pipeline explicitly; nothing in the crate reads a global
/// registry. The identity program is always present and always first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterRegistry {
    programs: Vec<FilterProgram>,
}

impl FilterRegistry {
    /// Registry with the built-in booth filters
    pub fn builtin() -> Self {
        Self::with_programs(
            BUILTIN_PROGRAMS
                .iter()
                .map(|(id, name, expr)| FilterProgram::new(id, name, expr))
                .collect(),
        )
    }

    /// Registry from custom programs; an identity program is inserted first
    /// and duplicate ids keep their first occurrence
    pub fn with_programs(programs: Vec<FilterProgram>) -> Self {
        let mut seen = HashSet::new();
        let mut ordered = vec![FilterProgram::identity()];
        seen.insert(IDENTITY_ID.to_string());

        for program in programs {
            if seen.insert(program.id.clone()) {
                ordered.push(program);
            }
        }

        Self { programs: ordered }
    }

    /// Look up a program by id; unknown ids resolve to identity
    pub fn lookup(&self, id: &str) -> &FilterProgram {
        self.programs
            .iter()
            .find(|p| p.id == id)
            .unwrap_or(&self.programs[0])
    }

    /// Whether `id` names a registered program
    pub fn contains(&self, id: &str) -> bool {
        self.programs.iter().any(|p| p.id == id)
    }

    /// Identity first, then enabled programs in registry order
    pub fn list_available(&self, enabled_ids: &HashSet<String>) -> Vec<&FilterProgram> {
        self.programs
            .iter()
            .filter(|p| p.is_identity() || enabled_ids.contains(&p.id))
            .collect()
    }

    pub fn all(&self) -> &[FilterProgram] {
        &self.programs
    }
}

impl Default for FilterRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_id_resolves_to_identity() {
        let registry = FilterRegistry::builtin();
        assert!(registry.lookup("does-not-exist").is_identity());
        assert!(registry.lookup("").is_identity());
        assert_eq!(registry.lookup("sepia").pixel_expression, "sepia(100%)");
    }

    #[test]
    fn test_list_available_keeps_registry_order() {
        let registry = FilterRegistry::builtin();
        let enabled: HashSet<String> = ["invert", "grayscale", "unknown"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let ids: Vec<&str> = registry
            .list_available(&enabled)
            .iter()
            .map(|p| p.id.as_str())
            .collect();
        assert_eq!(ids, vec!["normal", "grayscale", "invert"]);
    }

    #[test]
    fn test_list_available_with_nothing_enabled() {
        let registry = FilterRegistry::builtin();
        let available = registry.list_available(&HashSet::new());
        assert_eq!(available.len(), 1);
        assert!(available[0].is_identity());
    }

    #[test]
    fn test_custom_registry_inserts_identity_once() {
        let registry = FilterRegistry::with_programs(vec![
            FilterProgram::new("a", "A", "invert(1)"),
            FilterProgram::identity(),
            FilterProgram::new("a", "Duplicate", "sepia(1)"),
        ]);
        let ids: Vec<&str> = registry.all().iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["normal", "a"]);
        assert_eq!(registry.lookup("a").display_name, "A");
    }
}
