// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Bundled resources addressed by category and index.

use std::{fmt, str::FromStr};

/// A category of bundled samples.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuiltinCategory {
    Moderate,
}

/// Every bundled category with the number of resources it holds.
pub const BUILTIN_TABLE: &[(BuiltinCategory, usize)] = &[(BuiltinCategory::Moderate, 88)];

impl BuiltinCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            BuiltinCategory::Moderate => "moderate",
        }
    }

    /// Number of resources bundled for this category.
    pub fn count(self) -> usize {
        BUILTIN_TABLE
            .iter()
            .find(|(category, _)| *category == self)
            .map(|(_, len)| *len)
            .unwrap_or(0)
    }
}

impl FromStr for BuiltinCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "moderate" => Ok(BuiltinCategory::Moderate),
            _ => Err(format!("unknown builtin category {}", s)),
        }
    }
}

/// A reference to one bundled resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResourceRef {
    category: BuiltinCategory,
    index: usize,
}

impl ResourceRef {
    /// Looks up a resource, returning None for an unknown category or an index
    /// outside the table.
    pub fn lookup(category: &str, index: i64) -> Option<ResourceRef> {
        let category = BuiltinCategory::from_str(category).ok()?;
        let index = usize::try_from(index).ok()?;
        if index >= category.count() {
            return None;
        }
        Some(ResourceRef { category, index })
    }

    pub fn category(&self) -> BuiltinCategory {
        self.category
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// The resource name, e.g. `moderate_1` for index 0.
    pub fn name(&self) -> String {
        format!("{}_{}", self.category.as_str(), self.index + 1)
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Lists every bundled resource in table order.
pub fn all_resources() -> impl Iterator<Item = ResourceRef> {
    BUILTIN_TABLE.iter().flat_map(|(category, len)| {
        (0..*len).map(move |index| ResourceRef {
            category: *category,
            index,
        })
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_lookup() {
        let first = ResourceRef::lookup("moderate", 0).expect("first resource");
        assert_eq!(first.name(), "moderate_1");
        let last = ResourceRef::lookup("moderate", 87).expect("last resource");
        assert_eq!(last.name(), "moderate_88");
    }

    #[test]
    fn test_lookup_out_of_range() {
        assert!(ResourceRef::lookup("moderate", 88).is_none());
        assert!(ResourceRef::lookup("moderate", -1).is_none());
        assert!(ResourceRef::lookup("short", 0).is_none());
    }

    #[test]
    fn test_all_resources() {
        let all: Vec<ResourceRef> = all_resources().collect();
        assert_eq!(all.len(), 88);
        assert_eq!(all[10].name(), "moderate_11");
    }
}
