//! Groups a flat list of requested field paths (`"posts.author.name"`) into
//! a tree keyed by first segment, the shape both the SQL planner and the
//! Mongo pipeline builder recurse over (spec §4.4 step 1). `"*"` at a level
//! means "all scalar columns at this level"; nested relation groups are
//! built lazily only for paths that actually reference them
//! (explicit-expansion-only, per the design notes on the cyclic metadata
//! graph). Shared across backends so the two connectors can never disagree
//! on what a requested field path means.

use std::collections::BTreeMap;

use indexmap::IndexSet;

#[derive(Debug, Clone, Default)]
pub struct FieldGroups {
    pub wildcard: bool,
    pub scalars: IndexSet<String>,
    pub children: BTreeMap<String, FieldGroups>,
}

impl FieldGroups {
    pub fn from_paths(paths: &IndexSet<String>) -> FieldGroups {
        let mut root = FieldGroups::default();
        for path in paths {
            root.insert_path(path.split('.'));
        }
        root
    }

    fn insert_path<'a>(&mut self, mut segments: impl Iterator<Item = &'a str>) {
        let Some(first) = segments.next() else { return };
        match first {
            "*" => self.wildcard = true,
            other => {
                let rest: Vec<&str> = segments.collect();
                if rest.is_empty() {
                    self.scalars.insert(other.to_string());
                } else {
                    self.children.entry(other.to_string()).or_default().insert_path(rest.into_iter());
                }
            }
        }
    }

    pub fn requests(&self, relation_or_field: &str) -> bool {
        self.wildcard || self.scalars.contains(relation_or_field) || self.children.contains_key(relation_or_field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_nested_paths_by_first_segment() {
        let paths: IndexSet<String> = ["id", "name", "posts.id", "posts.published"].iter().map(|s| s.to_string()).collect();
        let groups = FieldGroups::from_paths(&paths);
        assert!(groups.scalars.contains("id"));
        assert!(groups.scalars.contains("name"));
        let posts = &groups.children["posts"];
        assert!(posts.scalars.contains("id"));
        assert!(posts.scalars.contains("published"));
    }

    #[test]
    fn wildcard_sets_flag_without_a_literal_field() {
        let paths: IndexSet<String> = ["*".to_string()].into_iter().collect();
        let groups = FieldGroups::from_paths(&paths);
        assert!(groups.wildcard);
        assert!(groups.scalars.is_empty());
    }
}
