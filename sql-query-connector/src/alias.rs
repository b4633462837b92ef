//! Two independent alias schemes, because the planner uses joins and
//! correlated subqueries for different purposes:
//!
//! - [`JoinAliasAllocator`] names tables that get joined into the *main*
//!   row stream (owner-side relations needed only for filter/sort). These
//!   share one `FROM` scope with the root, so their aliases must be
//!   globally collision-free: `<root>_<prop1>_<prop2>_…`.
//! - [`SubqueryAliasAllocator`] names the target table of a correlated
//!   subquery built for projection (reference/scalar/aggregate). Each
//!   subquery opens its own scope, so aliases only need to be
//!   collision-free *within one nesting chain*: `c`, `c1`, `c2`, … by
//!   depth, and `j_<prop>_<depth>` for a many-to-many junction.

/// Allocates aliases for relations joined into the outer `FROM` clause.
#[derive(Debug, Clone)]
pub struct JoinAliasAllocator {
    root: String,
}

impl JoinAliasAllocator {
    pub fn new(root_alias: impl Into<String>) -> Self {
        Self { root: root_alias.into() }
    }

    /// The alias for the table reached by following `path` (a sequence of
    /// relation property names) from the root.
    pub fn alias_for(&self, path: &[String]) -> String {
        if path.is_empty() {
            return self.root.clone();
        }
        format!("{}_{}", self.root, path.join("_"))
    }
}

/// Allocates aliases inside one correlated-subquery nesting chain.
#[derive(Debug, Clone, Default)]
pub struct SubqueryAliasAllocator {
    depth: usize,
}

impl SubqueryAliasAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// The alias for the relation target at the current depth, then
    /// advances to the next depth.
    pub fn next_table_alias(&mut self) -> String {
        let alias = if self.depth == 0 { "c".to_string() } else { format!("c{}", self.depth) };
        self.depth += 1;
        alias
    }

    pub fn junction_alias(&self, property_name: &str, depth: usize) -> String {
        format!("j_{property_name}_{depth}")
    }

    pub fn depth(&self) -> usize {
        self.depth
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_alias_concatenates_path() {
        let alloc = JoinAliasAllocator::new("user");
        assert_eq!(alloc.alias_for(&[]), "user");
        assert_eq!(alloc.alias_for(&["posts".to_string()]), "user_posts");
        assert_eq!(
            alloc.alias_for(&["posts".to_string(), "author".to_string()]),
            "user_posts_author"
        );
    }

    #[test]
    fn subquery_alias_increments_by_depth() {
        let mut alloc = SubqueryAliasAllocator::new();
        assert_eq!(alloc.next_table_alias(), "c");
        assert_eq!(alloc.next_table_alias(), "c1");
        assert_eq!(alloc.next_table_alias(), "c2");
    }
}
