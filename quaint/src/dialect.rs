//! Pure, dialect-keyed functions: identifier quoting, JSON aggregate
//! function names, text/uuid casts, and substring-match rendering. Nothing
//! here touches a connection; it exists so the SQL executor and the
//! visitor agree on one place that knows what each backend calls things.

use crate::ast::SubstringMode;
use crate::error::DialectUnsupported;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    Mysql,
    Postgres,
    Sqlite,
}

impl Dialect {
    pub fn quote_identifier(self, ident: &str) -> String {
        match self {
            Dialect::Mysql => format!("`{}`", ident.replace('`', "``")),
            Dialect::Postgres | Dialect::Sqlite => format!("\"{}\"", ident.replace('"', "\"\"")),
        }
    }

    /// The function used to build a single JSON object out of alternating
    /// key/value arguments.
    pub fn json_object_fn(self) -> &'static str {
        match self {
            Dialect::Mysql => "JSON_OBJECT",
            Dialect::Postgres => "json_build_object",
            Dialect::Sqlite => "json_object",
        }
    }

    /// The aggregate function that folds one JSON value per group row into
    /// a JSON array.
    pub fn json_array_agg_fn(self) -> &'static str {
        match self {
            Dialect::Mysql => "JSON_ARRAYAGG",
            Dialect::Postgres => "json_agg",
            Dialect::Sqlite => "json_group_array",
        }
    }

    /// The literal used when a collection relation's aggregate would
    /// otherwise be SQL `NULL` because the join produced no rows.
    pub fn empty_json_array_literal(self) -> &'static str {
        "'[]'"
    }

    /// Casts `expr` to text for a cross-type comparison. Only postgres
    /// needs an explicit cast; mysql and sqlite coerce implicitly.
    pub fn cast_to_text(self, expr_sql: &str) -> String {
        match self {
            Dialect::Postgres => format!("({expr_sql})::text"),
            Dialect::Mysql => format!("CAST({expr_sql} AS CHAR)"),
            Dialect::Sqlite => expr_sql.to_string(),
        }
    }

    /// Casts `expr` to `uuid`, postgres-only. Applied per bound parameter,
    /// including each element of an `_in`/`_not_in` list individually,
    /// since the AST has no array-literal expression to cast as a whole.
    pub fn cast_to_uuid(self, expr_sql: &str) -> Result<String, DialectUnsupported> {
        match self {
            Dialect::Postgres => Ok(format!("({expr_sql})::uuid")),
            _ => Err(DialectUnsupported {
                dialect: self,
                operation: "uuid cast".to_string(),
            }),
        }
    }

    /// Renders a case/accent-insensitive substring predicate. `haystack_sql`
    /// and `needle_sql` are already-rendered (possibly parameterised)
    /// sub-expressions; this only wraps them.
    pub fn substring_predicate(self, haystack_sql: &str, mode: SubstringMode, needle_sql: &str) -> String {
        let pattern = |needle: &str| match mode {
            SubstringMode::Contains => format!("'%' || {needle} || '%'"),
            SubstringMode::StartsWith => format!("{needle} || '%'"),
            SubstringMode::EndsWith => format!("'%' || {needle}"),
        };

        match self {
            Dialect::Postgres => {
                let pat = pattern(needle_sql);
                format!("unaccent(lower({haystack_sql})) ILIKE unaccent(lower({pat}))")
            }
            Dialect::Mysql => {
                // CONCAT takes the place of `||`, and a CI/AI collation
                // stands in for `unaccent(lower(...))`.
                let pat = match mode {
                    SubstringMode::Contains => format!("CONCAT('%', {needle_sql}, '%')"),
                    SubstringMode::StartsWith => format!("CONCAT({needle_sql}, '%')"),
                    SubstringMode::EndsWith => format!("CONCAT('%', {needle_sql})"),
                };
                format!("LOWER({haystack_sql}) LIKE LOWER({pat}) COLLATE utf8mb4_general_ci")
            }
            Dialect::Sqlite => {
                let pat = pattern(needle_sql);
                format!("{haystack_sql} LIKE {pat} COLLATE NOCASE")
            }
        }
    }

    /// Whether this dialect supports `WITH … AS (…)` CTEs used by the join
    /// planner's page-pinning optimisation (mysql 8+ and postgres; sqlite
    /// technically supports CTEs too but the planner only opts in for the
    /// two dialects that benefit from pre-materialising the page).
    pub fn supports_cte_page_pinning(self) -> bool {
        matches!(self, Dialect::Mysql | Dialect::Postgres)
    }
}
