//! Renders the AST into dialect-specific, parameterised SQL text. The three
//! marker visitors below exist to give each backend its own entry point
//! (and placeholder syntax); the actual tree-walk is shared in
//! [`Renderer`], since every divergence between dialects already lives in
//! [`crate::dialect::Dialect`].
use crate::ast::*;
use crate::dialect::Dialect;

pub trait Visitor {
    fn dialect(&self) -> Dialect;

    /// Renders a full `SELECT`, returning the SQL text and the parameters
    /// bound to it in placeholder order.
    fn visit_select(&self, select: &Select) -> (String, Vec<Value>) {
        let mut renderer = Renderer::new(self.dialect());
        let sql = renderer.render_select(select);
        (sql, renderer.params)
    }

    fn visit_insert(&self, insert: &Insert) -> (String, Vec<Value>) {
        Renderer::new(self.dialect()).render_insert(insert)
    }

    fn visit_update(&self, update: &Update) -> (String, Vec<Value>) {
        let mut renderer = Renderer::new(self.dialect());
        let sql = renderer.render_update(update);
        (sql, renderer.params)
    }

    fn visit_delete(&self, delete: &Delete) -> (String, Vec<Value>) {
        let mut renderer = Renderer::new(self.dialect());
        let sql = renderer.render_delete(delete);
        (sql, renderer.params)
    }
}

pub struct MysqlVisitor;
impl Visitor for MysqlVisitor {
    fn dialect(&self) -> Dialect {
        Dialect::Mysql
    }
}

pub struct PostgresVisitor;
impl Visitor for PostgresVisitor {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }
}

pub struct SqliteVisitor;
impl Visitor for SqliteVisitor {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }
}

pub fn visitor_for(dialect: Dialect) -> Box<dyn Visitor> {
    match dialect {
        Dialect::Mysql => Box::new(MysqlVisitor),
        Dialect::Postgres => Box::new(PostgresVisitor),
        Dialect::Sqlite => Box::new(SqliteVisitor),
    }
}

struct Renderer {
    dialect: Dialect,
    params: Vec<Value>,
}

impl Renderer {
    fn new(dialect: Dialect) -> Self {
        Self { dialect, params: Vec::new() }
    }

    fn quote(&self, ident: &str) -> String {
        self.dialect.quote_identifier(ident)
    }

    fn placeholder(&self) -> String {
        match self.dialect {
            Dialect::Postgres => format!("${}", self.params.len()),
            Dialect::Mysql | Dialect::Sqlite => "?".to_string(),
        }
    }

    fn push_param(&mut self, value: Value) -> String {
        self.params.push(value);
        self.placeholder()
    }

    fn render_select(&mut self, select: &Select) -> String {
        let mut sql = String::new();

        if !select.ctes.is_empty() {
            let mut cte_parts = Vec::with_capacity(select.ctes.len());
            for cte in &select.ctes {
                let inner = self.render_select(&cte.select);
                cte_parts.push(format!("{} AS ({})", self.quote(&cte.name), inner));
            }
            sql.push_str("WITH ");
            sql.push_str(&cte_parts.join(", "));
            sql.push(' ');
        }

        sql.push_str("SELECT ");
        if select.distinct {
            sql.push_str("DISTINCT ");
        }

        if select.columns.is_empty() {
            sql.push('*');
        } else {
            let cols: Vec<String> = select
                .columns
                .iter()
                .map(|c| {
                    let rendered = self.render_expression(&c.expr);
                    match &c.alias {
                        Some(alias) => format!("{} AS {}", rendered, self.quote(alias)),
                        None => rendered,
                    }
                })
                .collect();
            sql.push_str(&cols.join(", "));
        }

        if let Some(from) = &select.from {
            sql.push_str(" FROM ");
            sql.push_str(&self.render_table_ref(from));
        }

        for join in &select.joins {
            let kind = match join.join_type {
                JoinType::Left => "LEFT JOIN",
                JoinType::Inner => "INNER JOIN",
            };
            sql.push_str(&format!(" {} {} ON {}", kind, self.render_table_ref(&join.table), self.render_condition(&join.on)));
        }

        if let Some(conditions) = &select.conditions {
            sql.push_str(" WHERE ");
            sql.push_str(&self.render_condition(conditions));
        }

        if !select.order_by.is_empty() {
            let parts: Vec<String> = select
                .order_by
                .iter()
                .map(|o| {
                    let dir = match o.direction {
                        Direction::Ascending => "ASC",
                        Direction::Descending => "DESC",
                    };
                    format!("{} {}", self.render_expression(&o.expr), dir)
                })
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&parts.join(", "));
        }

        if let Some(limit) = select.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = select.offset {
            sql.push_str(&format!(" OFFSET {offset}"));
        }

        sql
    }

    fn render_table_ref(&self, table: &TableRef) -> String {
        match &table.alias {
            Some(alias) => format!("{} AS {}", self.quote(&table.name), self.quote(alias)),
            None => self.quote(&table.name),
        }
    }

    fn render_expression(&mut self, expr: &Expression) -> String {
        match expr {
            Expression::Column(c) => match &c.table {
                Some(t) => format!("{}.{}", self.quote(t), self.quote(&c.name)),
                None => self.quote(&c.name),
            },
            Expression::Value(v) => self.render_value(v),
            Expression::Function(f) => self.render_function(f),
            Expression::Row(items) => {
                let rendered: Vec<String> = items.iter().map(|e| self.render_expression(e)).collect();
                format!("({})", rendered.join(", "))
            }
            Expression::Subquery(select) => format!("({})", self.render_select(select)),
            Expression::Raw(sql) => sql.clone(),
            Expression::Asterisk => "*".to_string(),
        }
    }

    fn render_value(&mut self, value: &Value) -> String {
        if matches!(value, Value::Null) {
            return "NULL".to_string();
        }
        self.push_param(value.clone())
    }

    fn render_function(&mut self, function: &Function) -> String {
        match function {
            Function::Count(None) => "COUNT(*)".to_string(),
            Function::Count(Some(e)) => format!("COUNT({})", self.render_expression(e)),
            Function::CountDistinct(e) => format!("COUNT(DISTINCT {})", self.render_expression(e)),
            Function::Sum(e) => format!("SUM({})", self.render_expression(e)),
            Function::Avg(e) => format!("AVG({})", self.render_expression(e)),
            Function::Min(e) => format!("MIN({})", self.render_expression(e)),
            Function::Max(e) => format!("MAX({})", self.render_expression(e)),
            Function::Coalesce(items) => {
                let rendered: Vec<String> = items.iter().map(|e| self.render_expression(e)).collect();
                format!("COALESCE({})", rendered.join(", "))
            }
            Function::JsonObject(pairs) => {
                let fn_name = self.dialect.json_object_fn();
                let mut parts = Vec::with_capacity(pairs.len() * 2);
                for (key, value) in pairs {
                    parts.push(format!("'{key}'"));
                    parts.push(self.render_expression(value));
                }
                format!("{fn_name}({})", parts.join(", "))
            }
            Function::JsonArrayAgg(inner) => {
                let fn_name = self.dialect.json_array_agg_fn();
                format!("{fn_name}({})", self.render_expression(inner))
            }
            Function::CastToText(inner) => {
                let rendered = self.render_expression(inner);
                self.dialect.cast_to_text(&rendered)
            }
            Function::CastToUuid(inner) => {
                let rendered = self.render_expression(inner);
                self.dialect.cast_to_uuid(&rendered).unwrap_or(rendered)
            }
        }
    }

    fn render_condition(&mut self, tree: &ConditionTree) -> String {
        match tree {
            ConditionTree::And(parts) => {
                if parts.is_empty() {
                    return "1=1".to_string();
                }
                let rendered: Vec<String> = parts.iter().map(|p| self.render_condition(p)).collect();
                format!("({})", rendered.join(" AND "))
            }
            ConditionTree::Or(parts) => {
                if parts.is_empty() {
                    return "1=0".to_string();
                }
                let rendered: Vec<String> = parts.iter().map(|p| self.render_condition(p)).collect();
                format!("({})", rendered.join(" OR "))
            }
            ConditionTree::Not(inner) => format!("NOT ({})", self.render_condition(inner)),
            ConditionTree::ConstTrue => "1=1".to_string(),
            ConditionTree::ConstFalse => "1=0".to_string(),
            ConditionTree::Exists(select) => format!("EXISTS ({})", self.render_select(select)),
            ConditionTree::NotExists(select) => format!("NOT EXISTS ({})", self.render_select(select)),
            ConditionTree::ScalarCompare { subquery, op, value } => {
                let lhs = format!("({})", self.render_select(subquery));
                let rhs = self.render_expression(value);
                format!("{} {} {}", lhs, self.render_compare_op(*op), rhs)
            }
            ConditionTree::Compare(compare) => self.render_compare(compare),
        }
    }

    fn render_compare_op(&self, op: CompareOp) -> &'static str {
        match op {
            CompareOp::Eq => "=",
            CompareOp::Neq => "<>",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
        }
    }

    fn render_compare(&mut self, compare: &Compare) -> String {
        match compare {
            Compare::Equals(l, r) => format!("{} = {}", self.render_expression(l), self.render_expression(r)),
            Compare::NotEquals(l, r) => format!("{} <> {}", self.render_expression(l), self.render_expression(r)),
            Compare::GreaterThan(l, r) => format!("{} > {}", self.render_expression(l), self.render_expression(r)),
            Compare::GreaterThanOrEquals(l, r) => {
                format!("{} >= {}", self.render_expression(l), self.render_expression(r))
            }
            Compare::LessThan(l, r) => format!("{} < {}", self.render_expression(l), self.render_expression(r)),
            Compare::LessThanOrEquals(l, r) => {
                format!("{} <= {}", self.render_expression(l), self.render_expression(r))
            }
            Compare::In(l, values) => {
                if values.is_empty() {
                    return "1=0".to_string();
                }
                let lhs = self.render_expression(l);
                let rendered: Vec<String> = values.iter().map(|v| self.render_expression(v)).collect();
                format!("{} IN ({})", lhs, rendered.join(", "))
            }
            Compare::NotIn(l, values) => {
                if values.is_empty() {
                    return "1=1".to_string();
                }
                let lhs = self.render_expression(l);
                let rendered: Vec<String> = values.iter().map(|v| self.render_expression(v)).collect();
                format!("{} NOT IN ({})", lhs, rendered.join(", "))
            }
            Compare::InSelect(l, select) => {
                format!("{} IN ({})", self.render_expression(l), self.render_select(select))
            }
            Compare::NotInSelect(l, select) => {
                format!("{} NOT IN ({})", self.render_expression(l), self.render_select(select))
            }
            Compare::Between(e, lo, hi) => format!(
                "{} BETWEEN {} AND {}",
                self.render_expression(e),
                self.render_expression(lo),
                self.render_expression(hi)
            ),
            Compare::Substring { haystack, mode, needle } => {
                let haystack_sql = self.render_expression(haystack);
                let needle_sql = self.render_expression(needle);
                self.dialect.substring_predicate(&haystack_sql, *mode, &needle_sql)
            }
            Compare::IsNull(e) => format!("{} IS NULL", self.render_expression(e)),
            Compare::IsNotNull(e) => format!("{} IS NOT NULL", self.render_expression(e)),
        }
    }

    fn render_insert(&mut self, insert: &Insert) -> (String, Vec<Value>) {
        let table = self.render_table_ref(&insert.table);
        let columns: Vec<String> = insert.columns.iter().map(|c| self.quote(c)).collect();
        let placeholders: Vec<String> = insert.values.iter().map(|v| self.render_value(v)).collect();
        let sql = format!("INSERT INTO {table} ({}) VALUES ({})", columns.join(", "), placeholders.join(", "));
        (sql, self.params.clone())
    }

    fn render_update(&mut self, update: &Update) -> String {
        let table = self.render_table_ref(&update.table);
        let assignments: Vec<String> = update
            .assignments
            .iter()
            .map(|(col, value)| format!("{} = {}", self.quote(col), self.render_value(value)))
            .collect();
        let mut sql = format!("UPDATE {table} SET {}", assignments.join(", "));
        if let Some(conditions) = &update.conditions {
            sql.push_str(" WHERE ");
            sql.push_str(&self.render_condition(conditions));
        }
        sql
    }

    fn render_delete(&mut self, delete: &Delete) -> String {
        let table = self.render_table_ref(&delete.table);
        let mut sql = format!("DELETE FROM {table}");
        if let Some(conditions) = &delete.conditions {
            sql.push_str(" WHERE ");
            sql.push_str(&self.render_condition(conditions));
        }
        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(table: &str, name: &str) -> Expression {
        Expression::Column(ColumnRef::new(table, name))
    }

    #[test]
    fn simple_equality_binds_one_param() {
        let select = Select::from_table(TableRef::aliased("user", "u"))
            .column(col("u", "id"), None)
            .and_where(ConditionTree::Compare(Compare::Equals(col("u", "id"), Expression::Value(Value::Int32(1)))));

        let (sql, params) = MysqlVisitor.visit_select(&select);
        assert_eq!(sql, "SELECT `u`.`id` FROM `user` AS `u` WHERE `u`.`id` = ?");
        assert_eq!(params, vec![Value::Int32(1)]);
    }

    #[test]
    fn postgres_placeholders_increment() {
        let select = Select::from_table(TableRef::new("user")).and_where(ConditionTree::And(vec![
            ConditionTree::Compare(Compare::Equals(col("user", "id"), Expression::Value(Value::Int32(1)))),
            ConditionTree::Compare(Compare::Equals(col("user", "name"), Expression::Value(Value::text("a")))),
        ]));

        let (sql, params) = PostgresVisitor.visit_select(&select);
        assert!(sql.contains("$1"), "sql: {sql}");
        assert!(sql.contains("$2"), "sql: {sql}");
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn empty_in_collapses_to_false() {
        let compare = Compare::In(col("t", "id"), vec![]);
        let mut renderer = Renderer::new(Dialect::Sqlite);
        assert_eq!(renderer.render_compare(&compare), "1=0");
    }

    #[test]
    fn empty_not_in_collapses_to_true() {
        let compare = Compare::NotIn(col("t", "id"), vec![]);
        let mut renderer = Renderer::new(Dialect::Sqlite);
        assert_eq!(renderer.render_compare(&compare), "1=1");
    }

    #[test]
    fn json_arrayagg_uses_mysql_name() {
        let expr = Expression::Function(Function::JsonArrayAgg(Box::new(Expression::Function(Function::JsonObject(
            vec![("id".to_string(), col("c", "id"))],
        )))));
        let mut renderer = Renderer::new(Dialect::Mysql);
        let sql = renderer.render_expression(&expr);
        assert_eq!(sql, "JSON_ARRAYAGG(JSON_OBJECT('id', `c`.`id`))");
    }

    #[test]
    fn json_agg_uses_postgres_name() {
        let expr = Expression::Function(Function::JsonArrayAgg(Box::new(Expression::Function(Function::JsonObject(
            vec![("id".to_string(), col("c", "id"))],
        )))));
        let mut renderer = Renderer::new(Dialect::Postgres);
        let sql = renderer.render_expression(&expr);
        assert_eq!(sql, "json_agg(json_build_object('id', \"c\".\"id\"))");
    }

    #[test]
    fn count_distinct_renders_the_distinct_keyword() {
        let expr = Expression::Function(Function::CountDistinct(Box::new(col("u", "id"))));
        let mut renderer = Renderer::new(Dialect::Postgres);
        assert_eq!(renderer.render_expression(&expr), "COUNT(DISTINCT \"u\".\"id\")");
    }

    #[test]
    fn substring_predicate_differs_per_dialect() {
        assert_eq!(
            Dialect::Postgres.substring_predicate("t.name", SubstringMode::Contains, "$1"),
            "unaccent(lower(t.name)) ILIKE unaccent(lower('%' || $1 || '%'))"
        );
        assert_eq!(
            Dialect::Mysql.substring_predicate("t.name", SubstringMode::Contains, "?"),
            "LOWER(t.name) LIKE LOWER(CONCAT('%', ?, '%')) COLLATE utf8mb4_general_ci"
        );
        assert_eq!(
            Dialect::Sqlite.substring_predicate("t.name", SubstringMode::Contains, "?"),
            "t.name LIKE '%' || ? || '%' COLLATE NOCASE"
        );
    }

    #[test]
    fn subquery_expression_renders_parenthesised_in_column_list() {
        let inner = Select::from_table(TableRef::aliased("post", "c"))
            .column(
                Expression::Function(Function::JsonObject(vec![("id".to_string(), col("c", "id"))])),
                None,
            )
            .and_where(ConditionTree::Compare(Compare::Equals(col("c", "authorId"), col("u", "id"))))
            .limit(1);
        let outer = Select::from_table(TableRef::aliased("user", "u"))
            .column(Expression::Subquery(Box::new(inner)), Some("author"));
        let (sql, _) = MysqlVisitor.visit_select(&outer);
        assert!(sql.starts_with("SELECT (SELECT JSON_OBJECT('id', `c`.`id`) FROM `post` AS `c`"), "sql: {sql}");
        assert!(sql.ends_with("AS `author`"), "sql: {sql}");
    }

    #[test]
    fn exists_subquery_renders_correlated_where() {
        let inner = Select::from_table(TableRef::aliased("post", "c")).and_where(ConditionTree::Compare(
            Compare::Equals(col("c", "userId"), col("u", "id")),
        ));
        let outer = Select::from_table(TableRef::aliased("user", "u")).and_where(ConditionTree::Exists(Box::new(inner)));
        let (sql, _) = MysqlVisitor.visit_select(&outer);
        assert!(sql.contains("EXISTS (SELECT * FROM `post` AS `c` WHERE `c`.`userId` = `u`.`id`)"), "sql: {sql}");
    }
}
