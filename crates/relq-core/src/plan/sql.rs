//! SQL text rendering for translated statements.
//!
//! Statements execute as structured IR; the rendered text exists for
//! diagnostics, logging, and stores that do speak SQL. Literals become
//! `?` placeholders with positional parameters.

use relq_ir::{
    FilterExpr, NullOrder, Operand, OrderDirection, ScalarExpr, SelectStatement, Value,
};

/// Render a select statement as SQL text plus positional parameters.
pub fn render(stmt: &SelectStatement) -> (String, Vec<Value>) {
    let mut sql = String::from("SELECT ");
    let mut params = Vec::new();

    let projection = stmt
        .projection
        .iter()
        .map(|p| p.expr.label())
        .collect::<Vec<_>>()
        .join(", ");
    sql.push_str(&projection);

    sql.push_str(" FROM ");
    let sources = stmt
        .sources
        .iter()
        .map(|s| format!("{} AS {}", s.entity, s.alias))
        .collect::<Vec<_>>()
        .join(", ");
    sql.push_str(&sources);

    for join in &stmt.joins {
        sql.push_str(&format!(
            " INNER JOIN {} AS {} ON {} = {}",
            join.entity,
            join.alias,
            join.left.qualified(),
            join.right.qualified()
        ));
    }

    if let Some(filter) = &stmt.filter {
        sql.push_str(" WHERE ");
        render_filter(filter, &mut sql, &mut params);
    }

    if !stmt.group_by.is_empty() {
        sql.push_str(" GROUP BY ");
        let keys = stmt
            .group_by
            .iter()
            .map(|c| c.qualified())
            .collect::<Vec<_>>()
            .join(", ");
        sql.push_str(&keys);
    }

    if let Some(having) = &stmt.having {
        sql.push_str(" HAVING ");
        render_filter(having, &mut sql, &mut params);
    }

    if !stmt.order_by.is_empty() {
        sql.push_str(" ORDER BY ");
        let keys = stmt
            .order_by
            .iter()
            .map(|o| {
                format!(
                    "{} {} {}",
                    o.column.qualified(),
                    match o.direction {
                        OrderDirection::Asc => "ASC",
                        OrderDirection::Desc => "DESC",
                    },
                    match o.nulls {
                        NullOrder::First => "NULLS FIRST",
                        NullOrder::Last => "NULLS LAST",
                    }
                )
            })
            .collect::<Vec<_>>()
            .join(", ");
        sql.push_str(&keys);
    }

    if let Some(limit) = stmt.limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }
    if let Some(offset) = stmt.offset {
        sql.push_str(&format!(" OFFSET {offset}"));
    }

    (sql, params)
}

fn render_filter(expr: &FilterExpr, sql: &mut String, params: &mut Vec<Value>) {
    match expr {
        FilterExpr::Compare { lhs, op, rhs } => {
            render_scalar(lhs, sql);
            sql.push(' ');
            sql.push_str(op.symbol());
            sql.push(' ');
            match rhs {
                Operand::Value(v) => {
                    sql.push('?');
                    params.push(v.clone());
                }
                Operand::Column(col) => sql.push_str(&col.qualified()),
            }
        }
        FilterExpr::Between { column, low, high } => {
            sql.push_str(&column.qualified());
            sql.push_str(" BETWEEN ? AND ?");
            params.push(low.clone());
            params.push(high.clone());
        }
        FilterExpr::In {
            column,
            values,
            negated,
        } => {
            sql.push_str(&column.qualified());
            sql.push_str(if *negated { " NOT IN (" } else { " IN (" });
            for (i, v) in values.iter().enumerate() {
                if i > 0 {
                    sql.push_str(", ");
                }
                sql.push('?');
                params.push(v.clone());
            }
            sql.push(')');
        }
        FilterExpr::IsNull { column, negated } => {
            sql.push_str(&column.qualified());
            sql.push_str(if *negated {
                " IS NOT NULL"
            } else {
                " IS NULL"
            });
        }
        FilterExpr::Like { column, pattern } => {
            sql.push_str(&column.qualified());
            // Patterns use `\` to escape wildcards; ANSI has no default
            // escape character, so the clause must say so.
            sql.push_str(" LIKE ? ESCAPE '\\'");
            params.push(Value::String(pattern.clone()));
        }
        FilterExpr::And(parts) => render_group(parts, " AND ", sql, params),
        FilterExpr::Or(parts) => render_group(parts, " OR ", sql, params),
        FilterExpr::Not(inner) => {
            sql.push_str("NOT (");
            render_filter(inner, sql, params);
            sql.push(')');
        }
    }
}

fn render_group(parts: &[FilterExpr], sep: &str, sql: &mut String, params: &mut Vec<Value>) {
    sql.push('(');
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            sql.push_str(sep);
        }
        render_filter(part, sql, params);
    }
    sql.push(')');
}

fn render_scalar(expr: &ScalarExpr, sql: &mut String) {
    sql.push_str(&expr.label());
}
