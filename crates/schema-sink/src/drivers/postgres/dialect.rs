//! PostgreSQL SQL dialect (Strategy pattern).

use crate::core::identifier::quote_pg;
use crate::core::traits::Dialect;
use crate::core::{SqlType, TableName};
use crate::error::Result;

/// PostgreSQL dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    /// Create a new PostgreSQL dialect instance.
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for PostgresDialect {
    fn name(&self) -> &str {
        "postgres"
    }

    fn quote_ident(&self, name: &str) -> Result<String> {
        quote_pg(name)
    }

    fn native_boolean(&self) -> bool {
        true
    }

    fn render_type(&self, ty: &SqlType) -> String {
        match ty {
            SqlType::Text { length: Some(n) } => format!("varchar({})", n),
            SqlType::Text { length: None } => "text".to_string(),
            SqlType::Integer => "bigint".to_string(),
            SqlType::Numeric { precision, scale } => format!("numeric({},{})", precision, scale),
            SqlType::Float => "double precision".to_string(),
            SqlType::Boolean => "boolean".to_string(),
            SqlType::Date => "date".to_string(),
            SqlType::Time => "time".to_string(),
            SqlType::Timestamp => "timestamp".to_string(),
            SqlType::Other(name) => name.clone(),
        }
    }

    fn parse_type(
        &self,
        data_type: &str,
        char_length: Option<i64>,
        precision: Option<i64>,
        scale: Option<i64>,
    ) -> SqlType {
        let length = char_length.and_then(|n| u32::try_from(n).ok());
        match data_type.to_lowercase().as_str() {
            "character varying" | "varchar" | "character" | "char" => SqlType::text(length),
            "text" => SqlType::text(None),
            "bigint" | "integer" | "smallint" => SqlType::Integer,
            "numeric" | "decimal" => match precision.and_then(|p| u32::try_from(p).ok()) {
                Some(p) => {
                    let s = scale.and_then(|s| u32::try_from(s).ok()).unwrap_or(0);
                    SqlType::numeric(p, s)
                }
                None => SqlType::Other("numeric".into()),
            },
            "double precision" | "real" => SqlType::Float,
            "boolean" => SqlType::Boolean,
            "date" => SqlType::Date,
            "time without time zone" | "time" => SqlType::Time,
            "timestamp without time zone" | "timestamp with time zone" | "timestamp" => {
                SqlType::Timestamp
            }
            other => SqlType::Other(other.to_string()),
        }
    }

    fn param_placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }

    fn build_alter_column(&self, table: &TableName, column: &str, ty: &SqlType) -> Result<String> {
        Ok(format!(
            "ALTER TABLE {} ALTER COLUMN {} TYPE {}",
            self.qualify(table)?,
            self.quote_ident(column)?,
            self.render_type(ty)
        ))
    }

    fn build_create_staging(&self, staging: &TableName, target: &TableName) -> Result<String> {
        Ok(format!(
            "CREATE TABLE {} (LIKE {} INCLUDING DEFAULTS)",
            self.qualify(staging)?,
            self.qualify(target)?
        ))
    }

    fn build_merge_update(
        &self,
        target: &TableName,
        staging: &TableName,
        columns: &[String],
        keys: &[String],
    ) -> Result<Option<String>> {
        let mut assignments = Vec::new();
        for c in columns.iter().filter(|c| !keys.contains(c)) {
            let q = self.quote_ident(c)?;
            assignments.push(format!("{} = s.{}", q, q));
        }
        if assignments.is_empty() {
            return Ok(None);
        }

        Ok(Some(format!(
            "UPDATE {} AS t SET {} FROM {} AS s WHERE {}",
            self.qualify(target)?,
            assignments.join(", "),
            self.qualify(staging)?,
            self.build_key_join(keys)?
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ColumnDescriptor, TableDescriptor};

    fn users() -> TableName {
        TableName::new(Some("public".into()), "users")
    }

    #[test]
    fn test_quote_ident() {
        let dialect = PostgresDialect::new();
        assert_eq!(dialect.quote_ident("users").unwrap(), "\"users\"");
        assert_eq!(dialect.quote_ident("my\"table").unwrap(), "\"my\"\"table\"");
        assert_eq!(dialect.qualify(&users()).unwrap(), "\"public\".\"users\"");
    }

    #[test]
    fn test_create_table_with_primary_key() {
        let dialect = PostgresDialect::new();
        let table = TableDescriptor::new(
            users(),
            vec![
                ColumnDescriptor {
                    name: "id".into(),
                    sql_type: SqlType::Integer,
                    primary_key: true,
                },
                ColumnDescriptor {
                    name: "active".into(),
                    sql_type: SqlType::Boolean,
                    primary_key: false,
                },
            ],
        )
        .unwrap();

        assert_eq!(
            dialect.build_create_table(&table).unwrap(),
            "CREATE TABLE \"public\".\"users\" (\"id\" bigint NOT NULL, \"active\" boolean, PRIMARY KEY (\"id\"))"
        );
    }

    #[test]
    fn test_alter_column() {
        let dialect = PostgresDialect::new();
        assert_eq!(
            dialect
                .build_alter_column(&users(), "name", &SqlType::text(Some(500)))
                .unwrap(),
            "ALTER TABLE \"public\".\"users\" ALTER COLUMN \"name\" TYPE varchar(500)"
        );
    }

    #[test]
    fn test_merge_updates_then_inserts_by_key() {
        let dialect = PostgresDialect::new();
        let sql = dialect
            .build_merge(
                &users(),
                &users().sibling("_staging_users"),
                &["id".into(), "name".into()],
                &["id".into()],
            )
            .unwrap();
        assert_eq!(
            sql,
            vec![
                "UPDATE \"public\".\"users\" AS t SET \"name\" = s.\"name\" \
                 FROM \"public\".\"_staging_users\" AS s WHERE t.\"id\" = s.\"id\""
                    .to_string(),
                "INSERT INTO \"public\".\"users\" (\"id\", \"name\") SELECT s.\"id\", s.\"name\" \
                 FROM \"public\".\"_staging_users\" AS s LEFT JOIN \"public\".\"users\" AS t \
                 ON t.\"id\" = s.\"id\" WHERE t.\"id\" IS NULL"
                    .to_string(),
            ]
        );
    }

    #[test]
    fn test_merge_key_only_inserts_missing_rows() {
        let dialect = PostgresDialect::new();
        let sql = dialect
            .build_merge(
                &users(),
                &users().sibling("_staging_users"),
                &["tenant".into(), "id".into()],
                &["tenant".into(), "id".into()],
            )
            .unwrap();
        assert_eq!(sql.len(), 1);
        assert!(sql[0].starts_with("INSERT INTO"));
        assert!(sql[0].contains("ON t.\"tenant\" = s.\"tenant\" AND t.\"id\" = s.\"id\""));
    }

    #[test]
    fn test_parse_catalog_types() {
        let dialect = PostgresDialect::new();
        assert_eq!(
            dialect.parse_type("character varying", Some(100), None, None),
            SqlType::text(Some(100))
        );
        assert_eq!(dialect.parse_type("text", None, None, None), SqlType::text(None));
        assert_eq!(
            dialect.parse_type("numeric", None, Some(38), Some(16)),
            SqlType::numeric(38, 16)
        );
        assert_eq!(
            dialect.parse_type("timestamp without time zone", None, None, None),
            SqlType::Timestamp
        );
        assert_eq!(
            dialect.parse_type("jsonb", None, None, None),
            SqlType::Other("jsonb".into())
        );
    }

    #[test]
    fn test_render_parse_agree() {
        let dialect = PostgresDialect::new();
        for ty in [
            SqlType::text(Some(2000)),
            SqlType::Integer,
            SqlType::numeric(38, 16),
            SqlType::Float,
            SqlType::Boolean,
            SqlType::Date,
            SqlType::Timestamp,
        ] {
            let rendered = dialect.render_type(&ty);
            let (name, len, prec, scale) = match &ty {
                SqlType::Text { length } => ("character varying", length.map(i64::from), None, None),
                SqlType::Numeric { precision, scale } => {
                    ("numeric", None, Some(*precision as i64), Some(*scale as i64))
                }
                _ => (rendered.as_str(), None, None, None),
            };
            assert_eq!(dialect.parse_type(name, len, prec, scale), ty);
        }
    }
}
