//! Table evolution: reconcile a physical table with a batch's columns.
//!
//! Evolution runs in two steps. [`plan_evolution`] diffs the desired table
//! against the catalog and checks every required change against the
//! [`EvolutionPolicy`]; it is pure and either yields a complete plan or a
//! named error. [`TableEvolutionManager::apply`] then executes the plan. A
//! refused evolution therefore never leaves a table half-altered.

use std::collections::HashMap;
use std::fmt;

use tracing::{debug, info};

use crate::core::{
    ColumnDescriptor, ExistingColumn, SqlType, TableDescriptor, TableName, TargetEngine,
};
use crate::error::{Result, SinkError};
use crate::typemap::merge_pair;

/// Which structural changes configuration allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvolutionPolicy {
    pub allow_column_add: bool,
    pub allow_column_alter: bool,
}

impl Default for EvolutionPolicy {
    fn default() -> Self {
        Self {
            allow_column_add: true,
            allow_column_alter: false,
        }
    }
}

/// One DDL operation of a plan.
#[derive(Debug, Clone, PartialEq)]
pub enum EvolutionAction {
    CreateTable(TableDescriptor),
    AddColumn(ColumnDescriptor),
    AlterColumn {
        column: String,
        from: SqlType,
        to: SqlType,
    },
}

impl fmt::Display for EvolutionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvolutionAction::CreateTable(t) => {
                write!(f, "create table {} ({} columns)", t.name, t.columns.len())
            }
            EvolutionAction::AddColumn(c) => write!(f, "add column {} {}", c.name, c.sql_type),
            EvolutionAction::AlterColumn { column, from, to } => {
                write!(f, "alter column {} {} -> {}", column, from, to)
            }
        }
    }
}

/// Ordered DDL needed to bring a table in line with a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct EvolutionPlan {
    pub table: TableName,
    pub actions: Vec<EvolutionAction>,
    /// Effective column types after the plan runs, keyed by column name.
    pub column_types: HashMap<String, SqlType>,
}

impl EvolutionPlan {
    pub fn is_noop(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn creates_table(&self) -> bool {
        matches!(self.actions.first(), Some(EvolutionAction::CreateTable(_)))
    }
}

/// Decide what must change for `desired` to fit into the existing table.
///
/// For each desired column:
/// - absent on the table: add it, or fail if additions are disabled
/// - same rendered type: nothing
/// - different type: merge with the stored type; a merged type that renders
///   like the stored one needs nothing, anything else is a widening that is
///   applied or refused per policy. Unmergeable types fail.
pub fn plan_evolution(
    desired: &TableDescriptor,
    existing: Option<&[ExistingColumn]>,
    policy: EvolutionPolicy,
) -> Result<EvolutionPlan> {
    let table = desired.name.clone();

    let Some(existing) = existing else {
        let column_types = desired
            .columns
            .iter()
            .map(|c| (c.name.clone(), c.sql_type.clone()))
            .collect();
        return Ok(EvolutionPlan {
            table,
            actions: vec![EvolutionAction::CreateTable(desired.clone())],
            column_types,
        });
    };

    let mut column_types: HashMap<String, SqlType> = existing
        .iter()
        .map(|c| (c.name.clone(), c.sql_type.clone()))
        .collect();
    let mut actions = Vec::new();

    for col in &desired.columns {
        let Some(current) = column_types.get(&col.name).cloned() else {
            if !policy.allow_column_add {
                return Err(SinkError::not_permitted(
                    table.to_string(),
                    format!(
                        "column '{}' does not exist and column addition is disabled",
                        col.name
                    ),
                ));
            }
            column_types.insert(col.name.clone(), col.sql_type.clone());
            actions.push(EvolutionAction::AddColumn(ColumnDescriptor {
                primary_key: false,
                ..col.clone()
            }));
            continue;
        };

        if current.renders_as(&col.sql_type) {
            continue;
        }

        let merged = merge_pair(&current, &col.sql_type).map_err(|e| match e {
            SinkError::TypeMerge(msg) => {
                SinkError::TypeMerge(format!("{}.{}: {}", table, col.name, msg))
            }
            other => other,
        })?;
        if merged.renders_as(&current) {
            continue;
        }

        if !policy.allow_column_alter {
            return Err(SinkError::not_permitted(
                table.to_string(),
                format!(
                    "column '{}' would need widening from {} to {} and column alteration is disabled",
                    col.name, current, merged
                ),
            ));
        }
        column_types.insert(col.name.clone(), merged.clone());
        actions.push(EvolutionAction::AlterColumn {
            column: col.name.clone(),
            from: current,
            to: merged,
        });
    }

    Ok(EvolutionPlan {
        table,
        actions,
        column_types,
    })
}

/// Reconciles physical tables through a [`TargetEngine`].
pub struct TableEvolutionManager<'a> {
    engine: &'a dyn TargetEngine,
    policy: EvolutionPolicy,
}

impl<'a> TableEvolutionManager<'a> {
    pub fn new(engine: &'a dyn TargetEngine, policy: EvolutionPolicy) -> Self {
        Self { engine, policy }
    }

    /// Describe, plan and apply. Returns the executed plan.
    pub async fn reconcile(&self, desired: &TableDescriptor) -> Result<EvolutionPlan> {
        let existing = self.engine.describe_table(&desired.name).await?;
        let plan = plan_evolution(desired, existing.as_deref(), self.policy)?;
        self.apply(&plan).await?;
        Ok(plan)
    }

    pub async fn apply(&self, plan: &EvolutionPlan) -> Result<()> {
        if plan.is_noop() {
            debug!("{}: table matches schema", plan.table);
            return Ok(());
        }

        for action in &plan.actions {
            info!("{}: {}", plan.table, action);
            match action {
                EvolutionAction::CreateTable(table) => {
                    if let Some(schema) = &table.name.schema {
                        self.engine.create_schema(schema).await?;
                    }
                    self.engine.create_table(table).await?;
                }
                EvolutionAction::AddColumn(column) => {
                    self.engine.add_column(&plan.table, column).await?;
                }
                EvolutionAction::AlterColumn { column, to, .. } => {
                    self.engine
                        .alter_column_type(&plan.table, column, to)
                        .await?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(columns: Vec<(&str, SqlType, bool)>) -> TableDescriptor {
        TableDescriptor::new(
            TableName::new(Some("public".into()), "users"),
            columns
                .into_iter()
                .map(|(name, sql_type, primary_key)| ColumnDescriptor {
                    name: name.into(),
                    sql_type,
                    primary_key,
                })
                .collect(),
        )
        .unwrap()
    }

    fn existing(columns: Vec<(&str, SqlType)>) -> Vec<ExistingColumn> {
        columns
            .into_iter()
            .map(|(name, sql_type)| ExistingColumn {
                name: name.into(),
                sql_type,
            })
            .collect()
    }

    const PERMISSIVE: EvolutionPolicy = EvolutionPolicy {
        allow_column_add: true,
        allow_column_alter: true,
    };

    #[test]
    fn test_absent_table_is_created() {
        let desired = table(vec![("id", SqlType::Integer, true)]);
        let plan = plan_evolution(&desired, None, EvolutionPolicy::default()).unwrap();
        assert!(plan.creates_table());
        assert_eq!(plan.actions.len(), 1);
    }

    #[test]
    fn test_matching_table_is_noop() {
        let desired = table(vec![
            ("id", SqlType::Integer, true),
            ("name", SqlType::text(Some(2000)), false),
        ]);
        let current = existing(vec![
            ("id", SqlType::Integer),
            ("name", SqlType::text(Some(2000))),
            ("legacy", SqlType::Boolean),
        ]);
        let plan = plan_evolution(&desired, Some(&current), EvolutionPolicy::default()).unwrap();
        assert!(plan.is_noop());
    }

    #[test]
    fn test_new_column_added_when_allowed() {
        let desired = table(vec![
            ("id", SqlType::Integer, true),
            ("age", SqlType::Integer, false),
        ]);
        let current = existing(vec![("id", SqlType::Integer)]);
        let plan = plan_evolution(&desired, Some(&current), EvolutionPolicy::default()).unwrap();
        assert_eq!(plan.actions.len(), 1);
        assert!(matches!(&plan.actions[0], EvolutionAction::AddColumn(c) if c.name == "age"));
    }

    #[test]
    fn test_new_column_refused_when_disabled() {
        let desired = table(vec![
            ("id", SqlType::Integer, true),
            ("age", SqlType::Integer, false),
        ]);
        let current = existing(vec![("id", SqlType::Integer)]);
        let policy = EvolutionPolicy {
            allow_column_add: false,
            allow_column_alter: false,
        };
        let err = plan_evolution(&desired, Some(&current), policy).unwrap_err();
        assert!(matches!(err, SinkError::EvolutionNotPermitted { .. }));
    }

    #[test]
    fn test_narrower_incoming_type_is_noop() {
        let desired = table(vec![("name", SqlType::text(Some(50)), false)]);
        let current = existing(vec![("name", SqlType::text(Some(100)))]);
        let plan = plan_evolution(&desired, Some(&current), EvolutionPolicy::default()).unwrap();
        assert!(plan.is_noop());
        assert_eq!(plan.column_types["name"], SqlType::text(Some(100)));
    }

    #[test]
    fn test_widening_refused_when_alter_disabled() {
        let desired = table(vec![("name", SqlType::text(Some(500)), false)]);
        let current = existing(vec![("name", SqlType::text(Some(100)))]);
        let err =
            plan_evolution(&desired, Some(&current), EvolutionPolicy::default()).unwrap_err();
        assert!(matches!(err, SinkError::EvolutionNotPermitted { .. }));
    }

    #[test]
    fn test_widening_applied_when_alter_enabled() {
        let desired = table(vec![("amount", SqlType::numeric(38, 16), false)]);
        let current = existing(vec![("amount", SqlType::Integer)]);
        let plan = plan_evolution(&desired, Some(&current), PERMISSIVE).unwrap();
        assert_eq!(
            plan.actions,
            vec![EvolutionAction::AlterColumn {
                column: "amount".into(),
                from: SqlType::Integer,
                to: SqlType::numeric(38, 16),
            }]
        );
    }

    #[test]
    fn test_text_column_keeps_later_integer_declaration() {
        let desired = table(vec![("code", SqlType::Integer, false)]);
        let current = existing(vec![("code", SqlType::text(Some(2000)))]);
        let plan = plan_evolution(&desired, Some(&current), EvolutionPolicy::default()).unwrap();
        assert!(plan.is_noop());
        assert_eq!(plan.column_types["code"], SqlType::text(Some(2000)));
    }

    #[test]
    fn test_integer_column_widens_to_declared_text() {
        let desired = table(vec![("code", SqlType::text(Some(2000)), false)]);
        let current = existing(vec![("code", SqlType::Integer)]);

        let err =
            plan_evolution(&desired, Some(&current), EvolutionPolicy::default()).unwrap_err();
        assert!(matches!(err, SinkError::EvolutionNotPermitted { .. }));

        let plan = plan_evolution(&desired, Some(&current), PERMISSIVE).unwrap();
        assert_eq!(
            plan.actions,
            vec![EvolutionAction::AlterColumn {
                column: "code".into(),
                from: SqlType::Integer,
                to: SqlType::text(Some(2000)),
            }]
        );
    }

    #[test]
    fn test_unmergeable_change_fails_with_type_merge() {
        let desired = table(vec![("flag", SqlType::Boolean, false)]);
        let current = existing(vec![("flag", SqlType::text(Some(10)))]);
        let err = plan_evolution(&desired, Some(&current), PERMISSIVE).unwrap_err();
        assert!(matches!(err, SinkError::TypeMerge(ref m) if m.contains("flag")));
    }

    #[test]
    fn test_refusal_happens_before_any_action() {
        // First column would be added, second would need a refused widening.
        let desired = table(vec![
            ("extra", SqlType::Integer, false),
            ("name", SqlType::text(None), false),
        ]);
        let current = existing(vec![("name", SqlType::text(Some(10)))]);
        let result = plan_evolution(&desired, Some(&current), EvolutionPolicy::default());
        assert!(result.is_err());
    }
}
