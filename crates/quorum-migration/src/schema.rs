//! Structured schema changes and the snapshot they are replayed onto.
//!
//! Every revision describes its changes with [Change] rather than raw SQL so
//! the chain can be replayed in memory. The replay yields a [Schema] for any
//! revision, which is what chain validation and the schema tests compare.

use std::collections::BTreeMap;
use std::fmt::Display;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    BigInt,
    Text,
    Boolean,
    TimestampTz,
}

impl ColumnType {
    pub const fn as_sql(&self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::BigInt => "BIGINT",
            ColumnType::Text => "TEXT",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::TimestampTz => "TIMESTAMPTZ",
        }
    }
}

impl Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_sql())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub ty: ColumnType,
    pub nullable: bool,
    /// SQL expression used as the server side default
    pub default: Option<&'static str>,
    pub unique: bool,
    /// Values are generated by the database (`GENERATED BY DEFAULT AS IDENTITY`)
    pub identity: bool,
}

impl Column {
    /// A `NOT NULL` column without default
    pub const fn new(name: &'static str, ty: ColumnType) -> Self {
        Self {
            name,
            ty,
            nullable: false,
            default: None,
            unique: false,
            identity: false,
        }
    }

    pub const fn nullable(self) -> Self {
        Self {
            nullable: true,
            ..self
        }
    }

    pub const fn default(self, expression: &'static str) -> Self {
        Self {
            default: Some(expression),
            ..self
        }
    }

    pub const fn unique(self) -> Self {
        Self {
            unique: true,
            ..self
        }
    }

    pub const fn identity(self) -> Self {
        Self {
            identity: true,
            ..self
        }
    }

    fn definition(&self) -> String {
        let mut definition = format!("{} {}", quote_ident(self.name), self.ty);
        if self.identity {
            definition.push_str(" GENERATED BY DEFAULT AS IDENTITY");
        }
        if !self.nullable {
            definition.push_str(" NOT NULL");
        }
        if let Some(default) = self.default {
            definition.push_str(" DEFAULT ");
            definition.push_str(default);
        }
        if self.unique {
            definition.push_str(" UNIQUE");
        }
        definition
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnDelete {
    #[default]
    NoAction,
    Restrict,
    Cascade,
    SetNull,
}

impl OnDelete {
    fn clause(&self) -> &'static str {
        match self {
            OnDelete::NoAction => "",
            OnDelete::Restrict => " ON DELETE RESTRICT",
            OnDelete::Cascade => " ON DELETE CASCADE",
            OnDelete::SetNull => " ON DELETE SET NULL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignKey {
    /// Constraint name
    pub name: &'static str,
    pub columns: &'static [&'static str],
    pub references: &'static str,
    pub referenced_columns: &'static [&'static str],
    pub on_delete: OnDelete,
}

impl ForeignKey {
    fn definition(&self) -> String {
        format!(
            "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}){}",
            quote_ident(self.name),
            quote_list(self.columns),
            quote_ident(self.references),
            quote_list(self.referenced_columns),
            self.on_delete.clause()
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Table {
    pub name: &'static str,
    pub columns: &'static [Column],
    pub primary_key: &'static [&'static str],
    pub foreign_keys: &'static [ForeignKey],
}

/// One schema operation inside a revision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    CreateTable(Table),
    DropTable(&'static str),
    AddColumn {
        table: &'static str,
        column: Column,
    },
    DropColumn {
        table: &'static str,
        column: &'static str,
    },
    SetNullable {
        table: &'static str,
        column: &'static str,
        nullable: bool,
    },
    AddForeignKey {
        table: &'static str,
        foreign_key: ForeignKey,
    },
    DropForeignKey {
        table: &'static str,
        name: &'static str,
    },
    /// Data statement that leaves the shape of the schema untouched (backfills, seeds)
    Execute(&'static str),
}

impl Change {
    /// Render the postgres statement for this change (without a trailing `;`)
    pub fn to_sql(&self) -> String {
        match self {
            Change::CreateTable(table) => {
                let mut parts = table
                    .columns
                    .iter()
                    .map(Column::definition)
                    .collect::<Vec<String>>();
                if !table.primary_key.is_empty() {
                    parts.push(format!("PRIMARY KEY ({})", quote_list(table.primary_key)));
                }
                parts.extend(table.foreign_keys.iter().map(ForeignKey::definition));
                format!(
                    "CREATE TABLE {} ({})",
                    quote_ident(table.name),
                    parts.join(", ")
                )
            }
            Change::DropTable(table) => format!("DROP TABLE {}", quote_ident(table)),
            Change::AddColumn { table, column } => format!(
                "ALTER TABLE {} ADD COLUMN {}",
                quote_ident(table),
                column.definition()
            ),
            Change::DropColumn { table, column } => format!(
                "ALTER TABLE {} DROP COLUMN {}",
                quote_ident(table),
                quote_ident(column)
            ),
            Change::SetNullable {
                table,
                column,
                nullable,
            } => format!(
                "ALTER TABLE {} ALTER COLUMN {} {}",
                quote_ident(table),
                quote_ident(column),
                if *nullable {
                    "DROP NOT NULL"
                } else {
                    "SET NOT NULL"
                }
            ),
            Change::AddForeignKey { table, foreign_key } => format!(
                "ALTER TABLE {} ADD {}",
                quote_ident(table),
                foreign_key.definition()
            ),
            Change::DropForeignKey { table, name } => format!(
                "ALTER TABLE {} DROP CONSTRAINT {}",
                quote_ident(table),
                quote_ident(name)
            ),
            Change::Execute(sql) => sql.trim().trim_end_matches(';').trim_end().to_owned(),
        }
    }
}

impl Display for Change {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Change::CreateTable(table) => write!(f, "+ table {}", table.name),
            Change::DropTable(table) => write!(f, "- table {table}"),
            Change::AddColumn { table, column } => write!(f, "+ {table}.{}", column.name),
            Change::DropColumn { table, column } => write!(f, "- {table}.{column}"),
            Change::SetNullable {
                table,
                column,
                nullable,
            } => write!(f, "~ {table}.{column} nullable={nullable}"),
            Change::AddForeignKey { table, foreign_key } => {
                write!(f, "+ {table} fk {} -> {}", foreign_key.name, foreign_key.references)
            }
            Change::DropForeignKey { table, name } => write!(f, "- {table} fk {name}"),
            Change::Execute(_) => write!(f, "* execute"),
        }
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn quote_list(names: &[&str]) -> String {
    names
        .iter()
        .map(|name| quote_ident(name))
        .collect::<Vec<String>>()
        .join(", ")
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("table '{0}' already exists")]
    TableExists(&'static str),
    #[error("table '{0}' does not exist")]
    UnknownTable(&'static str),
    #[error("column '{table}.{column}' already exists")]
    ColumnExists {
        table: &'static str,
        column: &'static str,
    },
    #[error("column '{table}.{column}' does not exist")]
    UnknownColumn {
        table: &'static str,
        column: &'static str,
    },
    #[error("constraint '{name}' on '{table}' already exists")]
    ConstraintExists {
        table: &'static str,
        name: &'static str,
    },
    #[error("constraint '{name}' on '{table}' does not exist")]
    UnknownConstraint {
        table: &'static str,
        name: &'static str,
    },
    #[error("foreign key '{name}' on '{table}' references missing table '{references}'")]
    UnknownReference {
        table: &'static str,
        name: &'static str,
        references: &'static str,
    },
    #[error("foreign key '{name}' on '{table}' references missing column '{references}.{column}'")]
    UnknownReferencedColumn {
        table: &'static str,
        name: &'static str,
        references: &'static str,
        column: &'static str,
    },
    #[error("table '{table}' is still referenced by '{by}'")]
    TableReferenced {
        table: &'static str,
        by: &'static str,
    },
    #[error("column '{table}.{column}' is still referenced by '{by}'")]
    ColumnReferenced {
        table: &'static str,
        column: &'static str,
        by: &'static str,
    },
}

/// The state of one table at some revision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    name: &'static str,
    columns: Vec<Column>,
    primary_key: Vec<&'static str>,
    foreign_keys: Vec<ForeignKey>,
}

impl TableSchema {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn column_names(&self) -> Vec<&'static str> {
        self.columns.iter().map(|column| column.name).collect()
    }

    pub fn primary_key(&self) -> &[&'static str] {
        &self.primary_key
    }

    pub fn foreign_keys(&self) -> &[ForeignKey] {
        &self.foreign_keys
    }

    fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }
}

/// A replayed schema: the tables, columns and constraints in force at a revision
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    tables: BTreeMap<&'static str, TableSchema>,
}

impl Schema {
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.get(name)
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableSchema> {
        self.tables.values()
    }

    pub fn column(&self, table: &str, column: &str) -> Option<&Column> {
        self.table(table).and_then(|table| table.column(column))
    }

    /// Apply a change, every reference it makes has to resolve against the
    /// current state of the schema
    pub fn apply(&mut self, change: &Change) -> Result<(), SchemaError> {
        match *change {
            Change::CreateTable(table) => self.create_table(&table),
            Change::DropTable(name) => self.drop_table(name),
            Change::AddColumn { table, column } => {
                let target = self.table_mut(table)?;
                if target.has_column(column.name) {
                    return Err(SchemaError::ColumnExists {
                        table,
                        column: column.name,
                    });
                }
                target.columns.push(column);
                Ok(())
            }
            Change::DropColumn { table, column } => self.drop_column(table, column),
            Change::SetNullable {
                table,
                column,
                nullable,
            } => {
                let target = self.table_mut(table)?;
                let Some(existing) = target.columns.iter_mut().find(|c| c.name == column) else {
                    return Err(SchemaError::UnknownColumn { table, column });
                };
                existing.nullable = nullable;
                Ok(())
            }
            Change::AddForeignKey { table, foreign_key } => {
                let target = self.table(table).ok_or(SchemaError::UnknownTable(table))?;
                if target.foreign_keys.iter().any(|fk| fk.name == foreign_key.name) {
                    return Err(SchemaError::ConstraintExists {
                        table,
                        name: foreign_key.name,
                    });
                }
                self.check_foreign_key(target, &foreign_key)?;
                self.table_mut(table)?.foreign_keys.push(foreign_key);
                Ok(())
            }
            Change::DropForeignKey { table, name } => {
                let target = self.table_mut(table)?;
                let before = target.foreign_keys.len();
                target.foreign_keys.retain(|fk| fk.name != name);
                if before == target.foreign_keys.len() {
                    return Err(SchemaError::UnknownConstraint { table, name });
                }
                Ok(())
            }
            Change::Execute(_) => Ok(()),
        }
    }

    fn table_mut(&mut self, name: &'static str) -> Result<&mut TableSchema, SchemaError> {
        self.tables
            .get_mut(name)
            .ok_or(SchemaError::UnknownTable(name))
    }

    fn create_table(&mut self, table: &Table) -> Result<(), SchemaError> {
        if self.tables.contains_key(table.name) {
            return Err(SchemaError::TableExists(table.name));
        }

        let mut created = TableSchema {
            name: table.name,
            columns: Vec::with_capacity(table.columns.len()),
            primary_key: Vec::new(),
            foreign_keys: Vec::new(),
        };

        for column in table.columns {
            if created.has_column(column.name) {
                return Err(SchemaError::ColumnExists {
                    table: table.name,
                    column: column.name,
                });
            }
            created.columns.push(*column);
        }

        for key in table.primary_key.iter().copied() {
            if !created.has_column(key) {
                return Err(SchemaError::UnknownColumn {
                    table: table.name,
                    column: key,
                });
            }
            created.primary_key.push(key);
        }

        for foreign_key in table.foreign_keys {
            self.check_foreign_key(&created, foreign_key)?;
            created.foreign_keys.push(*foreign_key);
        }

        self.tables.insert(table.name, created);
        Ok(())
    }

    fn drop_table(&mut self, name: &'static str) -> Result<(), SchemaError> {
        if !self.tables.contains_key(name) {
            return Err(SchemaError::UnknownTable(name));
        }

        if let Some(by) = self
            .tables
            .values()
            .filter(|table| table.name != name)
            .find(|table| table.foreign_keys.iter().any(|fk| fk.references == name))
        {
            return Err(SchemaError::TableReferenced { table: name, by: by.name });
        }

        self.tables.remove(name);
        Ok(())
    }

    fn drop_column(&mut self, table: &'static str, column: &'static str) -> Result<(), SchemaError> {
        if let Some(by) = self.tables.values().find(|other| {
            other.foreign_keys.iter().any(|fk| {
                fk.references == table
                    && fk.referenced_columns.contains(&column)
                    && !(other.name == table && fk.columns.contains(&column))
            })
        }) {
            return Err(SchemaError::ColumnReferenced {
                table,
                column,
                by: by.name,
            });
        }

        let target = self.table_mut(table)?;
        if !target.has_column(column) {
            return Err(SchemaError::UnknownColumn { table, column });
        }

        // postgres drops constraints that involve the dropped column
        target.columns.retain(|c| c.name != column);
        target.primary_key.retain(|key| *key != column);
        target.foreign_keys.retain(|fk| !fk.columns.contains(&column));
        Ok(())
    }

    fn check_foreign_key(
        &self,
        table: &TableSchema,
        foreign_key: &ForeignKey,
    ) -> Result<(), SchemaError> {
        if let Some(column) = foreign_key
            .columns
            .iter()
            .copied()
            .find(|column| !table.has_column(column))
        {
            return Err(SchemaError::UnknownColumn {
                table: table.name,
                column,
            });
        }

        let referenced = if foreign_key.references == table.name {
            table
        } else {
            self.tables
                .get(foreign_key.references)
                .ok_or(SchemaError::UnknownReference {
                    table: table.name,
                    name: foreign_key.name,
                    references: foreign_key.references,
                })?
        };

        match foreign_key
            .referenced_columns
            .iter()
            .copied()
            .find(|column| !referenced.has_column(column))
        {
            Some(column) => Err(SchemaError::UnknownReferencedColumn {
                table: table.name,
                name: foreign_key.name,
                references: foreign_key.references,
                column,
            }),
            None => Ok(()),
        }
    }
}
