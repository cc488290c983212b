//! In-memory stand-in for a PostgreSQL session.
//!
//! Understands exactly the statement shapes sqlident emits: sequence and
//! table DDL, `select nextval(...)`, INSERT with `$n` / `nextval(...)` terms
//! and an optional RETURNING clause, `lastval()` post-reads, unfiltered
//! `DELETE FROM`, and the two catalog queries used by reflection. Sequences, SERIAL counters and the
//! session's `lastval()` behave like the real thing, and NOT NULL, primary
//! key and foreign key violations carry their SQLSTATE.

#![allow(dead_code, clippy::manual_async_fn)]

use asupersync::{Cx, Outcome};
use regex::Regex;
use sqlident::{Connection, Error, QueryError, QueryErrorKind, Row, Value};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex};

static CREATE_SEQUENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^CREATE SEQUENCE (\w+)(?: INCREMENT BY (-?\d+))?(?: START WITH (-?\d+))?$")
        .unwrap()
});
static CREATE_TABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^CREATE TABLE (\w+) \(\n(.*)\n\)$").unwrap());
static FOREIGN_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^FOREIGN KEY\((\w+)\) REFERENCES (\w+) \((\w+)\)$").unwrap()
});
static NEXTVAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^nextval\('(\w+)'(?:::regclass)?\)$").unwrap());
static PREFETCH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^select nextval\('(\w+)'\)$").unwrap());
static INSERT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^INSERT INTO (\w+)(?: \(([^)]*)\) VALUES \((.*?)\)| DEFAULT VALUES)(?: RETURNING (.+))?$",
    )
    .unwrap()
});
static SELECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^SELECT (.+) FROM (\w+) WHERE (.+)$").unwrap());

#[derive(Debug, Clone)]
pub struct Logged {
    pub sql: String,
    pub params: Vec<Value>,
}

#[derive(Debug, Clone)]
struct FakeSequence {
    next: i64,
    increment: i64,
}

#[derive(Debug, Clone)]
struct FakeColumn {
    name: String,
    data_type: String,
    char_len: Option<i64>,
    not_null: bool,
    default: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct FakeTable {
    columns: Vec<FakeColumn>,
    primary_key: Vec<String>,
    foreign_keys: Vec<(String, String, String)>,
    rows: Vec<HashMap<String, Value>>,
}

#[derive(Debug, Default)]
struct FakeState {
    sequences: HashMap<String, FakeSequence>,
    tables: HashMap<String, FakeTable>,
    lastval: Option<i64>,
    last_issued: HashMap<String, i64>,
    log: Vec<Logged>,
}

/// A shareable fake session. Clones see the same database.
#[derive(Debug, Clone, Default)]
pub struct FakePostgres {
    state: Arc<Mutex<FakeState>>,
}

impl FakePostgres {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every statement issued so far, in order.
    pub fn log(&self) -> Vec<Logged> {
        self.state.lock().unwrap().log.clone()
    }

    /// Statement texts issued so far, in order.
    pub fn statements(&self) -> Vec<String> {
        self.log().into_iter().map(|l| l.sql).collect()
    }

    pub fn clear_log(&self) {
        self.state.lock().unwrap().log.clear();
    }

    /// The value `nextval` last returned for `sequence`, like `currval()`.
    pub fn currval(&self, sequence: &str) -> Option<i64> {
        self.state.lock().unwrap().last_issued.get(sequence).copied()
    }

    /// Stored rows of `table` as `(id, data)` pairs, in insertion order.
    pub fn id_data(&self, table: &str) -> Vec<(i64, Option<String>)> {
        let state = self.state.lock().unwrap();
        state
            .tables
            .get(table)
            .map(|t| {
                t.rows
                    .iter()
                    .map(|row| {
                        (
                            row.get("id").and_then(Value::as_i64).unwrap_or_default(),
                            row.get("data").and_then(|v| v.as_str().map(str::to_string)),
                        )
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn run(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, Error> {
        let mut state = self.state.lock().unwrap();
        state.log.push(Logged {
            sql: sql.to_string(),
            params: params.to_vec(),
        });
        state.dispatch(sql, params)
    }
}

fn db_error(sql: &str, code: &str, kind: QueryErrorKind, message: String) -> Error {
    Error::Query(QueryError {
        kind,
        sql: Some(sql.to_string()),
        sqlstate: Some(code.to_string()),
        message,
        source: None,
    })
}

fn normalize(value: Value) -> Value {
    match value {
        Value::SmallInt(v) => Value::BigInt(i64::from(v)),
        Value::Int(v) => Value::BigInt(i64::from(v)),
        other => other,
    }
}

fn bare(column: &str) -> &str {
    column.rsplit_once('.').map_or(column, |(_, c)| c)
}

impl FakeState {
    fn dispatch(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, Error> {
        if let Some(caps) = CREATE_SEQUENCE.captures(sql) {
            let increment = caps.get(2).map_or(1, |m| m.as_str().parse().unwrap());
            let start = caps.get(3).map_or(1, |m| m.as_str().parse().unwrap());
            self.sequences.insert(
                caps[1].to_string(),
                FakeSequence {
                    next: start,
                    increment,
                },
            );
            return Ok(Vec::new());
        }
        if let Some(caps) = CREATE_TABLE.captures(sql) {
            let name = caps[1].to_string();
            let table = self.create_table(&name, &caps[2]);
            self.tables.insert(name, table);
            return Ok(Vec::new());
        }
        if let Some(name) = sql.strip_prefix("DROP TABLE ") {
            self.tables.remove(name);
            return Ok(Vec::new());
        }
        if let Some(name) = sql.strip_prefix("DELETE FROM ") {
            if let Some(table) = self.tables.get_mut(name) {
                table.rows.clear();
            }
            return Ok(Vec::new());
        }
        if let Some(name) = sql.strip_prefix("DROP SEQUENCE ") {
            self.sequences.remove(name);
            return Ok(Vec::new());
        }
        if let Some(caps) = PREFETCH.captures(sql) {
            let value = self.nextval(sql, &caps[1])?;
            return Ok(vec![Row::new(
                vec!["nextval".into()],
                vec![Value::BigInt(value)],
            )]);
        }
        if let Some(caps) = INSERT.captures(sql) {
            return self.insert(sql, &caps, params);
        }
        if sql.contains("information_schema.columns") {
            return Ok(self.catalog_columns(params));
        }
        if sql.contains("constraint_type = 'PRIMARY KEY'") {
            return Ok(self.catalog_primary_key(params));
        }
        if let Some(caps) = SELECT.captures(sql) {
            return self.select(sql, &caps, params);
        }
        Err(db_error(
            sql,
            "42601",
            QueryErrorKind::Syntax,
            format!("fake backend cannot parse: {sql}"),
        ))
    }

    fn create_table(&mut self, name: &str, body: &str) -> FakeTable {
        let mut table = FakeTable::default();
        for part in body.split(",\n").map(str::trim) {
            if let Some(list) = part
                .strip_prefix("PRIMARY KEY (")
                .and_then(|rest| rest.strip_suffix(')'))
            {
                table.primary_key = list.split(", ").map(str::to_string).collect();
                continue;
            }
            if let Some(caps) = FOREIGN_KEY.captures(part) {
                table.foreign_keys.push((
                    caps[1].to_string(),
                    caps[2].to_string(),
                    caps[3].to_string(),
                ));
                continue;
            }

            let (column, rest) = part.split_once(' ').unwrap();
            let (rest, not_null) = match rest.strip_suffix(" NOT NULL") {
                Some(rest) => (rest, true),
                None => (rest, false),
            };
            let (sql_type, mut default) = match rest.split_once(" DEFAULT ") {
                Some((ty, default)) => (ty.to_string(), Some(default.to_string())),
                None => (rest.to_string(), None),
            };
            let data_type = match sql_type.as_str() {
                "SERIAL" | "BIGSERIAL" => {
                    let seq = format!("{name}_{column}_seq");
                    self.sequences.insert(
                        seq.clone(),
                        FakeSequence {
                            next: 1,
                            increment: 1,
                        },
                    );
                    default = Some(format!("nextval('{seq}'::regclass)"));
                    if sql_type == "SERIAL" { "integer" } else { "bigint" }.to_string()
                }
                other => other.to_lowercase(),
            };
            let (data_type, char_len) = match data_type
                .strip_prefix("varchar(")
                .and_then(|r| r.strip_suffix(')'))
            {
                Some(len) => ("character varying".to_string(), len.parse().ok()),
                None => (data_type, None),
            };
            table.columns.push(FakeColumn {
                name: column.to_string(),
                data_type,
                char_len,
                not_null,
                default,
            });
        }
        table
    }

    fn nextval(&mut self, sql: &str, name: &str) -> Result<i64, Error> {
        let Some(sequence) = self.sequences.get_mut(name) else {
            return Err(db_error(
                sql,
                "42P01",
                QueryErrorKind::NotFound,
                format!("relation \"{name}\" does not exist"),
            ));
        };
        let value = sequence.next;
        sequence.next += sequence.increment;
        self.lastval = Some(value);
        self.last_issued.insert(name.to_string(), value);
        Ok(value)
    }

    fn eval_default(&mut self, sql: &str, default: &str) -> Result<Value, Error> {
        match NEXTVAL.captures(default) {
            Some(caps) => Ok(Value::BigInt(self.nextval(sql, &caps[1])?)),
            None => Ok(Value::Text(default.trim_matches('\'').to_string())),
        }
    }

    fn insert(
        &mut self,
        sql: &str,
        caps: &regex::Captures<'_>,
        params: &[Value],
    ) -> Result<Vec<Row>, Error> {
        let name = caps[1].to_string();
        let Some(table) = self.tables.get(&name).cloned() else {
            return Err(db_error(
                sql,
                "42P01",
                QueryErrorKind::NotFound,
                format!("relation \"{name}\" does not exist"),
            ));
        };

        let mut row: HashMap<String, Value> = HashMap::new();
        if let (Some(columns), Some(terms)) = (caps.get(2), caps.get(3)) {
            let columns: Vec<&str> = columns.as_str().split(", ").collect();
            let terms: Vec<&str> = terms.as_str().split(", ").collect();
            assert_eq!(columns.len(), terms.len(), "malformed INSERT: {sql}");
            for (column, term) in columns.into_iter().zip(terms) {
                let value = if let Some(index) = term.strip_prefix('$') {
                    let index: usize = index.parse().unwrap();
                    params[index - 1].clone()
                } else if let Some(seq) = NEXTVAL.captures(term) {
                    Value::BigInt(self.nextval(sql, &seq[1])?)
                } else {
                    panic!("unexpected VALUES term {term} in {sql}");
                };
                row.insert(column.to_string(), normalize(value));
            }
        }

        for column in &table.columns {
            if row.contains_key(&column.name) {
                continue;
            }
            let value = match &column.default {
                Some(default) => self.eval_default(sql, default)?,
                None => Value::Null,
            };
            row.insert(column.name.clone(), value);
        }

        for column in &table.columns {
            if column.not_null && row.get(&column.name).is_none_or(Value::is_null) {
                return Err(db_error(
                    sql,
                    "23502",
                    QueryErrorKind::Constraint,
                    format!(
                        "null value in column \"{}\" of relation \"{}\" violates not-null constraint",
                        column.name, name
                    ),
                ));
            }
        }

        let key: Vec<Value> = table.primary_key.iter().map(|c| row[c].clone()).collect();
        if !key.is_empty()
            && table
                .rows
                .iter()
                .any(|existing| table.primary_key.iter().map(|c| &existing[c]).eq(key.iter()))
        {
            return Err(db_error(
                sql,
                "23505",
                QueryErrorKind::Constraint,
                format!("duplicate key value violates unique constraint \"{name}_pkey\""),
            ));
        }

        for (column, target, target_column) in &table.foreign_keys {
            let value = &row[column];
            let present = self.tables.get(target).is_some_and(|t| {
                t.rows.iter().any(|r| r.get(target_column) == Some(value))
            });
            if !value.is_null() && !present {
                return Err(db_error(
                    sql,
                    "23503",
                    QueryErrorKind::Constraint,
                    format!(
                        "insert or update on table \"{name}\" violates foreign key constraint"
                    ),
                ));
            }
        }

        let returned = caps.get(4).map(|list| {
            let names: Vec<String> = list
                .as_str()
                .split(", ")
                .map(|c| bare(c).to_string())
                .collect();
            let values = names.iter().map(|c| row[c].clone()).collect();
            Row::new(names, values)
        });

        if let Some(stored) = self.tables.get_mut(&name) {
            stored.rows.push(row);
        }
        Ok(returned.into_iter().collect())
    }

    fn select(
        &self,
        sql: &str,
        caps: &regex::Captures<'_>,
        params: &[Value],
    ) -> Result<Vec<Row>, Error> {
        let table = self.tables.get(&caps[2]).ok_or_else(|| {
            db_error(
                sql,
                "42P01",
                QueryErrorKind::NotFound,
                format!("relation \"{}\" does not exist", &caps[2]),
            )
        })?;
        let mut conditions = Vec::new();
        for condition in caps[3].split(" AND ") {
            let (column, operand) = condition.split_once(" = ").unwrap();
            let expected = if operand == "lastval()" {
                match self.lastval {
                    Some(v) => Value::BigInt(v),
                    None => {
                        return Err(db_error(
                            sql,
                            "55000",
                            QueryErrorKind::Database,
                            "lastval is not yet defined in this session".to_string(),
                        ));
                    }
                }
            } else {
                let index: usize = operand.trim_start_matches('$').parse().unwrap();
                normalize(params[index - 1].clone())
            };
            conditions.push((bare(column).to_string(), expected));
        }

        let names: Vec<String> = caps[1].split(", ").map(|c| bare(c).to_string()).collect();
        Ok(table
            .rows
            .iter()
            .rev()
            .filter(|row| conditions.iter().all(|(c, v)| row.get(c) == Some(v)))
            .take(1)
            .map(|row| {
                Row::new(
                    names.clone(),
                    names.iter().map(|c| row[c].clone()).collect(),
                )
            })
            .collect())
    }

    fn catalog_columns(&self, params: &[Value]) -> Vec<Row> {
        let Some(table) = params.first().and_then(Value::as_str).and_then(|n| self.tables.get(n))
        else {
            return Vec::new();
        };
        let names: Vec<String> = [
            "column_name",
            "data_type",
            "character_maximum_length",
            "is_nullable",
            "column_default",
            "is_identity",
        ]
        .into_iter()
        .map(str::to_string)
        .collect();
        table
            .columns
            .iter()
            .map(|c| {
                Row::new(
                    names.clone(),
                    vec![
                        Value::Text(c.name.clone()),
                        Value::Text(c.data_type.clone()),
                        c.char_len.map_or(Value::Null, Value::BigInt),
                        Value::Text(if c.not_null { "NO" } else { "YES" }.to_string()),
                        c.default.clone().map_or(Value::Null, Value::Text),
                        Value::Text("NO".to_string()),
                    ],
                )
            })
            .collect()
    }

    fn catalog_primary_key(&self, params: &[Value]) -> Vec<Row> {
        let Some(table) = params.first().and_then(Value::as_str).and_then(|n| self.tables.get(n))
        else {
            return Vec::new();
        };
        table
            .primary_key
            .iter()
            .map(|c| Row::new(vec!["column_name".into()], vec![Value::Text(c.clone())]))
            .collect()
    }
}

impl Connection for FakePostgres {
    fn query(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        let result = self.run(sql, params);
        async move {
            match result {
                Ok(rows) => Outcome::Ok(rows),
                Err(e) => Outcome::Err(e),
            }
        }
    }

    fn query_one(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Option<Row>, Error>> + Send {
        let result = self.run(sql, params);
        async move {
            match result {
                Ok(rows) => Outcome::Ok(rows.into_iter().next()),
                Err(e) => Outcome::Err(e),
            }
        }
    }

    fn execute(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        let result = self.run(sql, params);
        async move {
            match result {
                Ok(rows) => Outcome::Ok(rows.len().max(1) as u64),
                Err(e) => Outcome::Err(e),
            }
        }
    }

    fn execute_many(
        &self,
        _cx: &Cx,
        sql: &str,
        param_sets: &[Vec<Value>],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        let mut result = Ok(Vec::new());
        for params in param_sets {
            match self.run(sql, params) {
                Ok(rows) => {
                    if let Ok(all) = result.as_mut() {
                        all.extend(rows);
                    }
                }
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }
        async move {
            match result {
                Ok(rows) => Outcome::Ok(rows),
                Err(e) => Outcome::Err(e),
            }
        }
    }
}

pub fn unwrap_outcome<T>(outcome: Outcome<T, Error>) -> T {
    match outcome {
        Outcome::Ok(v) => v,
        Outcome::Err(e) => panic!("unexpected error: {e}"),
        Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
        Outcome::Panicked(p) => panic!("panicked: {p:?}"),
    }
}

pub fn expect_err<T: std::fmt::Debug>(outcome: Outcome<T, Error>) -> Error {
    match outcome {
        Outcome::Err(e) => e,
        other => panic!("expected an error, got {other:?}"),
    }
}
