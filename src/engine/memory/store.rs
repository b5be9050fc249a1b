use crate::core::{CrudError, KeyValue, Result, Row};
use crate::schema::SchemaNode;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;
use uuid::Uuid;

use super::MemoryEngine;

/// Primary-key values of a stored row, in primary-column order.
pub(crate) type RowKey = Vec<KeyValue>;

pub(crate) fn row_key(node: &SchemaNode, row: &Row) -> Result<RowKey> {
    node.primary_columns()
        .iter()
        .map(|column| {
            let value = KeyValue::from_json(row.get(column));
            if value.is_null() {
                return Err(CrudError::store(format!(
                    "Row of {} has no value for primary column {column}",
                    node.name()
                )));
            }
            Ok(value)
        })
        .collect()
}

/// Rows of one table, ordered by primary key.
#[derive(Debug, Clone, Default)]
pub(crate) struct Table {
    rows: BTreeMap<RowKey, Row>,
}

impl Table {
    pub fn rows(&self) -> impl Iterator<Item = &Row> {
        self.rows.values()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&RowKey, &Row)> {
        self.rows.iter()
    }

    pub fn get(&self, key: &RowKey) -> Option<&Row> {
        self.rows.get(key)
    }

    fn put(&mut self, key: RowKey, row: Row) {
        self.rows.insert(key, row);
    }

    fn delete(&mut self, key: &RowKey) -> bool {
        self.rows.remove(key).is_some()
    }
}

#[derive(Debug, Clone)]
enum Change {
    Put { table: String, key: RowKey, row: Row },
    Delete { table: String, key: RowKey },
}

#[derive(Debug, Default)]
struct TxState {
    /// Working copies of the tables this transaction touched
    tables: HashMap<String, Table>,
    journal: Vec<Change>,
    finished: bool,
}

/// Handle to an open transaction of a [`MemoryStore`].
///
/// Writes go to per-transaction working copies and are replayed onto the
/// store on commit. Clones share the same transaction.
#[derive(Clone)]
pub struct MemoryTx {
    id: Uuid,
    state: Arc<Mutex<TxState>>,
}

impl MemoryTx {
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl fmt::Debug for MemoryTx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryTx").field("id", &self.id).finish()
    }
}

/// Read view: a transaction's working copies over the committed tables.
pub(crate) struct View<'a> {
    committed: &'a HashMap<String, Table>,
    working: Option<&'a HashMap<String, Table>>,
}

impl<'a> View<'a> {
    pub fn table(&self, name: &str) -> Option<&'a Table> {
        self.working
            .and_then(|tables| tables.get(name))
            .or_else(|| self.committed.get(name))
    }
}

pub(crate) struct TxWriter<'a> {
    committed: &'a HashMap<String, Table>,
    state: &'a mut TxState,
    sequences: &'a std::sync::Mutex<HashMap<String, i64>>,
}

impl TxWriter<'_> {
    pub fn view(&self) -> View<'_> {
        View {
            committed: self.committed,
            working: Some(&self.state.tables),
        }
    }

    fn working_table(&mut self, table: &str) -> &mut Table {
        let committed = self.committed;
        self.state
            .tables
            .entry(table.to_string())
            .or_insert_with(|| committed.get(table).cloned().unwrap_or_default())
    }

    pub fn put(&mut self, table: &str, key: RowKey, row: Row) {
        self.working_table(table).put(key.clone(), row.clone());
        self.state.journal.push(Change::Put {
            table: table.to_string(),
            key,
            row,
        });
    }

    pub fn delete(&mut self, table: &str, key: RowKey) -> bool {
        if !self.working_table(table).delete(&key) {
            return false;
        }
        self.state.journal.push(Change::Delete {
            table: table.to_string(),
            key,
        });
        true
    }

    /// Next value of the `table.column` sequence, never below the largest
    /// integer already stored in that column.
    pub fn next_id(&mut self, table: &str, column: &str) -> Result<i64> {
        let floor = self
            .view()
            .table(table)
            .and_then(|table| {
                table
                    .rows()
                    .filter_map(|row| row.get(column).and_then(|value| value.as_i64()))
                    .max()
            })
            .unwrap_or(0);

        let mut sequences = self.sequences.lock()?;
        let sequence = sequences.entry(format!("{table}.{column}")).or_insert(0);
        *sequence = (*sequence).max(floor) + 1;
        Ok(*sequence)
    }
}

#[derive(Default)]
struct StoreInner {
    tables: RwLock<HashMap<String, Table>>,
    sequences: std::sync::Mutex<HashMap<String, i64>>,
}

/// In-memory relational store keyed by schema-node name.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<StoreInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Query engine for one entity of this store.
    pub fn engine<A>(&self, node: Arc<SchemaNode>) -> MemoryEngine<A> {
        MemoryEngine::new(self.clone(), node)
    }

    pub fn begin(&self) -> MemoryTx {
        let tx = MemoryTx {
            id: Uuid::new_v4(),
            state: Arc::new(Mutex::new(TxState::default())),
        };
        debug!(tx = %tx.id, "memory transaction started");
        tx
    }

    pub async fn commit(&self, tx: &MemoryTx) -> Result<()> {
        let mut state = tx.state.lock().await;
        if state.finished {
            return Err(CrudError::store(format!(
                "Transaction {} is no longer active",
                tx.id
            )));
        }

        let mut tables = self.inner.tables.write().await;
        let changes = state.journal.len();
        for change in state.journal.drain(..) {
            match change {
                Change::Put { table, key, row } => tables.entry(table).or_default().put(key, row),
                Change::Delete { table, key } => {
                    if let Some(table) = tables.get_mut(&table) {
                        table.delete(&key);
                    }
                }
            }
        }
        state.tables.clear();
        state.finished = true;

        debug!(tx = %tx.id, changes, "memory transaction committed");
        Ok(())
    }

    pub async fn rollback(&self, tx: &MemoryTx) -> Result<()> {
        let mut state = tx.state.lock().await;
        if state.finished {
            return Err(CrudError::store(format!(
                "Transaction {} is no longer active",
                tx.id
            )));
        }

        let discarded = state.journal.len();
        state.journal.clear();
        state.tables.clear();
        state.finished = true;

        debug!(tx = %tx.id, discarded, "memory transaction rolled back");
        Ok(())
    }

    /// Committed rows of `table`, in primary-key order.
    pub async fn rows(&self, table: &str) -> Vec<Row> {
        self.inner
            .tables
            .read()
            .await
            .get(table)
            .map(|table| table.rows().cloned().collect())
            .unwrap_or_default()
    }

    /// Writes rows straight into `node`'s table, filling generated columns.
    pub async fn seed(&self, node: &SchemaNode, rows: Vec<Row>) -> Result<Vec<Row>> {
        let tx = self.begin();
        let seeded = self
            .write(&tx, |writer| {
                let mut seeded = Vec::with_capacity(rows.len());
                for mut row in rows {
                    for column in node.columns() {
                        let missing = row.get(&column.name).is_none_or(|value| value.is_null());
                        if column.generated && missing {
                            let id = writer.next_id(node.name(), &column.name)?;
                            row.insert(column.name.clone(), id.into());
                        }
                    }
                    let key = row_key(node, &row)?;
                    writer.put(node.name(), key, row.clone());
                    seeded.push(row);
                }
                Ok(seeded)
            })
            .await?;
        self.commit(&tx).await?;
        Ok(seeded)
    }

    pub(crate) async fn read<T>(
        &self,
        tx: Option<&MemoryTx>,
        read: impl FnOnce(View<'_>) -> Result<T>,
    ) -> Result<T> {
        match tx {
            Some(tx) => {
                let state = tx.state.lock().await;
                if state.finished {
                    return Err(CrudError::store(format!(
                        "Transaction {} is no longer active",
                        tx.id
                    )));
                }
                let committed = self.inner.tables.read().await;
                read(View {
                    committed: &*committed,
                    working: Some(&state.tables),
                })
            }
            None => {
                let committed = self.inner.tables.read().await;
                read(View {
                    committed: &*committed,
                    working: None,
                })
            }
        }
    }

    pub(crate) async fn write<T>(
        &self,
        tx: &MemoryTx,
        write: impl FnOnce(&mut TxWriter<'_>) -> Result<T>,
    ) -> Result<T> {
        let mut state = tx.state.lock().await;
        if state.finished {
            return Err(CrudError::store(format!(
                "Transaction {} is no longer active",
                tx.id
            )));
        }
        let committed = self.inner.tables.read().await;
        let mut writer = TxWriter {
            committed: &*committed,
            state: &mut *state,
            sequences: &self.inner.sequences,
        };
        write(&mut writer)
    }
}
