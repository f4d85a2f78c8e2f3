//! Document store: named collections of JSON documents keyed by id.
//!
//! Every mutation goes through a [`Batch`] which is applied all-or-nothing.
//! Single-document writes are simply batches of one.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// A typed document living in one collection.
pub trait Record: Serialize + DeserializeOwned {
    const COLLECTION: &'static str;
    fn id(&self) -> &str;
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    /// Create or replace the whole document.
    Set { collection: &'static str, id: String, doc: Value },
    /// Merge fields into the document, creating it when absent.
    Merge { collection: &'static str, id: String, fields: Map<String, Value> },
    /// Merge fields into an existing document. Fails the batch when absent.
    Update { collection: &'static str, id: String, fields: Map<String, Value> },
    Delete { collection: &'static str, id: String },
}

#[derive(Debug, Clone, Default)]
pub struct Batch {
    writes: Vec<Write>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set<R: Record>(&mut self, record: &R) -> Result<&mut Self> {
        let doc = serde_json::to_value(record)?;
        self.writes.push(Write::Set { collection: R::COLLECTION, id: record.id().to_string(), doc });
        Ok(self)
    }

    pub fn merge<R: Record>(&mut self, id: &str, fields: Value) -> Result<&mut Self> {
        let fields = into_fields(fields)?;
        self.writes.push(Write::Merge { collection: R::COLLECTION, id: id.to_string(), fields });
        Ok(self)
    }

    pub fn update<R: Record>(&mut self, id: &str, fields: Value) -> Result<&mut Self> {
        let fields = into_fields(fields)?;
        self.writes.push(Write::Update { collection: R::COLLECTION, id: id.to_string(), fields });
        Ok(self)
    }

    pub fn delete<R: Record>(&mut self, id: &str) -> &mut Self {
        self.writes.push(Write::Delete { collection: R::COLLECTION, id: id.to_string() });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn writes(&self) -> &[Write] {
        &self.writes
    }
}

fn into_fields(value: Value) -> Result<Map<String, Value>> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(Error::Commit(format!("field update must be an object, got {other}"))),
    }
}

/// The raw, untyped contract every backend fulfils.
pub trait DocumentStore {
    fn get_doc(&self, collection: &str, id: &str) -> Result<Option<Value>>;
    fn list_docs(&self, collection: &str) -> Result<Vec<Value>>;
    /// Apply every write in the batch, or none of them.
    fn commit(&self, batch: Batch) -> Result<()>;
    /// Live query: receives the current snapshot now and a fresh one after each
    /// commit that touches the collection.
    fn subscribe(&self, collection: &str) -> Receiver<Vec<Value>>;
}

/// Typed helpers over any [`DocumentStore`].
pub trait DocumentStoreExt: DocumentStore {
    fn get<R: Record>(&self, id: &str) -> Result<Option<R>> {
        match self.get_doc(R::COLLECTION, id)? {
            Some(doc) => Ok(Some(serde_json::from_value(doc)?)),
            None => Ok(None),
        }
    }

    fn fetch<R: Record>(&self, id: &str) -> Result<R> {
        self.get(id)?.ok_or_else(|| Error::NotFound { collection: R::COLLECTION, id: id.to_string() })
    }

    fn list<R: Record>(&self) -> Result<Vec<R>> {
        self.list_docs(R::COLLECTION)?
            .into_iter()
            .map(|doc| serde_json::from_value(doc).map_err(Error::from))
            .collect()
    }

    fn put<R: Record>(&self, record: &R) -> Result<()> {
        let mut batch = Batch::new();
        batch.set(record)?;
        self.commit(batch)
    }

    fn update<R: Record>(&self, id: &str, fields: Value) -> Result<()> {
        let mut batch = Batch::new();
        batch.update::<R>(id, fields)?;
        self.commit(batch)
    }

    fn remove<R: Record>(&self, id: &str) -> Result<()> {
        let mut batch = Batch::new();
        batch.delete::<R>(id);
        self.commit(batch)
    }
}

impl<S: DocumentStore + ?Sized> DocumentStoreExt for S {}

type Database = BTreeMap<String, BTreeMap<String, Value>>;

struct Watcher {
    collection: String,
    tx: Sender<Vec<Value>>,
}

/// Store kept in memory, optionally mirrored to a single JSON file.
///
/// The file is rewritten through a temp file and a rename, so a crash mid-write
/// leaves the previous snapshot in place.
pub struct JsonStore {
    path: Option<PathBuf>,
    db: Mutex<Database>,
    watchers: Mutex<Vec<Watcher>>,
}

impl JsonStore {
    pub fn in_memory() -> Self {
        JsonStore { path: None, db: Mutex::new(Database::new()), watchers: Mutex::new(Vec::new()) }
    }

    pub fn open(path: &Path) -> Result<Self> {
        let db = if path.exists() {
            let content = fs::read_to_string(path)?;
            if content.trim().is_empty() { Database::new() } else { serde_json::from_str(&content)? }
        } else {
            Database::new()
        };
        debug!(path = %path.display(), collections = db.len(), "opened document store");
        Ok(JsonStore {
            path: Some(path.to_path_buf()),
            db: Mutex::new(db),
            watchers: Mutex::new(Vec::new()),
        })
    }

    fn persist(&self, db: &Database) -> Result<()> {
        let Some(path) = &self.path else { return Ok(()) };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(db)?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    fn notify(&self, db: &Database, touched: &[&'static str]) {
        let mut watchers = self.watchers.lock().unwrap_or_else(PoisonError::into_inner);
        // Dropped receivers fall out here
        watchers.retain(|w| {
            if !touched.contains(&w.collection.as_str()) {
                return true;
            }
            w.tx.send(snapshot(db, &w.collection)).is_ok()
        });
    }
}

fn snapshot(db: &Database, collection: &str) -> Vec<Value> {
    db.get(collection).map(|docs| docs.values().cloned().collect()).unwrap_or_default()
}

fn apply(db: &mut Database, write: Write) -> Result<()> {
    match write {
        Write::Set { collection, id, doc } => {
            db.entry(collection.to_string()).or_default().insert(id, doc);
        }
        Write::Merge { collection, id, fields } => {
            let docs = db.entry(collection.to_string()).or_default();
            let doc = docs.entry(id.clone()).or_insert_with(|| Value::Object(Map::new()));
            merge_into(doc, fields, collection, &id)?;
        }
        Write::Update { collection, id, fields } => {
            let doc = db
                .get_mut(collection)
                .and_then(|docs| docs.get_mut(&id))
                .ok_or_else(|| Error::NotFound { collection, id: id.clone() })?;
            merge_into(doc, fields, collection, &id)?;
        }
        Write::Delete { collection, id } => {
            if let Some(docs) = db.get_mut(collection) {
                docs.remove(&id);
            }
        }
    }
    Ok(())
}

fn merge_into(doc: &mut Value, fields: Map<String, Value>, collection: &str, id: &str) -> Result<()> {
    let Value::Object(target) = doc else {
        return Err(Error::Commit(format!("{collection}/{id} is not an object")));
    };
    for (key, value) in fields {
        // Null clears the field entirely rather than storing null
        if value.is_null() {
            target.remove(&key);
        } else {
            target.insert(key, value);
        }
    }
    Ok(())
}

impl DocumentStore for JsonStore {
    fn get_doc(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        let db = self.db.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(db.get(collection).and_then(|docs| docs.get(id)).cloned())
    }

    fn list_docs(&self, collection: &str) -> Result<Vec<Value>> {
        let db = self.db.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(snapshot(&db, collection))
    }

    fn commit(&self, batch: Batch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut db = self.db.lock().unwrap_or_else(PoisonError::into_inner);

        let mut touched: Vec<&'static str> = Vec::new();
        let mut next = db.clone();
        let writes = batch.writes.len();
        for write in batch.writes {
            let collection = match &write {
                Write::Set { collection, .. }
                | Write::Merge { collection, .. }
                | Write::Update { collection, .. }
                | Write::Delete { collection, .. } => *collection,
            };
            if !touched.contains(&collection) {
                touched.push(collection);
            }
            apply(&mut next, write)?;
        }

        self.persist(&next)?;
        *db = next;
        info!(writes, collections = ?touched, "committed batch");
        self.notify(&db, &touched);
        Ok(())
    }

    fn subscribe(&self, collection: &str) -> Receiver<Vec<Value>> {
        let (tx, rx) = mpsc::channel();
        let db = self.db.lock().unwrap_or_else(PoisonError::into_inner);
        // Receiver is still in hand, so the initial send cannot fail
        let _ = tx.send(snapshot(&db, collection));
        self.watchers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Watcher { collection: collection.to_string(), tx });
        rx
    }
}
