use std::{
    cmp::Ordering,
    collections::HashMap,
    sync::{Arc, RwLock},
};

use serde_json::Value as JsonValue;
use tracing::trace;

use crate::{
    ChatflowError, Result,
    store::{DbCollection, PageData, db::mem::DbDocument, query::Query},
};

/// In-memory collection keeping rows in insertion order.
#[derive(Debug)]
pub struct Collect<T> {
    name: String,
    rows: Arc<RwLock<Vec<T>>>,
}

impl<T> Collect<T>
where
    T: DbDocument + Clone + Send + Sync,
{
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            rows: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Run `f` with exclusive access to all rows.
    pub fn with_rows<R>(
        &self,
        f: impl FnOnce(&mut Vec<T>) -> R,
    ) -> R {
        let mut rows = self.rows.write().unwrap();
        f(&mut rows)
    }

    fn check_unique(
        &self,
        rows: &[T],
        data: &T,
    ) -> Result<()> {
        let keys = data.unique_keys();
        if keys.is_empty() {
            return Ok(());
        }
        for row in rows.iter().filter(|r| r.id() != data.id()) {
            if let Some(key) = row.unique_keys().into_iter().find(|k| keys.contains(k)) {
                return Err(ChatflowError::Store(format!("unique constraint violated in {}: {}", self.name, key)));
            }
        }
        Ok(())
    }
}

fn matches(
    doc: &HashMap<String, JsonValue>,
    query: &Query,
) -> bool {
    query.filters().iter().all(|(key, value)| doc.get(key).unwrap_or(&JsonValue::Null) == value)
}

fn compare(
    a: &JsonValue,
    b: &JsonValue,
) -> Ordering {
    match (a, b) {
        (JsonValue::Number(a), JsonValue::Number(b)) => a.as_f64().unwrap_or_default().total_cmp(&b.as_f64().unwrap_or_default()),
        (JsonValue::String(a), JsonValue::String(b)) => a.cmp(b),
        (JsonValue::Bool(a), JsonValue::Bool(b)) => a.cmp(b),
        (JsonValue::Null, JsonValue::Null) => Ordering::Equal,
        (JsonValue::Null, _) => Ordering::Less,
        (_, JsonValue::Null) => Ordering::Greater,
        _ => a.to_string().cmp(&b.to_string()),
    }
}

impl<T> DbCollection for Collect<T>
where
    T: DbDocument + Clone + Send + Sync,
{
    type Item = T;

    fn exists(
        &self,
        id: &str,
    ) -> Result<bool> {
        trace!("{}::exists({})", self.name, id);
        Ok(self.rows.read().unwrap().iter().any(|r| r.id() == id))
    }

    fn find(
        &self,
        id: &str,
    ) -> Result<Self::Item> {
        trace!("{}::find({})", self.name, id);
        self.rows.read().unwrap().iter().find(|r| r.id() == id).cloned().ok_or(ChatflowError::NotFound(format!("{} '{}'", self.name, id)))
    }

    fn query(
        &self,
        query: &Query,
    ) -> Result<PageData<Self::Item>> {
        trace!("{}::query({:?})", self.name, query);
        let rows = self.rows.read().unwrap();
        let mut docs = Vec::new();
        for row in rows.iter() {
            let doc = row.doc()?;
            if matches(&doc, query) {
                docs.push((doc, row));
            }
        }

        for (key, rev) in query.orders().iter().rev() {
            docs.sort_by(|(a, _), (b, _)| {
                let ord = compare(a.get(key).unwrap_or(&JsonValue::Null), b.get(key).unwrap_or(&JsonValue::Null));
                if *rev { ord.reverse() } else { ord }
            });
        }

        let count = docs.len();
        let rows = docs.into_iter().skip(query.offset()).take(query.limit()).map(|(_, row)| row.clone()).collect::<Vec<_>>();
        Ok(PageData {
            count,
            page_num: query.offset() / query.limit() + 1,
            page_count: count.div_ceil(query.limit()),
            page_size: query.limit(),
            rows,
        })
    }

    fn create(
        &self,
        data: &Self::Item,
    ) -> Result<bool> {
        trace!("{}::create({})", self.name, data.id());
        let mut rows = self.rows.write().unwrap();
        if rows.iter().any(|r| r.id() == data.id()) {
            return Err(ChatflowError::Store(format!("duplicate id in {}: {}", self.name, data.id())));
        }
        self.check_unique(&rows, data)?;
        rows.push(data.clone());
        Ok(true)
    }

    fn update(
        &self,
        data: &Self::Item,
    ) -> Result<bool> {
        trace!("{}::update({})", self.name, data.id());
        let mut rows = self.rows.write().unwrap();
        self.check_unique(&rows, data)?;
        match rows.iter_mut().find(|r| r.id() == data.id()) {
            Some(row) => {
                *row = data.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn delete(
        &self,
        id: &str,
    ) -> Result<bool> {
        trace!("{}::delete({})", self.name, id);
        let mut rows = self.rows.write().unwrap();
        let before = rows.len();
        rows.retain(|r| r.id() != id);
        Ok(rows.len() < before)
    }
}
