//! In-process store backend.
//!
//! One `serde_json::Value` tree behind a mutex. Every write commits while
//! holding the lock and notifies watchers before releasing it, which gives
//! the two guarantees the engine leans on: concurrent writes to the same
//! path are serialized, and a subscriber observes commits in the order
//! they applied.
//!
//! Deletion follows the deployed backend's rules: writing `null` removes
//! the subtree and empty parent objects do not exist.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::{watch, Mutex};
use tracing::{debug, trace};

use echo_shared::ConnectionId;

use crate::backend::{StoreBackend, Subscription};
use crate::path::StorePath;
use crate::Result;

/// In-memory [`StoreBackend`]. Cheap to clone; clones share the tree.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    root: Value,
    watchers: Vec<Watcher>,
    hooks: HashMap<ConnectionId, Vec<(StorePath, Value)>>,
}

enum WatchKind {
    Subtree,
    Window { order_child: String, limit: usize },
}

impl WatchKind {
    fn view(&self, root: &Value, path: &StorePath) -> Value {
        match self {
            WatchKind::Subtree => value_at(root, path),
            WatchKind::Window { order_child, limit } => {
                let rows = ordered_children(node_at(root, path), order_child, *limit);
                Value::Array(rows.into_iter().map(|(_, v)| v).collect())
            }
        }
    }
}

struct Watcher {
    path: StorePath,
    kind: WatchKind,
    tx: watch::Sender<Value>,
}

impl Watcher {
    fn view(&self, root: &Value) -> Value {
        self.kind.view(root, &self.path)
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn attach(&self, path: &StorePath, kind: WatchKind) -> Subscription {
        let mut inner = self.inner.lock().await;
        let initial = kind.view(&inner.root, path);
        let (tx, rx) = watch::channel(initial);
        inner.watchers.push(Watcher {
            path: path.clone(),
            kind,
            tx,
        });
        debug!(path = %path, "subscription attached");
        Subscription::new(rx)
    }

    #[cfg(test)]
    async fn watcher_count(&self) -> usize {
        self.inner.lock().await.watchers.len()
    }
}

impl Inner {
    /// Apply a set of writes as one commit and notify overlapping
    /// watchers. Closed watchers are pruned here.
    fn commit(&mut self, updates: Vec<(StorePath, Value)>) {
        for (path, value) in &updates {
            trace!(path = %path, "write");
            write_at(&mut self.root, path, value.clone());
        }
        self.watchers.retain(|w| !w.tx.is_closed());
        for watcher in &self.watchers {
            if updates.iter().any(|(p, _)| p.overlaps(&watcher.path)) {
                let _ = watcher.tx.send(watcher.view(&self.root));
            }
        }
    }
}

impl StoreBackend for MemoryStore {
    async fn get(&self, path: &StorePath) -> Result<Value> {
        let inner = self.inner.lock().await;
        Ok(value_at(&inner.root, path))
    }

    async fn set(&self, path: &StorePath, value: Value) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.commit(vec![(path.clone(), value)]);
        Ok(())
    }

    async fn update(&self, updates: Vec<(StorePath, Value)>) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.commit(updates);
        Ok(())
    }

    async fn create(&self, path: &StorePath, value: Value) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        if node_at(&inner.root, path).is_some() {
            debug!(path = %path, "create skipped, path exists");
            return Ok(false);
        }
        inner.commit(vec![(path.clone(), value)]);
        Ok(true)
    }

    async fn query_last(
        &self,
        path: &StorePath,
        order_child: &str,
        limit: usize,
    ) -> Result<Vec<(String, Value)>> {
        let inner = self.inner.lock().await;
        Ok(ordered_children(
            node_at(&inner.root, path),
            order_child,
            limit,
        ))
    }

    async fn subscribe(&self, path: &StorePath) -> Result<Subscription> {
        Ok(self.attach(path, WatchKind::Subtree).await)
    }

    async fn subscribe_query(
        &self,
        path: &StorePath,
        order_child: &str,
        limit: usize,
    ) -> Result<Subscription> {
        Ok(self
            .attach(
                path,
                WatchKind::Window {
                    order_child: order_child.to_string(),
                    limit,
                },
            )
            .await)
    }

    async fn on_disconnect_update(
        &self,
        conn: ConnectionId,
        updates: Vec<(StorePath, Value)>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.hooks.insert(conn, updates);
        Ok(())
    }

    async fn disconnect(&self, conn: ConnectionId) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if let Some(updates) = inner.hooks.remove(&conn) {
            debug!(conn = %conn, writes = updates.len(), "applying disconnect hooks");
            inner.commit(updates);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tree helpers
// ---------------------------------------------------------------------------

fn node_at<'a>(root: &'a Value, path: &StorePath) -> Option<&'a Value> {
    let mut cur = root;
    for seg in path.segments() {
        cur = cur.as_object()?.get(seg)?;
    }
    Some(cur)
}

fn value_at(root: &Value, path: &StorePath) -> Value {
    node_at(root, path).cloned().unwrap_or(Value::Null)
}

fn write_at(root: &mut Value, path: &StorePath, value: Value) {
    if path.is_root() {
        *root = if value.is_null() { Value::Null } else { value };
        return;
    }
    if value.is_null() {
        remove_at(root, path.segments());
    } else {
        insert_at(root, path.segments(), value);
    }
}

fn insert_at(node: &mut Value, segments: &[String], value: Value) {
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    let Value::Object(map) = node else {
        return;
    };
    match segments {
        [leaf] => {
            map.insert(leaf.clone(), value);
        }
        [head, rest @ ..] => {
            let child = map
                .entry(head.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            insert_at(child, rest, value);
        }
        [] => unreachable!("root writes handled by write_at"),
    }
}

/// Remove the subtree at `segments`, pruning parents that become empty.
/// Returns whether `node` itself is now an empty object.
fn remove_at(node: &mut Value, segments: &[String]) -> bool {
    let Some(map) = node.as_object_mut() else {
        return false;
    };
    match segments {
        [leaf] => {
            map.remove(leaf);
        }
        [head, rest @ ..] => {
            if let Some(child) = map.get_mut(head) {
                if remove_at(child, rest) {
                    map.remove(head);
                }
            }
        }
        [] => {}
    }
    map.is_empty()
}

/// Children of an object node sorted ascending by a numeric child field,
/// ties broken by child key, truncated to the last `limit` entries.
fn ordered_children(
    node: Option<&Value>,
    order_child: &str,
    limit: usize,
) -> Vec<(String, Value)> {
    let Some(map) = node.and_then(Value::as_object) else {
        return Vec::new();
    };
    let mut rows: Vec<(String, Value)> = map.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    rows.sort_by(|(ka, va), (kb, vb)| {
        let oa = va.get(order_child).and_then(Value::as_i64).unwrap_or(0);
        let ob = vb.get(order_child).and_then(Value::as_i64).unwrap_or(0);
        oa.cmp(&ob).then_with(|| ka.cmp(kb))
    });
    if rows.len() > limit {
        rows.drain(..rows.len() - limit);
    }
    rows
}
