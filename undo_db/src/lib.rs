//! Versioned key-value state with nested, reversible sessions.
//!
//! Every mutation is recorded in the innermost open session. A session that goes out of scope
//! without being committed restores the exact state it started from. Committing the outermost
//! session keeps its changes as a *retained layer* that [`UndoDatabase::pop_undo`] can reverse
//! later, which is how applied blocks are popped during fork switches. Committing a nested
//! session folds its changes into its parent, so they become reversible as part of the parent.
//!
//! The number of retained layers is bounded by [`UndoDatabase::set_retained_depth`].
//! Layers beyond that depth are forgotten, and their changes can no longer be reversed.

use core::{
    fmt::Debug,
    ops::{Deref, DerefMut, RangeBounds},
};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

use anyhow::{ensure, Result};
use im::OrdMap;
use thiserror::Error;

pub struct UndoDatabase<K, V> {
    objects: OrdMap<K, V>,
    // Retained layers followed by the layers of open sessions, oldest first.
    layers: VecDeque<UndoLayer<K, V>>,
    open_sessions: usize,
    retained_depth: usize,
}

impl<K: Ord + Clone + Debug, V: Clone> UndoDatabase<K, V> {
    /// Initial objects are not recorded in any layer and cannot be undone.
    #[must_use]
    pub fn new(objects: OrdMap<K, V>, retained_depth: usize) -> Self {
        Self {
            objects,
            layers: VecDeque::new(),
            open_sessions: 0,
            retained_depth,
        }
    }

    #[must_use]
    pub const fn objects(&self) -> &OrdMap<K, V> {
        &self.objects
    }

    #[must_use]
    pub fn get(&self, key: &K) -> Option<&V> {
        self.objects.get(key)
    }

    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        self.objects.contains_key(key)
    }

    pub fn range(&self, range: impl RangeBounds<K>) -> impl Iterator<Item = (&K, &V)> {
        self.objects.range(range)
    }

    #[must_use]
    pub const fn open_sessions(&self) -> usize {
        self.open_sessions
    }

    #[must_use]
    pub fn retained_layers(&self) -> usize {
        self.layers.len() - self.open_sessions
    }

    #[must_use]
    pub const fn retained_depth(&self) -> usize {
        self.retained_depth
    }

    pub fn set_retained_depth(&mut self, retained_depth: usize) {
        self.retained_depth = retained_depth;
        self.trim_retained_layers();
    }

    pub fn start_session(&mut self) -> Session<'_, K, V> {
        self.layers.push_back(UndoLayer::default());
        self.open_sessions += 1;

        Session {
            depth: self.open_sessions,
            database: self,
            finished: false,
        }
    }

    /// Reattaches a session previously detached with [`Session::detach`].
    ///
    /// # Panics
    ///
    /// Panics if sessions were opened on top of the detached one and are still open.
    pub fn resume(&mut self, detached: DetachedSession) -> Session<'_, K, V> {
        assert_eq!(
            detached.depth, self.open_sessions,
            "only the innermost open session can be resumed",
        );

        Session {
            depth: detached.depth,
            database: self,
            finished: false,
        }
    }

    /// Reverses the newest retained layer.
    pub fn pop_undo(&mut self) -> Result<()> {
        ensure!(self.open_sessions == 0, Error::SessionOpen);

        let layer = self.layers.pop_back().ok_or(Error::NothingToUndo)?;
        self.revert(layer);

        Ok(())
    }

    pub fn insert(&mut self, key: K, value: V) -> Result<()> {
        ensure!(
            !self.objects.contains_key(&key),
            Error::KeyExists {
                key: format!("{key:?}"),
            },
        );

        let layer = self.top_layer()?;

        if let Some(original) = layer.removed_values.remove(&key) {
            layer.old_values.insert(key.clone(), original);
        } else {
            layer.new_keys.insert(key.clone());
        }

        self.objects.insert(key, value);

        Ok(())
    }

    pub fn modify<T>(&mut self, key: &K, modify: impl FnOnce(&mut V) -> T) -> Result<T> {
        let Some(current) = self.objects.get(key) else {
            return Err(Error::KeyNotFound {
                key: format!("{key:?}"),
            }
            .into());
        };

        let current = current.clone();
        let layer = self.top_layer()?;

        if !layer.new_keys.contains(key) && !layer.old_values.contains_key(key) {
            layer.old_values.insert(key.clone(), current);
        }

        let value = self
            .objects
            .get_mut(key)
            .expect("presence of key was checked above");

        Ok(modify(value))
    }

    pub fn upsert(&mut self, key: K, value: V) -> Result<()> {
        if self.objects.contains_key(&key) {
            self.modify(&key, |current| *current = value)
        } else {
            self.insert(key, value)
        }
    }

    pub fn remove(&mut self, key: &K) -> Result<V> {
        let Some(current) = self.objects.get(key) else {
            return Err(Error::KeyNotFound {
                key: format!("{key:?}"),
            }
            .into());
        };

        let current = current.clone();
        let layer = self.top_layer()?;

        if !layer.new_keys.remove(key) {
            let original = layer.old_values.remove(key).unwrap_or_else(|| current.clone());
            layer.removed_values.insert(key.clone(), original);
        }

        self.objects.remove(key);

        Ok(current)
    }

    fn top_layer(&mut self) -> Result<&mut UndoLayer<K, V>> {
        ensure!(self.open_sessions > 0, Error::NoOpenSession);

        Ok(self
            .layers
            .back_mut()
            .expect("an open session always has a layer"))
    }

    fn revert(&mut self, layer: UndoLayer<K, V>) {
        let UndoLayer {
            old_values,
            new_keys,
            removed_values,
        } = layer;

        for key in new_keys {
            self.objects.remove(&key);
        }

        for (key, value) in old_values.into_iter().chain(removed_values) {
            self.objects.insert(key, value);
        }
    }

    fn close_top_session(&mut self) -> UndoLayer<K, V> {
        self.open_sessions -= 1;

        self.layers
            .pop_back()
            .expect("an open session always has a layer")
    }

    fn trim_retained_layers(&mut self) {
        while self.retained_layers() > self.retained_depth {
            self.layers.pop_front();
        }
    }
}

/// Changes recorded while a session was open, expressed as the state needed to reverse them.
///
/// A key appears in at most one of the three collections.
struct UndoLayer<K, V> {
    // Values of keys that existed when the layer started and have been modified since.
    old_values: BTreeMap<K, V>,
    // Keys created in this layer.
    new_keys: BTreeSet<K>,
    // Values of keys that existed when the layer started and have been removed since.
    removed_values: BTreeMap<K, V>,
}

impl<K, V> Default for UndoLayer<K, V> {
    fn default() -> Self {
        Self {
            old_values: BTreeMap::new(),
            new_keys: BTreeSet::new(),
            removed_values: BTreeMap::new(),
        }
    }
}

impl<K: Ord + Clone, V> UndoLayer<K, V> {
    // Folds `child` (which started after `self`) into `self` so that reverting the result
    // restores the state from before `self` started.
    fn absorb(&mut self, child: Self) {
        let Self {
            old_values,
            new_keys,
            removed_values,
        } = child;

        for (key, value) in old_values {
            if !self.new_keys.contains(&key) && !self.old_values.contains_key(&key) {
                self.old_values.insert(key, value);
            }
        }

        for key in new_keys {
            if let Some(original) = self.removed_values.remove(&key) {
                self.old_values.insert(key, original);
            } else {
                self.new_keys.insert(key);
            }
        }

        for (key, value) in removed_values {
            if self.new_keys.remove(&key) {
                continue;
            }

            let original = self.old_values.remove(&key).unwrap_or(value);
            self.removed_values.insert(key, original);
        }
    }
}

/// Guard for one open layer. Dropping it without calling [`Session::commit`],
/// [`Session::merge`] or [`Session::detach`] reverts every change made through it.
pub struct Session<'database, K: Ord + Clone + Debug, V: Clone> {
    database: &'database mut UndoDatabase<K, V>,
    depth: usize,
    finished: bool,
}

impl<K: Ord + Clone + Debug, V: Clone> Deref for Session<'_, K, V> {
    type Target = UndoDatabase<K, V>;

    fn deref(&self) -> &Self::Target {
        self.database
    }
}

impl<K: Ord + Clone + Debug, V: Clone> DerefMut for Session<'_, K, V> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.database
    }
}

impl<K: Ord + Clone + Debug, V: Clone> Drop for Session<'_, K, V> {
    fn drop(&mut self) {
        if !self.finished {
            self.revert_layer();
        }
    }
}

impl<K: Ord + Clone + Debug, V: Clone> Session<'_, K, V> {
    /// Keeps the changes.
    ///
    /// The outermost session becomes a retained layer.
    /// A nested session is folded into its parent.
    pub fn commit(mut self) {
        self.assert_innermost();
        self.finished = true;

        let layer = self.database.close_top_session();

        if self.depth == 1 {
            self.database.layers.push_back(layer);
            self.database.trim_retained_layers();
        } else {
            self.absorb_into_parent(layer);
        }
    }

    /// Folds the changes into the layer beneath, whether that belongs to an open session or is
    /// a retained layer. Without a layer beneath this is the same as [`Session::commit`].
    pub fn merge(mut self) {
        self.assert_innermost();
        self.finished = true;

        let layer = self.database.close_top_session();

        if self.database.layers.is_empty() {
            self.database.layers.push_back(layer);
            self.database.trim_retained_layers();
        } else {
            self.absorb_into_parent(layer);
        }
    }

    pub fn undo(mut self) {
        self.finished = true;
        self.revert_layer();
    }

    /// Leaves the session open without borrowing the database.
    /// Use [`UndoDatabase::resume`] to continue it.
    #[must_use]
    pub fn detach(mut self) -> DetachedSession {
        self.assert_innermost();
        self.finished = true;

        DetachedSession { depth: self.depth }
    }

    fn absorb_into_parent(&mut self, layer: UndoLayer<K, V>) {
        self.database
            .layers
            .back_mut()
            .expect("caller checked that a layer exists beneath")
            .absorb(layer);
    }

    fn revert_layer(&mut self) {
        self.assert_innermost();

        let layer = self.database.close_top_session();
        self.database.revert(layer);
    }

    fn assert_innermost(&self) {
        assert_eq!(
            self.depth, self.database.open_sessions,
            "sessions must be closed in the reverse order they were opened",
        );
    }
}

/// An open session that does not borrow the database.
///
/// Dropping it leaves the layer open. Resume it and drop the resulting [`Session`] to revert it.
#[must_use]
#[derive(Debug)]
pub struct DetachedSession {
    depth: usize,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("state can only be mutated inside a session")]
    NoOpenSession,
    #[error("retained layers cannot be popped while a session is open")]
    SessionOpen,
    #[error("no retained layers left to undo")]
    NothingToUndo,
    #[error("object already exists: {key}")]
    KeyExists { key: String },
    #[error("object not found: {key}")]
    KeyNotFound { key: String },
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    type Database = UndoDatabase<u32, &'static str>;

    fn database() -> Database {
        UndoDatabase::new(OrdMap::from(vec![(1_u32, "one"), (2_u32, "two")]), 10)
    }

    #[test]
    fn mutations_outside_sessions_are_rejected() {
        let mut database = database();
        let original = database.objects().clone();

        let error = database
            .insert(3, "three")
            .expect_err("inserting without a session should fail");

        assert!(matches!(
            error.downcast_ref::<Error>(),
            Some(Error::NoOpenSession),
        ));
        assert_eq!(database.objects(), &original);
    }

    #[test]
    fn dropped_session_restores_original_state() -> Result<()> {
        let mut database = database();
        let original = database.objects().clone();

        {
            let mut session = database.start_session();
            session.insert(3, "three")?;
            session.modify(&1, |value| *value = "uno")?;
            session.remove(&2)?;
            session.modify(&3, |value| *value = "tres")?;
            session.insert(2, "dos")?;
        }

        assert_eq!(database.objects(), &original);
        assert_eq!(database.open_sessions(), 0);
        assert_eq!(database.retained_layers(), 0);

        Ok(())
    }

    #[test]
    fn committed_outermost_session_can_be_popped() -> Result<()> {
        let mut database = database();
        let original = database.objects().clone();

        let mut session = database.start_session();
        session.modify(&1, |value| *value = "uno")?;
        session.insert(3, "three")?;
        session.commit();

        assert_eq!(database.get(&1), Some(&"uno"));
        assert_eq!(database.retained_layers(), 1);

        database.pop_undo()?;

        assert_eq!(database.objects(), &original);
        assert_eq!(database.retained_layers(), 0);

        Ok(())
    }

    #[test]
    fn pop_undo_fails_without_layers_or_with_open_session() {
        let mut database = database();

        let error = database
            .pop_undo()
            .expect_err("nothing has been committed yet");

        assert!(matches!(
            error.downcast_ref::<Error>(),
            Some(Error::NothingToUndo),
        ));

        let session = database.start_session();
        let detached = session.detach();

        let error = database
            .pop_undo()
            .expect_err("a session is still open");

        assert!(matches!(
            error.downcast_ref::<Error>(),
            Some(Error::SessionOpen),
        ));

        database.resume(detached).undo();
    }

    // Each case mutates key 1 in the parent, then in the child, then drops the parent.
    #[test_case(&[Step::Modify("a")], &[Step::Modify("b")]; "modified twice")]
    #[test_case(&[Step::Remove], &[Step::Insert("b")]; "removed then recreated")]
    #[test_case(&[Step::Modify("a")], &[Step::Remove]; "modified then removed")]
    #[test_case(&[Step::Remove, Step::Insert("a")], &[Step::Remove]; "recreated then removed")]
    #[test_case(&[], &[Step::Remove, Step::Insert("b"), Step::Modify("c")]; "churn in child")]
    fn merged_child_is_reverted_with_parent(parent: &[Step], child: &[Step]) -> Result<()> {
        let mut database = database();
        let original = database.objects().clone();

        {
            let mut parent_session = database.start_session();
            apply(&mut parent_session, parent)?;

            let mut child_session = parent_session.start_session();
            apply(&mut child_session, child)?;
            child_session.merge();

            assert_eq!(parent_session.open_sessions(), 1);
        }

        assert_eq!(database.objects(), &original);

        Ok(())
    }

    #[test]
    fn created_key_removed_in_child_leaves_nothing_to_revert() -> Result<()> {
        let mut database = database();
        let original = database.objects().clone();

        {
            let mut parent_session = database.start_session();
            parent_session.insert(5, "five")?;

            let mut child_session = parent_session.start_session();
            child_session.remove(&5)?;
            child_session.commit();

            assert!(!parent_session.contains_key(&5));
        }

        assert_eq!(database.objects(), &original);

        Ok(())
    }

    #[test]
    fn dropped_child_keeps_parent_changes() -> Result<()> {
        let mut database = database();

        let mut parent_session = database.start_session();
        parent_session.modify(&1, |value| *value = "uno")?;

        {
            let mut child_session = parent_session.start_session();
            child_session.modify(&1, |value| *value = "eins")?;
            child_session.insert(9, "nine")?;
        }

        assert_eq!(parent_session.get(&1), Some(&"uno"));
        assert!(!parent_session.contains_key(&9));

        parent_session.commit();

        assert_eq!(database.get(&1), Some(&"uno"));

        Ok(())
    }

    #[test]
    fn retained_depth_bounds_reversible_layers() -> Result<()> {
        let mut database = database();
        database.set_retained_depth(2);

        for key in 10..15 {
            let mut session = database.start_session();
            session.insert(key, "block")?;
            session.commit();
        }

        assert_eq!(database.retained_layers(), 2);

        database.pop_undo()?;
        database.pop_undo()?;
        database.pop_undo().expect_err("older layers were forgotten");

        assert!(database.contains_key(&12));
        assert!(!database.contains_key(&13));

        database.set_retained_depth(0);

        assert_eq!(database.retained_layers(), 0);

        Ok(())
    }

    #[test]
    fn detached_session_survives_until_resumed() -> Result<()> {
        let mut database = database();

        let mut session = database.start_session();
        session.insert(3, "three")?;
        let detached = session.detach();

        assert!(database.contains_key(&3));
        assert_eq!(database.open_sessions(), 1);

        drop(database.resume(detached));

        assert!(!database.contains_key(&3));
        assert_eq!(database.open_sessions(), 0);

        Ok(())
    }

    #[test]
    fn duplicate_insert_and_missing_modify_are_rejected() {
        let mut database = database();
        let mut session = database.start_session();

        session
            .insert(1, "again")
            .expect_err("key 1 already exists");
        session
            .modify(&7, |_| ())
            .expect_err("key 7 does not exist");
        session.remove(&7).expect_err("key 7 does not exist");
    }

    #[derive(Debug)]
    enum Step {
        Insert(&'static str),
        Modify(&'static str),
        Remove,
    }

    fn apply(database: &mut Database, steps: &[Step]) -> Result<()> {
        for step in steps {
            match *step {
                Step::Insert(value) => database.insert(1, value)?,
                Step::Modify(value) => database.modify(&1, |current| *current = value)?,
                Step::Remove => {
                    database.remove(&1)?;
                }
            }
        }

        Ok(())
    }
}
