use serde::Serialize;

use crate::types::{Document, DocumentKey};

/// Options of [`WriteBatch::set`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SetOptions {
    /// Merges the given fields into an existing document instead of replacing it.
    pub merge: bool,
}

impl SetOptions {
    pub fn merge() -> Self {
        Self { merge: true }
    }
}

/// A single recorded write.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Mutation {
    /// Creates the document, replacing or merging into an existing one.
    Set {
        key: DocumentKey,
        fields: Document,
        merge: bool,
    },
    /// Merges fields into an existing document; fails when the document is missing.
    Update { key: DocumentKey, fields: Document },
}

impl Mutation {
    pub fn key(&self) -> &DocumentKey {
        match self {
            Mutation::Set { key, .. } | Mutation::Update { key, .. } => key,
        }
    }
}

/// Writes committed atomically by [`crate::store::DocumentStore::commit`].
///
/// A batch only records data, so committing it again after a failed attempt re-sends the same
/// writes instead of re-running the closures that produced them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WriteBatch {
    mutations: Vec<Mutation>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: DocumentKey, fields: Document, options: SetOptions) -> &mut Self {
        self.mutations.push(Mutation::Set {
            key,
            fields,
            merge: options.merge,
        });
        self
    }

    pub fn update(&mut self, key: DocumentKey, fields: Document) -> &mut Self {
        self.mutations.push(Mutation::Update { key, fields });
        self
    }

    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }

    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }
}

/// One unit of work submitted to the coordinator. It records its mutations into the batch it is
/// assigned to.
pub type WriteOperation = Box<dyn FnOnce(&mut WriteBatch) + Send + 'static>;
