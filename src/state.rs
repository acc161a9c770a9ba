//! Schema-checked state management for workflow runs.
//!
//! Each run owns a [`RunState`]: a mapping from declared field names to
//! values, mutated exclusively by merging the partial updates that steps
//! return. The set of legal field names is fixed up front by a
//! [`StateSchema`] attached to the graph definition; writing an undeclared
//! field is a contract violation surfaced as [`StateError::UndeclaredField`].
//!
//! # Core Types
//!
//! - [`StateSchema`]: the declared field set (built once, shared via `Arc`)
//! - [`StateUpdate`]: a partial update touching only the fields a step changes
//! - [`RunState`]: the mutable per-run container
//! - [`StateSnapshot`]: an immutable deep copy handed to steps and checkpoints
//!
//! # Merge semantics
//!
//! `merge` is a shallow union-merge: fields named in the update are
//! overwritten, all other fields are left untouched, and nothing is ever
//! implicitly cleared. Updates touching disjoint field sets therefore commute.
//!
//! # Examples
//!
//! ```rust
//! use draftflow::state::{RunState, StateSchema, StateUpdate};
//! use std::sync::Arc;
//!
//! let schema = Arc::new(
//!     StateSchema::builder()
//!         .field("email_text")
//!         .field("label")
//!         .build(),
//! );
//!
//! let mut state = RunState::new(schema);
//! assert_eq!(state.text("label"), "");
//!
//! state
//!     .merge(StateUpdate::new().set_text("label", "Accepted"))
//!     .unwrap();
//! assert_eq!(state.text("label"), "Accepted");
//!
//! // Snapshots are independent of later mutation.
//! let snapshot = state.snapshot();
//! state
//!     .merge(StateUpdate::new().set_text("label", "Rejected"))
//!     .unwrap();
//! assert_eq!(snapshot.text("label"), "Accepted");
//! ```

use miette::Diagnostic;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// A single state field value: free text or a list of text entries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    List(Vec<String>),
}

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        FieldValue::Text(value.into())
    }

    pub fn list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FieldValue::List(items.into_iter().map(Into::into).collect())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            FieldValue::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            FieldValue::List(items) => Some(items),
            FieldValue::Text(_) => None,
        }
    }
}

/// Errors from state operations.
///
/// Reading never fails; only merging a field outside the declared schema is
/// an error.
#[derive(Debug, Error, Diagnostic)]
pub enum StateError {
    #[error("undeclared state field: {field}")]
    #[diagnostic(
        code(draftflow::state::undeclared_field),
        help("Declare the field in the graph's StateSchema, or fix the step that writes it.")
    )]
    UndeclaredField { field: String },
}

/// The fixed, known-in-advance set of field names a graph's runs may use.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StateSchema {
    fields: FxHashSet<String>,
}

impl StateSchema {
    pub fn builder() -> StateSchemaBuilder {
        StateSchemaBuilder::default()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains(field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(String::as_str)
    }
}

/// Builder for [`StateSchema`].
#[derive(Debug, Default)]
pub struct StateSchemaBuilder {
    fields: FxHashSet<String>,
}

impl StateSchemaBuilder {
    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.fields.insert(name.into());
        self
    }

    pub fn fields<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn build(self) -> StateSchema {
        StateSchema {
            fields: self.fields,
        }
    }
}

/// A partial state update: only the fields a step changes.
///
/// Unnamed fields are left untouched by `merge`; there is no way to clear a
/// field through an update.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StateUpdate {
    changes: FxHashMap<String, FieldValue>,
}

impl StateUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: impl Into<String>, value: FieldValue) -> Self {
        self.changes.insert(field.into(), value);
        self
    }

    pub fn set_text(self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(field, FieldValue::text(value))
    }

    pub fn set_list<I, S>(self, field: impl Into<String>, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set(field, FieldValue::list(items))
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.changes.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Mutable state container for one run.
///
/// Owned exclusively by the executor driving the run. Steps receive
/// [`StateSnapshot`]s, never the container itself.
#[derive(Clone, Debug)]
pub struct RunState {
    schema: Arc<StateSchema>,
    fields: FxHashMap<String, FieldValue>,
    version: u32,
}

const EMPTY_LIST: &[String] = &[];

impl RunState {
    /// Create an empty container bound to a schema.
    pub fn new(schema: Arc<StateSchema>) -> Self {
        Self {
            schema,
            fields: FxHashMap::default(),
            version: 1,
        }
    }

    /// Create a container pre-populated with caller-supplied seed fields.
    ///
    /// Seed fields are validated against the schema exactly like a merge.
    pub fn seeded(schema: Arc<StateSchema>, seed: StateUpdate) -> Result<Self, StateError> {
        let mut state = Self::new(schema);
        state.merge(seed)?;
        Ok(state)
    }

    /// Read a text field; unset (or list-typed) fields read as `""`.
    pub fn text(&self, field: &str) -> &str {
        self.fields
            .get(field)
            .and_then(FieldValue::as_text)
            .unwrap_or("")
    }

    /// Read a list field; unset (or text-typed) fields read as `&[]`.
    pub fn list(&self, field: &str) -> &[String] {
        self.fields
            .get(field)
            .and_then(FieldValue::as_list)
            .unwrap_or(EMPTY_LIST)
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Apply a shallow union-merge of `update` into this container.
    ///
    /// Every field named in the update must be declared by the schema.
    /// Validation happens before any write, so a rejected merge leaves the
    /// container unchanged. The version is bumped when at least one field
    /// was written.
    pub fn merge(&mut self, update: StateUpdate) -> Result<(), StateError> {
        for (field, _) in update.iter() {
            if !self.schema.contains(field) {
                return Err(StateError::UndeclaredField {
                    field: field.to_string(),
                });
            }
        }
        if update.is_empty() {
            return Ok(());
        }
        for (field, value) in update.changes {
            self.fields.insert(field, value);
        }
        self.version = self.version.saturating_add(1);
        Ok(())
    }

    /// Take an immutable deep copy of the current fields for checkpointing
    /// or handing to a step.
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            fields: self.fields.clone(),
            version: self.version,
        }
    }
}

/// Immutable copy of a run's state at a point in time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    fields: FxHashMap<String, FieldValue>,
    version: u32,
}

impl StateSnapshot {
    pub fn text(&self, field: &str) -> &str {
        self.fields
            .get(field)
            .and_then(FieldValue::as_text)
            .unwrap_or("")
    }

    pub fn list(&self, field: &str) -> &[String] {
        self.fields
            .get(field)
            .and_then(FieldValue::as_list)
            .unwrap_or(EMPTY_LIST)
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn version(&self) -> u32 {
        self.version
    }
}
