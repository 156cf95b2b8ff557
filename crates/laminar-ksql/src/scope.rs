//! Model-creation scope token.
//!
//! Compilation is only meaningful while the embedding DSL is finishing a
//! model. The DSL opens a [`ModelScope`] for that model and hands it to
//! every compile entry point.

use std::cell::Cell;
use std::marker::PhantomData;

use crate::error::ScopeError;
use crate::model::QueryModel;

/// Capability to compile one specific [`QueryModel`].
///
/// The token is `Send` but not `Sync`.
#[derive(Debug)]
pub struct ModelScope {
    model_id: u64,
    _not_sync: PhantomData<Cell<()>>,
}

impl ModelScope {
    /// Opens a scope for `model`.
    #[must_use]
    pub fn open(model: &QueryModel) -> Self {
        Self {
            model_id: model.id(),
            _not_sync: PhantomData,
        }
    }

    /// Id of the model this scope was opened for.
    #[must_use]
    pub fn model_id(&self) -> u64 {
        self.model_id
    }

    /// Checks that this scope belongs to `model`.
    ///
    /// # Errors
    ///
    /// Returns [`ScopeError::WrongModel`] for any other model.
    pub fn ensure(&self, model: &QueryModel) -> Result<(), ScopeError> {
        if self.model_id == model.id() {
            Ok(())
        } else {
            Err(ScopeError::WrongModel {
                token: self.model_id,
                model: model.id(),
            })
        }
    }
}
