//! Reference lookup: the callback compilers use to read sibling results.

use serde_json::Value;

use super::{KeyState, ResolutionContext};
use crate::compiler::ReferenceLoader;
use crate::error::{ResolveError, ResolveResult};
use crate::reference::ReferencePath;

impl ReferenceLoader for ResolutionContext<'_> {
    /// Walk `reference` from its key through nested fields.
    ///
    /// The key is resolved on demand. A null or missing value at any step
    /// fails with `UnresolvedReference` naming the path up to that step.
    fn load(&mut self, reference: &str) -> ResolveResult<Value> {
        if self.is_terminated() {
            return Err(ResolveError::Terminated);
        }

        let Some(path) = ReferencePath::parse(reference) else {
            return Err(self.reject(ResolveError::UnresolvedReference {
                reference: reference.to_string(),
                path: reference.trim().to_string(),
            }));
        };

        let key = path.key();
        match self.state(key) {
            KeyState::InProgress => {
                return Err(self.reject(ResolveError::CyclicReference {
                    reference: reference.to_string(),
                }));
            }
            KeyState::Completed => {}
            KeyState::Unresolved | KeyState::Failed => {
                self.resolve(key)?;
            }
        }

        let mut current = self.results.get(key);
        let mut missing_at = None;
        for (index, segment) in path.segments().iter().enumerate() {
            if index > 0 {
                current = current
                    .and_then(Value::as_object)
                    .and_then(|fields| fields.get(segment));
            }
            if current.is_none_or(Value::is_null) {
                missing_at = Some(index);
                break;
            }
        }

        match (missing_at, current.cloned()) {
            (None, Some(value)) => Ok(value),
            (missing_at, _) => Err(self.reject(ResolveError::UnresolvedReference {
                reference: reference.to_string(),
                path: path.prefix(missing_at.unwrap_or(0)),
            })),
        }
    }
}
