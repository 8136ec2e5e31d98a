//! Hooks for the parts of ShEx that live outside of the schema: external shapes and semantic
//! actions.

use crate::model::{SemanticAction, ShapeLabel};
use oxrdf::{NamedNode, Term, Triple};
use rustc_hash::FxHashMap;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// Decides conformance for `EXTERNAL` shapes.
///
/// Closures with the same signature as [`resolve`](Self::resolve) implement this trait:
///
/// ```
/// use oxrdf::Term;
/// use oxshex::{ExternalShapeResolver, ShapeLabel};
///
/// let resolver = |node: &Term, _: Option<&ShapeLabel>| -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
///     Ok(matches!(node, Term::NamedNode(_)))
/// };
/// let _: &dyn ExternalShapeResolver = &resolver;
/// ```
pub trait ExternalShapeResolver: Send + Sync {
    /// Returns whether `node` conforms to the external shape declared under `label`.
    ///
    /// `label` is the label of the innermost shape being validated, if any.
    fn resolve(
        &self,
        node: &Term,
        label: Option<&ShapeLabel>,
    ) -> Result<bool, Box<dyn Error + Send + Sync>>;
}

impl<F> ExternalShapeResolver for F
where
    F: Fn(&Term, Option<&ShapeLabel>) -> Result<bool, Box<dyn Error + Send + Sync>> + Send + Sync,
{
    fn resolve(
        &self,
        node: &Term,
        label: Option<&ShapeLabel>,
    ) -> Result<bool, Box<dyn Error + Send + Sync>> {
        self(node, label)
    }
}

/// What a semantic action sees when it runs.
#[derive(Debug, Clone, Copy)]
pub struct SemanticActionContext<'a> {
    /// The node being validated.
    pub focus: &'a Term,
    /// The label of the innermost shape being validated, if any.
    pub shape: Option<&'a ShapeLabel>,
    /// The matched triple, for actions attached to a triple constraint.
    pub triple: Option<&'a Triple>,
}

/// Runs the semantic actions registered under one extension IRI.
///
/// Returning `false` makes the match fail.
pub trait SemanticActionHandler: Send + Sync {
    /// Runs `action`.
    fn run(&self, action: &SemanticAction, context: &SemanticActionContext<'_>) -> bool;
}

impl<F> SemanticActionHandler for F
where
    F: Fn(&SemanticAction, &SemanticActionContext<'_>) -> bool + Send + Sync,
{
    fn run(&self, action: &SemanticAction, context: &SemanticActionContext<'_>) -> bool {
        self(action, context)
    }
}

/// The hooks registered on a validator.
#[derive(Clone, Default)]
pub(crate) struct Extensions {
    external: Option<Arc<dyn ExternalShapeResolver>>,
    actions: FxHashMap<NamedNode, Arc<dyn SemanticActionHandler>>,
}

impl Extensions {
    pub(crate) fn set_external(&mut self, resolver: Arc<dyn ExternalShapeResolver>) {
        self.external = Some(resolver);
    }

    pub(crate) fn add_action(&mut self, name: NamedNode, handler: Arc<dyn SemanticActionHandler>) {
        self.actions.insert(name, handler);
    }

    pub(crate) fn external(&self) -> Option<&dyn ExternalShapeResolver> {
        self.external.as_deref()
    }

    /// Runs `actions` in order and returns the name of the first one that fails.
    ///
    /// Actions without a registered handler are skipped.
    pub(crate) fn run_actions(
        &self,
        actions: &[SemanticAction],
        context: &SemanticActionContext<'_>,
    ) -> Option<NamedNode> {
        for action in actions {
            let Some(handler) = self.actions.get(&action.name) else {
                tracing::trace!(action = %action.name, "no handler for semantic action");
                continue;
            };
            if !handler.run(action, context) {
                return Some(action.name.clone());
            }
        }
        None
    }
}

impl fmt::Debug for Extensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extensions")
            .field("external", &self.external.is_some())
            .field("actions", &self.actions.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_actions_are_skipped() {
        let mut extensions = Extensions::default();
        let rejecting = NamedNode::new("http://example.org/reject").unwrap();
        extensions.add_action(
            rejecting.clone(),
            Arc::new(|_: &SemanticAction, _: &SemanticActionContext<'_>| false),
        );
        let focus = Term::from(NamedNode::new("http://example.org/n").unwrap());
        let context = SemanticActionContext {
            focus: &focus,
            shape: None,
            triple: None,
        };
        let unknown =
            SemanticAction::new(NamedNode::new("http://example.org/unknown").unwrap(), None);
        assert_eq!(extensions.run_actions(&[unknown.clone()], &context), None);
        assert_eq!(
            extensions.run_actions(
                &[unknown, SemanticAction::new(rejecting.clone(), None)],
                &context
            ),
            Some(rejecting)
        );
    }
}
