//! Access to the RDF data being validated.

use oxrdf::{Graph, NamedNode, Term, Triple};
use std::convert::Infallible;
use std::error::Error;

/// Read access to the triples around a node.
///
/// The validator only ever asks for the triples having a given node as subject or as object.
/// [`Graph`] implements this trait; other stores can be plugged in by implementing it.
pub trait ShexGraph {
    /// Error raised by the underlying store.
    type Error: Error + Send + Sync + 'static;

    /// Returns the triples whose subject is `node`.
    ///
    /// Must return an empty list if `node` cannot be a subject (a literal for example).
    fn triples_with_subject(&self, node: &Term) -> Result<Vec<Triple>, Self::Error>;

    /// Returns the triples whose object is `node`.
    fn triples_with_object(&self, node: &Term) -> Result<Vec<Triple>, Self::Error>;
}

impl ShexGraph for Graph {
    type Error = Infallible;

    fn triples_with_subject(&self, node: &Term) -> Result<Vec<Triple>, Infallible> {
        Ok(match node {
            Term::NamedNode(n) => self
                .triples_for_subject(n)
                .map(|t| t.into_owned())
                .collect(),
            Term::BlankNode(b) => self
                .triples_for_subject(b)
                .map(|t| t.into_owned())
                .collect(),
            Term::Literal(_) => Vec::new(),
            #[cfg(feature = "rdf-12")]
            Term::Triple(_) => Vec::new(),
        })
    }

    fn triples_with_object(&self, node: &Term) -> Result<Vec<Triple>, Infallible> {
        Ok(self
            .triples_for_object(node)
            .map(|t| t.into_owned())
            .collect())
    }
}

impl<G: ShexGraph + ?Sized> ShexGraph for &G {
    type Error = G::Error;

    fn triples_with_subject(&self, node: &Term) -> Result<Vec<Triple>, Self::Error> {
        (**self).triples_with_subject(node)
    }

    fn triples_with_object(&self, node: &Term) -> Result<Vec<Triple>, Self::Error> {
        (**self).triples_with_object(node)
    }
}

/// A triple of the neighborhood seen from the focus node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NeighborhoodArc {
    /// The triple itself.
    pub triple: Triple,
    /// `true` if the focus node is the object of the triple.
    pub inverse: bool,
}

impl NeighborhoodArc {
    /// The predicate of the triple.
    pub fn predicate(&self) -> &NamedNode {
        &self.triple.predicate
    }

    /// The node at the other end of the arc.
    pub fn value(&self) -> Term {
        if self.inverse {
            Term::from(self.triple.subject.clone())
        } else {
            self.triple.object.clone()
        }
    }

    fn sort_key(&self) -> (bool, &str, String) {
        let other = if self.inverse {
            self.triple.subject.to_string()
        } else {
            self.triple.object.to_string()
        };
        (self.inverse, self.triple.predicate.as_str(), other)
    }
}

/// The arcs around a focus node, without duplicates and in a stable order.
///
/// Outgoing arcs come first, then incoming ones, each sorted by predicate then by value.
#[derive(Debug, Clone, Default)]
pub struct Neighborhood {
    arcs: Vec<NeighborhoodArc>,
}

impl Neighborhood {
    /// Loads the outgoing arcs of `focus`, and its incoming arcs if `with_incoming` is set.
    pub fn load<G: ShexGraph + ?Sized>(
        graph: &G,
        focus: &Term,
        with_incoming: bool,
    ) -> Result<Self, G::Error> {
        let mut arcs: Vec<_> = graph
            .triples_with_subject(focus)?
            .into_iter()
            .map(|triple| NeighborhoodArc {
                triple,
                inverse: false,
            })
            .collect();
        if with_incoming {
            arcs.extend(
                graph
                    .triples_with_object(focus)?
                    .into_iter()
                    .map(|triple| NeighborhoodArc {
                        triple,
                        inverse: true,
                    }),
            );
        }
        arcs.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        arcs.dedup();
        Ok(Self { arcs })
    }

    /// The arcs, in order.
    pub fn arcs(&self) -> &[NeighborhoodArc] {
        &self.arcs
    }

    /// Number of arcs.
    pub fn len(&self) -> usize {
        self.arcs.len()
    }

    /// Returns true if the focus node has no arcs.
    pub fn is_empty(&self) -> bool {
        self.arcs.is_empty()
    }
}
