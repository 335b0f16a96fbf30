//! Named, shaped placeholders and the per-node registry of them.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

use super::error::ShapeError;
use super::shape::{Shape, Shaped};

/// A named symbolic parameter, bound to a concrete array only at evaluation time.
///
/// Two arguments denote the same parameter iff both name and shape agree;
/// using one name with two shapes inside a graph is rejected at construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Argument {
    name: Arc<str>,
    shape: Shape,
}

impl Argument {
    pub fn new(name: impl AsRef<str>, shape: impl Into<Shape>) -> Self {
        Argument {
            name: Arc::from(name.as_ref()),
            shape: shape.into(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Shaped for Argument {
    fn shape(&self) -> &Shape {
        &self.shape
    }
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "?{}{}", self.name, self.shape)
    }
}

static EMPTY: LazyLock<Arc<ArgumentSet>> = LazyLock::new(|| Arc::new(ArgumentSet::default()));

/// The arguments a node depends on, keyed by name.
///
/// Computed once per node from its children; nodes without arguments all
/// share one empty set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgumentSet(BTreeMap<Arc<str>, Shape>);

impl ArgumentSet {
    pub(crate) fn empty() -> Arc<ArgumentSet> {
        Arc::clone(&EMPTY)
    }

    pub(crate) fn single(arg: &Argument) -> Arc<ArgumentSet> {
        let mut map = BTreeMap::new();
        map.insert(Arc::clone(&arg.name), arg.shape.clone());
        Arc::new(ArgumentSet(map))
    }

    /// Union of the children's sets, failing on a name used with two shapes.
    pub(crate) fn merge<'a>(
        sets: impl IntoIterator<Item = &'a Arc<ArgumentSet>>,
    ) -> Result<Arc<ArgumentSet>, ShapeError> {
        let mut merged: Option<Arc<ArgumentSet>> = None;
        for set in sets {
            if set.is_empty() {
                continue;
            }
            match &mut merged {
                None => merged = Some(Arc::clone(set)),
                Some(acc) if Arc::ptr_eq(acc, set) => {}
                Some(acc) => {
                    for (name, shape) in &set.0 {
                        if let Some(first) = acc.0.get(name) {
                            if first != shape {
                                return Err(ShapeError::ArgumentConflict {
                                    name: name.to_string(),
                                    first: first.clone(),
                                    second: shape.clone(),
                                });
                            }
                        } else {
                            Arc::make_mut(acc)
                                .0
                                .insert(Arc::clone(name), shape.clone());
                        }
                    }
                }
            }
        }
        Ok(merged.unwrap_or_else(ArgumentSet::empty))
    }

    /// Check `arg` against the registry without adding it
    pub(crate) fn check(&self, arg: &Argument) -> Result<(), ShapeError> {
        match self.0.get(arg.name()) {
            Some(shape) if shape != arg.shape() => Err(ShapeError::ArgumentConflict {
                name: arg.name().to_owned(),
                first: shape.clone(),
                second: arg.shape().clone(),
            }),
            _ => Ok(()),
        }
    }

    /// Whether `arg` (same name and shape) is in the set
    #[must_use]
    pub fn contains(&self, arg: &Argument) -> bool {
        self.0.get(arg.name()).is_some_and(|s| s == arg.shape())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Shape> {
        self.0.get(name)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = Argument> + '_ {
        self.0.iter().map(|(name, shape)| Argument {
            name: Arc::clone(name),
            shape: shape.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_unions_names() {
        let a = ArgumentSet::single(&Argument::new("u", [2]));
        let b = ArgumentSet::single(&Argument::new("v", [3]));
        let merged = ArgumentSet::merge([&a, &b]).unwrap();
        assert_eq!(merged.len(), 2);
        assert!(merged.contains(&Argument::new("v", [3])));
        assert!(!merged.contains(&Argument::new("v", [2])));
    }

    #[test]
    fn merge_rejects_shape_conflict() {
        let a = ArgumentSet::single(&Argument::new("u", [2]));
        let b = ArgumentSet::single(&Argument::new("u", [2, 3]));
        let err = ArgumentSet::merge([&a, &b]).unwrap_err();
        assert!(matches!(err, ShapeError::ArgumentConflict { name, .. } if name == "u"));
    }

    #[test]
    fn empty_sets_are_shared() {
        let merged = ArgumentSet::merge([&ArgumentSet::empty(), &ArgumentSet::empty()]).unwrap();
        assert!(Arc::ptr_eq(&merged, &ArgumentSet::empty()));
    }
}
