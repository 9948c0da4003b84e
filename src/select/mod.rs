use crate::error::{FactorModelError, Result};

/// Subset selection over a named axis (views or factors).
///
/// Replaces the usual `"all"` string sentinel with a closed enum.
/// `Names` and `Indices` keep the order they were requested in, so a
/// caller can reorder factors or views through the selection itself.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Selection {
    #[default]
    All,
    Names(Vec<String>),
    Indices(Vec<usize>),
}

impl Selection {
    pub fn names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Selection::Names(names.into_iter().map(Into::into).collect())
    }

    pub fn indices<I>(indices: I) -> Self
    where
        I: IntoIterator<Item = usize>,
    {
        Selection::Indices(indices.into_iter().collect())
    }

    /// Resolve the selection against an axis with the given names,
    /// returning positions in request order. `axis` only labels error
    /// messages ("factor", "view").
    pub(crate) fn resolve(&self, axis: &str, axis_names: &[String]) -> Result<Vec<usize>> {
        match self {
            Selection::All => Ok((0..axis_names.len()).collect()),
            Selection::Names(requested) => {
                if requested.is_empty() {
                    return Err(FactorModelError::invalid_selection(format!(
                        "empty {axis} selection"
                    )));
                }
                requested
                    .iter()
                    .map(|name| {
                        axis_names.iter().position(|n| n == name).ok_or_else(|| {
                            FactorModelError::invalid_selection(format!(
                                "unknown {axis} '{name}' (available: {})",
                                axis_names.join(", ")
                            ))
                        })
                    })
                    .collect()
            }
            Selection::Indices(requested) => {
                if requested.is_empty() {
                    return Err(FactorModelError::invalid_selection(format!(
                        "empty {axis} selection"
                    )));
                }
                requested
                    .iter()
                    .map(|&idx| {
                        if idx < axis_names.len() {
                            Ok(idx)
                        } else {
                            Err(FactorModelError::invalid_selection(format!(
                                "{axis} index {idx} out of range (0..{})",
                                axis_names.len()
                            )))
                        }
                    })
                    .collect()
            }
        }
    }
}
