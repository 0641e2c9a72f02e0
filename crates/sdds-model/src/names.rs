use std::collections::HashSet;

use sdds_format::edit_string;

use crate::definition::ItemClass;
use crate::error::SchemaError;
use crate::layout::Layout;
use crate::wildcard::WildcardPattern;

/// Delete/retain/rename/edit requests for one item class.
#[derive(Clone, Debug, Default)]
pub struct NameOptions {
    pub deletes: Vec<WildcardPattern>,
    pub retains: Vec<WildcardPattern>,
    /// Exact `(old, new)` pairs.
    pub renames: Vec<(String, String)>,
    /// `(pattern, edit script)` pairs applied to names matching the pattern.
    pub edits: Vec<(WildcardPattern, String)>,
}

impl NameOptions {
    pub fn is_empty(&self) -> bool {
        self.deletes.is_empty()
            && self.retains.is_empty()
            && self.renames.is_empty()
            && self.edits.is_empty()
    }

    fn survives(&self, name: &str) -> bool {
        let retained = self.retains.iter().any(|p| p.is_match(name));
        if self.deletes.is_empty() {
            return self.retains.is_empty() || retained;
        }
        retained || !self.deletes.iter().any(|p| p.is_match(name))
    }

    /// Map `names` to `(old, new)` pairs for the surviving items, in input order.
    ///
    /// A name survives unless a delete pattern matches it; a retain match always survives.
    /// With retains but no deletes, only retained names survive. Renames apply first,
    /// then each edit applies to the names that match its pattern at that point.
    pub fn apply(
        &self,
        class: ItemClass,
        names: &[String],
    ) -> Result<Vec<(String, String)>, SchemaError> {
        let mut pairs: Vec<(String, String)> = names
            .iter()
            .filter(|n| self.survives(n))
            .map(|n| (n.clone(), n.clone()))
            .collect();

        for (_, current) in pairs.iter_mut() {
            if let Some((_, new)) = self.renames.iter().find(|(old, _)| old == current) {
                *current = new.clone();
            }
        }
        for (pattern, script) in &self.edits {
            for (_, current) in pairs.iter_mut() {
                if pattern.is_match(current) {
                    let edited = edit_string(current, script).map_err(|source| {
                        SchemaError::Edit {
                            class,
                            name: current.clone(),
                            source,
                        }
                    })?;
                    *current = edited;
                }
            }
        }

        let mut seen = HashSet::new();
        for (_, new) in &pairs {
            if !seen.insert(new.as_str()) {
                return Err(SchemaError::Conflict {
                    class,
                    name: new.clone(),
                });
            }
        }
        Ok(pairs)
    }
}

/// Name management requests for all three classes.
#[derive(Clone, Debug, Default)]
pub struct SchemaOptions {
    pub columns: NameOptions,
    pub parameters: NameOptions,
    pub arrays: NameOptions,
}

impl SchemaOptions {
    pub fn for_class(&self, class: ItemClass) -> &NameOptions {
        match class {
            ItemClass::Column => &self.columns,
            ItemClass::Parameter => &self.parameters,
            ItemClass::Array => &self.arrays,
        }
    }

    pub fn for_class_mut(&mut self, class: ItemClass) -> &mut NameOptions {
        match class {
            ItemClass::Column => &mut self.columns,
            ItemClass::Parameter => &mut self.parameters,
            ItemClass::Array => &mut self.arrays,
        }
    }

    /// Derive the renamed/filtered layout and the mapping back to the input names.
    pub fn apply(&self, input: &Layout) -> Result<(Layout, SchemaMapping), SchemaError> {
        let mut output = Layout {
            description: input.description.clone(),
            major_order: input.major_order,
            ..Layout::default()
        };
        let mut mapping = SchemaMapping::default();
        for class in ItemClass::ALL {
            let pairs = self
                .for_class(class)
                .apply(class, &input.names(class))?;
            for (old, new) in &pairs {
                if let Some(def) = input.find(class, old) {
                    let mut def = def.clone();
                    def.name = new.clone();
                    output.items_mut(class).push(def);
                }
            }
            *mapping.pairs_mut(class) = pairs;
        }
        Ok((output, mapping))
    }
}

/// For each class, the `(input name, output name)` pairs of items carried from input to
/// output.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SchemaMapping {
    columns: Vec<(String, String)>,
    parameters: Vec<(String, String)>,
    arrays: Vec<(String, String)>,
}

impl SchemaMapping {
    /// Every item carried under its own name.
    pub fn identity(layout: &Layout) -> Self {
        let mut mapping = Self::default();
        for class in ItemClass::ALL {
            *mapping.pairs_mut(class) = layout
                .names(class)
                .into_iter()
                .map(|n| (n.clone(), n))
                .collect();
        }
        mapping
    }

    pub fn pairs(&self, class: ItemClass) -> &[(String, String)] {
        match class {
            ItemClass::Column => &self.columns,
            ItemClass::Parameter => &self.parameters,
            ItemClass::Array => &self.arrays,
        }
    }

    fn pairs_mut(&mut self, class: ItemClass) -> &mut Vec<(String, String)> {
        match class {
            ItemClass::Column => &mut self.columns,
            ItemClass::Parameter => &mut self.parameters,
            ItemClass::Array => &mut self.arrays,
        }
    }

    /// The input name of the output item `name`, if it came from the input.
    pub fn source_of(&self, class: ItemClass, name: &str) -> Option<&str> {
        self.pairs(class)
            .iter()
            .find(|(_, new)| new == name)
            .map(|(old, _)| old.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn pat(p: &str) -> WildcardPattern {
        WildcardPattern::new(p).expect("pattern")
    }

    fn outputs(pairs: Vec<(String, String)>) -> Vec<String> {
        pairs.into_iter().map(|(_, n)| n).collect()
    }

    #[test]
    fn retain_overrides_delete() {
        let opts = NameOptions {
            deletes: vec![pat("*")],
            retains: vec![pat("x"), pat("t*")],
            ..NameOptions::default()
        };
        let out = opts
            .apply(ItemClass::Column, &names(&["x", "y", "t1", "z"]))
            .expect("apply");
        assert_eq!(outputs(out), names(&["x", "t1"]));
    }

    #[test]
    fn retain_alone_keeps_only_matches() {
        let opts = NameOptions {
            retains: vec![pat("a*")],
            ..NameOptions::default()
        };
        let out = opts
            .apply(ItemClass::Column, &names(&["ab", "b", "ac"]))
            .expect("apply");
        assert_eq!(outputs(out), names(&["ab", "ac"]));
    }

    #[test]
    fn rename_then_edit() {
        let opts = NameOptions {
            renames: vec![("x".into(), "xRaw".into())],
            edits: vec![(pat("*Raw"), "ei/Val/".into())],
            ..NameOptions::default()
        };
        let out = opts
            .apply(ItemClass::Column, &names(&["x", "yRaw"]))
            .expect("apply");
        assert_eq!(
            out,
            vec![
                ("x".to_string(), "xRawVal".to_string()),
                ("yRaw".to_string(), "yRawVal".to_string())
            ]
        );
    }

    #[test]
    fn collisions_are_rejected() {
        let opts = NameOptions {
            renames: vec![("a".into(), "b".into())],
            ..NameOptions::default()
        };
        let err = opts
            .apply(ItemClass::Parameter, &names(&["a", "b"]))
            .expect_err("collision");
        assert!(matches!(err, SchemaError::Conflict { .. }), "{err}");
    }
}
