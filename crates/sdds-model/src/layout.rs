use crate::definition::{Definition, Description, ItemClass, MajorOrder};
use crate::error::SchemaError;

/// The schema of a dataset: every page shares one layout.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Layout {
    pub description: Option<Description>,
    pub parameters: Vec<Definition>,
    pub arrays: Vec<Definition>,
    pub columns: Vec<Definition>,
    pub major_order: MajorOrder,
}

impl Layout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self, class: ItemClass) -> &[Definition] {
        match class {
            ItemClass::Column => &self.columns,
            ItemClass::Parameter => &self.parameters,
            ItemClass::Array => &self.arrays,
        }
    }

    pub fn items_mut(&mut self, class: ItemClass) -> &mut Vec<Definition> {
        match class {
            ItemClass::Column => &mut self.columns,
            ItemClass::Parameter => &mut self.parameters,
            ItemClass::Array => &mut self.arrays,
        }
    }

    pub fn index_of(&self, class: ItemClass, name: &str) -> Option<usize> {
        self.items(class).iter().position(|d| d.name == name)
    }

    pub fn find(&self, class: ItemClass, name: &str) -> Option<&Definition> {
        self.items(class).iter().find(|d| d.name == name)
    }

    pub fn find_mut(&mut self, class: ItemClass, name: &str) -> Option<&mut Definition> {
        self.items_mut(class).iter_mut().find(|d| d.name == name)
    }

    pub fn require(&self, class: ItemClass, name: &str) -> Result<&Definition, SchemaError> {
        self.find(class, name).ok_or_else(|| SchemaError::Missing {
            class,
            name: name.to_string(),
        })
    }

    pub fn column(&self, name: &str) -> Option<&Definition> {
        self.find(ItemClass::Column, name)
    }

    pub fn parameter(&self, name: &str) -> Option<&Definition> {
        self.find(ItemClass::Parameter, name)
    }

    pub fn array(&self, name: &str) -> Option<&Definition> {
        self.find(ItemClass::Array, name)
    }

    pub fn names(&self, class: ItemClass) -> Vec<String> {
        self.items(class).iter().map(|d| d.name.clone()).collect()
    }

    /// Add a new definition; fails if the name is taken within its class.
    pub fn define(&mut self, class: ItemClass, def: Definition) -> Result<usize, SchemaError> {
        if self.index_of(class, &def.name).is_some() {
            return Err(SchemaError::Duplicate {
                class,
                name: def.name,
            });
        }
        let items = self.items_mut(class);
        items.push(def);
        Ok(items.len() - 1)
    }

    /// Add a definition, or replace an existing one of the same name in place.
    pub fn define_or_replace(&mut self, class: ItemClass, def: Definition) -> usize {
        match self.index_of(class, &def.name) {
            Some(i) => {
                self.items_mut(class)[i] = def;
                i
            }
            None => {
                let items = self.items_mut(class);
                items.push(def);
                items.len() - 1
            }
        }
    }

    pub fn remove(&mut self, class: ItemClass, name: &str) -> Option<Definition> {
        let i = self.index_of(class, name)?;
        Some(self.items_mut(class).remove(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdds_columnar::Kind;

    #[test]
    fn define_rejects_duplicates_within_a_class() {
        let mut layout = Layout::new();
        layout
            .define(ItemClass::Column, Definition::new("x", Kind::Double))
            .expect("first");
        layout
            .define(ItemClass::Parameter, Definition::new("x", Kind::Long))
            .expect("other class");
        let err = layout
            .define(ItemClass::Column, Definition::new("x", Kind::Short))
            .expect_err("duplicate");
        assert!(matches!(err, SchemaError::Duplicate { .. }), "{err}");
    }

    #[test]
    fn replace_keeps_position() {
        let mut layout = Layout::new();
        for name in ["a", "b", "c"] {
            layout
                .define(ItemClass::Column, Definition::new(name, Kind::Double))
                .expect("define");
        }
        let at = layout.define_or_replace(ItemClass::Column, Definition::new("b", Kind::String));
        assert_eq!(at, 1);
        assert_eq!(layout.columns[1].kind, Kind::String);
    }
}
