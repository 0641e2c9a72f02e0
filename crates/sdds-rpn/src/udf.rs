use std::collections::HashMap;
use std::sync::Arc;

use crate::program::Program;

#[derive(Clone, Debug)]
pub struct Udf {
    pub name: String,
    pub body: String,
    pub(crate) program: Arc<Program>,
}

/// User-defined functions, addressed by a stable index so redefinition keeps call sites valid.
#[derive(Clone, Debug, Default)]
pub struct UdfTable {
    index: HashMap<String, usize>,
    udfs: Vec<Udf>,
}

impl UdfTable {
    pub fn find(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn get(&self, index: usize) -> &Udf {
        &self.udfs[index]
    }

    pub fn len(&self) -> usize {
        self.udfs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.udfs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Udf> {
        self.udfs.iter()
    }

    pub(crate) fn insert(&mut self, name: &str, body: &str, program: Program) -> usize {
        let udf = Udf {
            name: name.to_string(),
            body: body.to_string(),
            program: Arc::new(program),
        };
        match self.find(name) {
            Some(i) => {
                self.udfs[i] = udf;
                i
            }
            None => {
                let i = self.udfs.len();
                self.index.insert(name.to_string(), i);
                self.udfs.push(udf);
                i
            }
        }
    }
}
