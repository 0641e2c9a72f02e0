use std::collections::HashMap;

use crate::error::EvalError;

#[derive(Clone, Debug, PartialEq)]
pub enum MemoryValue {
    Num(f64),
    Str(String),
}

/// Named memory cells. A cell's type (numeric or string) is fixed when it is created.
#[derive(Clone, Debug, Default)]
pub struct Memories {
    index: HashMap<String, usize>,
    names: Vec<String>,
    values: Vec<MemoryValue>,
}

impl Memories {
    pub fn find(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn name(&self, index: usize) -> &str {
        &self.names[index]
    }

    pub fn is_string(&self, index: usize) -> bool {
        matches!(self.values[index], MemoryValue::Str(_))
    }

    /// Find or create a cell. An existing cell of the other type is an error.
    pub fn create(&mut self, name: &str, is_string: bool) -> Result<usize, EvalError> {
        if let Some(i) = self.find(name) {
            if self.is_string(i) != is_string {
                return Err(EvalError::MemoryType(name.to_string()));
            }
            return Ok(i);
        }
        let i = self.values.len();
        self.index.insert(name.to_string(), i);
        self.names.push(name.to_string());
        self.values.push(if is_string {
            MemoryValue::Str(String::new())
        } else {
            MemoryValue::Num(0.0)
        });
        Ok(i)
    }

    pub fn get(&self, index: usize) -> &MemoryValue {
        &self.values[index]
    }

    pub fn num(&self, index: usize) -> f64 {
        match &self.values[index] {
            MemoryValue::Num(v) => *v,
            MemoryValue::Str(_) => f64::NAN,
        }
    }

    pub fn str(&self, index: usize) -> &str {
        match &self.values[index] {
            MemoryValue::Str(s) => s,
            MemoryValue::Num(_) => "",
        }
    }

    pub fn set_num(&mut self, index: usize, value: f64) {
        if let MemoryValue::Num(v) = &mut self.values[index] {
            *v = value;
        }
    }

    pub fn set_str(&mut self, index: usize, value: &str) {
        if let MemoryValue::Str(s) = &mut self.values[index] {
            s.clear();
            s.push_str(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creation_is_idempotent_and_typed() {
        let mut mem = Memories::default();
        let a = mem.create("a", false).expect("create");
        assert_eq!(mem.create("a", false).expect("again"), a);
        mem.set_num(a, 2.5);
        assert_eq!(mem.num(a), 2.5);
        assert!(matches!(mem.create("a", true), Err(EvalError::MemoryType(_))));

        let s = mem.create("s", true).expect("string");
        mem.set_str(s, "hi");
        assert_eq!(mem.str(s), "hi");
        assert_eq!(mem.len(), 2);
    }
}
