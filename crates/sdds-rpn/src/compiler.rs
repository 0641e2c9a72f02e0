use std::sync::Arc;

use crate::builtins::Builtin;
use crate::error::EvalError;
use crate::lexer::{tokenize, Token};
use crate::program::{Op, Program};
use crate::vm::Rpn;

struct OpenConditional {
    branch: usize,
    colon: Option<usize>,
}

impl Rpn {
    /// Compile RPN text.
    ///
    /// `sto`/`ssto` targets are created as memories here. Names that are neither builtins,
    /// memories nor UDFs compile to [`Op::Unknown`] and are resolved when executed.
    pub fn compile(&mut self, text: &str) -> Result<Program, EvalError> {
        let mut program = Program::new(text);
        let mut open: Vec<OpenConditional> = Vec::new();
        let unbalanced = || EvalError::UnbalancedConditional(text.to_string());
        let mut tokens = tokenize(text)?.into_iter();

        while let Some(token) = tokens.next() {
            let word = match token {
                Token::Number(v) => {
                    program.ops.push(Op::PushNum(v));
                    continue;
                }
                Token::Str(s) => {
                    program.ops.push(Op::PushStr(Arc::from(s)));
                    continue;
                }
                Token::Word(w) => w,
            };
            let here = program.ops.len();
            let op = match word.as_str() {
                "sto" | "ssto" => {
                    let is_string = word == "ssto";
                    let keyword = if is_string { "ssto" } else { "sto" };
                    let Some(Token::Word(name)) = tokens.next() else {
                        return Err(EvalError::MissingMemoryName(keyword));
                    };
                    let index = self.create_memory(&name, is_string)?;
                    if is_string {
                        Op::StoreStr(index)
                    } else {
                        Op::Store(index)
                    }
                }
                "?" => {
                    open.push(OpenConditional {
                        branch: here,
                        colon: None,
                    });
                    Op::Branch { target: usize::MAX }
                }
                ":" => {
                    let cond = open.last_mut().ok_or_else(unbalanced)?;
                    if cond.colon.is_some() {
                        return Err(unbalanced());
                    }
                    cond.colon = Some(here);
                    let branch = cond.branch;
                    program.ops[branch] = Op::Branch { target: here + 1 };
                    Op::Jump { target: usize::MAX }
                }
                "$" => {
                    let cond = open.pop().ok_or_else(unbalanced)?;
                    match cond.colon {
                        Some(colon) => program.ops[colon] = Op::Jump { target: here },
                        None => program.ops[cond.branch] = Op::Branch { target: here },
                    }
                    Op::EndIf
                }
                _ => {
                    if let Some(builtin) = Builtin::from_keyword(&word) {
                        Op::Builtin(builtin)
                    } else if let Some(index) = self.memories.find(&word) {
                        if self.memories.is_string(index) {
                            Op::RecallStr(index)
                        } else {
                            Op::Recall(index)
                        }
                    } else if let Some(index) = self.udfs.find(&word) {
                        Op::CallUdf(index)
                    } else {
                        Op::Unknown(Arc::from(word))
                    }
                }
            };
            program.ops.push(op);
        }
        if !open.is_empty() {
            return Err(unbalanced());
        }
        Ok(program)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn conditional_targets() {
        let mut rpn = Rpn::new();
        let p = rpn.compile("1 2 < ? 10 : 20 $").expect("compile");
        assert_eq!(
            p.ops()[3..],
            [
                Op::Branch { target: 6 },
                Op::PushNum(10.0),
                Op::Jump { target: 7 },
                Op::PushNum(20.0),
                Op::EndIf,
            ]
        );

        let p = rpn.compile("x ? 1 $").expect("compile");
        assert_eq!(p.ops()[1], Op::Branch { target: 3 });
    }

    #[test]
    fn unbalanced_conditionals_are_rejected() {
        let mut rpn = Rpn::new();
        for text in ["1 ?", "1 : 2", "$", "1 ? 2 : 3 : 4 $"] {
            assert!(
                matches!(rpn.compile(text), Err(EvalError::UnbalancedConditional(_))),
                "{text}"
            );
        }
    }

    #[test]
    fn names_link_late() {
        let mut rpn = Rpn::new();
        let p = rpn.compile("later 1 +").expect("compile");
        assert_eq!(p.ops()[0], Op::Unknown(Arc::from("later")));
        let p = rpn.compile("3 sto later later").expect("compile");
        assert!(matches!(p.ops()[2], Op::Recall(_)));
    }
}
