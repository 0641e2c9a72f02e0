use std::io::Write;

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use sdds_rpn::{infix_to_postfix, EvalError, MemoryValue, Rpn, StackKind};

fn run(rpn: &mut Rpn, text: &str) -> f64 {
    rpn.clear_stacks();
    rpn.evaluate(text).expect("evaluate");
    rpn.pop_numeric().expect("numeric result")
}

#[test]
fn statements_leave_the_numeric_stack_balanced() {
    let mut rpn = Rpn::with_seed(Some(1));
    for text in [
        "1 2 + pop",
        "3 sto a pop",
        r#""x" "y" scat sspop"#,
        "1 2 < ? 5 : 6 $ pop",
        "1 2 3 3 sumn pop",
    ] {
        rpn.clear_stacks();
        rpn.evaluate(text).expect(text);
        assert_eq!(rpn.numeric_stack().len(), 0, "{text}");
    }
}

#[test]
fn underflow_leaves_other_stacks_intact() {
    let mut rpn = Rpn::new();
    rpn.evaluate(r#""s" 1 2 <"#).expect("setup");
    let err = rpn.evaluate("&&").expect_err("needs two logicals");
    assert!(matches!(
        err,
        EvalError::StackUnderflow {
            stack: StackKind::Logical,
            ..
        }
    ));
    assert_eq!(rpn.logical_stack(), &[true]);
    assert_eq!(rpn.string_stack(), &["s".to_string()]);
    assert!(matches!(
        rpn.evaluate("scat"),
        Err(EvalError::StackUnderflow {
            stack: StackKind::String,
            ..
        })
    ));
}

#[test]
fn unknown_names_fail_at_run_time() {
    let mut rpn = Rpn::new();
    let program = rpn.compile("nosuchname 1 +").expect("compiles");
    assert!(matches!(
        rpn.execute(&program),
        Err(EvalError::UnknownToken(name)) if name == "nosuchname"
    ));
    rpn.set_memory("nosuchname", 41.0).expect("memory");
    rpn.clear_stacks();
    rpn.execute(&program).expect("resolves once defined");
    assert_eq!(rpn.pop_numeric().expect("result"), 42.0);
}

#[test]
fn implicit_memories_exist() {
    let mut rpn = Rpn::new();
    for name in ["i_page", "table_number", "n_rows", "i_row"] {
        assert_eq!(rpn.memory(name), Some(&MemoryValue::Num(0.0)), "{name}");
    }
    rpn.set_memory("n_rows", 3.0).expect("set");
    assert_eq!(run(&mut rpn, "n_rows 5 <  ? 1 : 0 $"), 1.0);
}

#[test]
fn definitions_file_defines_udfs_and_memories() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(file, "/* physical constants */").expect("write");
    writeln!(file, "# comment").expect("write");
    writeln!(file, "2.99792458e8 sto c").expect("write");
    writeln!(file, r#""hypot" "sqr swap sqr + sqrt" mudf"#).expect("write");
    file.flush().expect("flush");

    let mut rpn = Rpn::new();
    rpn.load_definitions(file.path()).expect("load");
    assert_eq!(run(&mut rpn, "3 4 hypot"), 5.0);
    assert_eq!(run(&mut rpn, "c"), 2.99792458e8);
    assert!(rpn.numeric_stack().is_empty());
}

#[test]
fn bad_definition_line_reports_its_position() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(file, "1 sto ok").expect("write");
    writeln!(file, "1 ? 2").expect("write");
    file.flush().expect("flush");

    let mut rpn = Rpn::new();
    match rpn.load_definitions(file.path()) {
        Err(EvalError::DefinitionLine { line, source, .. }) => {
            assert_eq!(line, 2);
            assert!(matches!(*source, EvalError::UnbalancedConditional(_)));
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn file_builtins_write_and_read() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("out.txt");
    let spec = format!("{},w", path.display());

    let mut rpn = Rpn::new();
    rpn.push_string(spec).expect("push");
    rpn.evaluate("open").expect("open");
    assert_eq!(rpn.file_stack().len(), 1);
    rpn.evaluate(r#"1.25 "%.3f" fprf "\n" puts close"#)
        .expect("write");
    assert!(rpn.file_stack().is_empty());

    rpn.push_string(path.display().to_string()).expect("push");
    rpn.evaluate("open gets").expect("gets");
    assert!(rpn.pop_logical().expect("line read"));
    assert_eq!(rpn.pop_string().expect("line"), "1.250");
    rpn.evaluate("gets").expect("eof");
    assert!(!rpn.pop_logical().expect("eof flag"));
    rpn.evaluate("close").expect("close");
    assert!(rpn.file_stack().is_empty());
}

#[test]
fn infix_examples_match_handwritten_postfix() {
    let mut rpn = Rpn::new();
    rpn.set_memory("x", 1.5).expect("x");
    rpn.set_memory("y", -2.0).expect("y");
    for (infix, postfix) in [
        ("x*x + y", "x x * y +"),
        ("-(x - y) / 2", "x y - chs 2 /"),
        ("2^x^2", "2 x 2 pow pow"),
        ("atan2(x, y)", "x y atan2"),
        ("sqrt(x*x + y*y)", "x sqr y sqr + sqrt"),
    ] {
        let translated = infix_to_postfix(infix).expect(infix);
        assert_eq!(run(&mut rpn, &translated), run(&mut rpn, postfix), "{infix}");
    }
}

fn expr() -> impl Strategy<Value = (String, String)> {
    let leaf = prop_oneof![
        (1u32..100).prop_map(|n| (n.to_string(), n.to_string())),
        Just(("x".to_string(), "x".to_string())),
    ];
    leaf.prop_recursive(4, 32, 2, |inner| {
        (inner.clone(), inner, prop_oneof![Just("+"), Just("-"), Just("*")]).prop_map(
            |((li, lp), (ri, rp), op)| (format!("({li} {op} {ri})"), format!("{lp} {rp} {op}")),
        )
    })
}

proptest! {
    #[test]
    fn parenthesized_infix_agrees_with_postfix((infix, postfix) in expr(), x in -50.0f64..50.0) {
        let mut rpn = Rpn::new();
        rpn.set_memory("x", x).expect("x");
        let translated = infix_to_postfix(&infix).expect("translate");
        let a = run(&mut rpn, &translated);
        let b = run(&mut rpn, &postfix);
        prop_assert_eq!(a.to_bits(), b.to_bits());
    }

    #[test]
    fn pushes_then_sumn_consume_exactly(values in proptest::collection::vec(-1e6f64..1e6, 1..40)) {
        let mut rpn = Rpn::new();
        let text = values.iter().map(|v| format!("{v:?}")).collect::<Vec<_>>().join(" ");
        rpn.evaluate(&format!("{text} {} sumn", values.len())).expect("sumn");
        prop_assert_eq!(rpn.numeric_stack().len(), 1);
    }
}
