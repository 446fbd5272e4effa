use proptest::prelude::*;
use proptest::test_runner::Config as ProptestConfig;
use std::sync::Arc;
use toolsmith_lang::parser::parse;
use toolsmith_lang::runtime::{ExecutionLimits, Interpreter, ModuleRegistry, Namespace, Value};

fn eval_global(source: &str, name: &str) -> Value {
    let ns = Arc::new(Namespace::new("prop", Arc::new(ModuleRegistry::new())));
    let program = parse(source).expect("parse");
    Interpreter::new(ns.clone(), ExecutionLimits::default())
        .exec_module(&program)
        .expect("exec");
    ns.get(name).expect("bound")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn floor_division_and_modulo_agree(a in -10_000i64..10_000, b in (-100i64..100).prop_filter("non-zero", |b| *b != 0)) {
        let source = format!("q = {a} // ({b})\nr = {a} % ({b})\nok = q * ({b}) + r == {a}");
        prop_assert_eq!(eval_global(&source, "ok"), Value::Bool(true));
        let r = eval_global(&source, "r").as_int().unwrap();
        prop_assert!(r == 0 || (r < 0) == (b < 0));
    }

    #[test]
    fn sorted_output_is_ordered_permutation(items in prop::collection::vec(-1000i64..1000, 0..20)) {
        let literal = items.iter().map(|i| i.to_string()).collect::<Vec<_>>().join(", ");
        let source = format!("out = sorted([{literal}])");
        let mut expected = items.clone();
        expected.sort();
        let expected = Value::List(expected.into_iter().map(Value::Int).collect());
        prop_assert_eq!(eval_global(&source, "out"), expected);
    }

    #[test]
    fn string_literals_survive_parsing(s in "[a-zA-Z0-9 _.,!?-]{0,40}") {
        let source = format!("s = \"{s}\"");
        prop_assert_eq!(eval_global(&source, "s"), Value::Str(s.clone()));
    }
}
