use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use toolsmith_lang::parser::parse;
use toolsmith_lang::runtime::{
    ExecutionLimits, Interpreter, ModuleRegistry, Namespace, ScriptError, Value,
};

fn namespace() -> Arc<Namespace> {
    Arc::new(Namespace::new("test", Arc::new(ModuleRegistry::standard())))
}

fn load(ns: &Arc<Namespace>, source: &str) -> Result<(), ScriptError> {
    let program = parse(source).expect("parse");
    Interpreter::new(ns.clone(), ExecutionLimits::default()).exec_module(&program)
}

fn call(ns: &Arc<Namespace>, name: &str, args: Vec<Value>) -> Result<Value, ScriptError> {
    let func = ns.get(name).expect("function defined");
    Interpreter::new(ns.clone(), ExecutionLimits::default()).call_function(&func, args, vec![])
}

fn run_main(source: &str) -> serde_json::Value {
    let ns = namespace();
    load(&ns, source).expect("load");
    call(&ns, "main", vec![])
        .expect("call")
        .to_json()
        .expect("json")
}

#[test]
fn test_arithmetic_semantics() {
    let result = run_main(
        "def main() { return [7 / 2, 7 // 2, -7 // 2, -7 % 3, 2 * 3 + 1, 1.5 * 2, 10 - 2.5] }",
    );
    assert_eq!(result, json!([3.5, 3, -4, 2, 7, 3.0, 7.5]));
}

#[test]
fn test_strings_and_methods() {
    let result = run_main(
        r#"
def main() {
    words = "  Hello World  ".strip().lower().split()
    joined = "-".join(words)
    return {
        "joined": joined,
        "upper": joined.upper(),
        "starts": joined.startswith("hello"),
        "find": joined.find("world"),
        "fmt": "{} has {n} chars".format(joined, n=len(joined)),
        "repeat": "ab" * 3,
        "contains": "lo-w" in joined,
    }
}
"#,
    );
    assert_eq!(
        result,
        json!({
            "joined": "hello-world",
            "upper": "HELLO-WORLD",
            "starts": true,
            "find": 6,
            "fmt": "hello-world has 11 chars",
            "repeat": "ababab",
            "contains": true,
        })
    );
}

#[test]
fn test_containers_have_value_semantics() {
    let result = run_main(
        r#"
def main() {
    a = [1, 2]
    b = a
    b[0] = 99
    d = {"k": {"inner": 1}}
    d["k"]["inner"] += 1
    d["new"] = a + b
    return [a, b, d]
}
"#,
    );
    assert_eq!(
        result,
        json!([[1, 2], [99, 2], {"k": {"inner": 2}, "new": [1, 2, 99, 2]}])
    );
}

#[test]
fn test_loops_break_continue() {
    let result = run_main(
        r#"
def main() {
    total = 0
    for i in range(10) {
        if i % 2 == 0 { continue }
        if i > 7 { break }
        total += i
    }
    n = 0
    while True {
        n += 1
        if n >= 5 { break }
    }
    pairs = []
    for k, v in {"a": 1, "b": 2}.items() {
        pairs += [k + str(v)]
    }
    return [total, n, pairs]
}
"#,
    );
    assert_eq!(result, json!([16, 5, ["a1", "b2"]]));
}

#[test]
fn test_builtins_collection_helpers() {
    let result = run_main(
        r#"
def main() {
    items = [3, 1, 2]
    return {
        "sorted": sorted(items),
        "desc": sorted(items, reverse=True),
        "by_len": sorted(["ccc", "a", "bb"], key=len),
        "minmax": [min(items), max(5, 9, 2), sum(items), sum([0.5, 1])],
        "zip": zip([1, 2, 3], ["a", "b"]),
        "enum": enumerate(["x", "y"], 1),
        "any_all": [any([0, "", 3]), all([1, [], 2])],
        "round": [round(2.5), round(3.5), round(2.675, 2)],
        "conv": [int("42"), float("1.5"), str(1.0), bool([]), int(3.9)],
        "types": [isinstance(1, int), isinstance("a", [int, str]), type({})],
        "range": range(10, 0, -3),
        "rev": reversed("abc"),
        "dict": dict([["a", 1]], b=2),
    }
}
"#,
    );
    assert_eq!(
        result,
        json!({
            "sorted": [1, 2, 3],
            "desc": [3, 2, 1],
            "by_len": ["a", "bb", "ccc"],
            "minmax": [1, 9, 6, 1.5],
            "zip": [[1, "a"], [2, "b"]],
            "enum": [[1, "x"], [2, "y"]],
            "any_all": [true, false],
            "round": [2, 4, 2.67],
            "conv": [42, 1.5, "1.0", false, 3],
            "types": [true, true, "dict"],
            "range": [10, 7, 4, 1],
            "rev": ["c", "b", "a"],
            "dict": {"a": 1, "b": 2},
        })
    );
}

#[test]
fn test_host_modules_through_imports() {
    let result = run_main(
        r#"
import json
import hashlib
from re import findall, sub as replace
from path import join, normalize
import math as m

def main() {
    return {
        "dumps": json.dumps({"b": 1, "a": [True, None]}),
        "sorted": json.dumps({"b": 1, "a": 2}, sort_keys=True),
        "loads": json.loads("[1, 2.5, \"x\"]"),
        "sha": hashlib.sha256("abc"),
        "digits": findall("[0-9]+", "a1b22c333"),
        "swap": replace("(\\w+)@(\\w+)", "\\2 at \\1", "me@home"),
        "path": normalize(join("a", "b", "../c.txt")),
        "floor": m.floor(2.7),
    }
}
"#,
    );
    assert_eq!(
        result,
        json!({
            "dumps": "{\"b\": 1, \"a\": [true, null]}",
            "sorted": "{\"a\": 2, \"b\": 1}",
            "loads": [1, 2.5, "x"],
            "sha": "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad",
            "digits": ["1", "22", "333"],
            "swap": "home at me",
            "path": "a/c.txt",
            "floor": 2,
        })
    );
}

#[test]
fn test_nested_functions_and_recursion() {
    let result = run_main(
        r#"
def fact(n) {
    if n <= 1 { return 1 }
    return n * fact(n - 1)
}

def main() {
    base = 10
    def add_base(x) { return x + base }
    def countdown(n) {
        if n == 0 { return [] }
        return [n] + countdown(n - 1)
    }
    return [fact(10), add_base(5), countdown(3)]
}
"#,
    );
    assert_eq!(result, json!([3628800, 15, [3, 2, 1]]));
}

#[test]
fn test_keyword_arguments_and_defaults() {
    let ns = namespace();
    load(&ns, "def greet(name, greeting=\"hi\", punct=\"!\") { return greeting + \" \" + name + punct }")
        .expect("load");
    let func = ns.get("greet").unwrap();
    let mut interp = Interpreter::new(ns.clone(), ExecutionLimits::default());
    let value = interp
        .call_function(
            &func,
            vec![Value::from("bob")],
            vec![("punct".to_string(), Value::from("?"))],
        )
        .unwrap();
    assert_eq!(value, Value::from("hi bob?"));

    let err = interp
        .call_function(&func, vec![], vec![])
        .unwrap_err();
    assert!(err.to_string().contains("missing required argument: 'name'"));

    let err = interp
        .call_function(
            &func,
            vec![Value::from("a")],
            vec![("name".to_string(), Value::from("b"))],
        )
        .unwrap_err();
    assert!(err.to_string().contains("multiple values"));
}

#[test]
fn test_runtime_errors_carry_lines() {
    let ns = namespace();
    load(&ns, "def main() {\n  x = 1\n  return x / 0\n}").unwrap();
    let err = call(&ns, "main", vec![]).unwrap_err();
    assert_eq!(err.line(), Some(3));
    assert_eq!(err.root(), &ScriptError::ZeroDivision);
}

#[test]
fn test_undefined_name_is_name_error() {
    let ns = namespace();
    load(&ns, "def main() { return nope }").unwrap();
    let err = call(&ns, "main", vec![]).unwrap_err();
    assert_eq!(err.root(), &ScriptError::NameError("nope".into()));
}

#[test]
fn test_call_depth_limit() {
    let ns = namespace();
    load(&ns, "def forever(n) { return forever(n + 1) }").unwrap();
    let func = ns.get("forever").unwrap();
    let limits = ExecutionLimits::default().with_max_call_depth(16);
    let err = Interpreter::new(ns.clone(), limits)
        .call_function(&func, vec![Value::Int(0)], vec![])
        .unwrap_err();
    assert_eq!(err, ScriptError::CallDepthExceeded(16));
}

#[test]
fn test_deadline_interrupts_infinite_loop() {
    let ns = namespace();
    load(&ns, "def spin() { while True { pass } }").unwrap();
    let func = ns.get("spin").unwrap();
    let limits = ExecutionLimits::default().with_timeout(Duration::from_millis(20));
    let err = Interpreter::new(ns.clone(), limits)
        .call_function(&func, vec![], vec![])
        .unwrap_err();
    assert!(err.is_interruption());
    assert_eq!(err, ScriptError::DeadlineExceeded);
}

#[test]
fn test_cancel_flag_stops_execution() {
    let ns = namespace();
    load(&ns, "def spin() { while True { pass } }").unwrap();
    let func = ns.get("spin").unwrap();
    let flag = Arc::new(AtomicBool::new(true));
    let limits = ExecutionLimits::default().with_cancel_flag(flag);
    let err = Interpreter::new(ns.clone(), limits)
        .call_function(&func, vec![], vec![])
        .unwrap_err();
    assert_eq!(err, ScriptError::Cancelled);
}

#[test]
fn test_staged_execution_leaves_namespace_untouched_until_committed() {
    let ns = namespace();
    let program = parse("A = 1\ndef f() { return A + 1 }\nB = f()").unwrap();
    let mut interp = Interpreter::staged(ns.clone(), ExecutionLimits::default());
    interp.exec_module(&program).unwrap();
    assert!(ns.is_empty());
    let stage = interp.take_stage();
    assert_eq!(stage.get("B"), Some(&Value::Int(2)));
    ns.commit(stage);
    assert_eq!(ns.names(), vec!["A".to_string(), "B".to_string(), "f".to_string()]);
}

#[test]
fn test_failed_staged_execution_is_discarded() {
    let ns = namespace();
    let program = parse("A = 1\nB = 1 / 0").unwrap();
    let mut interp = Interpreter::staged(ns.clone(), ExecutionLimits::default());
    assert!(interp.exec_module(&program).is_err());
    assert!(ns.is_empty());
}

#[test]
fn test_unknown_import_fails() {
    let ns = namespace();
    let err = load(&ns, "import socket").unwrap_err();
    assert!(err.to_string().contains("no module named 'socket'"));
    let err = load(&ns, "from json import nothing").unwrap_err();
    assert!(err.to_string().contains("cannot import name 'nothing'"));
}

#[test]
fn test_print_is_captured() {
    let ns = namespace();
    load(&ns, "def main() { print(\"a\", 1, [2]) }").unwrap();
    let func = ns.get("main").unwrap();
    let mut interp = Interpreter::new(ns.clone(), ExecutionLimits::default());
    interp.call_function(&func, vec![], vec![]).unwrap();
    assert_eq!(interp.take_output(), vec!["a 1 [2]".to_string()]);
}

#[test]
fn test_functions_do_not_cross_namespaces() {
    let first = namespace();
    let second = namespace();
    load(&first, "def f() { return 1 }").unwrap();
    let func = first.get("f").unwrap();
    let err = Interpreter::new(second, ExecutionLimits::default())
        .call_function(&func, vec![], vec![])
        .unwrap_err();
    assert!(err.to_string().contains("different namespace"));
}

#[test]
fn test_return_outside_function_is_rejected() {
    let ns = namespace();
    let err = load(&ns, "return 1").unwrap_err();
    assert!(err.to_string().contains("'return' outside function"));
}

#[test]
fn test_sequence_repetition_and_keyword_dicts() {
    let result = run_main(
        r#"
def main() {
    rows = [[1], "x"] * 2
    return {
        "rows": rows,
        "none": [1, 2] * 0,
        "kw": dict(a=1, b="two"),
        "merged": dict({"a": 1}, a=3),
    }
}
"#,
    );
    assert_eq!(
        result,
        json!({
            "rows": [[1], "x", [1], "x"],
            "none": [],
            "kw": {"a": 1, "b": "two"},
            "merged": {"a": 3},
        })
    );
}
