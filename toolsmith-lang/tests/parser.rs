use pretty_assertions::assert_eq;
use toolsmith_lang::ast::{Expr, ImportName, Literal, StmtKind, Target};
use toolsmith_lang::parser::parse;

#[test]
fn test_parse_imports() {
    let program = parse(
        "import json\nimport datetime as dt\nfrom re import search, sub as replace\nfrom text import *",
    )
    .expect("parse");
    let kinds: Vec<StmtKind> = program.body.into_iter().map(|s| s.kind).collect();
    assert_eq!(
        kinds,
        vec![
            StmtKind::Import {
                module: "json".into(),
                alias: None
            },
            StmtKind::Import {
                module: "datetime".into(),
                alias: Some("dt".into())
            },
            StmtKind::FromImport {
                module: "re".into(),
                names: vec![
                    ImportName {
                        name: "search".into(),
                        alias: None
                    },
                    ImportName {
                        name: "sub".into(),
                        alias: Some("replace".into())
                    },
                ],
                wildcard: false,
            },
            StmtKind::FromImport {
                module: "text".into(),
                names: vec![],
                wildcard: true,
            },
        ]
    );
}

#[test]
fn test_parse_dotted_import() {
    let program = parse("import os.path").expect("parse");
    assert_eq!(
        program.body[0].kind,
        StmtKind::Import {
            module: "os.path".into(),
            alias: None
        }
    );
}

#[test]
fn test_parse_function_with_defaults_and_control_flow() {
    let source = r#"
def classify(n, label="value") {
    if n < 0 {
        return "negative"
    } elif n == 0 {
        return "zero"
    }
    else {
        return label
    }
}
"#;
    let program = parse(source).expect("parse");
    assert_eq!(program.body.len(), 1);
    let def = match &program.body[0].kind {
        StmtKind::Def(def) => def.clone(),
        other => panic!("expected def, got {:?}", other),
    };
    assert_eq!(def.name, "classify");
    assert_eq!(def.line, 2);
    assert_eq!(def.params.len(), 2);
    assert_eq!(
        def.params[1].default,
        Some(Expr::Literal(Literal::Str("value".into())))
    );
    match &def.body[0].kind {
        StmtKind::If { branches, orelse } => {
            assert_eq!(branches.len(), 2);
            assert_eq!(orelse.len(), 1);
        }
        other => panic!("expected if, got {:?}", other),
    }
}

#[test]
fn test_parse_index_assignment_targets() {
    let program = parse("totals[\"a\"][0] += 2").expect("parse");
    match &program.body[0].kind {
        StmtKind::AugAssign { target, .. } => assert_eq!(
            target,
            &Target {
                name: "totals".into(),
                indices: vec![
                    Expr::Literal(Literal::Str("a".into())),
                    Expr::Literal(Literal::Int(0)),
                ],
            }
        ),
        other => panic!("expected augmented assignment, got {:?}", other),
    }
}

#[test]
fn test_parse_multiline_literals_and_calls() {
    let source = "data = {\n  \"a\": [1,\n        2],\n  'b': None,\n}\nprint(\n  data,\n  sep=\"-\",\n)";
    let program = parse(source).expect("parse");
    assert_eq!(program.body.len(), 2);
    assert_eq!(program.body[1].line, 6);
    match &program.body[1].kind {
        StmtKind::Expr(Expr::Call { args, kwargs, .. }) => {
            assert_eq!(args.len(), 1);
            assert_eq!(kwargs[0].0, "sep");
        }
        other => panic!("expected call, got {:?}", other),
    }
}

#[test]
fn test_parse_semicolon_separated_statements() {
    let program = parse("a = 1; b = 2; pass").expect("parse");
    assert_eq!(program.body.len(), 3);
}

#[test]
fn test_parse_for_with_unpacking() {
    let program = parse("for i, item in enumerate(items) { print(i, item) }").expect("parse");
    match &program.body[0].kind {
        StmtKind::For { targets, .. } => assert_eq!(targets, &vec!["i".to_string(), "item".to_string()]),
        other => panic!("expected for, got {:?}", other),
    }
}

#[test]
fn test_parse_rejects_keyword_as_name() {
    assert!(parse("return = 3").is_err());
    assert!(parse("def if() { pass }").is_err());
}

#[test]
fn test_parse_rejects_positional_after_keyword() {
    let err = parse("f(a=1, 2)").unwrap_err();
    assert!(err.message.contains("positional argument follows keyword argument"));
}

#[test]
fn test_parse_rejects_default_before_required() {
    assert!(parse("def f(a=1, b) { pass }").is_err());
}

#[test]
fn test_parse_error_position_for_unclosed_block() {
    let err = parse("def f() {\n  return 1\n").unwrap_err();
    assert_eq!(err.line, 3);
}

#[test]
fn test_parse_string_escapes() {
    let program = parse(r#"x = "tab\there \"q\" 'single'""#).expect("parse");
    match &program.body[0].kind {
        StmtKind::Assign { value, .. } => assert_eq!(
            value,
            &Expr::Literal(Literal::Str("tab\there \"q\" 'single'".into()))
        ),
        other => panic!("expected assignment, got {:?}", other),
    }
}
