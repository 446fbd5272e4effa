use std::sync::Arc;

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use toolsmith::security::policy::ALWAYS_ALLOWED_MODULES;
use toolsmith::security::{CapabilityPolicy, CodeValidator, Strictness, Tier};

const DENIED_MODULES: &[&str] = &[
    "os",
    "sys",
    "subprocess",
    "socket",
    "shutil",
    "ctypes",
    "importlib",
    "pickle",
    "marshal",
    "inspect",
    "multiprocessing",
    "threading",
];

fn validator() -> CodeValidator {
    CodeValidator::new(Arc::new(CapabilityPolicy::standard()))
}

fn tier() -> impl Strategy<Value = Tier> {
    prop_oneof![Just(Tier::Restricted), Just(Tier::Unrestricted)]
}

proptest! {
    #[test]
    fn always_allowed_imports_validate_clean(
        modules in proptest::sample::subsequence(ALWAYS_ALLOWED_MODULES.to_vec(), 0..=ALWAYS_ALLOWED_MODULES.len()),
        tier in tier(),
    ) {
        let mut source: Vec<String> = modules.iter().map(|m| format!("import {}", m)).collect();
        source.push("return 1".to_string());
        let errors = validator().validate(&source.join("\n"), tier);
        prop_assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
    }

    #[test]
    fn denied_module_is_named_in_result(
        module in proptest::sample::select(DENIED_MODULES.to_vec()),
        submodule in proptest::option::of("x[a-z]{0,5}"),
    ) {
        let target = match &submodule {
            Some(sub) => format!("{}.{}", module, sub),
            None => module.to_string(),
        };
        let source = format!("import json\nimport {}\nreturn 1", target);
        let errors = validator().validate(&source, Tier::Restricted);
        prop_assert_eq!(errors.len(), 1);
        prop_assert!(errors[0].contains(&target), "{:?} does not name {}", errors, target);
        prop_assert!(errors[0].contains("line 2"));
    }
}

#[test]
fn test_violations_are_listed_in_source_order() {
    let source = "import json\nfrom subprocess import run\nx = eval(\"1\")\nimport socket\nreturn x";
    let errors = validator().validate(source, Tier::Restricted);
    assert_eq!(
        errors,
        vec![
            "import of denied module 'subprocess' (line 2)".to_string(),
            "call to forbidden operation 'eval' (line 3)".to_string(),
            "import of denied module 'socket' (line 4)".to_string(),
        ]
    );
}

#[test]
fn test_restricted_tier_limits_symbols() {
    let v = validator();
    assert!(v
        .validate("from text import slugify\nreturn slugify(\"A b\")", Tier::Restricted)
        .is_empty());
    let errors = v.validate("from text import wrap\nreturn 1", Tier::Restricted);
    assert_eq!(
        errors,
        vec!["import of 'wrap' from module 'text' is not allowed for this tier (line 1)".to_string()]
    );

    let strict = CodeValidator::new(Arc::new(
        CapabilityPolicy::standard().with_unrestricted_strictness(Strictness::Strict),
    ));
    assert!(strict
        .validate("from text import wrap\nreturn 1", Tier::Unrestricted)
        .is_empty());
    assert_eq!(
        strict.validate("import socket\nreturn 1", Tier::Unrestricted),
        vec!["import of denied module 'socket' (line 1)".to_string()]
    );
}

#[test]
fn test_unrestricted_extended_strictness_skips_validation() {
    let policy = CapabilityPolicy::standard().with_unrestricted_strictness(Strictness::Extended);
    let v = CodeValidator::new(Arc::new(policy));
    assert!(v.validate("import socket\nreturn 1", Tier::Unrestricted).is_empty());
    assert_eq!(v.validate("import socket\nreturn 1", Tier::Restricted).len(), 1);
}

#[test]
fn test_parse_error_is_single_entry() {
    let errors = validator().validate("return (", Tier::Restricted);
    assert_eq!(errors.len(), 1);
}
