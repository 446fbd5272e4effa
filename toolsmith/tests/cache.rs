use std::sync::Arc;
use std::task::Poll;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use toolsmith::security::{CapabilityPolicy, Tier};
use toolsmith::tools::{
    CompilationError, CompiledToolCache, CompilerSettings, InvocationLimits, ToolCompiler,
    ToolParameter, ParamType, ToolSpec,
};
use toolsmith_lang::ModuleRegistry;

fn cache() -> CompiledToolCache {
    let compiler = ToolCompiler::new(
        Arc::new(CapabilityPolicy::standard()),
        Arc::new(ModuleRegistry::standard()),
        CompilerSettings::default(),
    );
    CompiledToolCache::new(Arc::new(compiler))
}

fn limits() -> InvocationLimits {
    InvocationLimits {
        max_call_depth: 32,
        timeout: Duration::from_secs(5),
    }
}

fn hello(tenant: &str) -> ToolSpec {
    ToolSpec::new("t-hello", tenant, "hello", "return \"hello from \" + tenant")
        .with_parameters(vec![ToolParameter::required("tenant", ParamType::String)])
}

#[tokio::test]
async fn test_cached_unit_is_reused() {
    let cache = cache();
    let spec = hello("acme");
    let first = cache.get_or_compile("acme", Tier::Restricted, &spec).await.unwrap();
    let second = cache.get_or_compile("acme", Tier::Restricted, &spec).await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(cache.compiler().compilations(), 1);
    assert_eq!(cache.cached_tool_count("acme"), 1);

    let out = first
        .invoke_blocking(json!({"tenant": "acme"}), limits())
        .await
        .unwrap();
    assert_eq!(out.result, json!("hello from acme"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callers_share_one_compilation() {
    let cache = Arc::new(cache());
    let spec = hello("acme");
    let callers = (0..16).map(|_| {
        let cache = cache.clone();
        let spec = spec.clone();
        async move { cache.get_or_compile("acme", Tier::Restricted, &spec).await }
    });
    let units: Vec<_> = futures::future::join_all(callers)
        .await
        .into_iter()
        .map(|outcome| outcome.unwrap())
        .collect();

    assert_eq!(cache.compiler().compilations(), 1);
    assert!(units.iter().all(|unit| Arc::ptr_eq(unit, &units[0])));
}

#[tokio::test]
async fn test_failed_sibling_leaves_no_bindings() {
    let cache = cache();
    let broken = ToolSpec::new(
        "t-broken",
        "acme",
        "broken",
        "def leaked_helper() { return 1 }\nboom = [1][5]\ndef broken() { return leaked_helper() }",
    );
    let good = ToolSpec::new("t-good", "acme", "good", "return 42");

    let (broken_outcome, good_outcome) = futures::join!(
        cache.get_or_compile("acme", Tier::Restricted, &broken),
        cache.get_or_compile("acme", Tier::Restricted, &good),
    );
    assert!(matches!(broken_outcome, Err(CompilationError::Bind(_))));
    let good = good_outcome.unwrap();
    assert_eq!(good.invoke_blocking(json!({}), limits()).await.unwrap().result, json!(42));

    let namespace = cache.compiler().namespace_for("acme", Tier::Restricted);
    assert!(!namespace.contains("leaked_helper"));
    assert!(!namespace.contains("boom"));
    assert!(!namespace.contains("good"));
}

#[tokio::test]
async fn test_failures_are_not_cached() {
    let cache = cache();
    let spec = ToolSpec::new("t1", "acme", "bad", "import socket\nreturn 1");
    for _ in 0..2 {
        let err = cache
            .get_or_compile("acme", Tier::Restricted, &spec)
            .await
            .unwrap_err();
        assert_eq!(
            err.messages(),
            vec!["import of denied module 'socket' (line 1)".to_string()]
        );
    }
    assert_eq!(cache.compiler().compilations(), 2);
    assert_eq!(cache.cached_tool_count("acme"), 0);
}

#[tokio::test]
async fn test_changed_source_recompiles() {
    let cache = cache();
    let mut spec = ToolSpec::new("t1", "acme", "answer", "return 1");
    let before = cache.get_or_compile("acme", Tier::Restricted, &spec).await.unwrap();
    spec.source_text = "return 2".to_string();
    let after = cache.get_or_compile("acme", Tier::Restricted, &spec).await.unwrap();

    assert!(!Arc::ptr_eq(&before, &after));
    assert_eq!(cache.compiler().compilations(), 2);
    assert_eq!(after.invoke_blocking(json!({}), limits()).await.unwrap().result, json!(2));
}

#[tokio::test]
async fn test_invalidate_is_scoped_to_tenant() {
    let cache = cache();
    let acme = cache.get_or_compile("acme", Tier::Restricted, &hello("acme")).await.unwrap();
    let globex = cache.get_or_compile("globex", Tier::Restricted, &hello("globex")).await.unwrap();
    assert!(!Arc::ptr_eq(&acme, &globex));
    assert!(!Arc::ptr_eq(acme.namespace(), globex.namespace()));

    cache.invalidate_tenant("acme");
    assert_eq!(cache.cached_tool_count("acme"), 0);
    assert!(!cache.has_namespace("acme"));
    assert_eq!(cache.cached_tool_count("globex"), 1);
    assert!(cache.has_namespace("globex"));

    let again = cache.get_or_compile("acme", Tier::Restricted, &hello("acme")).await.unwrap();
    assert!(!Arc::ptr_eq(&acme, &again));
    assert_eq!(cache.compiler().compilations(), 3);
}

#[tokio::test]
async fn test_same_tool_id_in_two_tenants_is_isolated() {
    let cache = cache();
    let globex = ToolSpec::new(
        "t-report",
        "globex",
        "report",
        "def secret() { return \"globex only\" }\ndef report() { return secret() }",
    );
    let acme = ToolSpec::new("t-report", "acme", "report", "return secret()");

    let globex_unit = cache.get_or_compile("globex", Tier::Restricted, &globex).await.unwrap();
    let err = cache
        .get_or_compile("acme", Tier::Restricted, &acme)
        .await
        .unwrap_err();
    assert!(matches!(err, CompilationError::Bind(_)));
    assert_eq!(err.to_string(), "name 'secret' is not defined (line 1)");

    assert_eq!(cache.cached_tool_count("acme"), 0);
    assert_eq!(cache.cached_tool_count("globex"), 1);
    assert_eq!(
        globex_unit.invoke_blocking(json!({}), limits()).await.unwrap().result,
        json!("globex only")
    );
}

#[tokio::test]
async fn test_tier_change_recompiles_under_new_policy() {
    let cache = cache();
    let spec = ToolSpec::new("t-wrap", "initech", "wrap", "from text import wrap\nreturn wrap(\"a b c\", 1)");

    let unit = cache.get_or_compile("initech", Tier::Unrestricted, &spec).await.unwrap();
    assert_eq!(
        unit.invoke_blocking(json!({}), limits()).await.unwrap().result,
        json!(["a", "b", "c"])
    );

    let err = cache
        .get_or_compile("initech", Tier::Restricted, &spec)
        .await
        .unwrap_err();
    assert_eq!(
        err.messages(),
        vec!["import of 'wrap' from module 'text' is not allowed for this tier (line 1)".to_string()]
    );
    assert_eq!(cache.compiler().compilations(), 2);
    assert_eq!(cache.cached_tool_count("initech"), 0);
}

#[tokio::test]
async fn test_tool_named_like_module_leaves_siblings_working() {
    let cache = cache();
    let encode = ToolSpec::new("t-encode", "acme", "encode", "import json\nreturn json.dumps([1])");
    let shadowing = ToolSpec::new("t-json", "acme", "json", "return 1");

    let encode = cache.get_or_compile("acme", Tier::Restricted, &encode).await.unwrap();
    let shadowing = cache.get_or_compile("acme", Tier::Restricted, &shadowing).await.unwrap();

    assert_eq!(
        encode.invoke_blocking(json!({}), limits()).await.unwrap().result,
        json!("[1]")
    );
    assert_eq!(
        shadowing.invoke_blocking(json!({}), limits()).await.unwrap().result,
        json!(1)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_invalidate_during_compilation_leaves_no_namespace() {
    let cache = cache();
    let spec = hello("acme");

    let mut compiling = Box::pin(cache.get_or_compile("acme", Tier::Restricted, &spec));
    let first = futures::poll!(compiling.as_mut());
    cache.invalidate_tenant("acme");

    let outcome = match first {
        Poll::Ready(outcome) => outcome,
        Poll::Pending => compiling.await,
    };
    match outcome {
        Ok(_) | Err(CompilationError::Invalidated(_)) => {}
        Err(other) => panic!("unexpected compilation error: {}", other),
    }
    assert!(!cache.has_namespace("acme"));
    assert_eq!(cache.cached_tool_count("acme"), 0);
}
