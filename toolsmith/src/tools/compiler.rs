//! Tool compilation
//!
//! Turns a tool's source into a [`CallableUnit`] bound into its tenant's
//! namespace. A source is either module-style, defining a top-level function
//! named after the tool, or body-style, where the whole source (minus its
//! top-level imports) becomes the body of that function.
//!
//! Module-level code runs against a staged overlay of the namespace and is
//! only committed once the tool compiled completely, so a failing tool never
//! leaves bindings behind for its siblings. The entry function itself is
//! never committed: it lives in its [`CallableUnit`], so a tool named like a
//! preloaded module or a sibling's helper cannot rebind either.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use thiserror::Error;
use toolsmith_lang::ast::{FunctionDef, Param, Program, Stmt, StmtKind};
use toolsmith_lang::parser::{parse, ParseError};
use toolsmith_lang::runtime::{
    builtins, ExecutionLimits, Interpreter, ModuleRegistry, Namespace, Value,
};
use toolsmith_lang::scope_check::unresolved_names;
use tracing::debug;

use super::callable::CallableUnit;
use super::types::ToolSpec;
use crate::security::{CapabilityPolicy, CodeValidator, PolicyImportGate, Tier};

#[derive(Debug, Clone, Error)]
pub enum CompilationError {
    #[error("{0}")]
    Parse(#[from] ParseError),

    #[error("policy violations: {}", .0.join("; "))]
    Policy(Vec<String>),

    #[error("source does not define '{0}'")]
    MissingEntryPoint(String),

    #[error("'{0}' is bound but is not a function")]
    NotCallable(String),

    #[error("'{tool}' does not accept declared parameter '{param}'")]
    SignatureMismatch { tool: String, param: String },

    #[error("{0}")]
    Bind(String),

    #[error("tenant '{0}' was invalidated while the tool compiled")]
    Invalidated(String),
}

impl CompilationError {
    /// The error as the ordered list persisted onto the tool record.
    pub fn messages(&self) -> Vec<String> {
        match self {
            CompilationError::Policy(violations) => violations.clone(),
            other => vec![other.to_string()],
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CompilerSettings {
    pub max_call_depth: usize,
    /// Bound on running a tool's module-level statements.
    pub compile_timeout: Duration,
}

impl Default for CompilerSettings {
    fn default() -> Self {
        Self {
            max_call_depth: toolsmith_lang::runtime::DEFAULT_MAX_CALL_DEPTH,
            compile_timeout: Duration::from_millis(2000),
        }
    }
}

struct TenantNamespace {
    tier: Tier,
    namespace: Arc<Namespace>,
}

/// A tenant's namespace plus a generation bumped on every discard, so a
/// compilation started before the discard cannot bring the namespace back.
#[derive(Default)]
struct TenantSlot {
    generation: u64,
    current: Option<TenantNamespace>,
}

pub struct ToolCompiler {
    policy: Arc<CapabilityPolicy>,
    validator: CodeValidator,
    registry: Arc<ModuleRegistry>,
    settings: CompilerSettings,
    namespaces: DashMap<String, TenantSlot>,
    compilations: AtomicU64,
}

impl ToolCompiler {
    pub fn new(
        policy: Arc<CapabilityPolicy>,
        registry: Arc<ModuleRegistry>,
        settings: CompilerSettings,
    ) -> Self {
        Self {
            validator: CodeValidator::new(policy.clone()),
            policy,
            registry,
            settings,
            namespaces: DashMap::new(),
            compilations: AtomicU64::new(0),
        }
    }

    pub fn validator(&self) -> &CodeValidator {
        &self.validator
    }

    /// Number of compilations started since construction.
    pub fn compilations(&self) -> u64 {
        self.compilations.load(Ordering::Relaxed)
    }

    pub fn has_namespace(&self, tenant_id: &str) -> bool {
        self.namespaces
            .get(tenant_id)
            .map(|slot| slot.current.is_some())
            .unwrap_or(false)
    }

    pub fn discard_namespace(&self, tenant_id: &str) {
        let mut slot = self.namespaces.entry(tenant_id.to_string()).or_default();
        slot.generation += 1;
        slot.current = None;
    }

    /// Current generation of the tenant's namespace; see
    /// [`ToolCompiler::compile_in_generation`].
    pub fn generation(&self, tenant_id: &str) -> u64 {
        self.namespaces
            .get(tenant_id)
            .map(|slot| slot.generation)
            .unwrap_or(0)
    }

    /// The tenant's namespace, created on first use and recreated when the
    /// tenant's tier changed.
    pub fn namespace_for(&self, tenant_id: &str, tier: Tier) -> Arc<Namespace> {
        let mut slot = self.namespaces.entry(tenant_id.to_string()).or_default();
        self.current_namespace(&mut slot, tenant_id, tier)
    }

    fn namespace_in_generation(
        &self,
        tenant_id: &str,
        tier: Tier,
        generation: Option<u64>,
    ) -> Result<Arc<Namespace>, CompilationError> {
        let mut slot = self.namespaces.entry(tenant_id.to_string()).or_default();
        if matches!(generation, Some(expected) if expected != slot.generation) {
            return Err(CompilationError::Invalidated(tenant_id.to_string()));
        }
        Ok(self.current_namespace(&mut slot, tenant_id, tier))
    }

    fn current_namespace(
        &self,
        slot: &mut TenantSlot,
        tenant_id: &str,
        tier: Tier,
    ) -> Arc<Namespace> {
        if let Some(current) = slot.current.as_ref().filter(|current| current.tier == tier) {
            return current.namespace.clone();
        }
        if slot.current.is_some() {
            debug!(tenant = %tenant_id, %tier, "tier changed, recreating namespace");
        }
        let created = self.new_namespace(tenant_id, tier);
        let namespace = created.namespace.clone();
        slot.current = Some(created);
        namespace
    }

    fn new_namespace(&self, tenant_id: &str, tier: Tier) -> TenantNamespace {
        let gate = PolicyImportGate::new(self.policy.clone(), self.registry.clone(), tier);
        let preloaded = gate.preloaded();
        let namespace = Namespace::new(tenant_id, Arc::new(gate));
        for module in preloaded {
            namespace.define(module.name.clone(), Value::Module(module));
        }
        TenantNamespace {
            tier,
            namespace: Arc::new(namespace),
        }
    }

    pub fn compile(
        &self,
        tenant_id: &str,
        tier: Tier,
        spec: &ToolSpec,
    ) -> Result<CallableUnit, CompilationError> {
        self.compile_with(tenant_id, tier, spec, None)
    }

    /// Like [`ToolCompiler::compile`], but fails with
    /// [`CompilationError::Invalidated`] instead of binding into the tenant's
    /// namespace once it was discarded after `generation` was read.
    pub fn compile_in_generation(
        &self,
        tenant_id: &str,
        tier: Tier,
        spec: &ToolSpec,
        generation: u64,
    ) -> Result<CallableUnit, CompilationError> {
        self.compile_with(tenant_id, tier, spec, Some(generation))
    }

    fn compile_with(
        &self,
        tenant_id: &str,
        tier: Tier,
        spec: &ToolSpec,
        generation: Option<u64>,
    ) -> Result<CallableUnit, CompilationError> {
        self.compilations.fetch_add(1, Ordering::Relaxed);
        debug!(tenant = %tenant_id, tool = %spec.name, "compiling tool");

        let parsed = parse(&spec.source_text)?;
        if self.policy.requires_validation(tier) {
            let violations = self.validator.check_program(&parsed, tier);
            if !violations.is_empty() {
                return Err(CompilationError::Policy(
                    violations.iter().map(ToString::to_string).collect(),
                ));
            }
        }

        let (program, entry_name) = shape_program(parsed, spec)?;
        let namespace = self.namespace_in_generation(tenant_id, tier, generation)?;

        let unresolved = unresolved_names(&program, &|name| {
            namespace.contains(name) || builtins::is_builtin(name)
        });
        if !unresolved.is_empty() {
            let detail: Vec<String> = unresolved
                .iter()
                .map(|u| format!("name '{}' is not defined (line {})", u.name, u.line))
                .collect();
            return Err(CompilationError::Bind(detail.join("; ")));
        }

        let limits = ExecutionLimits::default()
            .with_max_call_depth(self.settings.max_call_depth)
            .with_timeout(self.settings.compile_timeout);
        let mut interpreter = Interpreter::staged(namespace.clone(), limits);
        interpreter
            .exec_module(&program)
            .map_err(|e| CompilationError::Bind(e.to_string()))?;

        let entry = match interpreter.global(&entry_name) {
            Some(Value::Function(closure)) => Value::Function(Arc::new(closure.self_bound())),
            Some(_) => return Err(CompilationError::NotCallable(spec.name.clone())),
            None => return Err(CompilationError::MissingEntryPoint(spec.name.clone())),
        };
        let mut stage = interpreter.take_stage();
        stage.remove(&entry_name);
        namespace.commit(stage);

        Ok(CallableUnit::new(
            tenant_id,
            &spec.id,
            &spec.name,
            &spec.description,
            spec.parameter_list.clone(),
            entry,
            namespace,
        ))
    }
}

/// Binding of a body-style tool's entry function. Not an identifier, so tool
/// code can neither reach nor shadow it.
fn body_entry_name(tool_name: &str) -> String {
    format!("<tool {}>", tool_name)
}

/// Rewrite a body-style source into a module defining the entry function,
/// and check a module-style entry function against the declared parameters.
/// Returns the program and the binding its entry function ends up under.
fn shape_program(
    program: Program,
    spec: &ToolSpec,
) -> Result<(Program, String), CompilationError> {
    let entry = program.body.iter().find_map(|stmt| match &stmt.kind {
        StmtKind::Def(def) if def.name == spec.name => Some(def.clone()),
        _ => None,
    });

    if let Some(def) = entry {
        check_signature(&def, spec)?;
        return Ok((program, spec.name.clone()));
    }

    let declarations_only = program.body.iter().all(|stmt| {
        matches!(
            stmt.kind,
            StmtKind::Import { .. } | StmtKind::FromImport { .. } | StmtKind::Def(_)
        )
    });
    if declarations_only {
        return Err(CompilationError::MissingEntryPoint(spec.name.clone()));
    }

    let (imports, body): (Vec<Stmt>, Vec<Stmt>) = program.body.into_iter().partition(|stmt| {
        matches!(
            stmt.kind,
            StmtKind::Import { .. } | StmtKind::FromImport { .. }
        )
    });
    let line = body.first().map(|stmt| stmt.line).unwrap_or(1);
    let entry_name = body_entry_name(&spec.name);
    let def = FunctionDef {
        name: entry_name.clone(),
        params: spec
            .parameter_list
            .iter()
            .map(|p| Param {
                name: p.name.clone(),
                default: None,
            })
            .collect(),
        body,
        line,
    };

    let mut shaped = imports;
    shaped.push(Stmt {
        kind: StmtKind::Def(Arc::new(def)),
        line,
    });
    Ok((Program { body: shaped }, entry_name))
}

fn check_signature(def: &FunctionDef, spec: &ToolSpec) -> Result<(), CompilationError> {
    for declared in &spec.parameter_list {
        if !def.param_names().any(|name| name == declared.name) {
            return Err(CompilationError::SignatureMismatch {
                tool: spec.name.clone(),
                param: declared.name.clone(),
            });
        }
    }
    for param in &def.params {
        let declared = spec.parameter_list.iter().any(|p| p.name == param.name);
        if param.default.is_none() && !declared {
            return Err(CompilationError::SignatureMismatch {
                tool: spec.name.clone(),
                param: param.name.clone(),
            });
        }
    }
    Ok(())
}
