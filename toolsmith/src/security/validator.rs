//! Static validation of tool source against the capability policy.
//!
//! Nothing here executes the candidate program. Violations accumulate so a
//! tenant sees every problem of a revision at once.

use std::fmt;
use std::sync::Arc;

use toolsmith_lang::ast::{Expr, Program, Stmt, StmtKind};
use toolsmith_lang::parser::{parse, ParseError};
use toolsmith_lang::walk::{walk_expr, walk_stmt, Visitor};

use super::policy::{CapabilityPolicy, Tier};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViolationKind {
    /// Module root is in the deny-set.
    DeniedModule,
    /// Module is not in the tier's allow table.
    ModuleNotAllowed,
    /// Imported name is in the deny-set.
    DeniedSymbol { module: String },
    /// Imported name is outside the module's allow entry.
    SymbolNotAllowed { module: String },
    /// Bare call to an inherently dangerous operation.
    DangerousCall,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyViolation {
    pub kind: ViolationKind,
    pub subject: String,
    pub line: usize,
}

impl fmt::Display for PolicyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ViolationKind::DeniedModule => write!(
                f,
                "import of denied module '{}' (line {})",
                self.subject, self.line
            ),
            ViolationKind::ModuleNotAllowed => write!(
                f,
                "import of module '{}' is not allowed for this tier (line {})",
                self.subject, self.line
            ),
            ViolationKind::DeniedSymbol { module } => write!(
                f,
                "import of denied name '{}' from module '{}' (line {})",
                self.subject, module, self.line
            ),
            ViolationKind::SymbolNotAllowed { module } => write!(
                f,
                "import of '{}' from module '{}' is not allowed for this tier (line {})",
                self.subject, module, self.line
            ),
            ViolationKind::DangerousCall => write!(
                f,
                "call to forbidden operation '{}' (line {})",
                self.subject, self.line
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CodeValidator {
    policy: Arc<CapabilityPolicy>,
}

impl CodeValidator {
    pub fn new(policy: Arc<CapabilityPolicy>) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &Arc<CapabilityPolicy> {
        &self.policy
    }

    /// Validate `source` for `tier`. An empty list means the source is valid.
    ///
    /// A syntax error is reported as a single entry; the rest of the source is
    /// not inspected.
    pub fn validate(&self, source: &str, tier: Tier) -> Vec<String> {
        match self.validate_detailed(source, tier) {
            Ok(violations) => violations.iter().map(ToString::to_string).collect(),
            Err(parse_error) => vec![parse_error.to_string()],
        }
    }

    pub fn validate_detailed(
        &self,
        source: &str,
        tier: Tier,
    ) -> Result<Vec<PolicyViolation>, ParseError> {
        if !self.policy.requires_validation(tier) {
            return Ok(Vec::new());
        }
        let program = parse(source)?;
        Ok(self.check_program(&program, tier))
    }

    /// Policy check of an already parsed program. Runs regardless of the
    /// tier's strictness.
    pub fn check_program(&self, program: &Program, tier: Tier) -> Vec<PolicyViolation> {
        let mut checker = PolicyChecker {
            policy: &self.policy,
            tier,
            violations: Vec::new(),
        };
        for stmt in &program.body {
            checker.visit_stmt(stmt);
        }
        checker.violations
    }
}

struct PolicyChecker<'a> {
    policy: &'a CapabilityPolicy,
    tier: Tier,
    violations: Vec<PolicyViolation>,
}

impl PolicyChecker<'_> {
    fn push(&mut self, kind: ViolationKind, subject: &str, line: usize) {
        self.violations.push(PolicyViolation {
            kind,
            subject: subject.to_string(),
            line,
        });
    }

    /// Returns false when the module itself was rejected.
    fn check_module(&mut self, module: &str, line: usize) -> bool {
        if self.policy.is_denied(module) {
            self.push(ViolationKind::DeniedModule, module, line);
            return false;
        }
        if !self.policy.is_module_allowed(self.tier, module) {
            self.push(ViolationKind::ModuleNotAllowed, module, line);
            return false;
        }
        true
    }
}

impl Visitor for PolicyChecker<'_> {
    fn visit_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Import { module, .. } => {
                self.check_module(module, stmt.line);
            }
            StmtKind::FromImport {
                module,
                names,
                wildcard,
            } => {
                if self.check_module(module, stmt.line) && !*wildcard {
                    for item in names {
                        if self.policy.is_denied(&item.name) {
                            self.push(
                                ViolationKind::DeniedSymbol {
                                    module: module.clone(),
                                },
                                &item.name,
                                stmt.line,
                            );
                        } else if !self.policy.is_symbol_allowed(self.tier, module, &item.name) {
                            self.push(
                                ViolationKind::SymbolNotAllowed {
                                    module: module.clone(),
                                },
                                &item.name,
                                stmt.line,
                            );
                        }
                    }
                }
            }
            _ => {}
        }
        walk_stmt(self, stmt);
    }

    fn visit_expr(&mut self, expr: &Expr, line: usize) {
        if let Expr::Call { func, line, .. } = expr {
            if let Expr::Name(name) = func.as_ref() {
                if self.policy.is_dangerous_call(name) {
                    self.push(ViolationKind::DangerousCall, name, *line);
                }
            }
        }
        walk_expr(self, expr, line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::policy::Strictness;
    use pretty_assertions::assert_eq;

    fn validator() -> CodeValidator {
        CodeValidator::new(Arc::new(CapabilityPolicy::standard()))
    }

    #[test]
    fn test_clean_source_has_no_violations() {
        let source = "import json\nfrom re import sub\ndef main(x) { return json.dumps(sub(\"a\", \"b\", x)) }";
        assert!(validator().validate(source, Tier::Restricted).is_empty());
    }

    #[test]
    fn test_denied_module_reported_once() {
        assert_eq!(
            validator().validate("import socket", Tier::Restricted),
            vec!["import of denied module 'socket' (line 1)".to_string()]
        );
    }

    #[test]
    fn test_dotted_import_checks_root_segment() {
        let errors = validator().validate("import os.path as p", Tier::Restricted);
        assert_eq!(errors, vec!["import of denied module 'os.path' (line 1)".to_string()]);
    }

    #[test]
    fn test_violations_accumulate_in_source_order() {
        let source = r#"
from text import slugify, wrap
import requests
def main() {
    from subprocess import run
    return eval("1")
}
"#;
        let violations = validator()
            .validate_detailed(source, Tier::Restricted)
            .expect("parses");
        let summary: Vec<(ViolationKind, &str, usize)> = violations
            .iter()
            .map(|v| (v.kind.clone(), v.subject.as_str(), v.line))
            .collect();
        assert_eq!(
            summary,
            vec![
                (
                    ViolationKind::SymbolNotAllowed {
                        module: "text".into()
                    },
                    "wrap",
                    2
                ),
                (ViolationKind::ModuleNotAllowed, "requests", 3),
                (ViolationKind::DeniedModule, "subprocess", 5),
                (ViolationKind::DangerousCall, "eval", 6),
            ]
        );
    }

    #[test]
    fn test_denied_symbol_from_allowed_module() {
        let errors = validator().validate("from json import open", Tier::Restricted);
        assert_eq!(
            errors,
            vec!["import of denied name 'open' from module 'json' (line 1)".to_string()]
        );
    }

    #[test]
    fn test_syntax_error_is_single_terminal_entry() {
        let errors = validator().validate("def broken( {\nimport os", Tier::Restricted);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("syntax error at line 1"));
    }

    #[test]
    fn test_unrestricted_fast_path() {
        assert!(validator()
            .validate("import socket\neval(\"x\")", Tier::Unrestricted)
            .is_empty());

        let strict = CodeValidator::new(Arc::new(
            CapabilityPolicy::standard().with_unrestricted_strictness(Strictness::Strict),
        ));
        assert_eq!(strict.validate("import socket", Tier::Unrestricted).len(), 1);
    }
}
