//! Capability policy, static validation and the run-time import gate.

pub mod gate;
pub mod policy;
pub mod validator;

pub use gate::PolicyImportGate;
pub use policy::{CapabilityPolicy, Strictness, SymbolAllowance, Tier};
pub use validator::{CodeValidator, PolicyViolation, ViolationKind};
