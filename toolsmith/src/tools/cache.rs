//! Compiled tool cache
//!
//! Keyed by `(tenant_id, tool_id)`. A slot holds either a finished unit or
//! the in-flight compilation for that key, so concurrent callers for the same
//! key share one compilation while unrelated keys never wait on each other.
//! A slot is only reused for the same source and the same tier.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, info};

use super::callable::CallableUnit;
use super::compiler::{CompilationError, ToolCompiler};
use super::types::ToolSpec;
use crate::security::Tier;

pub type CompileOutcome = Result<Arc<CallableUnit>, CompilationError>;

type InFlight = Shared<BoxFuture<'static, CompileOutcome>>;

type CacheKey = (String, String);

/// What a slot was compiled from.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Stamp {
    fingerprint: String,
    tier: Tier,
}

enum Slot {
    Ready {
        stamp: Stamp,
        unit: Arc<CallableUnit>,
    },
    Pending {
        stamp: Stamp,
        ticket: u64,
        compilation: InFlight,
    },
}

impl Slot {
    fn stamp(&self) -> &Stamp {
        match self {
            Slot::Ready { stamp, .. } | Slot::Pending { stamp, .. } => stamp,
        }
    }
}

pub struct CompiledToolCache {
    compiler: Arc<ToolCompiler>,
    slots: DashMap<CacheKey, Slot>,
    next_ticket: AtomicU64,
}

impl CompiledToolCache {
    pub fn new(compiler: Arc<ToolCompiler>) -> Self {
        Self {
            compiler,
            slots: DashMap::new(),
            next_ticket: AtomicU64::new(1),
        }
    }

    pub fn compiler(&self) -> &Arc<ToolCompiler> {
        &self.compiler
    }

    /// The cached unit for `spec`, compiling it first when needed.
    ///
    /// A cached unit is reused only while the spec's fingerprint and the
    /// tenant's tier are unchanged. Failed compilations are not cached.
    pub async fn get_or_compile(
        &self,
        tenant_id: &str,
        tier: Tier,
        spec: &ToolSpec,
    ) -> CompileOutcome {
        let key = (tenant_id.to_string(), spec.id.clone());
        let stamp = Stamp {
            fingerprint: spec.fingerprint(),
            tier,
        };

        let (ticket, compilation) = match self.slots.entry(key.clone()) {
            Entry::Occupied(mut occupied) => match occupied.get() {
                Slot::Ready { stamp: cached, unit } if *cached == stamp => return Ok(unit.clone()),
                Slot::Pending {
                    stamp: pending,
                    ticket,
                    compilation,
                } if *pending == stamp => (*ticket, compilation.clone()),
                previous => {
                    let reason = if previous.stamp().tier != tier {
                        "tier changed"
                    } else {
                        "source changed"
                    };
                    debug!(tenant = %tenant_id, tool = %spec.id, %tier, "{}, recompiling", reason);
                    let (ticket, compilation) = self.start(tenant_id, tier, spec);
                    occupied.insert(Slot::Pending {
                        stamp,
                        ticket,
                        compilation: compilation.clone(),
                    });
                    (ticket, compilation)
                }
            },
            Entry::Vacant(vacant) => {
                let (ticket, compilation) = self.start(tenant_id, tier, spec);
                vacant.insert(Slot::Pending {
                    stamp,
                    ticket,
                    compilation: compilation.clone(),
                });
                (ticket, compilation)
            }
        };

        let outcome = compilation.await;
        self.settle(&key, ticket, &outcome);
        outcome
    }

    /// Spawn the compilation. It is pinned to the namespace generation seen
    /// here, so invalidating the tenant meanwhile makes it fail instead of
    /// recreating the namespace.
    fn start(&self, tenant_id: &str, tier: Tier, spec: &ToolSpec) -> (u64, InFlight) {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let generation = self.compiler.generation(tenant_id);
        let compiler = self.compiler.clone();
        let tenant_id = tenant_id.to_string();
        let spec = spec.clone();
        let compilation = async move {
            let task = tokio::task::spawn_blocking(move || {
                compiler.compile_in_generation(&tenant_id, tier, &spec, generation)
            });
            match task.await {
                Ok(result) => result.map(Arc::new),
                Err(join_error) => Err(CompilationError::Bind(format!(
                    "compilation task failed: {}",
                    join_error
                ))),
            }
        }
        .boxed()
        .shared();
        (ticket, compilation)
    }

    /// Replace the pending slot this ticket created with its outcome. A slot
    /// that was invalidated or superseded meanwhile is left alone.
    fn settle(&self, key: &CacheKey, ticket: u64, outcome: &CompileOutcome) {
        let holds_ticket =
            |slot: &Slot| matches!(slot, Slot::Pending { ticket: t, .. } if *t == ticket);
        match outcome {
            Ok(unit) => {
                if let Some(mut slot) = self.slots.get_mut(key) {
                    if holds_ticket(&*slot) {
                        let stamp = slot.stamp().clone();
                        *slot = Slot::Ready {
                            stamp,
                            unit: unit.clone(),
                        };
                    }
                }
            }
            Err(_) => {
                self.slots.remove_if(key, |_, slot| holds_ticket(slot));
            }
        }
    }

    /// Drop every cached unit and the namespace of `tenant_id`.
    pub fn invalidate_tenant(&self, tenant_id: &str) {
        let before = self.slots.len();
        self.slots.retain(|(tenant, _), _| tenant != tenant_id);
        self.compiler.discard_namespace(tenant_id);
        info!(
            tenant = %tenant_id,
            dropped = before.saturating_sub(self.slots.len()),
            "invalidated tenant tools"
        );
    }

    /// Number of finished units cached for `tenant_id`.
    pub fn cached_tool_count(&self, tenant_id: &str) -> usize {
        self.slots
            .iter()
            .filter(|entry| entry.key().0 == tenant_id && matches!(entry.value(), Slot::Ready { .. }))
            .count()
    }

    pub fn has_namespace(&self, tenant_id: &str) -> bool {
        self.compiler.has_namespace(tenant_id)
    }
}
