//! Runtime host
//!
//! Owns the mounted tenant servers. Each tenant has a cell whose async mutex
//! orders mount and unmount for that tenant; different tenants never wait on
//! each other. Resources acquired by a mount are kept in the host's
//! [`ResourceLedger`] and released on unmount or, newest tenant first, on
//! shutdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::resources::{GateResource, ResourceLedger, ResourceStack, SessionReaper};
use super::routing::{endpoint_for, RouteTable};
use crate::config::HostConfig;
use crate::mcp::TenantServer;
use crate::repository::{RepositoryError, ToolRepository};
use crate::security::Tier;
use crate::tools::{
    CallableUnit, CompiledToolCache, Invocation, InvocationError, InvocationLimits, ToolCompiler,
    ToolSpec,
};
use toolsmith_lang::ModuleRegistry;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolFailure {
    pub tool_id: String,
    pub name: String,
    pub errors: Vec<String>,
}

#[derive(Debug, Error)]
pub enum HostError {
    #[error("no valid tools for tenant '{tenant_id}' ({} failed)", .failures.len())]
    NoValidTools {
        tenant_id: String,
        failures: Vec<ToolFailure>,
    },

    #[error("tenant '{0}' is already mounted")]
    AlreadyMounted(String),

    #[error("tenant '{0}' is not mounted")]
    NotMounted(String),

    #[error("mounting tenant '{tenant_id}' timed out after {timeout:?}")]
    MountTimeout { tenant_id: String, timeout: Duration },

    #[error("endpoint '{0}' is already registered")]
    RouteConflict(String),

    #[error("host is shutting down")]
    ShuttingDown,

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Invocation(#[from] InvocationError),
}

impl HostError {
    /// Caller misuse of the mount state machine.
    pub fn is_mount_state_error(&self) -> bool {
        matches!(self, HostError::AlreadyMounted(_) | HostError::NotMounted(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MountPhase {
    Unmounted,
    Mounting,
    Mounted,
    Unmounting,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MountResult {
    pub tenant_id: String,
    pub endpoint_path: String,
    pub mounted_tools: Vec<String>,
    pub failed_tools: Vec<ToolFailure>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TenantFailure {
    pub tenant_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconciliationReport {
    pub mounted: Vec<String>,
    pub failed: Vec<TenantFailure>,
}

#[derive(Debug, Clone, Copy)]
pub struct HostSettings {
    pub mount_timeout: Duration,
    pub reconcile_concurrency: usize,
    pub drain_timeout: Duration,
    pub session_idle_ttl: Duration,
    pub session_reap_interval: Duration,
    pub invocation: InvocationLimits,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            mount_timeout: Duration::from_millis(10_000),
            reconcile_concurrency: 4,
            drain_timeout: Duration::from_millis(5_000),
            session_idle_ttl: Duration::from_secs(1_800),
            session_reap_interval: Duration::from_secs(60),
            invocation: InvocationLimits {
                max_call_depth: toolsmith_lang::runtime::DEFAULT_MAX_CALL_DEPTH,
                timeout: Duration::from_millis(30_000),
            },
        }
    }
}

struct MountedServer {
    endpoint_path: String,
    server: Arc<TenantServer>,
}

struct TenantCell {
    mount: tokio::sync::Mutex<Option<MountedServer>>,
    phase: Mutex<MountPhase>,
}

impl TenantCell {
    fn new() -> Self {
        Self {
            mount: tokio::sync::Mutex::new(None),
            phase: Mutex::new(MountPhase::Unmounted),
        }
    }

    fn phase(&self) -> MountPhase {
        *self.phase.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_phase(&self, phase: MountPhase) {
        *self.phase.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = phase;
    }
}

/// Puts a cell back to `Unmounted` and drops whatever the attempt compiled
/// into the cache, unless the mount it guards completed.
struct MountingPhase<'a> {
    cell: &'a TenantCell,
    cache: &'a CompiledToolCache,
    tenant_id: &'a str,
    completed: bool,
}

impl Drop for MountingPhase<'_> {
    fn drop(&mut self) {
        if !self.completed {
            self.cache.invalidate_tenant(self.tenant_id);
            self.cell.set_phase(MountPhase::Unmounted);
        }
    }
}

pub struct RuntimeHost {
    cache: Arc<CompiledToolCache>,
    repository: Arc<dyn ToolRepository>,
    routes: Arc<RouteTable>,
    settings: HostSettings,
    cells: DashMap<String, Arc<TenantCell>>,
    ledger: ResourceLedger,
    shutting_down: AtomicBool,
    ready: AtomicBool,
}

impl RuntimeHost {
    pub fn new(
        cache: Arc<CompiledToolCache>,
        repository: Arc<dyn ToolRepository>,
        settings: HostSettings,
    ) -> Self {
        Self {
            cache,
            repository,
            routes: Arc::new(RouteTable::new()),
            settings,
            cells: DashMap::new(),
            ledger: ResourceLedger::new(),
            shutting_down: AtomicBool::new(false),
            ready: AtomicBool::new(false),
        }
    }

    /// Wire policy, compiler and cache from configuration.
    pub fn from_config(config: &HostConfig, repository: Arc<dyn ToolRepository>) -> Self {
        let compiler = ToolCompiler::new(
            Arc::new(config.policy()),
            Arc::new(ModuleRegistry::standard()),
            config.compiler_settings(),
        );
        let cache = Arc::new(CompiledToolCache::new(Arc::new(compiler)));
        Self::new(cache, repository, config.host_settings())
    }

    pub fn cache(&self) -> &Arc<CompiledToolCache> {
        &self.cache
    }

    pub fn routes(&self) -> &Arc<RouteTable> {
        &self.routes
    }

    pub fn settings(&self) -> &HostSettings {
        &self.settings
    }

    /// True once startup reconciliation has returned.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn phase(&self, tenant_id: &str) -> MountPhase {
        self.cells
            .get(tenant_id)
            .map(|cell| cell.phase())
            .unwrap_or(MountPhase::Unmounted)
    }

    pub fn mounted_tenants(&self) -> Vec<String> {
        self.ledger.tenants()
    }

    fn cell(&self, tenant_id: &str) -> Arc<TenantCell> {
        self.cells
            .entry(tenant_id.to_string())
            .or_insert_with(|| Arc::new(TenantCell::new()))
            .clone()
    }

    fn check_running(&self) -> Result<(), HostError> {
        if self.shutting_down.load(Ordering::Acquire) {
            return Err(HostError::ShuttingDown);
        }
        Ok(())
    }

    /// Compile `tool_specs` and mount the tenant's server at `/{tenant_id}`.
    ///
    /// Tools that fail to compile are skipped and reported; the mount fails
    /// only when none compiled.
    pub async fn mount(
        &self,
        tenant_id: &str,
        tier: Tier,
        tool_specs: Vec<ToolSpec>,
    ) -> Result<MountResult, HostError> {
        self.check_running()?;
        let cell = self.cell(tenant_id);
        let mut slot = cell.mount.lock().await;
        if slot.is_some() {
            return Err(HostError::AlreadyMounted(tenant_id.to_string()));
        }
        self.check_running()?;

        cell.set_phase(MountPhase::Mounting);
        let mut phase = MountingPhase {
            cell: &cell,
            cache: &self.cache,
            tenant_id,
            completed: false,
        };

        info!(tenant = %tenant_id, %tier, tools = tool_specs.len(), "mounting tenant");
        let (units, failed_tools) = self.compile_tools(tenant_id, tier, &tool_specs).await;
        if units.is_empty() {
            warn!(tenant = %tenant_id, "no tool compiled, tenant stays unmounted");
            return Err(HostError::NoValidTools {
                tenant_id: tenant_id.to_string(),
                failures: failed_tools,
            });
        }

        // Nothing below suspends, so a cancelled mount either acquired
        // everything or nothing.
        self.check_running()?;
        let endpoint_path = endpoint_for(tenant_id);
        let server = Arc::new(TenantServer::new(
            tenant_id,
            &endpoint_path,
            units,
            self.settings.invocation,
        ));

        let mut resources = ResourceStack::new(tenant_id);
        resources.push(Box::new(GateResource::new(
            server.gate().clone(),
            self.settings.drain_timeout,
        )));
        resources.push(Box::new(SessionReaper::spawn(
            server.sessions().clone(),
            self.settings.session_idle_ttl,
            self.settings.session_reap_interval,
        )));

        if !self.routes.register(&endpoint_path, server.clone()) {
            return Err(HostError::RouteConflict(endpoint_path));
        }
        self.ledger.push(tenant_id, resources);

        let result = MountResult {
            tenant_id: tenant_id.to_string(),
            endpoint_path: endpoint_path.clone(),
            mounted_tools: server.tool_names(),
            failed_tools,
        };
        *slot = Some(MountedServer {
            endpoint_path,
            server,
        });
        phase.completed = true;
        cell.set_phase(MountPhase::Mounted);
        info!(
            tenant = %tenant_id,
            mounted = result.mounted_tools.len(),
            failed = result.failed_tools.len(),
            "tenant mounted"
        );
        Ok(result)
    }

    async fn compile_tools(
        &self,
        tenant_id: &str,
        tier: Tier,
        tool_specs: &[ToolSpec],
    ) -> (Vec<Arc<CallableUnit>>, Vec<ToolFailure>) {
        let outcomes = futures::future::join_all(
            tool_specs
                .iter()
                .map(|spec| self.cache.get_or_compile(tenant_id, tier, spec)),
        )
        .await;

        let mut units = Vec::new();
        let mut failures = Vec::new();
        for (spec, outcome) in tool_specs.iter().zip(outcomes) {
            let (validated, errors) = match outcome {
                Ok(unit) => {
                    units.push(unit);
                    (true, Vec::new())
                }
                Err(e) => {
                    warn!(tenant = %tenant_id, tool = %spec.name, "skipping tool: {}", e);
                    let errors = e.messages();
                    failures.push(ToolFailure {
                        tool_id: spec.id.clone(),
                        name: spec.name.clone(),
                        errors: errors.clone(),
                    });
                    (false, errors)
                }
            };
            if let Err(e) = self
                .repository
                .update_validation_result(&spec.id, validated, errors)
                .await
            {
                warn!(tenant = %tenant_id, tool = %spec.id, "validation write-back failed: {}", e);
            }
        }
        (units, failures)
    }

    /// Take the tenant off the routing surface, release its resources and
    /// drop its cached tools.
    pub async fn unmount(&self, tenant_id: &str) -> Result<(), HostError> {
        let cell = self
            .cells
            .get(tenant_id)
            .map(|cell| cell.clone())
            .ok_or_else(|| HostError::NotMounted(tenant_id.to_string()))?;
        let mut slot = cell.mount.lock().await;
        let mounted = slot
            .take()
            .ok_or_else(|| HostError::NotMounted(tenant_id.to_string()))?;

        cell.set_phase(MountPhase::Unmounting);
        self.routes.deregister(&mounted.endpoint_path);
        if let Some(resources) = self.ledger.remove(tenant_id) {
            resources.close().await;
        }
        self.cache.invalidate_tenant(tenant_id);
        cell.set_phase(MountPhase::Unmounted);
        info!(
            tenant = %tenant_id,
            tools = mounted.server.tool_names().len(),
            "tenant unmounted"
        );
        Ok(())
    }

    /// Call one of a mounted tenant's tools.
    pub async fn invoke(
        &self,
        tenant_id: &str,
        tool_name: &str,
        arguments: JsonValue,
    ) -> Result<Invocation, HostError> {
        let server = self
            .routes
            .resolve(tenant_id)
            .ok_or_else(|| HostError::NotMounted(tenant_id.to_string()))?;
        Ok(server.call_tool(tool_name, arguments).await?)
    }

    /// Mount every tenant whose shared deployment is active.
    ///
    /// Fails only when the active deployments cannot be listed. Individual
    /// tenant failures, including timeouts, are reported and skipped.
    pub async fn reconcile_on_startup(&self) -> Result<ReconciliationReport, HostError> {
        let deployments = self
            .repository
            .get_active_shared_deployments()
            .await
            .map_err(|e| {
                error!("cannot list active deployments: {}", e);
                HostError::Repository(e)
            })?;
        info!(tenants = deployments.len(), "reconciling active deployments");

        let timeout = self.settings.mount_timeout;
        let outcomes: Vec<(String, Result<MountResult, HostError>)> = stream::iter(deployments)
            .map(|deployment| async move {
                let mount = async {
                    match self.repository.get_tool_specs(&deployment.tenant_id).await {
                        Ok(specs) => self.mount(&deployment.tenant_id, deployment.tier, specs).await,
                        Err(e) => Err(HostError::Repository(e)),
                    }
                };
                let outcome = match tokio::time::timeout(timeout, mount).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(HostError::MountTimeout {
                        tenant_id: deployment.tenant_id.clone(),
                        timeout,
                    }),
                };
                (deployment.tenant_id, outcome)
            })
            .buffer_unordered(self.settings.reconcile_concurrency.max(1))
            .collect()
            .await;

        let mut report = ReconciliationReport::default();
        for (tenant_id, outcome) in outcomes {
            match outcome {
                Ok(_) | Err(HostError::AlreadyMounted(_)) => report.mounted.push(tenant_id),
                Err(e) => {
                    warn!(tenant = %tenant_id, "reconciliation failed: {}", e);
                    report.failed.push(TenantFailure {
                        tenant_id,
                        reason: e.to_string(),
                    });
                }
            }
        }
        report.mounted.sort();
        report.failed.sort_by(|a, b| a.tenant_id.cmp(&b.tenant_id));

        self.ready.store(true, Ordering::Release);
        info!(
            mounted = report.mounted.len(),
            failed = report.failed.len(),
            "reconciliation complete"
        );
        Ok(report)
    }

    /// Refuse new mounts, wait for mounts in progress, then release every
    /// mounted tenant, newest first.
    pub async fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.ready.store(false, Ordering::Release);
        info!("shutting down runtime host");

        let cells: Vec<(String, Arc<TenantCell>)> = self
            .cells
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        let mut slots = Vec::with_capacity(cells.len());
        for (_, cell) in &cells {
            slots.push(cell.mount.lock().await);
        }

        for (tenant_id, resources) in self.ledger.drain_newest_first() {
            debug!(tenant = %tenant_id, "releasing tenant resources");
            self.routes.deregister(&endpoint_for(&tenant_id));
            resources.close().await;
            self.cache.invalidate_tenant(&tenant_id);
        }

        for ((_, cell), mut slot) in cells.iter().zip(slots) {
            slot.take();
            cell.set_phase(MountPhase::Unmounted);
        }
        info!("runtime host stopped");
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }
}
