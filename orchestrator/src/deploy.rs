//! Deployments: the scaling reconciler. `spec.md` §4.11 — small enough
//! (~300 LOC) to live inside `volant-orchestrator` rather than as its own
//! crate. Grounded on the teacher's `WarmPool` background
//! replenish/evict loop (`runtime/src/pool/warm_pool.rs`): a
//! `tokio::sync::watch` shutdown signal plus a periodic tick, generalized
//! from "keep N identical warm VMs around" to "keep `replicas` named,
//! templated children matching the group's current `template_config`".
//!
//! Child names are derived deterministically as `{group_name}-{index}` for
//! `index` in `0..replicas`. A template update is detected by comparing
//! each child's persisted config JSON against what the template would
//! produce for that child's name; a mismatch triggers a one-at-a-time
//! destroy-then-recreate so the live replica count never dips below
//! `replicas - 1` mid-rollout.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use volant_db::models::VmGroup;
use volant_manifest::Manifest;

use crate::error::Result;
use crate::orchestrator::{CreateOptions, Orchestrator};
use crate::tx::run_tx;

/// Default interval between reconcile passes.
pub const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(10);

pub struct DeployController {
    orchestrator: Arc<Orchestrator>,
    shutdown_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl DeployController {
    /// Create a group record and immediately reconcile it up to its
    /// initial replica count.
    pub async fn create_group(orchestrator: &Orchestrator, name: &str, template: Manifest, replicas: i64) -> Result<VmGroup> {
        let config_json = serde_json::to_string(&template).map_err(volant_core::CoreError::from)?;
        let group = run_tx(orchestrator.db(), |tx| {
            let id = volant_db::groups::insert(tx, name, &config_json, replicas)?;
            volant_db::groups::get_by_name(tx, name).map_err(Into::into).map(|g| {
                debug_assert_eq!(g.id, id);
                g
            })
        })?;
        reconcile_group(orchestrator, &group).await;
        Ok(group)
    }

    /// Update a group's template and/or replica count, then reconcile.
    /// `spec.md` §4.11: this is what triggers a rolling replacement.
    pub async fn update_template(orchestrator: &Orchestrator, name: &str, template: Manifest, replicas: i64) -> Result<()> {
        let config_json = serde_json::to_string(&template).map_err(volant_core::CoreError::from)?;
        let group = run_tx(orchestrator.db(), |tx| {
            let existing = volant_db::groups::get_by_name(tx, name)?;
            volant_db::groups::update_template(tx, existing.id, &config_json, replicas)?;
            volant_db::groups::get_by_name(tx, name).map_err(Into::into)
        })?;
        reconcile_group(orchestrator, &group).await;
        Ok(())
    }

    /// Destroy every child and remove the group record.
    pub async fn delete_group(orchestrator: &Orchestrator, name: &str) -> Result<()> {
        let group = run_tx(orchestrator.db(), |tx| volant_db::groups::get_by_name(tx, name).map_err(Into::into))?;
        let children = run_tx(orchestrator.db(), |tx| volant_db::vms::list_by_group(tx, group.id).map_err(Into::into))?;
        for vm in children {
            if let Err(e) = orchestrator.destroy_vm(&vm.name).await {
                tracing::warn!(vm = vm.name.as_str(), error = %e, "failed to destroy group child during group delete");
            }
        }
        run_tx(orchestrator.db(), |tx| volant_db::groups::delete(tx, group.id).map_err(Into::into))
    }

    /// Reconcile every group once.
    pub async fn reconcile_all(orchestrator: &Orchestrator) {
        let groups = match run_tx(orchestrator.db(), |tx| volant_db::groups::list(tx).map_err(Into::into)) {
            Ok(groups) => groups,
            Err(e) => {
                tracing::warn!(error = %e, "failed to list deployment groups for reconcile");
                return;
            }
        };
        for group in groups {
            reconcile_group(orchestrator, &group).await;
        }
    }

    /// Start the background reconcile loop. The returned controller owns
    /// the loop's shutdown signal; drop or call `stop` to end it.
    pub fn start(orchestrator: Arc<Orchestrator>, interval: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let loop_orchestrator = orchestrator.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = shutdown_rx.changed() => {
                        if result.is_ok() && *shutdown_rx.borrow() {
                            tracing::debug!("deployment reconcile loop shutting down");
                            break;
                        }
                    }
                    _ = tokio::time::sleep(interval) => {
                        Self::reconcile_all(&loop_orchestrator).await;
                    }
                }
            }
        });

        Self { orchestrator, shutdown_tx, handle: Some(handle) }
    }

    pub async fn stop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }
}

/// Parse `{group_name}-{index}` back into its index, or `None` if `name`
/// doesn't belong to `group_name`.
fn child_index(group_name: &str, vm_name: &str) -> Option<usize> {
    vm_name.strip_prefix(group_name)?.strip_prefix('-')?.parse().ok()
}

async fn reconcile_group(orchestrator: &Orchestrator, group: &VmGroup) {
    let template: Manifest = match serde_json::from_str(&group.config_json) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!(group = group.name.as_str(), error = %e, "group template_config is not a valid manifest, skipping reconcile");
            return;
        }
    };

    let children = match run_tx(orchestrator.db(), |tx| volant_db::vms::list_by_group(tx, group.id).map_err(Into::into)) {
        Ok(children) => children,
        Err(e) => {
            tracing::warn!(group = group.name.as_str(), error = %e, "failed to list group children, skipping reconcile");
            return;
        }
    };

    let replicas = group.replicas.max(0) as usize;

    for vm in &children {
        if let Some(index) = child_index(&group.name, &vm.name) {
            if index >= replicas {
                if let Err(e) = orchestrator.destroy_vm(&vm.name).await {
                    tracing::warn!(vm = vm.name.as_str(), error = %e, "failed to scale down group child");
                }
            }
        }
    }

    for index in 0..replicas {
        let desired_name = format!("{}-{index}", group.name);
        let mut desired_manifest = template.clone();
        desired_manifest.name = desired_name.clone();

        let desired_json = match serde_json::to_string(&desired_manifest) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(group = group.name.as_str(), error = %e, "failed to serialize desired child manifest");
                continue;
            }
        };

        let options = CreateOptions { group_id: Some(group.id), ..Default::default() };

        match children.iter().find(|vm| vm.name == desired_name) {
            None => {
                if let Err(e) = orchestrator.create_vm(desired_manifest, options).await {
                    tracing::warn!(vm = desired_name.as_str(), error = %e, "failed to create missing group child");
                }
            }
            Some(vm) => {
                let current_matches = run_tx(orchestrator.db(), |tx| {
                    Ok(volant_db::configs::current(tx, vm.id)?.map(|c| c.config_json) == Some(desired_json.clone()))
                })
                .unwrap_or(true);

                if !current_matches {
                    tracing::info!(vm = desired_name.as_str(), "group template changed, rolling replacement");
                    if let Err(e) = orchestrator.destroy_vm(&desired_name).await {
                        tracing::warn!(vm = desired_name.as_str(), error = %e, "failed to destroy outdated group child");
                        continue;
                    }
                    if let Err(e) = orchestrator.create_vm(desired_manifest, options).await {
                        tracing::warn!(vm = desired_name.as_str(), error = %e, "failed to recreate group child after rolling replacement");
                    }
                }
            }
        }
    }
}
