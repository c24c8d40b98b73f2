//! Instance provisioning: `Requested -> Created -> BootAvailable -> Attached`.
//!
//! A failure to create leaves nothing behind. Any failure after creation
//! deletes the partially created instance and then its boot disk before the
//! error is returned, so nothing billable is orphaned. The data volume is
//! never touched here.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.

use crate::application::ports::{InfraApi, InstanceApi, InstanceSpec, ProgressReporter};
use crate::application::services::disks;
use crate::application::services::readiness::{PollPolicy, Retryable, poll};
use crate::domain::bootstrap::first_boot_script;
use crate::domain::instance::DATA_DEVICE_NAME;
use crate::domain::{InfraError, Instance, InstanceStatus, ProvisionError, ReadinessError, VolumeId};

/// Provisioner state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionPhase {
    Requested,
    Created,
    BootAvailable,
    Attached,
}

/// Everything `provision` needs.
pub struct ProvisionRequest<'a> {
    pub spec: InstanceSpec<'a>,
    /// Already materialized data volume.
    pub data_volume: &'a VolumeId,
    /// Budget for the platform to report the instance RUNNING.
    pub boot_policy: PollPolicy,
}

enum BootWait {
    Pending(String),
    Infra(InfraError),
}

impl Retryable for BootWait {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Pending(_) => true,
            Self::Infra(e) => e.is_retryable(),
        }
    }
}

impl std::fmt::Display for BootWait {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending(status) => write!(f, "instance status is {status}"),
            Self::Infra(e) => e.fmt(f),
        }
    }
}

/// Create the instance, attach the data volume at the fixed device slot and
/// apply the first-boot mount payload.
///
/// The returned instance is in `Provisioning`: bootable but not yet
/// reachable or bootstrapped.
///
/// # Errors
///
/// Returns a [`ProvisionError`]; every variant after `Create` reports whether
/// the compensating delete succeeded.
pub async fn provision(
    api: &impl InfraApi,
    req: &ProvisionRequest<'_>,
    reporter: &impl ProgressReporter,
) -> Result<Instance, ProvisionError> {
    let name = req.spec.name;
    let zone = req.spec.zone;
    let mut phase = ProvisionPhase::Requested;
    tracing::debug!(instance = name, ?phase, "provisioning");

    reporter.step(&format!("creating instance {name}..."));
    api.create_instance(&req.spec)
        .await
        .map_err(ProvisionError::Create)?;
    phase = ProvisionPhase::Created;
    tracing::debug!(instance = name, ?phase, "instance created");

    let booted = poll(req.boot_policy, |_| async move {
        match api.describe_instance(name, zone).await {
            Ok(info) if info.status == "RUNNING" => Ok(info),
            Ok(info) => Err(BootWait::Pending(info.status)),
            Err(e) => Err(BootWait::Infra(e)),
        }
    })
    .await;
    if let Err(e) = booted {
        let attempts = match e {
            ReadinessError::Exhausted { attempts, .. }
            | ReadinessError::Aborted { attempts, .. } => attempts,
        };
        let compensated = compensate(api, name, zone, reporter).await;
        return Err(ProvisionError::BootTimeout {
            name: name.to_string(),
            attempts,
            compensated,
        });
    }
    phase = ProvisionPhase::BootAvailable;
    tracing::debug!(instance = name, ?phase, "instance running");

    reporter.step(&format!("attaching data volume {}...", req.data_volume));
    if let Err(source) = api
        .attach_disk(name, zone, req.data_volume, DATA_DEVICE_NAME)
        .await
    {
        let compensated = compensate(api, name, zone, reporter).await;
        return Err(ProvisionError::Attach {
            volume: req.data_volume.to_string(),
            source,
            compensated,
        });
    }

    reporter.step("applying first-boot mount configuration...");
    let first_boot = async {
        api.set_startup_script(name, zone, &first_boot_script()).await?;
        api.reset_instance(name, zone).await
    };
    if let Err(source) = first_boot.await {
        let compensated = compensate(api, name, zone, reporter).await;
        return Err(ProvisionError::FirstBoot {
            source,
            compensated,
        });
    }
    phase = ProvisionPhase::Attached;
    tracing::debug!(instance = name, ?phase, "data volume attached");

    let mut instance = Instance::planned(name, zone, req.spec.machine_type);
    instance.status = InstanceStatus::Provisioning;
    instance.boot_volume = Some(VolumeId(name.to_string()));
    instance.data_volume = Some(req.data_volume.clone());
    // Addresses are informational; a failed describe here is not a provisioning failure.
    match api.describe_instance(name, zone).await {
        Ok(info) => {
            instance.external_ip = info.external_ip;
            instance.internal_ip = info.internal_ip;
            if let Some(boot) = info.disks.iter().find(|d| d.boot) {
                instance.boot_volume = Some(boot.volume.clone());
            }
        }
        Err(e) => tracing::warn!(instance = name, error = %e, "could not read instance addresses"),
    }
    reporter.success(&format!("instance {name} provisioned"));
    Ok(instance)
}

/// Delete a partially created instance and its boot disk. Returns whether
/// both are gone.
async fn compensate(
    api: &impl InfraApi,
    name: &str,
    zone: &str,
    reporter: &impl ProgressReporter,
) -> bool {
    reporter.warn(&format!("removing partially created instance {name}"));
    match api.delete_instance(name, zone).await {
        Ok(()) => {}
        Err(e) if e.is_not_found() => {}
        Err(e) => {
            tracing::error!(instance = name, error = %e, "compensating delete failed");
            return false;
        }
    }
    // The boot disk outlives the instance and carries its name.
    let boot = VolumeId(name.to_string());
    match disks::delete_volume(api, &boot, zone).await {
        Ok(_) => true,
        Err(e) => {
            tracing::error!(volume = %boot, error = %e, "compensating boot disk delete failed");
            false
        }
    }
}
