//! # External Planner
//!
//! Install-time-like resolution hands the roots to a [`Planner`] instead of
//! the slicer. The planner receives a throw-away [`Profile`] carrying the
//! target environment, builds a [`ChangeRequest`] adding the roots, and
//! answers with a [`ProvisioningPlan`]. The plan's additions, plus those of
//! its installer plan, form the closure that gets mirrored.
//!
//! [`SlicingPlanner`] is a local planner that approximates install-time
//! resolution with a strict slice: one provider per requirement, optional
//! and non-greedy requirements ignored.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use log::debug;

use crate::cancel::CancelToken;
use crate::defaults::PLANNER_PROFILE_PREFIX;
use crate::error::{Error, Result};
use crate::filter::Environment;
use crate::model::Unit;
use crate::repository::{MetadataRepository, RepositoryLookup};
use crate::slicer::{Closure, Slicer, SlicingPolicy};
use crate::status::Severity;

/// A named target environment a plan is computed for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub id: String,
    pub environment: Environment,
}

impl Profile {
    pub fn new(id: impl Into<String>, environment: Environment) -> Self {
        Profile {
            id: id.into(),
            environment,
        }
    }

    /// A profile named `mirror-<millis since epoch>`.
    pub fn temporary(environment: Environment) -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        Profile::new(format!("{}{}", PLANNER_PROFILE_PREFIX, millis), environment)
    }
}

/// Units to add to a profile.
#[derive(Debug, Clone)]
pub struct ChangeRequest {
    pub profile: Profile,
    pub additions: Vec<Arc<Unit>>,
}

impl ChangeRequest {
    pub fn new(profile: Profile) -> Self {
        ChangeRequest {
            profile,
            additions: Vec::new(),
        }
    }

    pub fn add_all(&mut self, units: &[Arc<Unit>]) {
        self.additions.extend(units.iter().cloned());
    }
}

/// The units a plan would install.
#[derive(Debug, Clone, Default)]
pub struct ProvisioningPlan {
    pub additions: Vec<Arc<Unit>>,
    /// Units the installer itself needs, if the plan has an installer part.
    pub installer_plan: Option<Box<ProvisioningPlan>>,
}

impl ProvisioningPlan {
    /// The additions of this plan followed by those of its installer plan.
    pub fn closure(&self) -> Closure {
        let installer = self
            .installer_plan
            .as_ref()
            .map(|plan| plan.additions.clone())
            .unwrap_or_default();
        Closure::from_units(self.additions.iter().cloned().chain(installer))
    }
}

/// An installation planner.
pub trait Planner: Send + Sync {
    fn create_change_request(&self, profile: &Profile) -> ChangeRequest {
        ChangeRequest::new(profile.clone())
    }

    fn provisioning_plan(
        &self,
        request: &ChangeRequest,
        cancel: &CancelToken,
    ) -> Result<ProvisioningPlan>;
}

/// Resolves `roots` through `planner` for the environment of `policy`.
pub fn resolve_with_planner(
    planner: &dyn Planner,
    roots: &[Arc<Unit>],
    policy: &SlicingPolicy,
    cancel: &CancelToken,
) -> Result<Closure> {
    let profile = Profile::temporary(policy.environment.clone());
    debug!("Planning {} roots in profile {}", roots.len(), profile.id);
    let mut request = planner.create_change_request(&profile);
    request.add_all(roots);
    let plan = planner.provisioning_plan(&request, cancel)?;
    Ok(plan.closure())
}

/// Plans by slicing a metadata repository with install-time rules.
pub struct SlicingPlanner {
    repository: Arc<dyn MetadataRepository>,
}

impl SlicingPlanner {
    pub fn new(repository: Arc<dyn MetadataRepository>) -> Self {
        SlicingPlanner { repository }
    }
}

impl Planner for SlicingPlanner {
    fn provisioning_plan(
        &self,
        request: &ChangeRequest,
        cancel: &CancelToken,
    ) -> Result<ProvisioningPlan> {
        let policy = SlicingPolicy {
            environment: request.profile.environment.clone(),
            include_optional_dependencies: false,
            everything_greedy: false,
            ..SlicingPolicy::default()
        };
        let lookup = RepositoryLookup::new(self.repository.as_ref());
        let outcome = Slicer::new(&lookup, policy).slice(&request.additions, cancel)?;
        if outcome.status.severity() == Severity::Error {
            let reasons: Vec<String> = outcome
                .status
                .entries()
                .iter()
                .map(|e| e.message.clone())
                .collect();
            return Err(Error::Planner {
                message: format!(
                    "No plan for profile {}: {}",
                    request.profile.id,
                    reasons.join("; ")
                ),
            });
        }
        Ok(ProvisioningPlan {
            additions: outcome.closure.units().to_vec(),
            installer_plan: None,
        })
    }
}
