//! # Dependency-Closure Slicer
//!
//! The slicer computes the set of units reachable from a root set by
//! following requirements, under a [`SlicingPolicy`].
//!
//! ## Process
//!
//! 1.  **Roots**: duplicate roots are dropped; roots whose filter does not
//!     apply to the policy environment are reported as warnings and excluded.
//! 2.  **Work-list traversal**: units are taken from a FIFO queue. For each
//!     requirement the policy decides whether it is followed (optional,
//!     strict-only, filtered-only, greedy and filter rules). Providers come
//!     from the [`Lookup`] collaborator and are narrowed to those whose own
//!     filter applies.
//! 3.  **Selection**: with `everything_greedy` or a `multiple` requirement all
//!     providers are taken; otherwise only the highest matching version (the
//!     first one wins among equal versions).
//! 4.  **Termination**: a visited set keyed by id+version guarantees that
//!     cyclic requirement graphs terminate.
//! 5.  **Post-processing**: `latest_version_only` keeps, per id, only the
//!     highest version of the finished closure.
//!
//! Unsatisfied requirements never abort slicing: mandatory ones are recorded
//! as errors, optional ones as warnings, and the partial closure is returned.
//! Only a failing `Lookup` or cancellation returns `Err`.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::filter::{Environment, Filter};
use crate::model::{ArtifactKey, Requirement, Unit, UnitKey};
use crate::status::Status;
use crate::version::Version;

/// Finds the units that may satisfy a requirement.
///
/// Implementations may return non-matching units; the slicer re-checks every
/// candidate against the requirement. An `Err` aborts slicing.
pub trait Lookup: Send + Sync {
    fn lookup(&self, requirement: &Requirement) -> Result<Vec<Arc<Unit>>>;
}

/// Immutable configuration of one slicing run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlicingPolicy {
    /// Target environment for filter evaluation. When empty, filters are not
    /// evaluated and every filter counts as `force_filter_to`.
    pub environment: Environment,
    pub include_optional_dependencies: bool,
    pub everything_greedy: bool,
    pub force_filter_to: bool,
    pub consider_strict_dependency_only: bool,
    pub follow_only_filtered_requirements: bool,
    pub latest_version_only: bool,
    /// Resolve through the external planner instead of slicing.
    pub install_time_like_resolution: bool,
}

impl Default for SlicingPolicy {
    fn default() -> Self {
        SlicingPolicy {
            environment: Environment::new(),
            include_optional_dependencies: true,
            everything_greedy: true,
            force_filter_to: true,
            consider_strict_dependency_only: false,
            follow_only_filtered_requirements: false,
            latest_version_only: false,
            install_time_like_resolution: false,
        }
    }
}

impl SlicingPolicy {
    /// Whether something guarded by `filter` applies to this policy.
    pub fn filter_applies(&self, filter: Option<&Filter>) -> bool {
        match filter {
            None => true,
            Some(filter) if !self.environment.is_empty() => filter.matches(&self.environment),
            Some(_) => self.force_filter_to,
        }
    }

    /// Whether the slicer traverses `requirement` at all.
    pub fn follows(&self, requirement: &Requirement) -> bool {
        if requirement.optional && !self.include_optional_dependencies {
            return false;
        }
        if self.consider_strict_dependency_only && !requirement.is_strict() {
            return false;
        }
        if self.follow_only_filtered_requirements && requirement.filter.is_none() {
            return false;
        }
        if !requirement.greedy && !self.everything_greedy {
            return false;
        }
        self.filter_applies(requirement.filter.as_ref())
    }
}

/// A deduplicated collection of units, without the edges that produced it.
#[derive(Debug, Clone, Default)]
pub struct Closure {
    units: Vec<Arc<Unit>>,
}

impl Closure {
    /// Builds a closure, keeping the first unit seen for each id+version.
    pub fn from_units<I: IntoIterator<Item = Arc<Unit>>>(units: I) -> Self {
        let mut seen = HashSet::new();
        let units = units
            .into_iter()
            .filter(|unit| seen.insert(unit.key()))
            .collect();
        Closure { units }
    }

    pub fn units(&self) -> &[Arc<Unit>] {
        &self.units
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn contains(&self, id: &str, version: &Version) -> bool {
        self.units
            .iter()
            .any(|u| u.id == id && &u.version == version)
    }

    /// Units matching `predicate`, in closure order.
    pub fn query<P: Fn(&Unit) -> bool>(&self, predicate: P) -> Vec<Arc<Unit>> {
        self.units
            .iter()
            .filter(|u| predicate(u))
            .cloned()
            .collect()
    }

    /// Identity set, for set-wise comparison of closures.
    pub fn keys(&self) -> BTreeSet<UnitKey> {
        self.units.iter().map(|u| u.key()).collect()
    }

    /// For each id, only the highest version present.
    pub fn latest_versions(&self) -> Closure {
        let mut slots: HashMap<&str, usize> = HashMap::new();
        let mut latest: Vec<Arc<Unit>> = Vec::new();
        for unit in &self.units {
            match slots.get(unit.id.as_str()) {
                Some(&slot) => {
                    if unit.version > latest[slot].version {
                        latest[slot] = Arc::clone(unit);
                    }
                }
                None => {
                    slots.insert(unit.id.as_str(), latest.len());
                    latest.push(Arc::clone(unit));
                }
            }
        }
        Closure { units: latest }
    }

    /// Artifact keys referenced by the closure, deduplicated in order.
    pub fn artifact_keys(&self) -> Vec<ArtifactKey> {
        let mut seen = HashSet::new();
        self.units
            .iter()
            .flat_map(|u| u.artifacts.iter())
            .filter(|key| seen.insert((*key).clone()))
            .cloned()
            .collect()
    }
}

/// Result of a slicing run.
#[derive(Debug, Clone)]
pub struct SliceOutcome {
    pub closure: Closure,
    pub status: Status,
}

/// Computes closures over a [`Lookup`].
pub struct Slicer<'a> {
    lookup: &'a dyn Lookup,
    policy: SlicingPolicy,
}

impl<'a> Slicer<'a> {
    pub fn new(lookup: &'a dyn Lookup, policy: SlicingPolicy) -> Self {
        Slicer { lookup, policy }
    }

    pub fn policy(&self) -> &SlicingPolicy {
        &self.policy
    }

    /// Computes the closure of `roots`.
    pub fn slice(&self, roots: &[Arc<Unit>], cancel: &CancelToken) -> Result<SliceOutcome> {
        let mut status = Status::new();
        let mut visited: HashSet<UnitKey> = HashSet::new();
        let mut queue: VecDeque<Arc<Unit>> = VecDeque::new();
        let mut members: Vec<Arc<Unit>> = Vec::new();

        for root in roots {
            if !visited.insert(root.key()) {
                continue;
            }
            if !self.policy.filter_applies(root.filter.as_ref()) {
                warn!("Root {} does not apply to the target environment", root);
                status.warning(format!(
                    "Root {} was filtered out: its filter does not match the target environment",
                    root
                ));
                continue;
            }
            queue.push_back(Arc::clone(root));
        }

        while let Some(unit) = queue.pop_front() {
            cancel.check()?;
            debug!("Slicing {}", unit);

            for requirement in unit.all_requirements() {
                if !self.policy.follows(requirement) {
                    continue;
                }

                let providers = self.providers(requirement)?;
                if providers.is_empty() {
                    self.record_unsatisfied(&unit, requirement, &mut status);
                    continue;
                }

                for provider in self.select(requirement, providers) {
                    if visited.insert(provider.key()) {
                        queue.push_back(provider);
                    }
                }
            }

            members.push(unit);
        }

        let mut closure = Closure::from_units(members);
        if self.policy.latest_version_only {
            closure = closure.latest_versions();
        }
        debug!(
            "Slice complete: {} units, status {}",
            closure.len(),
            status.severity()
        );
        Ok(SliceOutcome { closure, status })
    }

    /// Applicable providers of `requirement`, deduplicated in lookup order.
    fn providers(&self, requirement: &Requirement) -> Result<Vec<Arc<Unit>>> {
        let mut seen = HashSet::new();
        Ok(self
            .lookup
            .lookup(requirement)?
            .into_iter()
            .filter(|candidate| requirement.is_satisfied_by(candidate))
            .filter(|candidate| self.policy.filter_applies(candidate.filter.as_ref()))
            .filter(|candidate| seen.insert(candidate.key()))
            .collect())
    }

    fn select(&self, requirement: &Requirement, providers: Vec<Arc<Unit>>) -> Vec<Arc<Unit>> {
        if self.policy.everything_greedy || requirement.multiple {
            return providers;
        }

        let mut best: Option<(Version, Arc<Unit>)> = None;
        for provider in providers {
            let version = matched_version(requirement, &provider);
            let better = match &best {
                Some((best_version, _)) => version > *best_version,
                None => true,
            };
            if better {
                best = Some((version, provider));
            }
        }
        best.map(|(_, unit)| vec![unit]).unwrap_or_default()
    }

    fn record_unsatisfied(&self, unit: &Unit, requirement: &Requirement, status: &mut Status) {
        if requirement.optional {
            debug!("Optional requirement {} of {} is unsatisfied", requirement, unit);
            status.warning(format!(
                "Unsatisfied optional requirement {} of {}",
                requirement, unit
            ));
        } else {
            warn!("Requirement {} of {} is unsatisfied", requirement, unit);
            status.error(format!("Unsatisfied requirement {} of {}", requirement, unit));
        }
    }
}

/// Highest version among the capabilities of `unit` that match `requirement`.
fn matched_version(requirement: &Requirement, unit: &Unit) -> Version {
    std::iter::once(unit.self_capability())
        .chain(unit.capabilities.iter().cloned())
        .filter(|capability| requirement.matches(capability))
        .map(|capability| capability.version)
        .max()
        .unwrap_or_else(|| unit.version.clone())
}
