//! Property-based tests for the slicer.
//!
//! Random repositories of up to a dozen units over five ids, wired together by
//! requirements with random ranges and flags.

#[cfg(test)]
mod proptest_tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use proptest::prelude::*;

    use crate::cancel::CancelToken;
    use crate::error::Result;
    use crate::model::{Requirement, Unit};
    use crate::slicer::{Closure, Lookup, Slicer, SlicingPolicy};
    use crate::version::{Version, VersionRange};

    /// Answers every lookup with the whole repository.
    struct WholeRepository(Vec<Arc<Unit>>);

    impl Lookup for WholeRepository {
        fn lookup(&self, _requirement: &Requirement) -> Result<Vec<Arc<Unit>>> {
            Ok(self.0.clone())
        }
    }

    type RequirementSpec = (usize, u8, u64, bool, bool, bool);

    fn requirement(spec: &RequirementSpec) -> Requirement {
        let (target, range_kind, major, optional, greedy, multiple) = *spec;
        let version = Version::new(major, 0, 0);
        let range = match range_kind {
            0 => VersionRange::any(),
            1 => VersionRange::at_least(version),
            _ => VersionRange::exact(version),
        };
        let mut requirement = Requirement::unit(format!("u{}", target), range);
        if optional {
            requirement = requirement.optional();
        }
        if !greedy {
            requirement = requirement.non_greedy();
        }
        if multiple {
            requirement = requirement.multiple();
        }
        requirement
    }

    fn arb_repository() -> impl Strategy<Value = Vec<Arc<Unit>>> {
        let requirement = (0usize..5, 0u8..3, 1u64..4, any::<bool>(), any::<bool>(), any::<bool>());
        let unit = (0usize..5, 1u64..4, prop::collection::vec(requirement, 0..3));
        prop::collection::vec(unit, 1..12).prop_map(|specs| {
            specs
                .into_iter()
                .map(|(id, major, requirements)| {
                    let unit = requirements.iter().fold(
                        Unit::new(format!("u{}", id), Version::new(major, 0, 0)),
                        |unit, spec| unit.requires(self::requirement(spec)),
                    );
                    Arc::new(unit)
                })
                .collect()
        })
    }

    fn arb_policy() -> impl Strategy<Value = SlicingPolicy> {
        (any::<bool>(), any::<bool>(), any::<bool>()).prop_map(|(optional, greedy, strict)| {
            SlicingPolicy {
                include_optional_dependencies: optional,
                everything_greedy: greedy,
                consider_strict_dependency_only: strict,
                ..SlicingPolicy::default()
            }
        })
    }

    fn slice(units: &[Arc<Unit>], policy: SlicingPolicy) -> Closure {
        let lookup = WholeRepository(units.to_vec());
        Slicer::new(&lookup, policy)
            .slice(&units[..1], &CancelToken::new())
            .unwrap()
            .closure
    }

    proptest! {
        /// Property: a closure never holds two units with the same id and version
        #[test]
        fn closure_has_no_duplicates(units in arb_repository(), policy in arb_policy()) {
            let closure = slice(&units, policy);
            prop_assert_eq!(closure.keys().len(), closure.len());
        }

        /// Property: slicing twice yields the same set of units
        #[test]
        fn slicing_is_idempotent(units in arb_repository(), policy in arb_policy()) {
            let first = slice(&units, policy.clone());
            let second = slice(&units, policy);
            prop_assert_eq!(first.keys(), second.keys());
        }

        /// Property: every non-root member satisfies a followed requirement of
        /// another member
        #[test]
        fn members_are_reachable(units in arb_repository(), policy in arb_policy()) {
            let closure = slice(&units, policy.clone());
            let root = units[0].key();
            for member in closure.units() {
                if member.key() == root {
                    continue;
                }
                let reached = closure.units().iter().any(|parent| {
                    parent
                        .all_requirements()
                        .any(|r| policy.follows(r) && r.is_satisfied_by(member))
                });
                prop_assert!(reached, "{} is not reachable", member);
            }
        }

        /// Property: following optional requirements never shrinks the closure
        #[test]
        fn optional_dependencies_are_monotone(units in arb_repository(), policy in arb_policy()) {
            let without = slice(&units, SlicingPolicy { include_optional_dependencies: false, ..policy.clone() });
            let with = slice(&units, SlicingPolicy { include_optional_dependencies: true, ..policy });
            prop_assert!(without.keys().is_subset(&with.keys()));
        }

        /// Property: greedy slicing never shrinks the closure
        #[test]
        fn greedy_is_monotone(units in arb_repository(), policy in arb_policy()) {
            let narrow = slice(&units, SlicingPolicy { everything_greedy: false, ..policy.clone() });
            let greedy = slice(&units, SlicingPolicy { everything_greedy: true, ..policy });
            prop_assert!(narrow.keys().is_subset(&greedy.keys()));
        }

        /// Property: latest-only keeps exactly the maximum version of every id
        #[test]
        fn latest_only_keeps_maximum_per_id(units in arb_repository(), policy in arb_policy()) {
            let full = slice(&units, SlicingPolicy { latest_version_only: false, ..policy.clone() });
            let latest = slice(&units, SlicingPolicy { latest_version_only: true, ..policy });

            let mut expected: BTreeMap<String, Version> = BTreeMap::new();
            for unit in full.units() {
                let slot = expected.entry(unit.id.clone()).or_insert_with(|| unit.version.clone());
                if unit.version > *slot {
                    *slot = unit.version.clone();
                }
            }
            let actual: BTreeMap<String, Version> = latest
                .units()
                .iter()
                .map(|u| (u.id.clone(), u.version.clone()))
                .collect();
            prop_assert_eq!(latest.len(), actual.len());
            prop_assert_eq!(actual, expected);
        }
    }
}
