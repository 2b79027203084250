//! Property-based tests for architecture deduplication and rootfs path
//! resolution.
//!
//! These tests use proptest to generate random inputs and verify that
//! invariants hold for all possible inputs.

#[cfg(test)]
mod proptest_tests {
    use crate::rootfs::resolve_rootfs;
    use crate::target::{unique_architectures, Target};
    use proptest::prelude::*;
    use std::path::{Path, PathBuf};

    fn arch() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("x86_64".to_string()),
            Just("arm64".to_string()),
            Just("arm".to_string()),
            "[a-z0-9_]{1,8}",
        ]
    }

    fn targets() -> impl Strategy<Value = Vec<Target>> {
        prop::collection::vec(
            ("[a-z]{0,6}", arch()).prop_map(|(name, arch)| Target::new(name, arch)),
            0..16,
        )
    }

    // ============================================================================
    // unique_architectures property tests
    // ============================================================================

    proptest! {
        /// Property: no architecture appears twice in the result
        #[test]
        fn unique_architectures_has_no_duplicates(targets in targets()) {
            let archs = unique_architectures(&targets);
            for (i, a) in archs.iter().enumerate() {
                prop_assert!(!archs[i + 1..].contains(a), "duplicate architecture {}", a);
            }
        }

        /// Property: every target's architecture is represented
        #[test]
        fn unique_architectures_covers_every_target(targets in targets()) {
            let archs = unique_architectures(&targets);
            for target in &targets {
                prop_assert!(archs.contains(&target.architecture));
            }
        }

        /// Property: the result follows first-appearance order
        #[test]
        fn unique_architectures_keeps_first_seen_order(targets in targets()) {
            let archs = unique_architectures(&targets);
            let first_index = |arch: &str| {
                targets.iter().position(|t| t.architecture == arch)
            };
            let positions: Vec<_> = archs.iter().map(|a| first_index(a.as_str())).collect();
            let mut sorted = positions.clone();
            sorted.sort();
            prop_assert_eq!(positions, sorted);
        }
    }

    // ============================================================================
    // resolve_rootfs property tests
    // ============================================================================

    fn relative_path() -> impl Strategy<Value = PathBuf> {
        prop::collection::vec(
            prop_oneof![
                Just("..".to_string()),
                Just(".".to_string()),
                "[a-z]{1,6}",
            ],
            1..6,
        )
        .prop_map(|parts| parts.iter().collect::<PathBuf>())
    }

    proptest! {
        /// Property: resolving an already resolved path changes nothing
        #[test]
        fn resolve_rootfs_is_idempotent(input in relative_path()) {
            let workdir = Path::new("/work/app");
            let once = resolve_rootfs(workdir, &input);
            let twice = resolve_rootfs(workdir, &once);
            prop_assert_eq!(once, twice);
        }

        /// Property: resolved paths are absolute and free of `.` and `..`
        #[test]
        fn resolve_rootfs_is_clean(input in relative_path()) {
            let resolved = resolve_rootfs(Path::new("/work/app"), &input);
            prop_assert!(resolved.is_absolute());
            let s = resolved.to_string_lossy();
            prop_assert!(!s.split('/').any(|c| c == "." || c == ".."));
        }
    }
}
