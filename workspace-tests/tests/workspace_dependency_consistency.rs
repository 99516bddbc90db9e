use proptest::prelude::*;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Property test for workspace dependency consistency
///
/// **Property 1: Workspace Dependency Consistency**
/// For any crate in the workspace that uses a shared dependency,
/// the dependency should be declared with `workspace = true` to inherit
/// the version from the root workspace configuration.
#[cfg(test)]
mod workspace_dependency_tests {
    use super::*;

    const MEMBERS: [&str; 4] = ["farm-common", "farm-engine", "farm-agent", "workspace-tests"];

    /// Names declared under `[workspace.dependencies]` in the root manifest
    fn get_workspace_dependencies() -> Vec<String> {
        let content = fs::read_to_string("../Cargo.toml").expect("root manifest");
        let manifest: toml::Value = toml::from_str(&content).expect("root manifest parses");
        manifest
            .get("workspace")
            .and_then(|w| w.get("dependencies"))
            .and_then(|d| d.as_table())
            .map(|deps| deps.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Every dependency of a crate manifest, mapped to whether it inherits
    /// from the workspace
    fn parse_cargo_toml_dependencies(content: &str) -> HashMap<String, bool> {
        let mut dependencies = HashMap::new();
        let manifest: toml::Value = match toml::from_str(content) {
            Ok(manifest) => manifest,
            Err(_) => return dependencies,
        };

        for section in ["dependencies", "dev-dependencies", "build-dependencies"] {
            if let Some(table) = manifest.get(section).and_then(|s| s.as_table()) {
                for (name, value) in table {
                    let uses_workspace = value
                        .get("workspace")
                        .and_then(|w| w.as_bool())
                        .unwrap_or(false);
                    dependencies.insert(name.clone(), uses_workspace);
                }
            }
        }

        dependencies
    }

    proptest! {
        #[test]
        fn test_workspace_dependency_consistency(
            crate_name in prop::sample::select(MEMBERS.to_vec())
        ) {
            let cargo_toml_path = format!("../{}/Cargo.toml", crate_name);

            if !Path::new(&cargo_toml_path).exists() {
                return Ok(());
            }

            let cargo_toml_content = fs::read_to_string(&cargo_toml_path)
                .map_err(|e| proptest::test_runner::TestCaseError::fail(
                    format!("Failed to read {}: {}", cargo_toml_path, e)
                ))?;

            let workspace_deps = get_workspace_dependencies();
            let crate_deps = parse_cargo_toml_dependencies(&cargo_toml_content);

            for dep_name in &workspace_deps {
                if let Some(&uses_workspace) = crate_deps.get(dep_name) {
                    prop_assert!(
                        uses_workspace,
                        "Crate '{}' uses dependency '{}' but does not inherit from workspace (missing 'workspace = true')",
                        crate_name,
                        dep_name
                    );
                }
            }
        }
    }

    #[test]
    fn test_workspace_dependency_consistency_unit() {
        let good_cargo_toml = r#"
[package]
name = "test-crate"
version.workspace = true
edition.workspace = true

[dependencies]
tokio = { workspace = true }
serde.workspace = true
"#;

        let parsed_deps = parse_cargo_toml_dependencies(good_cargo_toml);
        assert!(parsed_deps.get("tokio").copied().unwrap_or(false));
        assert!(parsed_deps.get("serde").copied().unwrap_or(false));

        let bad_cargo_toml = r#"
[package]
name = "test-crate"

[dependencies]
tokio = "1.0"
serde = { workspace = true }
"#;

        let parsed_deps_bad = parse_cargo_toml_dependencies(bad_cargo_toml);
        assert!(!parsed_deps_bad.get("tokio").copied().unwrap_or(false));
        assert!(parsed_deps_bad.get("serde").copied().unwrap_or(false));
    }

    #[test]
    fn test_root_declares_shared_stack() {
        let deps = get_workspace_dependencies();
        for name in ["tokio", "tracing", "thiserror", "serde", "reqwest", "proptest"] {
            assert!(deps.iter().any(|d| d == name), "missing workspace dependency {}", name);
        }
    }
}
