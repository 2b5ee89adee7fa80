//! Dependency materialisation.
//!
//! A node's metadata carries a `DepsMetadata` describing shell commands,
//! packages, and user call-before/call-after hooks. `materialize` expands
//! that into the ordered `call_before`/`call_after` hook lists the Task
//! Runner wraps around the main callable.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Declarative dependency metadata stored on a node, as produced by the
/// client SDK at graph-build time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DepsMetadata {
    #[serde(default)]
    pub bash: Option<DepsBash>,
    #[serde(default)]
    pub pip: Option<DepsPip>,
    #[serde(default)]
    pub call_before: Vec<DepsCall>,
    #[serde(default)]
    pub call_after: Vec<DepsCall>,
}

/// Shell commands to run before the task's callable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepsBash {
    pub commands: Vec<String>,
}

/// Packages to install before the task's callable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepsPip {
    pub packages: Vec<String>,
}

/// An arbitrary user callback, serialized the same opaque way as a node's
/// main callable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepsCall {
    pub callable: Value,
}

/// A single materialised hook, ready to be executed by an executor ahead
/// of or after the main callable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Hook {
    Shell { command: String },
    Pip { packages: Vec<String> },
    Call { callable: Value },
}

/// Assemble `call_before`/`call_after` from a node's deps metadata.
///
/// Ordering: `call_before` is shell, then packages, then user callbacks
/// in declared order; `call_after` runs in declared order after the main
/// callable, regardless of its outcome.
pub fn materialize(deps: &DepsMetadata) -> (Vec<Hook>, Vec<Hook>) {
    let mut call_before = Vec::new();

    if let Some(bash) = &deps.bash {
        for command in &bash.commands {
            call_before.push(Hook::Shell {
                command: command.clone(),
            });
        }
    }

    if let Some(pip) = &deps.pip {
        call_before.push(Hook::Pip {
            packages: pip.packages.clone(),
        });
    }

    for dep in &deps.call_before {
        call_before.push(Hook::Call {
            callable: dep.callable.clone(),
        });
    }

    let call_after = deps
        .call_after
        .iter()
        .map(|dep| Hook::Call {
            callable: dep.callable.clone(),
        })
        .collect();

    (call_before, call_after)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ordering_is_shell_then_packages_then_user_callbacks() {
        let deps = DepsMetadata {
            bash: Some(DepsBash { commands: vec!["echo hi".into()] }),
            pip: Some(DepsPip { packages: vec!["numpy".into()] }),
            call_before: vec![DepsCall { callable: json!("before-hook") }],
            call_after: vec![DepsCall { callable: json!("after-hook") }],
        };

        let (before, after) = materialize(&deps);
        assert!(matches!(before[0], Hook::Shell { .. }));
        assert!(matches!(before[1], Hook::Pip { .. }));
        assert!(matches!(before[2], Hook::Call { .. }));
        assert_eq!(before.len(), 3);
        assert_eq!(after.len(), 1);
    }
}
