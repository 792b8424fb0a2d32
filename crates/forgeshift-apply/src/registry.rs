//! Closed registry of action constructors by type tag

use crate::action::{Action, ActionSpec};
use crate::actions;
use forgeshift_core::{Error, Result};
use std::collections::BTreeMap;

type Constructor = fn(ActionSpec) -> Box<dyn Action>;

pub struct ActionRegistry {
    constructors: BTreeMap<&'static str, Constructor>,
}

impl ActionRegistry {
    /// The full builtin taxonomy: repository lifecycle, CI/CD
    /// deployment, issue machinery, pull requests, wiki, releases,
    /// packages, settings, and migration metadata preservation.
    pub fn with_builtin_actions() -> Self {
        let mut constructors: BTreeMap<&'static str, Constructor> = BTreeMap::new();

        constructors.insert("repo_create", |spec| {
            Box::new(actions::repository::CreateRepositoryAction::new(spec))
        });
        constructors.insert("repo_push", |spec| {
            Box::new(actions::repository::PushCodeAction::new(spec))
        });
        constructors.insert("lfs_configure", |spec| {
            Box::new(actions::repository::PushLfsAction::new(spec))
        });
        constructors.insert("repo_configure", |spec| {
            Box::new(actions::repository::ConfigureRepositoryAction::new(spec))
        });
        constructors.insert("gitmodules_update", |spec| {
            Box::new(actions::repository::UpdateGitmodulesAction::new(spec))
        });

        constructors.insert("workflow_commit", |spec| {
            Box::new(actions::ci_cd::CommitWorkflowAction::new(spec))
        });
        constructors.insert("environment_create", |spec| {
            Box::new(actions::ci_cd::CreateEnvironmentAction::new(spec))
        });
        constructors.insert("secret_set", |spec| {
            Box::new(actions::ci_cd::SetSecretAction::new(spec))
        });
        constructors.insert("variable_set", |spec| {
            Box::new(actions::ci_cd::SetVariableAction::new(spec))
        });

        constructors.insert("label_create", |spec| {
            Box::new(actions::issues::CreateLabelAction::new(spec))
        });
        constructors.insert("milestone_create", |spec| {
            Box::new(actions::issues::CreateMilestoneAction::new(spec))
        });
        constructors.insert("issue_create", |spec| {
            Box::new(actions::issues::CreateIssueAction::new(spec))
        });
        constructors.insert("issue_comment_add", |spec| {
            Box::new(actions::issues::AddIssueCommentAction::new(spec))
        });

        constructors.insert("pr_create", |spec| {
            Box::new(actions::pull_requests::CreatePullRequestAction::new(spec))
        });
        constructors.insert("pr_comment_add", |spec| {
            Box::new(actions::pull_requests::AddPrCommentAction::new(spec))
        });

        constructors.insert("wiki_push", |spec| {
            Box::new(actions::wiki::PushWikiAction::new(spec))
        });

        constructors.insert("release_create", |spec| {
            Box::new(actions::releases::CreateReleaseAction::new(spec))
        });
        constructors.insert("release_asset_upload", |spec| {
            Box::new(actions::releases::UploadReleaseAssetAction::new(spec))
        });

        constructors.insert("package_publish", |spec| {
            Box::new(actions::packages::PublishPackageAction::new(spec))
        });

        constructors.insert("protection_set", |spec| {
            Box::new(actions::settings::SetBranchProtectionAction::new(spec))
        });
        constructors.insert("collaborator_add", |spec| {
            Box::new(actions::settings::AddCollaboratorAction::new(spec))
        });
        constructors.insert("webhook_create", |spec| {
            Box::new(actions::settings::CreateWebhookAction::new(spec))
        });

        constructors.insert("artifact_commit", |spec| {
            Box::new(actions::preservation::CommitPreservationArtifactsAction::new(spec))
        });

        Self { constructors }
    }

    pub fn knows(&self, action_type: &str) -> bool {
        self.constructors.contains_key(action_type)
    }

    pub fn known_types(&self) -> Vec<&'static str> {
        self.constructors.keys().copied().collect()
    }

    pub fn build(&self, spec: ActionSpec) -> Result<Box<dyn Action>> {
        match self.constructors.get(spec.action_type.as_str()) {
            Some(constructor) => Ok(constructor(spec)),
            None => Err(Error::validation(format!(
                "unknown action type: {}",
                spec.action_type
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_covers_the_full_taxonomy() {
        let registry = ActionRegistry::with_builtin_actions();
        let expected = [
            "repo_create",
            "repo_push",
            "lfs_configure",
            "repo_configure",
            "gitmodules_update",
            "workflow_commit",
            "environment_create",
            "secret_set",
            "variable_set",
            "label_create",
            "milestone_create",
            "issue_create",
            "issue_comment_add",
            "pr_create",
            "pr_comment_add",
            "wiki_push",
            "release_create",
            "release_asset_upload",
            "package_publish",
            "protection_set",
            "collaborator_add",
            "webhook_create",
            "artifact_commit",
        ];
        for tag in expected {
            assert!(registry.knows(tag), "missing action type {tag}");
        }
        assert_eq!(registry.known_types().len(), expected.len());
    }

    #[test]
    fn unknown_type_is_a_validation_error() {
        let registry = ActionRegistry::with_builtin_actions();
        let err = registry
            .build(ActionSpec {
                id: "a1".to_string(),
                action_type: "nope".to_string(),
                parameters: serde_json::Value::Null,
                idempotency_key: None,
            })
            .unwrap_err();
        assert!(err.to_string().contains("unknown action type"));
    }
}
