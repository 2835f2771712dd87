//! SSG-032: Image registry stack (`SsgEcrStack`).

use super::StackContext;
use crate::constructs::lambda::RepositoryRef;
use crate::core::intrinsic::get_att;
use crate::core::types::{CfnResource, ExportRef, RemovalPolicy, Stack};
use indexmap::IndexMap;
use serde_json::json;

/// Every container image repository the platform pulls from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Repo {
    Authorizer,
    JobApi,
    Nmap,
    Frontend,
    StripeHook,
    Batch,
    EbRules,
    EbSchedule,
    Relay,
}

impl Repo {
    pub const ALL: [Repo; 9] = [
        Self::Authorizer,
        Self::JobApi,
        Self::Nmap,
        Self::Frontend,
        Self::StripeHook,
        Self::Batch,
        Self::EbRules,
        Self::EbSchedule,
        Self::Relay,
    ];

    pub fn repository_name(self) -> &'static str {
        match self {
            Self::Authorizer => "auth0-authorizer",
            Self::JobApi => "job-api-lambda",
            Self::Nmap => "nmap",
            Self::Frontend => "frontend",
            Self::StripeHook => "stripe-hook",
            Self::Batch => "ssg-batch",
            Self::EbRules => "eb-rules-lambda",
            Self::EbSchedule => "eb-schedule-lambda",
            Self::Relay => "relay",
        }
    }

    fn logical_id(self) -> &'static str {
        match self {
            Self::Authorizer => "SsgAuthorizerRepository",
            Self::JobApi => "SsgJobRepository",
            Self::Nmap => "SsgNmapRepository",
            Self::Frontend => "SsgFrontEndRepository",
            Self::StripeHook => "StripeHookRepository",
            Self::Batch => "SsgBatchRepository",
            Self::EbRules => "SsgEbRulesRepository",
            Self::EbSchedule => "SsgEbScheduleRepository",
            Self::Relay => "SsgRelayRepository",
        }
    }

    /// Slug used in export names, `ssg-repo-<slug>-arn`.
    fn export_slug(self) -> &'static str {
        match self {
            Self::Authorizer => "authorizer",
            Self::JobApi => "job-api",
            Self::Nmap => "nmap",
            Self::Frontend => "frontend",
            Self::StripeHook => "stripe-hook",
            Self::Batch => "batch",
            Self::EbRules => "eb-rules",
            Self::EbSchedule => "schedule",
            Self::Relay => "relay",
        }
    }
}

/// Exported ARN and URI of one repository.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRepository {
    pub repository_name: String,
    pub arn: ExportRef,
    pub uri: ExportRef,
}

impl ImageRepository {
    /// Import into `stack`, recording the dependency on the registry.
    pub fn import(&self, stack: &mut Stack) -> RepositoryRef {
        RepositoryRef {
            repository_name: self.repository_name.clone(),
            arn: stack.import(&self.arn),
            uri: stack.import(&self.uri),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RegistryHandle {
    repositories: IndexMap<Repo, ImageRepository>,
}

impl RegistryHandle {
    pub fn get(&self, repo: Repo) -> Result<&ImageRepository, String> {
        self.repositories
            .get(&repo)
            .ok_or_else(|| format!("registry has no '{}' repository", repo.repository_name()))
    }

    pub fn len(&self) -> usize {
        self.repositories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.repositories.is_empty()
    }
}

pub fn build(ctx: &StackContext<'_>, name: &str) -> Result<(Stack, RegistryHandle), String> {
    let mut stack = ctx.stack(name, "ScanSafeGuard container image repositories");
    let mut repositories = IndexMap::new();
    for repo in Repo::ALL {
        let id = repo.logical_id();
        stack.add_resource(
            id,
            CfnResource::new(
                "AWS::ECR::Repository",
                json!({ "RepositoryName": repo.repository_name() }),
            )
            .with_removal_policy(RemovalPolicy::Retain),
        )?;
        let arn_export = format!("ssg-repo-{}-arn", repo.export_slug());
        let uri_export = format!("ssg-repo-{}-uri", repo.export_slug());
        let arn = stack.export(&format!("{}Arn", id), get_att(id, "Arn"), &arn_export)?;
        let uri = stack.export(&format!("{}Uri", id), get_att(id, "RepositoryUri"), &uri_export)?;
        repositories.insert(
            repo,
            ImageRepository {
                repository_name: repo.repository_name().to_string(),
                arn,
                uri,
            },
        );
    }
    tracing::debug!(stack = %stack.name, repositories = repositories.len(), "registry stack built");
    Ok((stack, RegistryHandle { repositories }))
}
