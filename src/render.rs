use crate::aggregate::{Sources, aggregate};
use crate::config::EngineConfig;
use crate::error::{Degradation, RenderStatus, StoreError};
use crate::logo::try_resolve_logo;
use crate::model::{CompanyProfile, LogoResult, RenderRequest};
use crate::passes::{Pipeline, PipelineInput};
use crate::store::OrganizationStore;
use anyhow::Result;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDocument {
    pub html: String,
    pub status: RenderStatus,
}

impl RenderedDocument {
    pub fn is_degraded(&self) -> bool {
        !self.status.is_complete()
    }
}

/// Renders templates against organization data read from `S`.
///
/// Holds no per-render state, so one renderer can serve concurrent previews.
#[derive(Debug, Clone)]
pub struct Renderer<S> {
    store: S,
    config: EngineConfig,
}

impl<S: OrganizationStore> Renderer<S> {
    pub fn new(store: S) -> Self {
        Self::with_config(store, EngineConfig::default())
    }

    pub fn with_config(store: S, config: EngineConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Never fails: lookup errors are logged, recorded in the status, and replaced
    /// by defaults.
    pub async fn render(&self, template: &str, request: &RenderRequest) -> RenderedDocument {
        let mut degradations = Vec::new();

        let (profile, logo) = match request.organization_id.as_deref() {
            Some(organization_id) => {
                let (profile, logo) = tokio::join!(
                    self.fetch_profile(organization_id, request.company_profile.as_ref()),
                    try_resolve_logo(&self.store, organization_id),
                );
                let profile = profile.unwrap_or_else(|err| {
                    tracing::warn!(organization_id, error = %err, "company profile lookup failed, rendering with empty company fields");
                    degradations.push(Degradation::ProfileUnavailable(err.to_string()));
                    None
                });
                let logo = logo.unwrap_or_else(|err| {
                    tracing::warn!(organization_id, error = %err, "logo lookup failed, rendering without logo");
                    degradations.push(Degradation::LogoUnavailable(err.to_string()));
                    LogoResult::none()
                });
                (profile, logo)
            }
            None => (request.company_profile.clone(), LogoResult::none()),
        };

        render_resolved(template, request, profile.as_ref(), &logo, &self.config, degradations)
    }

    async fn fetch_profile(
        &self,
        organization_id: &str,
        supplied: Option<&CompanyProfile>,
    ) -> Result<Option<CompanyProfile>, StoreError> {
        match supplied {
            Some(profile) => Ok(Some(profile.clone())),
            None => self.store.company_profile(organization_id).await,
        }
    }
}

/// Renders with inputs that are already resolved. Synchronous and pure.
pub fn render_resolved(
    template: &str,
    request: &RenderRequest,
    profile: Option<&CompanyProfile>,
    logo: &LogoResult,
    config: &EngineConfig,
    mut degradations: Vec<Degradation>,
) -> RenderedDocument {
    let sources = Sources {
        organization_id: request.organization_id.as_deref(),
        profile,
        document_fields: &request.document_fields,
        line_items: &request.line_items,
        today: request.today,
    };
    let aggregated = aggregate(&sources, config);

    let input = PipelineInput {
        logo,
        scalars: &aggregated.scalars,
        items: &aggregated.items,
        config,
    };
    let output = Pipeline::run(template, &input);
    degradations.extend(output.diagnostics);

    let status = RenderStatus::from_degradations(degradations);
    match &status {
        RenderStatus::Complete => {
            tracing::debug!(len = output.html.len(), "document rendered");
        }
        RenderStatus::Degraded(reasons) => {
            tracing::info!(
                len = output.html.len(),
                reasons = reasons.len(),
                "document rendered in degraded form"
            );
        }
    }

    RenderedDocument {
        html: output.html,
        status,
    }
}

/// Renders without any store: the request's own profile, no logo.
pub fn render_with_defaults(
    template: &str,
    request: &RenderRequest,
    config: &EngineConfig,
) -> RenderedDocument {
    render_resolved(
        template,
        request,
        request.company_profile.as_ref(),
        &LogoResult::none(),
        config,
        Vec::new(),
    )
}

pub fn write_output_html(html: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, html)?;
        }
        None => {
            print!("{}", html);
        }
    }
    Ok(())
}
