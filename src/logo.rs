use crate::error::StoreError;
use crate::model::LogoResult;
use crate::store::OrganizationStore;

/// Looks up the organization's logo. Errors are passed through so the caller can
/// record why the logo is missing before falling back.
pub async fn try_resolve_logo<S>(store: &S, organization_id: &str) -> Result<LogoResult, StoreError>
where
    S: OrganizationStore + ?Sized,
{
    let url = store.company_logo(organization_id).await?.unwrap_or_default();
    let logo = LogoResult::from_url(url);
    tracing::debug!(
        organization_id,
        has_logo = logo.has_logo(),
        kind = logo_kind(logo.logo_url()),
        "logo resolved"
    );
    Ok(logo)
}

/// Like [`try_resolve_logo`], but a failed lookup is just an absent logo.
pub async fn resolve_logo<S>(store: &S, organization_id: &str) -> LogoResult
where
    S: OrganizationStore + ?Sized,
{
    match try_resolve_logo(store, organization_id).await {
        Ok(logo) => logo,
        Err(err) => {
            tracing::warn!(organization_id, error = %err, "logo lookup failed, rendering without logo");
            LogoResult::none()
        }
    }
}

fn logo_kind(url: &str) -> &'static str {
    if url.trim().is_empty() {
        "none"
    } else if url.starts_with("data:") {
        "inline"
    } else {
        "url"
    }
}
