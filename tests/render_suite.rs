use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use docmerge::{
    CachedStore, CompanyProfile, Degradation, EngineConfig, LineItem, MemoryStore,
    OrganizationStore, RenderRequest, RenderStatus, Renderer, StoreError, parse_config,
    render_with_defaults,
};

const LOGO_URL: &str = "https://cdn.example/acme.png";

fn fixture(name: &str) -> String {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name);
    std::fs::read_to_string(path).expect("fixture read failed")
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
}

fn acme_profile() -> CompanyProfile {
    CompanyProfile {
        company_name: Some("Van Dijk Advocaten".to_string()),
        company_address: Some("Keizersgracht 1".to_string()),
        company_postal_code: Some("1015 AA".to_string()),
        company_city: Some("Amsterdam".to_string()),
        company_iban: Some("NL91ABNA0417164300".to_string()),
        company_kvk: Some("12345678".to_string()),
        ..CompanyProfile::default()
    }
}

fn store() -> MemoryStore {
    MemoryStore::new()
        .with_organization("acme", Some(acme_profile()), Some(LOGO_URL.to_string()))
        .with_organization("nologo", Some(acme_profile()), None)
}

fn line_items(count: usize) -> Vec<LineItem> {
    (0..count)
        .map(|idx| LineItem::new(format!("Werkzaamheden {}", idx + 1), 2.0, 100.0, 21.0, 200.0))
        .collect()
}

fn invoice_request() -> RenderRequest {
    RenderRequest::new(today())
        .organization("acme")
        .field("factuurnummer", "2024-001")
        .field("client_name", "Jansen B.V.")
        .line_item(LineItem::new("Consulting", 10.0, 75.0, 21.0, 750.0))
        .line_item(LineItem::new("Griffierecht", 1.0, 50.0, 0.0, 50.0))
}

fn full_request() -> RenderRequest {
    invoice_request()
        .field("offertenummer", "OFF-7")
        .field("geldig_tot", NaiveDate::from_ymd_opt(2026, 11, 18).unwrap())
        .field("onderwerp", "Uw dossier")
        .field("aanhef", "Geachte heer")
        .field("inhoud", "Hierbij ontvangt u de stukken.")
        .field("ondertekenaar", "mr. A. de Vries")
        .field("ondertekenaar_titel", "advocaat")
}

#[tokio::test]
async fn render_all_fixtures() {
    // Keep this list explicit so new document types must be added intentionally.
    let fixtures = ["invoice.html", "quote.html", "letter.html"];
    let renderer = Renderer::new(store());
    let request = full_request();

    for name in fixtures {
        let doc = renderer.render(&fixture(name), &request).await;
        assert!(!doc.html.contains("{{"), "{name}: template syntax leaked");
        assert!(doc.html.contains("</html>"), "{name}: markup truncated");
        assert_eq!(doc.status, RenderStatus::Complete, "{name}: {:?}", doc.status);
    }
}

#[tokio::test]
async fn simple_invoice() {
    let renderer = Renderer::new(MemoryStore::new());
    let request = RenderRequest::new(today())
        .field("invoice_number", "2024-001")
        .line_item(LineItem::new("Consulting", 10.0, 75.0, 21.0, 750.0));
    let doc = renderer
        .render(
            "<h1>{{invoice_number}}</h1>{{#each items}}<tr><td>{{description}}</td><td>{{line_total}}</td></tr>{{/each}}",
            &request,
        )
        .await;
    assert_eq!(
        doc.html,
        "<h1>2024-001</h1><tr><td>Consulting</td><td>750.00</td></tr>"
    );
    assert!(!doc.is_degraded());
}

#[tokio::test]
async fn missing_logo_renders_else_branch() {
    let renderer = Renderer::new(store());
    let doc = renderer
        .render(
            r#"{{#if logo}}<img src="{{logo}}">{{else}}<span>No logo</span>{{/if}}"#,
            &RenderRequest::new(today()).organization("nologo"),
        )
        .await;
    assert_eq!(doc.html, "<span>No logo</span>");
    assert!(!doc.html.contains("<img"));
    // an unconfigured logo is a normal state, not a failure
    assert!(!doc.is_degraded());
}

#[tokio::test]
async fn present_logo_fills_guard_and_token() {
    let renderer = Renderer::new(store());
    let doc = renderer.render(&fixture("invoice.html"), &invoice_request()).await;
    assert!(doc.html.contains(&format!(
        r#"<img class="logo" src="{LOGO_URL}" alt="Van Dijk Advocaten">"#
    )));
    assert!(!doc.html.contains("logo-fallback"));
}

#[tokio::test]
async fn empty_line_items_render_one_fallback_row() {
    let renderer = Renderer::new(store());
    let mut request = invoice_request();
    request.line_items.clear();

    let doc = renderer.render(&fixture("invoice.html"), &request).await;
    assert_eq!(doc.html.matches(r#"data-empty-state="true""#).count(), 1);
    assert_eq!(doc.html.matches("<tr><td>").count(), 0);
    assert!(doc.html.contains("Subtotaal: €0.00"));
    assert!(!doc.is_degraded());
}

#[tokio::test]
async fn loop_repeats_once_per_item_in_order() {
    let renderer = Renderer::new(store());
    for count in [1, 3, 7] {
        let mut request = invoice_request();
        request.line_items = line_items(count);
        let doc = renderer.render(&fixture("invoice.html"), &request).await;
        assert_eq!(doc.html.matches("<tr><td>").count(), count);

        let first = doc.html.find("Werkzaamheden 1<").unwrap();
        let last = doc.html.find(&format!("Werkzaamheden {count}<")).unwrap();
        assert!(first <= last);
    }
}

#[tokio::test]
async fn invoice_totals_and_system_fields() {
    let renderer = Renderer::new(store());
    let doc = renderer.render(&fixture("invoice.html"), &invoice_request()).await;
    assert!(doc.html.contains(
        "<tr><td>Consulting</td><td>10</td><td>€75.00</td><td>21%</td><td>€750.00</td></tr>"
    ));
    assert!(doc.html.contains("Subtotaal: €800.00"));
    assert!(doc.html.contains("BTW: €157.50"));
    assert!(doc.html.contains("Totaal: €957.50"));
    assert!(doc.html.contains("Datum: 19-10-2026 | Referentie: REF-20261019-ACME"));
    assert!(doc.html.contains("1015 AA Amsterdam"));
}

#[tokio::test]
async fn conditional_follows_field_truthiness() {
    let renderer = Renderer::new(store());
    let template = fixture("invoice.html");

    let with_notes = invoice_request().field("notities", "Betaling binnen 14 dagen.");
    let doc = renderer.render(&template, &with_notes).await;
    assert!(doc.html.contains(r#"<section class="notes">Betaling binnen 14 dagen.</section>"#));

    let blank_notes = invoice_request().field("notities", "   ");
    let doc = renderer.render(&template, &blank_notes).await;
    assert!(!doc.html.contains("notes"));
}

#[tokio::test]
async fn quote_uses_default_row_and_else_branch() {
    let renderer = Renderer::new(store());
    let doc = renderer.render(&fixture("quote.html"), &full_request()).await;
    assert!(doc.html.contains(
        "<tr><td>Griffierecht</td><td>1</td><td>€50.00</td><td>0%</td><td>€50.00</td></tr>"
    ));
    assert!(doc.html.contains(r#"<p class="no-discount">Geen korting</p>"#));
    assert!(doc.html.contains("Geldig tot: 18-11-2026"));
    assert!(doc.html.contains("<p>Van Dijk Advocaten, Amsterdam</p>"));
    assert!(doc.html.contains(&format!(r#"<img src="{LOGO_URL}" alt="logo">"#)));
}

#[tokio::test]
async fn unknown_placeholders_are_stripped_and_reported() {
    let renderer = Renderer::new(store());
    let mut request = full_request();
    request.document_fields.remove("ondertekenaar_titel");

    let doc = renderer.render(&fixture("letter.html"), &request).await;
    assert!(!doc.html.contains("{{"));
    assert!(doc.html.contains("<p>mr. A. de Vries<br></p>"));
    assert!(doc.html.contains("<p>Geachte heer Jansen B.V.,</p>"));
    assert_eq!(
        doc.status.degradations(),
        &[Degradation::UnresolvedPlaceholders(vec![
            "ondertekenaar_titel".to_string()
        ])]
    );
}

#[test]
fn keys_with_accents_and_colons_resolve() {
    let request = RenderRequest::new(today())
        .field("naam_cliënt", "Jansen")
        .field("klant:naam", "X");
    let doc = render_with_defaults(
        "<p>{{naam_cliënt}}|{{klant:naam}}</p>{{#if naam_cliënt}}ok{{/if}}",
        &request,
        &EngineConfig::default(),
    );
    assert_eq!(doc.html, "<p>Jansen|X</p>ok");
    assert_eq!(doc.status, RenderStatus::Complete);
}

#[test]
fn field_text_is_never_read_as_template_syntax() {
    let request = RenderRequest::new(today())
        .field("notities", "Zie {{else}} bijlage")
        .line_item(LineItem::new("Uren {{/each}} extra", 1.0, 10.0, 21.0, 10.0));
    let doc = render_with_defaults(
        "{{#if notities}}<p>{{notities}}</p>{{/if}}{{#each items}}<td>{{description}}</td>{{/each}}",
        &request,
        &EngineConfig::default(),
    );
    assert_eq!(
        doc.html,
        "<p>Zie {&#123;else}} bijlage</p><td>Uren {&#123;/each}} extra</td>"
    );
    assert_eq!(doc.status, RenderStatus::Complete);
}

struct UnreachableStore;

#[async_trait]
impl OrganizationStore for UnreachableStore {
    async fn company_profile(
        &self,
        _organization_id: &str,
    ) -> Result<Option<CompanyProfile>, StoreError> {
        Err(StoreError::Backend("connection refused".to_string()))
    }

    async fn company_logo(&self, _organization_id: &str) -> Result<Option<String>, StoreError> {
        Err(StoreError::Timeout)
    }
}

#[tokio::test]
async fn store_failures_degrade_instead_of_failing() {
    let renderer = Renderer::new(UnreachableStore);
    let doc = renderer.render(&fixture("invoice.html"), &invoice_request()).await;

    assert!(!doc.html.contains("<img"));
    assert!(doc.html.contains(r#"<h2 class="logo-fallback"></h2>"#));
    assert!(doc.html.contains("<h1>Factuur 2024-001</h1>"));
    assert!(!doc.html.contains("{{"));

    let reasons = doc.status.degradations();
    assert!(reasons.iter().any(|r| matches!(r, Degradation::ProfileUnavailable(_))));
    assert!(reasons.iter().any(|r| matches!(r, Degradation::LogoUnavailable(_))));
}

#[tokio::test]
async fn concurrent_renders_match_sequential_ones() {
    let renderer = Renderer::new(store());
    let invoice = fixture("invoice.html");
    let quote = fixture("quote.html");
    let request = full_request();

    let (a, b) = tokio::join!(
        renderer.render(&invoice, &request),
        renderer.render(&quote, &request),
    );
    assert_eq!(a, renderer.render(&invoice, &request).await);
    assert_eq!(b, renderer.render(&quote, &request).await);
}

struct CountingStore {
    profile_calls: Arc<AtomicUsize>,
    logo_calls: Arc<AtomicUsize>,
    stamp: DateTime<Utc>,
}

#[async_trait]
impl OrganizationStore for CountingStore {
    async fn company_profile(
        &self,
        _organization_id: &str,
    ) -> Result<Option<CompanyProfile>, StoreError> {
        self.profile_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Some(acme_profile()))
    }

    async fn company_logo(&self, _organization_id: &str) -> Result<Option<String>, StoreError> {
        self.logo_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Some(LOGO_URL.to_string()))
    }

    async fn last_modified(
        &self,
        _organization_id: &str,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(Some(self.stamp))
    }
}

#[tokio::test]
async fn cached_store_reuses_profiles_across_renders() {
    let profile_calls = Arc::new(AtomicUsize::new(0));
    let logo_calls = Arc::new(AtomicUsize::new(0));
    let store = CachedStore::new(CountingStore {
        profile_calls: Arc::clone(&profile_calls),
        logo_calls: Arc::clone(&logo_calls),
        stamp: Utc.with_ymd_and_hms(2026, 10, 1, 9, 0, 0).unwrap(),
    });
    let renderer = Renderer::new(store);
    let template = fixture("invoice.html");

    let first = renderer.render(&template, &invoice_request()).await;
    let second = renderer.render(&template, &invoice_request()).await;
    assert_eq!(first, second);
    assert_eq!(profile_calls.load(Ordering::SeqCst), 1);
    assert_eq!(logo_calls.load(Ordering::SeqCst), 2);
    assert_eq!(renderer.store().cached_len().await, 1);

    renderer.store().invalidate("acme").await;
    renderer.render(&template, &invoice_request()).await;
    assert_eq!(profile_calls.load(Ordering::SeqCst), 2);
}

/// Keeps the trait's default `last_modified`.
struct StamplessStore {
    profile_calls: Arc<AtomicUsize>,
}

#[async_trait]
impl OrganizationStore for StamplessStore {
    async fn company_profile(
        &self,
        _organization_id: &str,
    ) -> Result<Option<CompanyProfile>, StoreError> {
        self.profile_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Some(acme_profile()))
    }

    async fn company_logo(&self, _organization_id: &str) -> Result<Option<String>, StoreError> {
        Ok(None)
    }
}

#[tokio::test]
async fn cache_never_reads_more_than_the_plain_store() {
    let template = fixture("invoice.html");

    let plain_calls = Arc::new(AtomicUsize::new(0));
    let plain = Renderer::new(StamplessStore {
        profile_calls: Arc::clone(&plain_calls),
    });
    let cached_calls = Arc::new(AtomicUsize::new(0));
    let cached = Renderer::new(CachedStore::new(StamplessStore {
        profile_calls: Arc::clone(&cached_calls),
    }));

    for _ in 0..3 {
        let a = plain.render(&template, &invoice_request()).await;
        let b = cached.render(&template, &invoice_request()).await;
        assert_eq!(a, b);
    }
    assert_eq!(plain_calls.load(Ordering::SeqCst), 3);
    assert_eq!(cached_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn dutch_locale_formats_money() {
    let config = parse_config(r#"{"locale": "nl"}"#).unwrap();
    let renderer = Renderer::with_config(MemoryStore::new(), config);
    let request = RenderRequest::new(today())
        .line_item(LineItem::new("Procesvoering", 1.0, 1234.5, 21.0, 1234.5));
    let doc = renderer.render("{{subtotaal}}|{{datum}}", &request).await;
    assert_eq!(doc.html, "1.234,50|19-10-2026");
}

#[test]
fn malformed_markers_never_leak() {
    let config = EngineConfig::default();
    let request = RenderRequest::new(today()).field("notities", "x");

    let doc = render_with_defaults("<p>{{#if notities}}open</p>", &request, &config);
    assert_eq!(doc.html, "<p>open</p>");
    assert!(doc
        .status
        .degradations()
        .iter()
        .any(|r| matches!(r, Degradation::UnbalancedMarkers { count: 1 })));

    let doc = render_with_defaults(
        "{{#each items}}<i>{{description}}</i>{{/each}}{{#each items}}<b>{{description}}</b>{{/each}}",
        &request.clone().line_items(line_items(2)),
        &config,
    );
    assert_eq!(doc.html, "<i>Werkzaamheden 1</i><i>Werkzaamheden 2</i>");
    assert!(doc
        .status
        .degradations()
        .contains(&Degradation::DuplicateLoopBlock { count: 1 }));
}
