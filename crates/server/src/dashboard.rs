//! Dashboard pages and invoice form endpoints.
//!
//! Paths come from [`DashboardConfig`]; with the defaults they are:
//!
//! - `GET  /login`                        login notice for anonymous visitors
//! - `GET  /dashboard`                    overview cards
//! - `GET  /dashboard/invoices`           searchable, paginated listing (cached)
//! - `GET  /dashboard/invoices/create`    blank invoice form
//! - `POST /dashboard/invoices/create`    create handler
//! - `GET  /dashboard/invoices/{id}/edit` prefilled invoice form
//! - `POST /dashboard/invoices/{id}/edit` update handler
//! - `POST /dashboard/invoices/{id}/delete` delete handler, 303 back to the listing
//!
//! Anything else falls through to a 404 page. The fallback is part of this
//! router so middleware layered over it sees unrouted paths too.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode, Uri},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tera::{Context, Tera};
use tracing::{error, warn};
use uuid::Uuid;

use invoicer_core::config::DashboardConfig;
use invoicer_core::domain::customer::Customer;
use invoicer_core::domain::invoice::{Invoice, InvoiceId, InvoiceStatus};
use invoicer_core::errors::{ApplicationError, InterfaceError};
use invoicer_core::search::{SearchParams, PAGE_PARAM, QUERY_PARAM};
use invoicer_core::validation::{AMOUNT_FIELD, CUSTOMER_ID_FIELD, STATUS_FIELD};
use invoicer_core::FormData;
use invoicer_db::{CustomerRepository, InvoiceRepository, InvoiceSummary, RepositoryError};

use crate::actions::{self, ActionContext, ActionOutcome, ActionSettings, ActionState};
use crate::cache::PageCache;

const TEMPLATE_GLOB: &str = "templates/dashboard/**/*";

type PageResult = Result<Html<String>, (StatusCode, Html<String>)>;

/// Mount points for the dashboard pages, also handed to templates for links.
#[derive(Clone, Debug, Serialize)]
pub struct DashboardPaths {
    pub home: String,
    pub login: String,
    pub invoices: String,
}

impl DashboardPaths {
    fn from_config(config: &DashboardConfig) -> Self {
        let normalize = |path: &str| match path.trim_end_matches('/') {
            "" => "/".to_string(),
            trimmed => trimmed.to_string(),
        };
        Self {
            home: normalize(&config.home_path),
            login: normalize(&config.login_path),
            invoices: normalize(&config.invoices_path),
        }
    }

    fn create(&self) -> String {
        format!("{}/create", self.invoices)
    }

    fn edit(&self, id: &InvoiceId) -> String {
        format!("{}/{}/edit", self.invoices, id.0)
    }
}

#[derive(Clone)]
pub struct DashboardState {
    invoices: Arc<dyn InvoiceRepository>,
    customers: Arc<dyn CustomerRepository>,
    templates: Arc<Tera>,
    cache: Arc<PageCache>,
    settings: Arc<ActionSettings>,
    paths: Arc<DashboardPaths>,
    page_size: u32,
    search_debounce_ms: u64,
}

impl DashboardState {
    pub fn new(
        invoices: Arc<dyn InvoiceRepository>,
        customers: Arc<dyn CustomerRepository>,
        config: &DashboardConfig,
    ) -> Self {
        Self {
            invoices,
            customers,
            templates: init_templates(),
            cache: Arc::new(PageCache::default()),
            settings: Arc::new(ActionSettings::from(config)),
            paths: Arc::new(DashboardPaths::from_config(config)),
            page_size: config.page_size,
            search_debounce_ms: config.search_debounce_ms,
        }
    }

    #[cfg(test)]
    pub fn cache(&self) -> &PageCache {
        &self.cache
    }
}

fn init_templates() -> Arc<Tera> {
    let mut tera = match Tera::new(TEMPLATE_GLOB) {
        Ok(tera) if tera.get_template_names().next().is_some() => tera,
        Ok(_) | Err(_) => {
            warn!(
                event_name = "dashboard.templates.embedded",
                correlation_id = "bootstrap",
                glob = TEMPLATE_GLOB,
                "dashboard templates not found on disk, using embedded copies"
            );
            Tera::default()
        }
    };

    if tera.get_template_names().next().is_none() {
        let embedded = tera.add_raw_templates(vec![
            ("base.html", include_str!("../../../templates/dashboard/base.html")),
            ("overview.html", include_str!("../../../templates/dashboard/overview.html")),
            ("invoices.html", include_str!("../../../templates/dashboard/invoices.html")),
            ("invoice_form.html", include_str!("../../../templates/dashboard/invoice_form.html")),
            ("login.html", include_str!("../../../templates/dashboard/login.html")),
            ("error.html", include_str!("../../../templates/dashboard/error.html")),
        ]);
        if let Err(error) = embedded {
            error!(
                event_name = "dashboard.templates.invalid",
                correlation_id = "bootstrap",
                error = %error,
                "embedded dashboard templates failed to parse"
            );
        }
    }

    Arc::new(tera)
}

pub fn router(state: DashboardState) -> Router {
    let paths = Arc::clone(&state.paths);
    let invoices = paths.invoices.as_str();

    Router::new()
        .route(&paths.login, get(login_page))
        .route(&paths.home, get(overview_page))
        .route(invoices, get(invoices_page))
        .route(&paths.create(), get(create_page).post(create_submit))
        .route(&format!("{invoices}/{{id}}/edit"), get(edit_page).post(edit_submit))
        .route(&format!("{invoices}/{{id}}/delete"), post(delete_submit))
        .fallback(page_not_found)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct SummaryView {
    total_paid: String,
    total_pending: String,
    invoice_count: u64,
    customer_count: u64,
}

impl From<InvoiceSummary> for SummaryView {
    fn from(summary: InvoiceSummary) -> Self {
        Self {
            total_paid: summary.total_paid.display(),
            total_pending: summary.total_pending.display(),
            invoice_count: summary.invoice_count,
            customer_count: summary.customer_count,
        }
    }
}

#[derive(Debug, Serialize)]
struct InvoiceView {
    id: String,
    customer_name: String,
    customer_email: String,
    amount: String,
    date: String,
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct PageLink {
    number: u32,
    href: String,
    current: bool,
}

#[derive(Debug, Default, Serialize)]
struct FormValues {
    customer_id: String,
    amount: String,
    status: String,
}

impl FormValues {
    fn submitted(form: &FormData) -> Self {
        let value = |key| form.get(key).unwrap_or_default().to_string();
        Self {
            customer_id: value(CUSTOMER_ID_FIELD),
            amount: value(AMOUNT_FIELD),
            status: value(STATUS_FIELD),
        }
    }

    fn stored(invoice: &Invoice) -> Self {
        Self {
            customer_id: invoice.customer_id.0.clone(),
            amount: invoice.amount.to_decimal().to_string(),
            status: invoice.status.as_str().to_string(),
        }
    }
}

#[derive(Debug, Default, Serialize)]
struct FormErrors {
    customer_id: Vec<String>,
    amount: Vec<String>,
    status: Vec<String>,
}

impl From<&ActionState> for FormErrors {
    fn from(state: &ActionState) -> Self {
        Self {
            customer_id: state.errors.get(CUSTOMER_ID_FIELD).to_vec(),
            amount: state.errors.get(AMOUNT_FIELD).to_vec(),
            status: state.errors.get(STATUS_FIELD).to_vec(),
        }
    }
}

enum InvoiceForm<'a> {
    Create,
    Edit(&'a InvoiceId),
}

impl InvoiceForm<'_> {
    fn heading(&self) -> &'static str {
        match self {
            Self::Create => "Create Invoice",
            Self::Edit(_) => "Edit Invoice",
        }
    }

    fn action(&self, paths: &DashboardPaths) -> String {
        match self {
            Self::Create => paths.create(),
            Self::Edit(id) => paths.edit(id),
        }
    }
}

// ---------------------------------------------------------------------------
// Pages
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct LoginQuery {
    #[serde(rename = "callbackUrl")]
    pub callback_url: Option<String>,
}

async fn login_page(State(state): State<DashboardState>, Query(query): Query<LoginQuery>) -> PageResult {
    let mut context = page_context(&state);
    context.insert("callback_url", &query.callback_url.unwrap_or_default());
    render(&state.templates, "login.html", &context)
}

async fn overview_page(State(state): State<DashboardState>) -> PageResult {
    let summary = state.invoices.summary().await.map_err(|error| db_error(&state, error))?;

    let mut context = page_context(&state);
    context.insert("summary", &SummaryView::from(summary));
    render(&state.templates, "overview.html", &context)
}

#[derive(Debug, Default, Deserialize)]
pub struct ListingQuery {
    pub query: Option<String>,
    pub page: Option<String>,
}

async fn invoices_page(
    State(state): State<DashboardState>,
    uri: Uri,
    Query(listing): Query<ListingQuery>,
) -> PageResult {
    let cache_key = uri.path_and_query().map_or_else(|| uri.path().to_string(), |pq| pq.to_string());
    let generation = state.cache.generation();
    if let Some(html) = state.cache.get(&cache_key) {
        return Ok(Html(html));
    }

    let term = listing.query.unwrap_or_default();
    let page = listing
        .page
        .as_deref()
        .and_then(|raw| raw.trim().parse::<u32>().ok())
        .filter(|page| *page > 0)
        .unwrap_or(1);

    let results = state
        .invoices
        .search(&term, page, state.page_size)
        .await
        .map_err(|error| db_error(&state, error))?;

    let invoices: Vec<InvoiceView> = results
        .rows
        .into_iter()
        .map(|row| InvoiceView {
            id: row.invoice.id.0,
            customer_name: row.customer_name,
            customer_email: row.customer_email,
            amount: row.invoice.amount.display(),
            date: row.invoice.date.format("%b %-d, %Y").to_string(),
            status: row.invoice.status.as_str(),
        })
        .collect();

    let params = SearchParams::parse(uri.query().unwrap_or_default());
    let pages: Vec<PageLink> = (1..=results.total_pages)
        .map(|number| {
            let mut params = params.clone();
            params.set(PAGE_PARAM, number.to_string());
            PageLink {
                number,
                href: format!("{}?{}", uri.path(), params.to_query_string()),
                current: number == page,
            }
        })
        .collect();

    let mut context = page_context(&state);
    context.insert("invoices", &invoices);
    context.insert("pages", &pages);
    context.insert(QUERY_PARAM, &term);
    context.insert("debounce_ms", &state.search_debounce_ms);
    let html = render(&state.templates, "invoices.html", &context)?;

    state.cache.put(cache_key, html.0.clone(), generation);
    Ok(html)
}

async fn create_page(State(state): State<DashboardState>) -> PageResult {
    render_form(&state, InvoiceForm::Create, FormValues::default(), &ActionState::default()).await
}

async fn edit_page(State(state): State<DashboardState>, Path(id): Path<String>) -> PageResult {
    let id = InvoiceId(id);
    let invoice = state.invoices.find_by_id(&id).await.map_err(|error| db_error(&state, error))?;

    match invoice {
        Some(invoice) => {
            render_form(
                &state,
                InvoiceForm::Edit(&id),
                FormValues::stored(&invoice),
                &ActionState::default(),
            )
            .await
        }
        None => Err(not_found(&state)),
    }
}

// ---------------------------------------------------------------------------
// Mutations
// ---------------------------------------------------------------------------

async fn create_submit(State(state): State<DashboardState>, Form(form): Form<FormData>) -> Response {
    let revalidate = |path: &str| {
        state.cache.invalidate(path);
    };
    let ctx = action_context(&state, &revalidate);

    let outcome = actions::create_invoice(&ctx, &ActionState::default(), &form).await;
    respond(&state, InvoiceForm::Create, &form, outcome).await
}

async fn edit_submit(
    State(state): State<DashboardState>,
    Path(id): Path<String>,
    Form(form): Form<FormData>,
) -> Response {
    let id = InvoiceId(id);
    let revalidate = |path: &str| {
        state.cache.invalidate(path);
    };
    let ctx = action_context(&state, &revalidate);

    let outcome = actions::update_invoice(&ctx, &id, &ActionState::default(), &form).await;
    respond(&state, InvoiceForm::Edit(&id), &form, outcome).await
}

async fn delete_submit(
    State(state): State<DashboardState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let id = InvoiceId(id);
    let revalidate = |path: &str| {
        state.cache.invalidate(path);
    };
    let ctx = action_context(&state, &revalidate);

    match actions::delete_invoice(&ctx, &id).await {
        Ok(ActionOutcome::Revalidated) => {
            Redirect::to(&listing_return_target(&state, &headers)).into_response()
        }
        Ok(ActionOutcome::Redirect(target)) => Redirect::to(&target).into_response(),
        Ok(ActionOutcome::Rejected(rejected)) => {
            let message = rejected.message.unwrap_or_default();
            error_page(&state, StatusCode::SERVICE_UNAVAILABLE, &message, &new_correlation_id())
                .into_response()
        }
        Err(error) => interface_error(&state, ApplicationError::from(error)).into_response(),
    }
}

/// The listing page the delete form was posted from, query included, or the
/// bare listing when the referer is missing or points elsewhere.
fn listing_return_target(state: &DashboardState, headers: &HeaderMap) -> String {
    headers
        .get(header::REFERER)
        .and_then(|value| value.to_str().ok())
        .and_then(|referer| referer.parse::<Uri>().ok())
        .filter(|referer| referer.path() == state.paths.invoices)
        .and_then(|referer| referer.path_and_query().map(ToString::to_string))
        .unwrap_or_else(|| state.paths.invoices.clone())
}

fn action_context<'a>(
    state: &'a DashboardState,
    revalidate: &'a (dyn Fn(&str) + Send + Sync),
) -> ActionContext<'a> {
    ActionContext {
        repository: state.invoices.as_ref(),
        revalidate,
        today: Utc::now().date_naive(),
        settings: &state.settings,
    }
}

async fn respond(
    state: &DashboardState,
    form_kind: InvoiceForm<'_>,
    form: &FormData,
    outcome: Result<ActionOutcome, actions::ActionError>,
) -> Response {
    match outcome {
        Ok(ActionOutcome::Redirect(target)) => Redirect::to(&target).into_response(),
        Ok(ActionOutcome::Revalidated) => Redirect::to(&state.paths.invoices).into_response(),
        Ok(ActionOutcome::Rejected(rejected)) => {
            let status = if rejected.errors.is_empty() {
                StatusCode::SERVICE_UNAVAILABLE
            } else {
                StatusCode::UNPROCESSABLE_ENTITY
            };
            match render_form(state, form_kind, FormValues::submitted(form), &rejected).await {
                Ok(html) => (status, html).into_response(),
                Err(failure) => failure.into_response(),
            }
        }
        Err(error) => interface_error(state, ApplicationError::from(error)).into_response(),
    }
}

// ---------------------------------------------------------------------------
// Rendering helpers
// ---------------------------------------------------------------------------

async fn render_form(
    state: &DashboardState,
    form_kind: InvoiceForm<'_>,
    values: FormValues,
    action_state: &ActionState,
) -> PageResult {
    let customers: Vec<Customer> =
        state.customers.list().await.map_err(|error| db_error(state, error))?;
    let statuses: Vec<&str> = InvoiceStatus::ALL.iter().map(InvoiceStatus::as_str).collect();

    let mut context = page_context(state);
    context.insert("heading", form_kind.heading());
    context.insert("action", &form_kind.action(&state.paths));
    context.insert("submit_label", form_kind.heading());
    context.insert("customers", &customers);
    context.insert("statuses", &statuses);
    context.insert("values", &values);
    context.insert("errors", &FormErrors::from(action_state));
    context.insert("message", &action_state.message);
    render(&state.templates, "invoice_form.html", &context)
}

fn page_context(state: &DashboardState) -> Context {
    let mut context = Context::new();
    context.insert("paths", state.paths.as_ref());
    context
}

fn render(templates: &Tera, name: &str, context: &Context) -> PageResult {
    templates.render(name, context).map(Html).map_err(|error| {
        error!(
            event_name = "dashboard.render.failed",
            correlation_id = "render",
            template = name,
            error = %error,
            "template rendering failed"
        );
        (StatusCode::INTERNAL_SERVER_ERROR, Html("<h1>Internal Server Error</h1>".to_string()))
    })
}

fn new_correlation_id() -> String {
    Uuid::new_v4().simple().to_string()
}

fn error_page(
    state: &DashboardState,
    status: StatusCode,
    message: &str,
    correlation_id: &str,
) -> (StatusCode, Html<String>) {
    let mut context = page_context(state);
    context.insert("message", message);
    context.insert("correlation_id", correlation_id);
    match render(&state.templates, "error.html", &context) {
        Ok(html) => (status, html),
        Err(failure) => failure,
    }
}

fn interface_error(state: &DashboardState, error: ApplicationError) -> (StatusCode, Html<String>) {
    let correlation_id = new_correlation_id();
    error!(
        event_name = "dashboard.request.failed",
        correlation_id = %correlation_id,
        error = %error,
        "dashboard request failed"
    );

    let interface = error.into_interface(correlation_id);
    let status = match interface {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_page(state, status, interface.user_message(), interface.correlation_id())
}

fn db_error(state: &DashboardState, error: RepositoryError) -> (StatusCode, Html<String>) {
    interface_error(state, ApplicationError::Persistence(error.to_string()))
}

fn not_found(state: &DashboardState) -> (StatusCode, Html<String>) {
    error_page(state, StatusCode::NOT_FOUND, "Could not find the requested invoice.", &new_correlation_id())
}

async fn page_not_found(State(state): State<DashboardState>) -> (StatusCode, Html<String>) {
    error_page(&state, StatusCode::NOT_FOUND, "Could not find the requested page.", &new_correlation_id())
}
