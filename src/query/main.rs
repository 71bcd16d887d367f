//! Query server for INSEE reference lookups.
//!
//! Provides an HTTP API for commune search, address auto-fill on commune
//! selection, and address create/update with the display city kept in step.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use clap::Parser;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use insee::autofill::{AddressService, AutoFill, AutoFillError};
use insee::models::{Address, AddressChanges};
use insee::store::{search_cities, Filter, Id, Record, ReferenceStore, StoreError};

#[derive(Parser, Debug)]
#[command(name = "query")]
#[command(about = "INSEE reference query server")]
struct Args {
    /// Listen address
    #[arg(short, long, default_value = "0.0.0.0:3000")]
    listen: String,

    /// Reference store written by `ingest`
    #[arg(long, default_value = "insee.db")]
    db: PathBuf,
}

/// Application state shared across handlers
struct AppState {
    store: ReferenceStore,
}

type ApiError = (StatusCode, String);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    info!("INSEE Query Server");
    info!("Opening reference store at {}", args.db.display());

    let store = ReferenceStore::open_sled(&args.db)
        .with_context(|| format!("Failed to open reference store {}", args.db.display()))?;

    info!(
        "Reference store holds {} regions, {} departments, {} zip codes, {} cities",
        store.regions.count()?,
        store.departments.count()?,
        store.zipcodes.count()?,
        store.cities.count()?
    );

    let state = Arc::new(AppState { store });

    // Build router
    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/v1/cities", get(cities_handler))
        .route("/v1/autofill", get(autofill_handler))
        .route("/v1/addresses", post(create_address_handler))
        .route(
            "/v1/addresses/{id}",
            get(get_address_handler).put(update_address_handler),
        )
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    info!("Starting server on {}", args.listen);

    let listener = tokio::net::TcpListener::bind(&args.listen).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Run store work on the blocking pool; sled lookups scan whole trees.
async fn blocking<T, F>(state: &Arc<AppState>, work: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&AppState) -> Result<T, ApiError> + Send + 'static,
{
    let state = Arc::clone(state);
    tokio::task::spawn_blocking(move || work(&state))
        .await
        .map_err(|e| {
            tracing::error!("Store task failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?
}

/// Health check endpoint
async fn health_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<HealthResponse>, ApiError> {
    let cities = blocking(&state, |state| Ok(state.store.cities.count().unwrap_or(0))).await?;

    Ok(Json(HealthResponse {
        status: if cities > 0 { "ok" } else { "empty" },
        cities,
    }))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    cities: usize,
}

#[derive(Deserialize)]
struct CityQueryParams {
    /// Name prefix (matched case-insensitively against the canonical name)
    name: Option<String>,
    /// Department code
    dep: Option<String>,
    /// Number of results
    size: Option<usize>,
}

#[derive(Serialize)]
struct CityHit {
    id: Id,
    /// "NAME (DEP)"
    label: String,
    ncc: String,
    nccenr: String,
    dep: String,
    city_code: String,
    department_id: Option<Id>,
}

/// Commune search by name, for city pickers
async fn cities_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CityQueryParams>,
) -> Result<Json<Vec<CityHit>>, ApiError> {
    let mut filter = Filter::new();
    if let Some(name) = params.name.as_deref() {
        filter = filter.ilike("ncc", name);
    }
    if let Some(dep) = params.dep.as_deref() {
        filter = filter.eq("dep", dep);
    }
    let size = params.size.unwrap_or(10).min(50);

    let hits = blocking(&state, move |state| {
        let mut ids = search_cities(&*state.store.cities, &filter).map_err(store_error)?;
        ids.truncate(size);
        let records = state.store.cities.read(&ids).map_err(store_error)?;
        Ok(records
            .into_iter()
            .map(|r| CityHit {
                id: r.id,
                label: r.value.display_name(),
                dep: r.value.dep().to_string(),
                city_code: r.value.city_code().to_string(),
                department_id: r.value.department_id,
                ncc: r.value.ncc,
                nccenr: r.value.nccenr,
            })
            .collect())
    })
    .await?;

    Ok(Json(hits))
}

#[derive(Deserialize)]
struct AutoFillParams {
    city_id: Option<u64>,
}

/// Address field updates for a selected commune
async fn autofill_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AutoFillParams>,
) -> Result<Json<AddressChanges>, ApiError> {
    let city_id = params.city_id.map(Id);
    let changes = blocking(&state, move |state| {
        AutoFill::new(&state.store)
            .on_city_changed(city_id)
            .map_err(autofill_error)
    })
    .await?;
    Ok(Json(changes))
}

async fn create_address_handler(
    State(state): State<Arc<AppState>>,
    Json(changes): Json<AddressChanges>,
) -> Result<(StatusCode, Json<Record<Address>>), ApiError> {
    let record = blocking(&state, move |state| {
        AddressService::new(&state.store)
            .create(changes)
            .map_err(autofill_error)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn update_address_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    Json(changes): Json<AddressChanges>,
) -> Result<Json<Record<Address>>, ApiError> {
    let record = blocking(&state, move |state| {
        AddressService::new(&state.store)
            .write(Id(id), changes)
            .map_err(autofill_error)
    })
    .await?;
    Ok(Json(record))
}

async fn get_address_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<Record<Address>>, ApiError> {
    let record = blocking(&state, move |state| {
        state.store.addresses.browse(Id(id)).map_err(store_error)
    })
    .await?;
    record
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, format!("address {} not found", id)))
}

fn store_error(e: StoreError) -> ApiError {
    match e {
        StoreError::NotFound { .. } => (StatusCode::NOT_FOUND, e.to_string()),
        _ => {
            tracing::error!("Reference store error: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

fn autofill_error(e: AutoFillError) -> ApiError {
    match e {
        AutoFillError::UnknownCity(_) => (StatusCode::NOT_FOUND, e.to_string()),
        AutoFillError::Store(e) => store_error(e),
        AutoFillError::MissingCountry(_) => {
            tracing::error!("Auto-fill failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}
