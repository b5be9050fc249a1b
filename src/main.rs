use anyhow::{Context, Result};
use clap::Parser;
use crudkit::core::LimitDefault;
use crudkit::controller::{ControllerConfig, KeyBinding, QueryValue, RouteAuth};
use crudkit::query::{Filter, SortBy};
use crudkit::service::RuleValidator;
use crudkit::web::{header_identity, router};
use crudkit::{
    Dao, DaoCore, MemoryEngine, MemoryStore, ReadableController, ReadableService, SchemaNode,
    WritableController, WritableService,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "crudkit-demo")]
#[command(about = "Serves a drivers/rides API from an in-memory store")]
struct Cli {
    #[arg(long, default_value = "127.0.0.1:3000")]
    bind: SocketAddr,

    /// Largest limit a find request may ask for
    #[arg(long, default_value_t = 500)]
    max_limit: u64,

    /// Disable the limit maximum
    #[arg(long)]
    unlimited: bool,

    /// Limit applied when a request carries none; defaults to the maximum
    #[arg(long)]
    default_limit: Option<u64>,

    /// Header carrying the caller identity
    #[arg(long, default_value = "x-user")]
    identity_header: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Driver {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<i64>,
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    ride_count: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Ride {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<i64>,
    driver_id: Option<i64>,
    distance: f64,
    price: f64,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    if let Some(limit) = cli.default_limit.filter(|limit| !cli.unlimited && *limit > cli.max_limit) {
        anyhow::bail!("--default-limit {limit} exceeds --max-limit {}", cli.max_limit);
    }

    let store = MemoryStore::new();
    let drivers_node = SchemaNode::builder("driver")
        .generated("id")
        .primary(&["id"])
        .column("name")
        .count("rideCount", "ride", "driverId")
        .build()
        .context("invalid driver schema")?;
    let rides_node = SchemaNode::builder("ride")
        .generated("id")
        .primary(&["id"])
        .columns(&["distance", "price"])
        .relation("driver", Arc::clone(&drivers_node), "driverId", "id")
        .build()
        .context("invalid ride schema")?;
    seed(&store, &drivers_node, &rides_node).await?;

    let config = || {
        let config = ControllerConfig::new().max_limit((!cli.unlimited).then_some(cli.max_limit));
        match cli.default_limit {
            Some(limit) => config.default_limit(LimitDefault::Value(limit)),
            None => config.default_limit(LimitDefault::UseMax),
        }
    };

    let drivers_dao: Arc<Dao<Driver, MemoryEngine<String>>> = Arc::new(Dao::new(
        DaoCore::new(store.engine(Arc::clone(&drivers_node))).insertable(&["name"]),
    ));
    let drivers_service = WritableService::new(drivers_dao)
        .validator(RuleValidator::new().required("name").max_length("name", 64));
    let drivers = Arc::new(
        WritableController::new(drivers_service, KeyBinding::integer("id")).with_config(
            config().default_sort_by(|schema: &SchemaNode| {
                schema.resolve("name").map(|name| vec![SortBy::asc(&name)]).unwrap_or_default()
            }),
        ),
    );

    let rides_dao: Arc<Dao<Ride, MemoryEngine<String>>> =
        Arc::new(Dao::new(DaoCore::new(store.engine(Arc::clone(&rides_node)))));
    let rides = Arc::new(
        ReadableController::new(ReadableService::new(rides_dao), KeyBinding::integer("id"))
            .with_config(config().additional_filter(
                "driver",
                |schema, value, _auth| {
                    let Some(name) = value.and_then(QueryValue::as_single) else {
                        return Ok(None);
                    };
                    let field = schema.resolve("driver.name").ok_or_else(|| {
                        crudkit::CrudError::internal("ride schema has no driver.name")
                    })?;
                    Ok(Some(Filter::eq(&field, json!(name))))
                },
            )),
    );

    let table = drivers
        .routes("/drivers", "/drivers/:id", RouteAuth::Required)
        .merge(rides.routes("/rides", "/rides/:id", RouteAuth::None));
    let app = router(table, header_identity(&cli.identity_header))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(cli.bind)
        .await
        .with_context(|| format!("failed to bind {}", cli.bind))?;
    info!(bind_addr = %cli.bind, "crudkit demo started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}

async fn seed(store: &MemoryStore, drivers: &SchemaNode, rides: &SchemaNode) -> Result<()> {
    let rows = |values: serde_json::Value| -> Vec<crudkit::core::Row> {
        values
            .as_array()
            .map(|items| items.iter().filter_map(|item| item.as_object().cloned()).collect())
            .unwrap_or_default()
    };

    store
        .seed(drivers, rows(json!([{"name": "Ada"}, {"name": "Grace"}, {"name": "Linus"}])))
        .await
        .context("failed to seed drivers")?;
    store
        .seed(
            rides,
            rows(json!([
                {"driverId": 1, "distance": 12.5, "price": 18.0},
                {"driverId": 1, "distance": 3.2, "price": 7.5},
                {"driverId": 2, "distance": 40.0, "price": 52.0}
            ])),
        )
        .await
        .context("failed to seed rides")?;
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("crudkit=debug,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "unable to install ctrl+c handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "unable to install sigterm handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
