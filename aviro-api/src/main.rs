use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use aviro_api::{app, scheduler, AppState};
use aviro_booking::{BookingLifecycle, LifecycleConfig, MockAirlineProvider, ReconciliationEngine};
use aviro_core::notify::NoopMailer;
use aviro_core::payment::PaymentProcessor;
use aviro_core::provider::AirlineProvider;
use aviro_core::repository::{
    AddonRepository, BookingRepository, CouponRepository, FlightRepository, IdempotencyRepository,
    ReconciliationLogRepository, SeatMapStore,
};
use aviro_inventory::SeatInventory;
use aviro_payments::{GatewayConfig, MockProcessor, PaymentGateway};
use aviro_pricing::{PricingEngine, PricingPolicy};
use aviro_store::booking_repo::PgBookingRepository;
use aviro_store::catalog_repo::{PgAddonRepository, PgCouponRepository, PgFlightRepository};
use aviro_store::idempotency_repo::PgIdempotencyRepository;
use aviro_store::recon_log_repo::PgReconciliationLogRepository;
use aviro_store::seatmap_repo::PgSeatMapStore;
use aviro_store::{Config, DbClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aviro=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;
    tracing::info!("starting aviro api on port {}", config.server.port);

    let db = DbClient::new(&config.database.url, config.database.max_connections).await?;
    db.migrate().await?;

    let bookings: Arc<dyn BookingRepository> =
        Arc::new(PgBookingRepository::new(db.pool.clone()));
    let seat_maps: Arc<dyn SeatMapStore> = Arc::new(PgSeatMapStore::new(db.pool.clone()));
    let idempotency: Arc<dyn IdempotencyRepository> =
        Arc::new(PgIdempotencyRepository::new(db.pool.clone()));
    let coupons: Arc<dyn CouponRepository> = Arc::new(PgCouponRepository::new(db.pool.clone()));
    let addons: Arc<dyn AddonRepository> = Arc::new(PgAddonRepository::new(db.pool.clone()));
    let flights: Arc<dyn FlightRepository> = Arc::new(PgFlightRepository::new(db.pool.clone()));
    let recon_logs: Arc<dyn ReconciliationLogRepository> =
        Arc::new(PgReconciliationLogRepository::new(db.pool.clone()));

    // Sandbox adapters until real processor/GDS credentials are wired in.
    let processor: Arc<dyn PaymentProcessor> = Arc::new(MockProcessor::new());
    let provider: Arc<dyn AirlineProvider> = Arc::new(MockAirlineProvider::new());
    let mailer = Arc::new(NoopMailer);

    let inventory = Arc::new(SeatInventory::new(seat_maps));

    let gateway = Arc::new(PaymentGateway::new(
        processor.clone(),
        bookings.clone(),
        mailer.clone(),
        GatewayConfig {
            webhook_secret: config.payments.webhook_secret.clone(),
            success_url: config.payments.success_url.clone(),
            cancel_url: config.payments.cancel_url.clone(),
        },
    ));

    let pricing = PricingEngine::new(PricingPolicy {
        tax_rate_bp: config.pricing.tax_rate_bp,
        apply_unvalidated_coupons: config.pricing.apply_unvalidated_coupons,
    });

    let lifecycle = Arc::new(BookingLifecycle::new(
        bookings.clone(),
        idempotency,
        coupons,
        addons,
        flights.clone(),
        inventory.clone(),
        pricing,
        gateway.clone(),
        provider.clone(),
        mailer.clone(),
        LifecycleConfig {
            cancellation_fee_bp: config.booking.cancellation_fee_bp,
        },
    ));

    let reconciler = Arc::new(ReconciliationEngine::new(
        bookings,
        processor,
        gateway.clone(),
        inventory.clone(),
        provider.clone(),
        mailer,
        recon_logs,
    ));

    if config.reconcile.enabled {
        scheduler::spawn_reconcile_loop(
            reconciler.clone(),
            config.reconcile.interval_secs,
            config.reconcile.limit,
        );
    }

    let state = AppState {
        lifecycle,
        gateway,
        inventory,
        reconciler,
        flights,
        provider,
        hold_minutes: config.booking.hold_minutes,
    };

    let app = app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
