use anyhow::Context;
use anyhow::Result;
use diesel::r2d2;
use diesel::r2d2::ConnectionManager;
use diesel::PgConnection;
use payroll_commons::WalletProvider;
use payroll_engine::cli::Opts;
use payroll_engine::closure::ClosureValidator;
use payroll_engine::gateway::local::LocalPayloadStore;
use payroll_engine::gateway::xaman::XamanGateway;
use payroll_engine::gateway::SigningGateway;
use payroll_engine::lifecycle::Lifecycle;
use payroll_engine::logger;
use payroll_engine::notification_service::NotificationService;
use payroll_engine::reconciler::Reconciler;
use payroll_engine::resolver::ChannelIdResolver;
use payroll_engine::routes::router;
use payroll_engine::routes::AppState;
use payroll_engine::run_migration;
use payroll_engine::scheduler::ReconcileScheduler;
use payroll_engine::settings::Settings;
use payroll_engine::tracker::Tracker;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::metadata::LevelFilter;
use xahau_client::LedgerApi;
use xahau_client::XahauClient;

#[tokio::main]
async fn main() -> Result<()> {
    let opts = Opts::read();
    let network = opts.network;
    let http_address = opts.http_address;

    logger::init_tracing(LevelFilter::DEBUG, opts.json)?;

    let data_dir = opts.data_dir()?;
    if !data_dir.exists() {
        std::fs::create_dir_all(&data_dir)
            .context(format!("Could not create data dir for {network}"))?;
    }

    let settings = Settings::new(&data_dir, network).await;

    // set up database connection pool
    let manager = ConnectionManager::<PgConnection>::new(opts.database.clone());
    let pool = r2d2::Pool::builder()
        .build(manager)
        .expect("Failed to create pool.");

    let mut conn = pool.get()?;
    run_migration(&mut conn);

    // The node connection is process-wide and initialized exactly once,
    // after the configuration has been parsed.
    let ledger_url = opts.ledger_ws_url()?;
    let ledger: Arc<dyn LedgerApi> = Arc::new(XahauClient::connect(ledger_url));

    let local_wallet = Arc::new(LocalPayloadStore::new());
    let default_provider = if opts.wallet_api_key.is_empty() {
        WalletProvider::ManualSeed
    } else {
        WalletProvider::MobileQr
    };
    let mut gateway = SigningGateway::new(
        network.to_network_tag(),
        settings.signing_gateway_deadline(),
        default_provider,
    );
    gateway.register(WalletProvider::ManualSeed, local_wallet.clone());
    gateway.register(WalletProvider::BrowserExtension, local_wallet.clone());
    if opts.wallet_api_key.is_empty() {
        tracing::warn!("No wallet service API key set, QR signing is disabled");
    } else {
        gateway.register(
            WalletProvider::MobileQr,
            Arc::new(XamanGateway::new(
                opts.wallet_service_url()?,
                opts.wallet_api_key.clone(),
                opts.wallet_api_secret.clone(),
            )),
        );
    }
    let gateway = Arc::new(gateway);

    let notification_service = NotificationService::new(pool.clone());

    let resolver = ChannelIdResolver::new(ledger.clone(), settings.resolver_retry_schedule());
    let validator = ClosureValidator::new(ledger.clone());
    let lifecycle = Arc::new(Lifecycle::new(
        pool.clone(),
        ledger.clone(),
        gateway.clone(),
        resolver,
        validator,
        notification_service.get_sender(),
        settings.channel_default_settle_delay_seconds,
        settings.channel_default_cancel_after_seconds,
    ));
    let tracker = Arc::new(Tracker::new(
        pool.clone(),
        settings.max_daily_hours_per_channel,
    ));
    let reconciler = Arc::new(Reconciler::new(
        pool.clone(),
        ledger.clone(),
        notification_service.get_sender(),
        settings.reconcile_min_interval(),
        settings.sync_all_concurrency,
    ));

    let scheduler = ReconcileScheduler::new(reconciler.clone()).await;
    scheduler
        .add_organization_sync_job(&settings.organization_sync_scheduler)
        .await?;
    scheduler.start().await?;

    let app_state = Arc::new(AppState {
        pool,
        lifecycle,
        tracker,
        reconciler,
        ledger,
        local_wallet,
    });
    let app = router(app_state);

    let addr = SocketAddr::from((http_address.ip(), http_address.port()));
    tracing::debug!("listening on http://{}", addr);
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}
