use futures::StreamExt;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use moya_driver::config::{Config, LogFormat};
use moya_driver::engine::launch::{Route, initial_route};
use moya_driver::error::AppError;
use moya_driver::models::session::DriverProfile;
use moya_driver::state::AppContext;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    let filter = EnvFilter::new(config.log_level.clone());
    match config.log_format {
        LogFormat::Compact => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init(),
    }

    let ctx = AppContext::new(config)?;

    let mut route = initial_route(&ctx.session).await?;
    if route == Route::Login {
        route = login(&ctx).await?;
    }

    match route {
        Route::DriverHome => run_driver_home(&ctx).await,
        Route::CustomerHome => {
            info!(path = route.path(), "customer home has no features yet");
            Ok(())
        }
        Route::Login => Err(AppError::Internal("still unauthenticated after login".into())),
    }
}

async fn login(ctx: &AppContext) -> Result<Route, AppError> {
    let (Some(username), Some(password)) = (&ctx.config.username, &ctx.config.password) else {
        error!("no saved session and MOYA_USERNAME/MOYA_PASSWORD are not set");
        return Err(AppError::Config("login credentials are required".into()));
    };

    match ctx.api.login(username, password).await {
        Ok(session) => Ok(Route::for_role(session.role)),
        Err(err) => {
            error!(error = %err, "{}", err.user_message());
            Err(err)
        }
    }
}

async fn run_driver_home(ctx: &AppContext) -> Result<(), AppError> {
    if let Some(session) = ctx.session.get_all() {
        let profile = DriverProfile::from_session(&session);
        info!(driver_id = %profile.driver_id, name = %profile.display_name, "driver home");
    }

    let poller = ctx.order_poller().start();
    let mut updates = WatchStream::new(poller.subscribe());
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            board = updates.next() => {
                let Some(board) = board else { break };
                if board.loading {
                    continue;
                }
                if let Some(message) = &board.last_error {
                    warn!(generation = board.generation, "{message}");
                    continue;
                }
                if board.orders.is_empty() {
                    info!("no orders today");
                }
                for order in &board.orders {
                    let customer = order.customer_or_default();
                    info!(
                        order_id = %order.id,
                        badge = order.bucket().label(),
                        customer = customer.display_name(),
                        phone = customer.display_phone(),
                        address = customer.display_address(),
                        packs = order.quantity_packs,
                        "assigned order"
                    );
                }
            }
            signal = &mut shutdown => {
                if let Err(err) = signal {
                    error!(error = %err, "failed to listen for shutdown signal");
                }
                break;
            }
        }
    }

    poller.shutdown().await;

    match ctx.metrics.encode() {
        Ok(text) => debug!("metrics\n{text}"),
        Err(err) => warn!(error = %err, "failed to encode metrics"),
    }
    Ok(())
}
