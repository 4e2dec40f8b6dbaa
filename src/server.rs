use std::net::SocketAddr;
use std::sync::Arc;

use poem::http::StatusCode;
use poem::listener::TcpListener;
use poem::web::{Data, Json};
use poem::{EndpointExt, Route, Server, handler};
use tracing::{info, warn};

use crate::runner::{self, AppContext, RunReport, RunStatus};

/// Handles a trigger request by running the rotation workflow for all
/// configured profiles once.
#[handler]
async fn trigger(Data(ctx): Data<&Arc<AppContext>>) -> (StatusCode, Json<RunReport>) {
    let report = runner::run_all_profiles(ctx).await;
    (response_status(&report), Json(report))
}

fn response_status(report: &RunReport) -> StatusCode {
    match report.status() {
        RunStatus::Success => StatusCode::OK,
        RunStatus::PartialFailure => StatusCode::MULTI_STATUS,
        RunStatus::Failure => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Serves the trigger endpoint until the process receives ctrl-c.
///
/// # Errors
/// Returns error if the listener cannot be bound.
pub async fn serve(ctx: Arc<AppContext>) -> anyhow::Result<()> {
    let app = Route::new().at("/", poem::get(trigger)).data(Arc::clone(&ctx));

    let addr = SocketAddr::from(([0, 0, 0, 0], ctx.settings.listen_port));
    info!("Starting rotation trigger endpoint on {addr}");

    let mut server = tokio::spawn(Server::new(TcpListener::bind(addr)).run(app));
    tokio::select! {
        result = &mut server => {
            result??;
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("Shutdown signal received");
        }
    }
    Ok(())
}
