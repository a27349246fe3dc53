use anyhow::Result;
use std::future::Future;
use std::time::Duration;
use tracing::{error, info};

/// Run `refresh` every `period` until `shutdown` resolves and return the number
/// of completed refreshes. The first refresh starts immediately. `shutdown` is
/// polled while a refresh is in flight, so an interrupt abandons it.
pub async fn run_refresh_loop<S, F, Fut>(period: Duration, shutdown: S, mut refresh: F) -> usize
where
    S: Future,
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut interval = tokio::time::interval(period);
    tokio::pin!(shutdown);
    let mut completed = 0;

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = &mut shutdown => {
                info!("Interrupted, stopping refresh loop");
                break;
            }
        }

        tokio::select! {
            result = refresh(completed) => {
                if let Err(e) = result {
                    error!("Refresh failed: {:#}", e);
                }
                completed += 1;
            }
            _ = &mut shutdown => {
                info!("Interrupted during refresh {}, stopping", completed + 1);
                break;
            }
        }
    }

    completed
}
