use std::{sync::Arc, time::Duration};

use futures::future::join_all;
use log::{debug, error, info};
use rand::{rngs::SmallRng, SeedableRng};
use tokio::task::JoinHandle;

use crate::session::{connect_and_run, Connector, SessionContext, SessionReport};

pub struct Supervisor<C> {
    connector: Arc<C>,
    ctx: Arc<SessionContext>,
    clients: usize,
}

impl<C> Supervisor<C>
where
    C: Connector + 'static,
{
    pub fn new(connector: C, ctx: SessionContext, clients: usize) -> Self {
        Self {
            connector: Arc::new(connector),
            ctx: Arc::new(ctx),
            clients,
        }
    }

    /// Starts every session at once, then waits for `duration` (or Ctrl-C when `None`).
    /// Sessions still running at that point are aborted.
    pub async fn run(self, duration: Option<Duration>) -> Vec<SessionReport> {
        info!(
            "Starting {} sessions (busy factor {}, {:?} pacing)",
            self.clients,
            self.ctx.tunables.busy_factor(),
            self.ctx.pacing
        );

        let handles = self.spawn_all();

        match duration {
            Some(duration) => tokio::time::sleep(duration).await,
            None => {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!("Failed to listen for Ctrl-C, running until killed: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        }

        Self::stop(handles).await
    }

    fn spawn_all(&self) -> Vec<JoinHandle<SessionReport>> {
        (0..self.clients)
            .map(|_| {
                let connector = Arc::clone(&self.connector);
                let ctx = Arc::clone(&self.ctx);

                tokio::spawn(async move {
                    let report =
                        connect_and_run(connector.as_ref(), ctx, SmallRng::from_os_rng()).await;
                    debug!("{}", report);
                    report
                })
            })
            .collect()
    }

    /// Aborts what is still running and collects the reports of sessions that already ended.
    async fn stop(handles: Vec<JoinHandle<SessionReport>>) -> Vec<SessionReport> {
        let running = handles.iter().filter(|h| !h.is_finished()).count();
        info!(
            "Run over, stopping {} of {} sessions",
            running,
            handles.len()
        );

        for handle in &handles {
            handle.abort();
        }

        join_all(handles)
            .await
            .into_iter()
            .filter_map(Result::ok)
            .collect()
    }
}
