use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::types::{MarketInfo, MarketSnapshot, Result};

/// A protocol whose markets can be read in one cycle.
#[async_trait]
pub trait RateSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch_markets(&self) -> Result<Vec<MarketInfo>>;
}

/// Periodically refreshes one `RateSource` and publishes each result as a new snapshot.
///
/// The first cycle runs immediately. A failed cycle keeps whatever was published before;
/// the next tick simply tries again. Dropping the poller cancels its task.
pub struct Poller {
    name: &'static str,
    rx: watch::Receiver<MarketSnapshot>,
    handle: JoinHandle<()>,
}

impl Poller {
    pub fn spawn<S>(source: S, period: Duration) -> Self
    where
        S: RateSource + 'static,
    {
        let name = source.name();
        let (tx, rx) = watch::channel(None);

        log::info!("[Poller::spawn] {} polling every {:?}", name, period);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                match source.fetch_markets().await {
                    Ok(markets) => {
                        log::debug!("[Poller::run] {} published {} markets", name, markets.len());
                        tx.send_replace(Some(Arc::new(markets)));
                    }
                    Err(e) => {
                        log::warn!("[Poller::run] {} refresh failed: {}", name, e);
                    }
                }
            }
        });

        Self { name, rx, handle }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn subscribe(&self) -> watch::Receiver<MarketSnapshot> {
        self.rx.clone()
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        log::debug!("[Poller::drop] Stopping {}", self.name);
        self.handle.abort();
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use crate::types::Error;

    /// Replays scripted results, then repeats the last one.
    pub struct ScriptedSource {
        pub calls: Arc<AtomicUsize>,
        script: Mutex<Vec<Result<Vec<MarketInfo>>>>,
    }

    impl ScriptedSource {
        pub fn new(script: Vec<Result<Vec<MarketInfo>>>) -> Self {
            Self {
                calls: Arc::new(AtomicUsize::new(0)),
                script: Mutex::new(script),
            }
        }
    }

    #[async_trait]
    impl RateSource for ScriptedSource {
        fn name(&self) -> &'static str {
            "Scripted"
        }

        async fn fetch_markets(&self) -> Result<Vec<MarketInfo>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.remove(0)
            } else {
                match script.first() {
                    Some(Ok(markets)) => Ok(markets.clone()),
                    _ => Err(Error::Decode("scripted failure".into())),
                }
            }
        }
    }
}
