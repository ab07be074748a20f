use tracing::debug;

use crate::providers::SnapshotProvider;
use crate::types::{Snapshot, short_id};

/// Tries providers in priority order and returns the first snapshot produced.
///
/// Results are never merged across providers: a token appearing or vanishing
/// only because the answering source changed would show up as a fake trade.
pub struct Resolver {
    providers: Vec<Box<dyn SnapshotProvider>>,
}

impl Resolver {
    pub fn new(providers: Vec<Box<dyn SnapshotProvider>>) -> Self {
        Self { providers }
    }

    pub fn provider_names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Resolve a normalized snapshot for `address`, or `None` when every
    /// provider came up empty. Provider errors and timeouts are not surfaced.
    ///
    /// This path never touches stored state, so it is safe for on-demand lookups.
    pub async fn resolve(&self, address: &str) -> Option<Snapshot> {
        let short = short_id(address);

        for provider in &self.providers {
            let name = provider.name();
            match tokio::time::timeout(provider.timeout(), provider.try_fetch(address)).await {
                Ok(Ok(Some(snap))) => {
                    debug!("[{short}] snapshot from {name}");
                    return Some(snap.normalized());
                }
                Ok(Ok(None)) => debug!("[{short}] {name}: no data"),
                Ok(Err(e)) => debug!("[{short}] {name} failed: {e:#}"),
                Err(_) => debug!(
                    "[{short}] {name} timed out after {}s",
                    provider.timeout().as_secs()
                ),
            }
        }

        debug!("[{short}] no provider returned a snapshot");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use anyhow::{Result, bail};
    use async_trait::async_trait;

    enum Behaviour {
        Returns(f64),
        Empty,
        Fails,
        Hangs,
    }

    struct FakeProvider {
        name: &'static str,
        behaviour: Behaviour,
        calls: Arc<AtomicUsize>,
    }

    impl FakeProvider {
        fn boxed(name: &'static str, behaviour: Behaviour) -> (Box<dyn SnapshotProvider>, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let provider = Box::new(Self {
                name,
                behaviour,
                calls: calls.clone(),
            });
            (provider, calls)
        }
    }

    #[async_trait]
    impl SnapshotProvider for FakeProvider {
        fn name(&self) -> &'static str {
            self.name
        }

        fn timeout(&self) -> Duration {
            Duration::from_millis(50)
        }

        async fn try_fetch(&self, address: &str) -> Result<Option<Snapshot>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behaviour {
                Behaviour::Returns(total) => {
                    let mut snap = Snapshot::empty(address, self.name);
                    snap.add_token(self.name, total);
                    snap.usd_total = total;
                    Ok(Some(snap))
                }
                Behaviour::Empty => Ok(None),
                Behaviour::Fails => bail!("upstream exploded"),
                Behaviour::Hangs => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(None)
                }
            }
        }
    }

    #[tokio::test]
    async fn first_provider_wins_verbatim() {
        let (first, _) = FakeProvider::boxed("first", Behaviour::Returns(100.0));
        let (second, second_calls) = FakeProvider::boxed("second", Behaviour::Returns(999.0));
        let resolver = Resolver::new(vec![first, second]);

        let snap = resolver.resolve("0xabc").await.expect("resolved");
        assert_eq!(snap.source, "first");
        assert_eq!(snap.usd_total, 100.0);
        assert_eq!(snap.tokens.len(), 1);
        assert!(snap.tokens.contains_key("first"));
        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failures_and_empties_fall_through() {
        let (failing, _) = FakeProvider::boxed("failing", Behaviour::Fails);
        let (empty, _) = FakeProvider::boxed("empty", Behaviour::Empty);
        let (last, _) = FakeProvider::boxed("last", Behaviour::Returns(7.0));
        let resolver = Resolver::new(vec![failing, empty, last]);

        let snap = resolver.resolve("0xabc").await.expect("resolved");
        assert_eq!(snap.source, "last");
    }

    #[tokio::test]
    async fn timeout_falls_through() {
        let (slow, _) = FakeProvider::boxed("slow", Behaviour::Hangs);
        let (fast, _) = FakeProvider::boxed("fast", Behaviour::Returns(1.0));
        let resolver = Resolver::new(vec![slow, fast]);

        let snap = resolver.resolve("0xabc").await.expect("resolved");
        assert_eq!(snap.source, "fast");
    }

    #[tokio::test]
    async fn all_absent_is_none() {
        let (a, a_calls) = FakeProvider::boxed("a", Behaviour::Empty);
        let (b, b_calls) = FakeProvider::boxed("b", Behaviour::Fails);
        let resolver = Resolver::new(vec![a, b]);

        assert!(resolver.resolve("0xabc").await.is_none());
        assert_eq!(a_calls.load(Ordering::SeqCst), 1);
        assert_eq!(b_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn result_is_normalized() {
        let (neg, _) = FakeProvider::boxed("neg", Behaviour::Returns(-5.0));
        let resolver = Resolver::new(vec![neg]);

        let snap = resolver.resolve("0xABC").await.expect("resolved");
        assert_eq!(snap.address, "0xabc");
        assert_eq!(snap.usd_total, 0.0);
    }

    #[tokio::test]
    async fn names_in_priority_order() {
        let (a, _) = FakeProvider::boxed("a", Behaviour::Empty);
        let (b, _) = FakeProvider::boxed("b", Behaviour::Empty);
        assert_eq!(Resolver::new(vec![a, b]).provider_names(), vec!["a", "b"]);
    }
}
