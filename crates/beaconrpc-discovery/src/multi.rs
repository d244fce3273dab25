//! Statically managed discovery set.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::Mutex;

use beaconrpc_common::{Result, RpcError};

use crate::{Discovery, SelectMode};

/// Everything one `get` touches lives under one lock, so concurrent calls
/// each advance the cursor exactly once.
struct SelectState {
    servers: Vec<String>,
    index: usize,
    rng: StdRng,
}

/// Discovery over a hand-maintained address list; `refresh` is a no-op.
pub struct MultiServerDiscovery {
    state: Mutex<SelectState>,
}

impl MultiServerDiscovery {
    /// Creates the set with its own random source and a random round-robin
    /// offset, so independently constructed instances do not all start at
    /// the first server.
    pub fn new(servers: Vec<String>) -> Self {
        let mut rng = StdRng::from_entropy();
        let index = rng.gen::<u32>() as usize;
        Self {
            state: Mutex::new(SelectState {
                servers,
                index,
                rng,
            }),
        }
    }
}

#[async_trait]
impl Discovery for MultiServerDiscovery {
    async fn refresh(&self) -> Result<()> {
        // nothing upstream to refresh for a static set
        Ok(())
    }

    async fn update(&self, servers: Vec<String>) -> Result<()> {
        let mut state = self.state.lock().await;
        state.servers = servers;
        Ok(())
    }

    async fn get(&self, mode: SelectMode) -> Result<String> {
        let mut state = self.state.lock().await;
        let n = state.servers.len();
        if n == 0 {
            return Err(RpcError::NoAvailableServers);
        }
        match mode {
            SelectMode::Random => {
                let i = state.rng.gen_range(0..n);
                Ok(state.servers[i].clone())
            }
            SelectMode::RoundRobin => {
                // modulo against the current length: the list may have
                // been replaced since the cursor was last advanced
                let server = state.servers[state.index % n].clone();
                state.index = (state.index + 1) % n;
                Ok(server)
            }
        }
    }

    async fn get_all(&self) -> Result<Vec<String>> {
        let state = self.state.lock().await;
        if state.servers.is_empty() {
            return Err(RpcError::NoAvailableServers);
        }
        Ok(state.servers.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::task::JoinSet;

    fn three() -> MultiServerDiscovery {
        MultiServerDiscovery::new(vec![
            "a".to_string(),
            "b".to_string(),
            "c".to_string(),
        ])
    }

    #[tokio::test]
    async fn test_round_robin_visits_each_once_per_cycle() {
        let discovery = three();
        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(discovery.get(SelectMode::RoundRobin).await.unwrap());
        }
        seen.sort();
        assert_eq!(seen, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_round_robin_rotates_in_order() {
        let discovery = three();
        let first = discovery.get(SelectMode::RoundRobin).await.unwrap();
        let second = discovery.get(SelectMode::RoundRobin).await.unwrap();
        let all = discovery.get_all().await.unwrap();

        let i = all.iter().position(|s| *s == first).unwrap();
        assert_eq!(all[(i + 1) % all.len()], second);
    }

    #[tokio::test]
    async fn test_concurrent_gets_advance_cursor_exactly_once_each() {
        let discovery = Arc::new(three());
        let mut tasks = JoinSet::new();
        for _ in 0..30 {
            let discovery = Arc::clone(&discovery);
            tasks.spawn(async move { discovery.get(SelectMode::RoundRobin).await.unwrap() });
        }

        let mut counts: HashMap<String, usize> = HashMap::new();
        while let Some(result) = tasks.join_next().await {
            *counts.entry(result.unwrap()).or_default() += 1;
        }
        assert_eq!(counts.len(), 3);
        for (_, count) in counts {
            assert_eq!(count, 10);
        }
    }

    #[tokio::test]
    async fn test_random_draws_from_the_set() {
        let discovery = three();
        let all = discovery.get_all().await.unwrap();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..100 {
            let addr = discovery.get(SelectMode::Random).await.unwrap();
            assert!(all.contains(&addr));
            seen.insert(addr);
        }
        // 100 uniform draws over 3 servers miss one with probability ~1e-17
        assert_eq!(seen.len(), 3);
    }

    #[tokio::test]
    async fn test_empty_set_fails_both_policies() {
        let discovery = MultiServerDiscovery::new(Vec::new());
        assert!(matches!(
            discovery.get(SelectMode::Random).await.unwrap_err(),
            RpcError::NoAvailableServers
        ));
        assert!(matches!(
            discovery.get(SelectMode::RoundRobin).await.unwrap_err(),
            RpcError::NoAvailableServers
        ));
        assert!(matches!(
            discovery.get_all().await.unwrap_err(),
            RpcError::NoAvailableServers
        ));
    }

    #[tokio::test]
    async fn test_update_replaces_wholesale() {
        let discovery = MultiServerDiscovery::new(Vec::new());
        discovery
            .update(vec!["x".to_string(), "y".to_string()])
            .await
            .unwrap();
        let addr = discovery.get(SelectMode::RoundRobin).await.unwrap();
        assert!(addr == "x" || addr == "y");
        assert_eq!(discovery.get_all().await.unwrap(), vec!["x", "y"]);
    }
}
