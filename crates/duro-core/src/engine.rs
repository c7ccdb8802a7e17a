//! Top-level loop (spec §4.J): polls the schedule store, dispatches stale
//! roots through the tree walker, and resets stuck state on startup.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::traits::{Notifier, NotifyClass, ProcessorRunner, ScheduleStore, WarehouseConn};
use crate::tree::TreeWalker;

/// Interval between polls of the schedule store (spec §4.J).
const POLL_INTERVAL_S: u64 = 30;

pub struct Engine<S, W, P, N> {
    store: Arc<S>,
    walker: TreeWalker<S, W, P, N>,
    notifier: Arc<N>,
    graph: Arc<crate::graph::Graph>,
}

impl<S, W, P, N> Engine<S, W, P, N>
where
    S: ScheduleStore + 'static,
    W: WarehouseConn + 'static,
    P: ProcessorRunner + 'static,
    N: Notifier + 'static,
{
    pub fn new(
        store: Arc<S>,
        warehouse: Arc<W>,
        processor: Option<Arc<P>>,
        notifier: Arc<N>,
        graph: Arc<crate::graph::Graph>,
        test_queries: Arc<BTreeMap<String, Vec<String>>>,
        load_ddl: Arc<BTreeMap<String, String>>,
    ) -> Self {
        let walker = TreeWalker::new(
            store.clone(),
            warehouse,
            processor,
            notifier.clone(),
            test_queries,
            load_ddl,
        );
        Self {
            store,
            walker,
            notifier,
            graph,
        }
    }

    /// Runs forever. On boot, clears every `started_ts` left behind by a
    /// prior crashed process (spec §4.J: "any started is from a prior
    /// crashed run").
    pub async fn serve(&self) -> ! {
        if let Err(err) = self.store.reset_all_starts().await {
            tracing::error!(error = %err, "reset_all_starts: failed");
            self.notify_generic(&err.to_string()).await;
        }

        loop {
            self.poll_once().await;
            tokio::time::sleep(Duration::from_secs(POLL_INTERVAL_S)).await;
        }
    }

    /// One poll iteration, exposed separately so tests and
    /// `create_single_table`-style tooling can drive it directly.
    pub async fn poll_once(&self) {
        let stale = match self.store.tables_to_create().await {
            Ok(tables) => tables,
            Err(err) => {
                tracing::error!(error = %err, "tables_to_create: failed");
                self.notify_generic(&err.to_string()).await;
                return;
            }
        };

        for table in stale {
            self.walker
                .create_tree(&self.graph, &table.name, table.interval_mins, 1)
                .await;
        }
    }

    /// `create_single_table` (spec §6): runs §4.I.2 once for one table,
    /// bypassing the tree walk entirely.
    pub async fn create_single_table(&self, name: &str) {
        self.walker.create_single(name).await;
    }

    async fn notify_generic(&self, message: &str) {
        if let Err(err) = self
            .notifier
            .notify("duro engine", message, NotifyClass::Failure)
            .await
        {
            tracing::error!(error = %err, "notifier: failed to deliver engine error");
        }
    }
}
