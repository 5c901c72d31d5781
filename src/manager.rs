// Copyright (c) 2026 Bilinear Labs
// SPDX-License-Identifier: MIT

//! Module with the per-network manager of categorization workers.
//!
//! The manager keeps two worker populations: the current workers, fed from
//! the live block queue, and the catch-up groups of outdated workers, each
//! advanced by its own driver. New workers arrive over the registration
//! endpoint and are routed to one side or the other relative to the live
//! edge.

use crate::{
    CancellationToken, RxRegistration, TxCategorized,
    block_queue::BlockQueue,
    catchup_driver::CatchUpDriver,
    contract::{ContractSource, Smartcontract, TrackRequest},
    decoder::EventDecoder,
    group::{GroupId, OldGroupList, OldWorkerGroup},
    live_driver::LiveDriver,
    rpc::LogClient,
    subscriber::Subscriber,
    worker::{Worker, Workers},
};
use crate::{block::LiveBlock, constants, metrics::MetricsHandle};
use alloy::primitives::Address;
use anyhow::{Result, anyhow};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::{
    sync::broadcast,
    time::{Duration, sleep},
};
use tracing::{info, warn};

/// Mutable state shared by the manager tasks, always behind the state lock.
#[derive(Default)]
pub struct ManagerState {
    /// First block number observed from the live subscription. Zero means
    /// "not seen yet"; once set it never changes.
    pub live_edge: u64,
    pub current_workers: Workers,
    pub old_groups: OldGroupList,
    pub block_queue: BlockQueue<LiveBlock>,
    next_group_id: GroupId,
}

impl ManagerState {
    /// Deduplicated union of every tracked address, groups first.
    pub fn all_addresses(&self) -> Vec<Address> {
        let mut addresses: Vec<Address> = Vec::new();
        for group in self.old_groups.iter() {
            for address in group.workers.addresses() {
                if !addresses.contains(&address) {
                    addresses.push(address);
                }
            }
        }
        for address in self.current_workers.addresses() {
            if !addresses.contains(&address) {
                addresses.push(address);
            }
        }
        addresses
    }

    /// Every tracked contract descriptor, from all worker populations.
    pub fn smartcontracts(&self) -> Vec<Smartcontract> {
        let mut smartcontracts = Vec::new();
        for group in self.old_groups.iter() {
            smartcontracts.extend(group.workers.smartcontracts());
        }
        smartcontracts.extend(self.current_workers.smartcontracts());
        smartcontracts
    }

    pub fn is_tracked(&self, address: Address) -> bool {
        self.current_workers.contains_address(address)
            || self
                .old_groups
                .iter()
                .any(|group| group.workers.contains_address(address))
    }

    fn allocate_group_id(&mut self) -> GroupId {
        self.next_group_id += 1;
        self.next_group_id
    }
}

/// Handle to one manager's state, shared by its tasks.
pub struct ManagerShared {
    pub network_id: String,
    pub metrics: MetricsHandle,
    state: Mutex<ManagerState>,
}

impl ManagerShared {
    pub fn new(network_id: String, metrics: MetricsHandle) -> Self {
        Self {
            network_id,
            metrics,
            state: Mutex::new(ManagerState::default()),
        }
    }

    pub fn lock(&self) -> Result<MutexGuard<'_, ManagerState>> {
        self.state
            .lock()
            .map_err(|_| anyhow!("manager state lock poisoned"))
    }
}

impl ContractSource for ManagerShared {
    fn smartcontracts(&self) -> Vec<Smartcontract> {
        self.lock()
            .map(|state| state.smartcontracts())
            .unwrap_or_default()
    }
}

/// Categorization manager for one blockchain network.
pub struct Manager {
    shared: Arc<ManagerShared>,
    broadcasts: broadcast::Receiver<String>,
    registrations: RxRegistration,
    client: Arc<dyn LogClient>,
    sink: TxCategorized,
    cancellation_token: CancellationToken,
}

impl Manager {
    pub fn new(
        network_id: String,
        broadcasts: broadcast::Receiver<String>,
        registrations: RxRegistration,
        client: Arc<dyn LogClient>,
        sink: TxCategorized,
        metrics: MetricsHandle,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            shared: Arc::new(ManagerShared::new(network_id, metrics)),
            broadcasts,
            registrations,
            client,
            sink,
            cancellation_token,
        }
    }

    /// Handle to the shared state, for introspection.
    pub fn shared(&self) -> Arc<ManagerShared> {
        self.shared.clone()
    }

    /// Runs the manager until cancellation or endpoint closure.
    ///
    /// # Description
    ///
    /// Startup order is observable and load-bearing: the subscriber starts
    /// first, the manager blocks until the live edge is known, only then the
    /// live driver and the registration loop start. A registration request
    /// arriving earlier waits in the endpoint channel instead of being
    /// classified against a zero live edge.
    pub async fn run(self) -> Result<()> {
        let Manager {
            shared,
            broadcasts,
            mut registrations,
            client,
            sink,
            cancellation_token,
        } = self;

        info!(network_id = %shared.network_id, "starting categorization");
        tokio::spawn(Subscriber::new(shared.clone(), broadcasts, cancellation_token.clone()).run());

        // Wait until we receive the first block number.
        loop {
            if cancellation_token.is_cancelled() {
                return Ok(());
            }
            if shared.lock()?.live_edge > 0 {
                break;
            }
            sleep(Duration::from_secs(constants::LIVE_EDGE_POLL_INTERVAL)).await;
        }

        info!(network_id = %shared.network_id, "subscription started");
        tokio::spawn(LiveDriver::new(shared.clone(), sink.clone(), cancellation_token.clone()).run());

        info!(network_id = %shared.network_id, "waiting for registration requests");
        let mut cancellation_receiver = cancellation_token.subscribe();
        loop {
            let request = tokio::select! {
                _ = cancellation_receiver.recv() => return Ok(()),
                request = registrations.recv() => request,
            };

            match request {
                Some(request) => {
                    register(&shared, &client, &sink, &cancellation_token, request)?;
                }
                None => {
                    info!(network_id = %shared.network_id, "registration endpoint closed");
                    return Ok(());
                }
            }
        }
    }
}

/// Applies one registration request to the manager state.
///
/// The whole request is handled under a single state lock so the live edge
/// snapshot, the duplicate checks and the group routing are consistent with
/// concurrent promotions.
fn register(
    shared: &Arc<ManagerShared>,
    client: &Arc<dyn LogClient>,
    sink: &TxCategorized,
    cancellation_token: &CancellationToken,
    request: TrackRequest,
) -> Result<()> {
    let TrackRequest {
        smartcontracts,
        abis,
    } = request;

    if smartcontracts.len() != abis.len() {
        warn!(
            smartcontracts_amount = smartcontracts.len(),
            abis_amount = abis.len(),
            "registration request is misaligned, unpaired entries are ignored"
        );
    }

    let mut state = shared.lock()?;

    let mut accepted: Vec<Worker> = Vec::new();
    for (smartcontract, abi) in smartcontracts.into_iter().zip(abis) {
        if smartcontract.network_id != shared.network_id {
            warn!(
                network_id = %smartcontract.network_id,
                address = %smartcontract.address,
                "skipping a contract registered for another network"
            );
            continue;
        }
        if state.is_tracked(smartcontract.address)
            || accepted
                .iter()
                .any(|worker| worker.address() == smartcontract.address)
        {
            warn!(
                address = %smartcontract.address,
                "skipping a contract that is already tracked"
            );
            continue;
        }
        let decoder = match EventDecoder::from_json(&abi) {
            Ok(decoder) => decoder,
            Err(e) => {
                warn!(
                    address = %smartcontract.address,
                    "skipping a contract with an unusable ABI: {e:#}"
                );
                continue;
            }
        };

        info!(
            address = %smartcontract.address,
            number = accepted.len() + 1,
            "add a new worker"
        );
        accepted.push(Worker::new(smartcontract, decoder));
    }

    if accepted.is_empty() {
        return Ok(());
    }

    let live_edge = state.live_edge;
    let (behind, ahead) = Workers::from(accepted).sort().split(live_edge);
    info!(
        live_edge,
        old_amount = behind.len(),
        current_amount = ahead.len(),
        "splitting to old and new workers"
    );

    state.current_workers.append(ahead);

    if !behind.is_empty() {
        let Some(earliest) = behind.earliest_block_number() else {
            return Ok(());
        };

        let compatible = state
            .old_groups
            .first_group_at_least(earliest)
            .map(|group| group.id());
        if let Some(group_id) = compatible {
            info!(group_id, "add to the existing group");
            if let Some(group) = state.old_groups.get_mut(group_id) {
                group.add_workers(behind);
            }
        } else {
            let group_id = state.allocate_group_id();
            info!(
                group_id,
                earliest_block_number = earliest,
                "create a new group of old workers"
            );
            state
                .old_groups
                .push(OldWorkerGroup::new(group_id, earliest, behind));
            drop(state);

            CatchUpDriver::new(
                shared.clone(),
                group_id,
                client.clone(),
                sink.clone(),
                cancellation_token.clone(),
            )
            .spawn();
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        RxCategorized, TxRegistration,
        block::RawLog,
        test_utils::{erc20_abi_json, fake_address, live_block, transfer_log, truncated_transfer_log},
    };
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;
    use tokio::{
        sync::{Notify, mpsc},
        time::timeout,
    };

    /// Range-log client that serves scripted responses and blocks when the
    /// script runs dry, so catch-up iterations are stepped by the test.
    struct ScriptedLogClient {
        responses: StdMutex<VecDeque<Vec<RawLog>>>,
        calls: StdMutex<Vec<(u64, Vec<Address>)>>,
        notify: Notify,
    }

    impl ScriptedLogClient {
        fn new(responses: Vec<Vec<RawLog>>) -> Arc<Self> {
            Arc::new(Self {
                responses: StdMutex::new(responses.into()),
                calls: StdMutex::new(Vec::new()),
                notify: Notify::new(),
            })
        }

        fn push_response(&self, logs: Vec<RawLog>) {
            self.responses.lock().expect("responses lock").push_back(logs);
            self.notify.notify_waiters();
        }

        fn calls(&self) -> Vec<(u64, Vec<Address>)> {
            self.calls.lock().expect("calls lock").clone()
        }
    }

    #[async_trait]
    impl LogClient for ScriptedLogClient {
        async fn logs_from(&self, from_block: u64, addresses: &[Address]) -> Result<Vec<RawLog>> {
            loop {
                let notified = self.notify.notified();
                let next = self.responses.lock().expect("responses lock").pop_front();
                if let Some(logs) = next {
                    self.calls
                        .lock()
                        .expect("calls lock")
                        .push((from_block, addresses.to_vec()));
                    return Ok(logs);
                }
                notified.await;
            }
        }
    }

    struct Harness {
        broadcast_tx: broadcast::Sender<String>,
        registration_tx: TxRegistration,
        push_rx: RxCategorized,
        shared: Arc<ManagerShared>,
        cancellation_token: CancellationToken,
    }

    fn start_manager(client: Arc<ScriptedLogClient>) -> Harness {
        let (broadcast_tx, broadcast_rx) = broadcast::channel(64);
        let (registration_tx, registration_rx) = mpsc::channel(16);
        let (push_tx, push_rx) = mpsc::channel(100);
        let cancellation_token = CancellationToken::default();

        let manager = Manager::new(
            "1".to_string(),
            broadcast_rx,
            registration_rx,
            client as Arc<dyn LogClient>,
            push_tx,
            MetricsHandle::default(),
            cancellation_token.clone(),
        );
        let shared = manager.shared();
        tokio::spawn(manager.run());

        Harness {
            broadcast_tx,
            registration_tx,
            push_rx,
            shared,
            cancellation_token,
        }
    }

    fn contract(address: Address, block_number: u64) -> Smartcontract {
        Smartcontract {
            network_id: "1".to_string(),
            address,
            categorized_block_number: block_number,
            categorized_block_timestamp: 0,
        }
    }

    impl Harness {
        fn broadcast(&self, block: &LiveBlock) {
            let raw = serde_json::to_string(block).expect("a live block serializes");
            self.broadcast_tx.send(raw).expect("the subscriber is alive");
        }

        async fn register(&self, smartcontracts: Vec<Smartcontract>) {
            let abis = smartcontracts.iter().map(|_| erc20_abi_json()).collect();
            self.registration_tx
                .send(TrackRequest {
                    smartcontracts,
                    abis,
                })
                .await
                .expect("the registration endpoint is alive");
        }

        async fn next_push(&mut self) -> crate::contract::CategorizedPush {
            timeout(Duration::from_secs(120), self.push_rx.recv())
                .await
                .expect("timed out waiting for a downstream push")
                .expect("the push channel is open")
        }

        async fn wait_until(&self, what: &str, check: impl Fn(&ManagerState) -> bool) {
            let outcome = timeout(Duration::from_secs(120), async {
                loop {
                    if check(&self.shared.lock().expect("state lock")) {
                        return;
                    }
                    sleep(Duration::from_millis(50)).await;
                }
            })
            .await;
            outcome.unwrap_or_else(|_| panic!("timed out waiting until {what}"));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn a_live_worker_categorizes_subscribed_blocks_in_order() {
        let mut harness = start_manager(ScriptedLogClient::new(vec![]));
        let address = fake_address();

        harness.broadcast(&live_block("1", 1000, vec![]));
        harness
            .wait_until("the live edge is set", |state| state.live_edge == 1000)
            .await;

        // Recorded block == live edge: the worker is current, not old.
        harness.register(vec![contract(address, 1000)]).await;
        harness
            .wait_until("the worker is current", |state| {
                state.current_workers.len() == 1 && state.old_groups.is_empty()
            })
            .await;

        harness.broadcast(&live_block("1", 1001, vec![transfer_log(address, 1001, 7)]));
        harness.broadcast(&live_block("1", 1002, vec![transfer_log(address, 1002, 8)]));

        let first = harness.next_push().await;
        assert_eq!(first.smartcontracts[0].address, address);
        assert_eq!(first.logs.len(), 1);
        assert_eq!(first.logs[0].block_number, 1001);

        let second = harness.next_push().await;
        assert_eq!(second.logs.len(), 1);
        assert_eq!(second.logs[0].block_number, 1002);

        harness
            .wait_until("the worker watermark reaches 1002", |state| {
                state
                    .current_workers
                    .iter()
                    .all(|worker| worker.categorized_block_number() == 1002)
            })
            .await;

        harness.cancellation_token.graceful_shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn a_deep_worker_catches_up_and_joins_the_live_set() {
        let address = fake_address();
        let client = ScriptedLogClient::new(vec![
            vec![transfer_log(address, 200, 1)],
            vec![transfer_log(address, 2500, 2)],
            vec![transfer_log(address, 4999, 3)],
            vec![transfer_log(address, 5000, 4)],
        ]);
        let mut harness = start_manager(client.clone());

        harness.broadcast(&live_block("1", 5000, vec![]));
        harness
            .wait_until("the live edge is set", |state| state.live_edge == 5000)
            .await;

        harness.register(vec![contract(address, 100)]).await;

        for expected_block in [200, 2500, 4999, 5000] {
            let push = harness.next_push().await;
            assert_eq!(push.logs.len(), 1);
            assert_eq!(push.logs[0].block_number, expected_block);
        }

        // The group crossed the live edge: its worker joins the current set
        // exactly once and the group disappears.
        harness
            .wait_until("the worker is promoted", |state| {
                state.old_groups.is_empty() && state.current_workers.len() == 1
            })
            .await;

        let calls = client.calls();
        assert_eq!(calls[0].0, 101, "the first range query starts after the recorded block");

        // Once promoted, the worker categorizes live blocks.
        harness.broadcast(&live_block("1", 5001, vec![transfer_log(address, 5001, 5)]));
        let push = harness.next_push().await;
        assert_eq!(push.logs[0].block_number, 5001);

        harness.cancellation_token.graceful_shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn late_registrations_join_a_compatible_group() {
        let address_a = Address::repeat_byte(0x0a);
        let address_b = Address::repeat_byte(0x0b);
        let address_c = Address::repeat_byte(0x0c);

        let client = ScriptedLogClient::new(vec![vec![
            transfer_log(address_a, 450, 1),
            transfer_log(address_b, 500, 2),
        ]]);
        let mut harness = start_manager(client.clone());

        harness.broadcast(&live_block("1", 10_000, vec![]));
        harness
            .wait_until("the live edge is set", |state| state.live_edge == 10_000)
            .await;

        harness
            .register(vec![contract(address_a, 100), contract(address_b, 120)])
            .await;

        // Workers are processed in sorted order: A (100) before B (120).
        let push = harness.next_push().await;
        assert_eq!(push.smartcontracts[0].address, address_a);
        assert_eq!(push.logs[0].block_number, 450);
        let push = harness.next_push().await;
        assert_eq!(push.smartcontracts[0].address, address_b);
        assert_eq!(push.logs[0].block_number, 500);

        harness
            .wait_until("the group cursor reaches 500", |state| {
                state.old_groups.iter().any(|group| group.block_number == 500)
            })
            .await;

        // C's earliest (400) is below the group cursor (500): it joins the
        // existing group instead of spawning a new one.
        harness.register(vec![contract(address_c, 400)]).await;
        harness
            .wait_until("C joins the group", |state| {
                state.old_groups.len() == 1
                    && state.old_groups.iter().all(|group| group.workers.len() == 3)
            })
            .await;

        // The next pass serves C's logs through the shared range query.
        client.push_response(vec![transfer_log(address_c, 600, 3)]);
        let push = harness.next_push().await;
        assert_eq!(push.smartcontracts[0].address, address_c);
        assert_eq!(push.logs[0].block_number, 600);

        // One more pass that crosses the live edge promotes all three.
        client.push_response(vec![transfer_log(address_a, 10_000, 4)]);
        harness.next_push().await;
        harness
            .wait_until("the whole group is promoted", |state| {
                state.old_groups.is_empty() && state.current_workers.len() == 3
            })
            .await;

        // Range queries issued after C joined union its address in.
        let calls = client.calls();
        assert!(
            calls.iter().any(|(_, addresses)| addresses.contains(&address_c)),
            "range queries include the late worker's address"
        );

        harness.cancellation_token.graceful_shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn overflowed_blocks_are_never_emitted() {
        let address = fake_address();
        let client = ScriptedLogClient::new(vec![]);
        let mut harness = start_manager(client.clone());

        // Nobody consumes the queue yet: 15 blocks arrive, 10 fit.
        for number in 100..115 {
            harness.broadcast(&live_block(
                "1",
                number,
                vec![transfer_log(address, number, 1)],
            ));
        }
        harness
            .wait_until("the queue is full", |state| {
                state.live_edge == 100 && state.block_queue.len() == 10
            })
            .await;

        // The worker is one block behind the edge; an empty catch-up pass
        // advances the group cursor to the edge and promotes it.
        harness.register(vec![contract(address, 99)]).await;
        client.push_response(vec![]);
        harness
            .wait_until("the worker is promoted", |state| {
                state.current_workers.len() == 1
            })
            .await;

        for expected_block in 100..110 {
            let push = harness.next_push().await;
            assert_eq!(push.logs.len(), 1);
            assert_eq!(push.logs[0].block_number, expected_block);
        }

        // Blocks 110..114 were dropped on the queue and never reach the sink.
        harness
            .wait_until("the queue is drained", |state| state.block_queue.is_empty())
            .await;
        assert!(
            harness.push_rx.try_recv().is_err(),
            "no push may exist for a dropped block"
        );

        harness.cancellation_token.graceful_shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn registrations_wait_for_the_live_edge() {
        let harness = start_manager(ScriptedLogClient::new(vec![]));
        let address = fake_address();

        // The request is sent before any block was broadcast.
        harness.register(vec![contract(address, 50)]).await;
        sleep(Duration::from_secs(5)).await;
        {
            let state = harness.shared.lock().expect("state lock");
            assert_eq!(state.live_edge, 0);
            assert!(
                state.current_workers.is_empty() && state.old_groups.is_empty(),
                "no worker may be classified while the live edge is unset"
            );
        }

        harness.broadcast(&live_block("1", 100, vec![]));
        harness
            .wait_until("the deferred registration lands", |state| {
                state.old_groups.len() == 1
            })
            .await;

        harness.cancellation_token.graceful_shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn registration_grows_the_population_by_the_accepted_amount() {
        let harness = start_manager(ScriptedLogClient::new(vec![]));
        let current = fake_address();
        let behind = fake_address();

        harness.broadcast(&live_block("1", 1000, vec![]));
        harness
            .wait_until("the live edge is set", |state| state.live_edge == 1000)
            .await;

        harness
            .register(vec![contract(current, 1000), contract(behind, 10)])
            .await;
        harness
            .wait_until("both workers are tracked", |state| {
                state.current_workers.len() == 1
                    && state.old_groups.iter().map(|g| g.workers.len()).sum::<usize>() == 1
            })
            .await;

        // Re-registering a tracked address is rejected and changes nothing.
        harness.register(vec![contract(current, 1000)]).await;
        sleep(Duration::from_secs(2)).await;
        {
            let state = harness.shared.lock().expect("state lock");
            let total = state.current_workers.len()
                + state
                    .old_groups
                    .iter()
                    .map(|group| group.workers.len())
                    .sum::<usize>();
            assert_eq!(total, 2, "a duplicate address must not add a worker");
        }

        harness.cancellation_token.graceful_shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn a_failing_log_does_not_poison_its_block() {
        let mut harness = start_manager(ScriptedLogClient::new(vec![]));
        let address = fake_address();

        harness.broadcast(&live_block("1", 2000, vec![]));
        harness
            .wait_until("the live edge is set", |state| state.live_edge == 2000)
            .await;
        harness.register(vec![contract(address, 2000)]).await;
        harness
            .wait_until("the worker is current", |state| {
                state.current_workers.len() == 1
            })
            .await;

        // Two logs in the same block: the first fails to decode.
        harness.broadcast(&live_block(
            "1",
            2001,
            vec![
                truncated_transfer_log(address, 2001),
                transfer_log(address, 2001, 3),
            ],
        ));

        let push = harness.next_push().await;
        assert_eq!(push.logs.len(), 1, "only the well formed event survives");
        assert_eq!(push.logs[0].block_number, 2001);
        harness
            .wait_until("the watermark still advances", |state| {
                state
                    .current_workers
                    .iter()
                    .all(|worker| worker.categorized_block_number() == 2001)
            })
            .await;

        harness.cancellation_token.graceful_shutdown();
    }
}
