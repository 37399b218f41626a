//! Binary search for every responder on the bus.
//!
//! The engine sends DISC_UNIQUE_BRANCH for a uid range. Silence drops the range, a collision
//! splits it at the midpoint and a unique reply gets the device muted before the same range is
//! searched again, since the muted device may have hidden others.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::discovery_reply::DiscoveryReply;
use crate::dmx_controller::{RdmController, RdmResponseError};
use crate::dmx_port::PortError;
use crate::unique_identifier::{PackageAddress, Uid};

/// Lowest uid a device may have.
pub const FIRST_DEVICE_UID: Uid = Uid::new(0x0000, 0x0000_0001);
/// Highest uid a device may have.
pub const LAST_DEVICE_UID: Uid = Uid::new(0xFFFF, 0xFFFF_FFFE);

/// The bus operations discovery is built from.
#[async_trait]
pub trait DiscoveryBus: Send {
    type Error: Send;

    /// Sends DISC_UNIQUE_BRANCH for `[low, high]` and reports how the bus answered.
    async fn unique_branch(&mut self, low: Uid, high: Uid) -> Result<DiscoveryReply, Self::Error>;

    /// Sends DISC_MUTE to `uid`. Returns whether the device acknowledged it.
    async fn mute(&mut self, uid: Uid) -> Result<bool, Self::Error>;

    /// Broadcasts DISC_UN_MUTE.
    async fn un_mute_all(&mut self) -> Result<(), Self::Error>;
}

#[async_trait]
impl<U: Send> DiscoveryBus for RdmController<U> {
    type Error = PortError;

    async fn unique_branch(&mut self, low: Uid, high: Uid) -> Result<DiscoveryReply, PortError> {
        match self.rdm_discover(low, high).await {
            Ok(reply) => Ok(reply),
            Err(RdmResponseError::Port(error)) => Err(error),
            Err(error) => {
                log::debug!("unexpected answer to DISC_UNIQUE_BRANCH: {}", error);
                Ok(DiscoveryReply::Collision)
            },
        }
    }

    async fn mute(&mut self, uid: Uid) -> Result<bool, PortError> {
        match self.rdm_disc_mute(PackageAddress::Device(uid)).await {
            Ok(response) => Ok(response.is_some()),
            Err(RdmResponseError::Port(error)) => Err(error),
            Err(error) => {
                log::debug!("mute of {} not acknowledged: {}", uid, error);
                Ok(false)
            },
        }
    }

    async fn un_mute_all(&mut self) -> Result<(), PortError> {
        match self.rdm_disc_un_mute(PackageAddress::Broadcast).await {
            Ok(_) => Ok(()),
            Err(RdmResponseError::Port(error)) => Err(error),
            Err(error) => {
                log::debug!("broadcast un mute failed: {}", error);
                Ok(())
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// How long to wait for a DISC_MUTE acknowledgement before moving on.
    pub mute_timeout: Duration,
    /// A device that keeps answering after this many mutes is resolved by splitting its range.
    pub max_mute_attempts: u8,
    /// Upper bound for a single DISC_UNIQUE_BRANCH exchange. Longer ones count as silence.
    pub branch_guard: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            mute_timeout: Duration::from_millis(20),
            max_mute_attempts: 3,
            branch_guard: Duration::from_millis(50),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError<E> {
    /// Discovery was cancelled. Contains the devices found up to then.
    #[error("discovery cancelled after finding {} devices", .found.len())]
    Cancelled { found: BTreeSet<Uid> },
    #[error("discovery bus failed: {0}")]
    Bus(E),
}

pub struct RdmDiscoveryEngine<B: DiscoveryBus> {
    bus: B,
    config: DiscoveryConfig,
}

impl<B: DiscoveryBus> RdmDiscoveryEngine<B> {
    pub fn new(bus: B, config: DiscoveryConfig) -> Self {
        Self { bus, config }
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn into_bus(self) -> B {
        self.bus
    }

    /// Un mutes every device, then searches the whole uid space.
    pub async fn full_discovery(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<BTreeSet<Uid>, DiscoveryError<B::Error>> {
        self.bus.un_mute_all().await.map_err(DiscoveryError::Bus)?;
        self.discover(FIRST_DEVICE_UID, LAST_DEVICE_UID, cancel).await
    }

    /// Finds every unmuted device in `[from, to]`. Found devices are left muted.
    pub async fn discover(
        &mut self,
        from: Uid,
        to: Uid,
        cancel: &CancellationToken,
    ) -> Result<BTreeSet<Uid>, DiscoveryError<B::Error>> {
        let mut found = BTreeSet::new();
        let mut mute_attempts: BTreeMap<Uid, u8> = BTreeMap::new();
        let mut unacknowledged = BTreeSet::new();
        let mut ranges = VecDeque::from([(from, to)]);

        while let Some((low, high)) = ranges.pop_front() {
            let reply = tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    return Err(self.cancelled(found, &unacknowledged).await);
                }

                reply = self.branch(low, high) => reply.map_err(DiscoveryError::Bus)?,
            };

            match reply {
                DiscoveryReply::NoReply => {
                    log::trace!("no device in {} - {}", low, high);
                },
                DiscoveryReply::Collision => split_range(&mut ranges, low, high),
                DiscoveryReply::Unique(uid) if uid < low || uid > high => {
                    log::debug!("{} answered outside of {} - {}", uid, low, high);
                    split_range(&mut ranges, low, high);
                },
                DiscoveryReply::Unique(uid) => {
                    let attempts = mute_attempts.entry(uid).or_insert(0);
                    if *attempts >= self.config.max_mute_attempts {
                        log::warn!("{} keeps answering after {} mutes", uid, attempts);
                        split_range(&mut ranges, low, high);
                        continue;
                    }
                    *attempts += 1;

                    if found.insert(uid) {
                        log::debug!("found {}", uid);
                    }

                    if self.mute(uid).await.map_err(DiscoveryError::Bus)? {
                        unacknowledged.remove(&uid);
                    } else {
                        unacknowledged.insert(uid);
                    }
                    ranges.push_back((low, high));
                },
            }

            if cancel.is_cancelled() {
                return Err(self.cancelled(found, &unacknowledged).await);
            }
        }

        Ok(found)
    }

    async fn branch(&mut self, low: Uid, high: Uid) -> Result<DiscoveryReply, B::Error> {
        match tokio::time::timeout(self.config.branch_guard, self.bus.unique_branch(low, high)).await
        {
            Ok(reply) => reply,
            Err(_) => {
                log::warn!("unique branch {} - {} did not finish", low, high);
                Ok(DiscoveryReply::NoReply)
            },
        }
    }

    async fn mute(&mut self, uid: Uid) -> Result<bool, B::Error> {
        match tokio::time::timeout(self.config.mute_timeout, self.bus.mute(uid)).await {
            Ok(acknowledged) => acknowledged,
            Err(_) => {
                log::debug!("mute of {} timed out", uid);
                Ok(false)
            },
        }
    }

    /// Gives devices whose mute went unanswered one more mute before giving up.
    async fn cancelled(
        &mut self,
        found: BTreeSet<Uid>,
        unacknowledged: &BTreeSet<Uid>,
    ) -> DiscoveryError<B::Error> {
        for &uid in unacknowledged {
            match self.mute(uid).await {
                Ok(true) => {},
                Ok(false) | Err(_) => log::warn!("{} may still answer discovery", uid),
            }
        }

        DiscoveryError::Cancelled { found }
    }
}

fn split_range(ranges: &mut VecDeque<(Uid, Uid)>, low: Uid, high: Uid) {
    match Uid::split_range(low, high) {
        Some((lower, upper)) => {
            ranges.push_back(lower);
            ranges.push_back(upper);
        },
        None => log::warn!("unresolvable collision at {}", low),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Default)]
    struct SimulatedBus {
        devices: BTreeSet<Uid>,
        muted: BTreeSet<Uid>,
        /// Devices that ignore DISC_MUTE.
        stubborn: BTreeSet<Uid>,
        /// Devices whose mute acknowledgement gets lost.
        silent_mute: BTreeSet<Uid>,
        branches: Vec<(Uid, Uid)>,
        mutes: Vec<Uid>,
        cancel_on_mute: Option<CancellationToken>,
    }

    impl SimulatedBus {
        fn with_devices(devices: impl IntoIterator<Item = u64>) -> Self {
            Self {
                devices: devices.into_iter().map(Uid::from_u64).collect(),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl DiscoveryBus for SimulatedBus {
        type Error = ();

        async fn unique_branch(&mut self, low: Uid, high: Uid) -> Result<DiscoveryReply, ()> {
            self.branches.push((low, high));

            let mut answering = self
                .devices
                .range(low..=high)
                .filter(|uid| !self.muted.contains(uid));

            Ok(match (answering.next(), answering.next()) {
                (None, _) => DiscoveryReply::NoReply,
                (Some(uid), None) => DiscoveryReply::Unique(*uid),
                (Some(_), Some(_)) => DiscoveryReply::Collision,
            })
        }

        async fn mute(&mut self, uid: Uid) -> Result<bool, ()> {
            self.mutes.push(uid);
            if let Some(cancel) = self.cancel_on_mute.as_ref() {
                cancel.cancel();
            }

            if !self.stubborn.contains(&uid) {
                self.muted.insert(uid);
            }
            Ok(!self.silent_mute.contains(&uid))
        }

        async fn un_mute_all(&mut self) -> Result<(), ()> {
            self.muted.clear();
            Ok(())
        }
    }

    fn range(low: u64, high: u64) -> (Uid, Uid) {
        (Uid::from_u64(low), Uid::from_u64(high))
    }

    #[tokio::test]
    async fn test_single_device() {
        let mut engine =
            RdmDiscoveryEngine::new(SimulatedBus::with_devices([0x5]), DiscoveryConfig::default());

        let found = engine
            .discover(Uid::from_u64(0x0), Uid::from_u64(0xF), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(found, BTreeSet::from([Uid::from_u64(0x5)]));
        let bus = engine.into_bus();
        assert_eq!(bus.branches, vec![range(0x0, 0xF), range(0x0, 0xF)]);
        assert_eq!(bus.mutes, vec![Uid::from_u64(0x5)]);
    }

    #[tokio::test]
    async fn test_collision_splits_range() {
        let mut engine = RdmDiscoveryEngine::new(
            SimulatedBus::with_devices([0x3, 0xC]),
            DiscoveryConfig::default(),
        );

        let found = engine
            .discover(Uid::from_u64(0x0), Uid::from_u64(0xF), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(found, BTreeSet::from([Uid::from_u64(0x3), Uid::from_u64(0xC)]));
        let bus = engine.into_bus();
        assert_eq!(
            &bus.branches[..3],
            &[range(0x0, 0xF), range(0x0, 0x7), range(0x8, 0xF)]
        );
    }

    #[tokio::test]
    async fn test_empty_bus() {
        let mut engine =
            RdmDiscoveryEngine::new(SimulatedBus::default(), DiscoveryConfig::default());

        let found = engine.full_discovery(&CancellationToken::new()).await.unwrap();

        assert!(found.is_empty());
        assert_eq!(engine.into_bus().branches, vec![(FIRST_DEVICE_UID, LAST_DEVICE_UID)]);
    }

    #[tokio::test]
    async fn test_device_ignoring_mute_terminates() {
        let mut bus = SimulatedBus::with_devices([0x10, 0x1234]);
        bus.stubborn.insert(Uid::from_u64(0x10));
        let mut engine = RdmDiscoveryEngine::new(bus, DiscoveryConfig::default());

        let found = engine.full_discovery(&CancellationToken::new()).await.unwrap();

        assert_eq!(found, BTreeSet::from([Uid::from_u64(0x10), Uid::from_u64(0x1234)]));
        let bus = engine.into_bus();
        let stubborn_mutes = bus.mutes.iter().filter(|uid| **uid == Uid::from_u64(0x10)).count();
        assert_eq!(stubborn_mutes, 3);
    }

    #[tokio::test]
    async fn test_cancel_mutes_unacknowledged() {
        let cancel = CancellationToken::new();
        let mut bus = SimulatedBus::with_devices([0x5, 0x9]);
        bus.silent_mute.insert(Uid::from_u64(0x9));
        bus.cancel_on_mute = Some(cancel.clone());
        // 0x5 is already muted, so 0x9 answers alone
        bus.muted.insert(Uid::from_u64(0x5));
        let mut engine = RdmDiscoveryEngine::new(bus, DiscoveryConfig::default());

        let result = engine
            .discover(Uid::from_u64(0x0), Uid::from_u64(0xF), &cancel)
            .await;

        match result {
            Err(DiscoveryError::Cancelled { found }) => {
                assert_eq!(found, BTreeSet::from([Uid::from_u64(0x9)]));
            },
            _ => panic!("discovery was not cancelled"),
        }
        let bus = engine.into_bus();
        assert_eq!(bus.mutes, vec![Uid::from_u64(0x9), Uid::from_u64(0x9)]);
        assert_eq!(bus.branches.len(), 1);
    }

    #[tokio::test]
    async fn test_already_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut engine =
            RdmDiscoveryEngine::new(SimulatedBus::with_devices([0x5]), DiscoveryConfig::default());

        let result = engine.full_discovery(&cancel).await;

        assert!(matches!(result, Err(DiscoveryError::Cancelled { found }) if found.is_empty()));
        assert!(engine.into_bus().branches.is_empty());
    }

    fn block_on<F: std::future::Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .unwrap()
            .block_on(future)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn test_finds_every_device(
            devices in proptest::collection::btree_set(0x1u64..=0xFFFF_FFFF_FFFE, 0..12)
        ) {
            let mut engine = RdmDiscoveryEngine::new(
                SimulatedBus::with_devices(devices.iter().copied()),
                DiscoveryConfig::default(),
            );

            let found = block_on(engine.full_discovery(&CancellationToken::new())).unwrap();

            let expected: BTreeSet<Uid> = devices.into_iter().map(Uid::from_u64).collect();
            prop_assert_eq!(found, expected);
        }

        #[test]
        fn test_dense_ranges(devices in proptest::collection::btree_set(0x0u64..=0x3F, 2..16)) {
            let mut engine = RdmDiscoveryEngine::new(
                SimulatedBus::with_devices(devices.iter().copied()),
                DiscoveryConfig::default(),
            );

            let found = block_on(engine.discover(
                Uid::from_u64(0x0),
                Uid::from_u64(0x3F),
                &CancellationToken::new(),
            ))
            .unwrap();

            prop_assert_eq!(found.len(), devices.len());
            // two devices always share the first range
            prop_assert!(engine.bus_mut().branches.len() > devices.len() + 1);
        }
    }
}
