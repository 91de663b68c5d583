//! Operators: atomic cluster mutations handed to the executor
//!
//! An operator is a short, ordered list of steps on one region. Once built
//! it is immutable; ownership passes to whoever executes it.

use cyxcloud_core::{PeerId, RegionId, StoreId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use crate::cluster::Cluster;
use crate::info::RegionInfo;

/// Set of operator kind flags
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OpKind(u32);

impl OpKind {
    /// Moves leadership
    pub const LEADER: OpKind = OpKind(1 << 0);
    /// Adds or removes peers
    pub const REGION: OpKind = OpKind(1 << 1);
    /// Produced by a balance scheduler
    pub const BALANCE: OpKind = OpKind(1 << 2);

    const NAMES: [(OpKind, &'static str); 3] = [
        (OpKind::LEADER, "leader"),
        (OpKind::REGION, "region"),
        (OpKind::BALANCE, "balance"),
    ];

    pub const fn empty() -> Self {
        OpKind(0)
    }

    pub const fn contains(self, other: OpKind) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    /// Individual flags set in `self`
    pub fn flags(self) -> impl Iterator<Item = OpKind> {
        Self::NAMES
            .into_iter()
            .map(|(flag, _)| flag)
            .filter(move |flag| self.contains(*flag))
    }
}

impl BitOr for OpKind {
    type Output = OpKind;

    fn bitor(self, rhs: OpKind) -> OpKind {
        OpKind(self.0 | rhs.0)
    }
}

impl BitOrAssign for OpKind {
    fn bitor_assign(&mut self, rhs: OpKind) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = Self::NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "{}", names.join(","))
    }
}

impl fmt::Debug for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OpKind({})", self)
    }
}

/// One step of an operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OpStep {
    AddPeer { to_store: StoreId, peer_id: PeerId },
    TransferLeader { from_store: StoreId, to_store: StoreId },
    RemovePeer { from_store: StoreId },
}

impl fmt::Display for OpStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpStep::AddPeer { to_store, peer_id } => {
                write!(f, "add peer {} on store {}", peer_id, to_store)
            }
            OpStep::TransferLeader {
                from_store,
                to_store,
            } => write!(f, "transfer leader from store {} to store {}", from_store, to_store),
            OpStep::RemovePeer { from_store } => write!(f, "remove peer on store {}", from_store),
        }
    }
}

/// Pending size and count deltas for one store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreInfluence {
    pub region_size: i64,
    pub region_count: i64,
    pub leader_size: i64,
    pub leader_count: i64,
}

/// Expected effect of in-flight operators, per store
///
/// Lets back-to-back decisions account for moves the cluster view has not
/// caught up with yet.
#[derive(Debug, Clone, Default)]
pub struct OpInfluence {
    stores: HashMap<StoreId, StoreInfluence>,
}

impl OpInfluence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_operators<'a>(operators: impl IntoIterator<Item = &'a Operator>) -> Self {
        let mut influence = Self::new();
        for op in operators {
            op.influence(&mut influence);
        }
        influence
    }

    /// Influence on `store_id`; zero when nothing is pending
    pub fn get_store_influence(&self, store_id: StoreId) -> StoreInfluence {
        self.stores.get(&store_id).copied().unwrap_or_default()
    }

    pub fn get_store_influence_mut(&mut self, store_id: StoreId) -> &mut StoreInfluence {
        self.stores.entry(store_id).or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }
}

/// An immutable cluster mutation on one region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operator {
    desc: String,
    region_id: RegionId,
    region_size: i64,
    kind: OpKind,
    steps: Vec<OpStep>,
}

impl Operator {
    pub fn new(
        desc: impl Into<String>,
        region_id: RegionId,
        region_size: i64,
        kind: OpKind,
        steps: Vec<OpStep>,
    ) -> Self {
        Self {
            desc: desc.into(),
            region_id,
            region_size,
            kind,
            steps,
        }
    }

    /// Short description, usually the producing scheduler's type
    pub fn desc(&self) -> &str {
        &self.desc
    }

    pub fn region_id(&self) -> RegionId {
        self.region_id
    }

    /// Approximate size of the region when the operator was built
    pub fn region_size(&self) -> i64 {
        self.region_size
    }

    pub fn kind(&self) -> OpKind {
        self.kind
    }

    pub fn steps(&self) -> &[OpStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Store receiving a new peer, if any
    pub fn target_store(&self) -> Option<StoreId> {
        self.steps.iter().find_map(|s| match s {
            OpStep::AddPeer { to_store, .. } => Some(*to_store),
            _ => None,
        })
    }

    /// Store losing a peer, if any
    pub fn source_store(&self) -> Option<StoreId> {
        self.steps.iter().find_map(|s| match s {
            OpStep::RemovePeer { from_store } => Some(*from_store),
            _ => None,
        })
    }

    /// Add this operator's expected effect to `influence`
    pub fn influence(&self, influence: &mut OpInfluence) {
        let size = self.region_size;
        for step in &self.steps {
            match *step {
                OpStep::AddPeer { to_store, .. } => {
                    let to = influence.get_store_influence_mut(to_store);
                    to.region_size += size;
                    to.region_count += 1;
                }
                OpStep::RemovePeer { from_store } => {
                    let from = influence.get_store_influence_mut(from_store);
                    from.region_size -= size;
                    from.region_count -= 1;
                }
                OpStep::TransferLeader {
                    from_store,
                    to_store,
                } => {
                    let from = influence.get_store_influence_mut(from_store);
                    from.leader_size -= size;
                    from.leader_count -= 1;
                    let to = influence.get_store_influence_mut(to_store);
                    to.leader_size += size;
                    to.leader_count += 1;
                }
            }
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let steps: Vec<String> = self.steps.iter().map(|s| s.to_string()).collect();
        write!(
            f,
            "{} (kind:{}, region:{}, size:{}) [{}]",
            self.desc,
            self.kind,
            self.region_id,
            self.region_size,
            steps.join(", ")
        )
    }
}

/// Steps that take the peer on `store_id` out of `region`
///
/// If that peer leads the region, leadership moves first to the follower on
/// the lowest-numbered up store.
fn remove_peer_steps(
    cluster: &dyn Cluster,
    region: &RegionInfo,
    store_id: StoreId,
) -> (OpKind, Vec<OpStep>) {
    let mut kind = OpKind::empty();
    let mut steps = Vec::with_capacity(2);

    if region.leader_store_id() == Some(store_id) {
        let mut followers: Vec<StoreId> = region
            .followers()
            .map(|p| p.store_id)
            .filter(|id| cluster.get_store(*id).is_some_and(|s| s.is_up()))
            .collect();
        followers.sort();
        if let Some(&to_store) = followers.first() {
            steps.push(OpStep::TransferLeader {
                from_store: store_id,
                to_store,
            });
            kind |= OpKind::LEADER;
        }
    }

    steps.push(OpStep::RemovePeer {
        from_store: store_id,
    });
    (kind | OpKind::REGION, steps)
}

/// Build an operator moving the peer on `old_store` to `new_store`
///
/// The new peer is added before the old one is removed, so the region never
/// drops below its replica count.
pub fn create_move_peer_operator(
    desc: &str,
    cluster: &dyn Cluster,
    region: &RegionInfo,
    kind: OpKind,
    old_store: StoreId,
    new_store: StoreId,
    peer_id: PeerId,
) -> Operator {
    let (remove_kind, remove_steps) = remove_peer_steps(cluster, region, old_store);
    let mut steps = Vec::with_capacity(remove_steps.len() + 1);
    steps.push(OpStep::AddPeer {
        to_store: new_store,
        peer_id,
    });
    steps.extend(remove_steps);

    Operator::new(
        desc,
        region.id,
        region.approximate_size,
        remove_kind | kind | OpKind::REGION,
        steps,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::MemoryCluster;
    use crate::info::{Peer, StoreInfo};
    use crate::options::ScheduleOptions;

    fn cluster() -> MemoryCluster {
        let mut cluster = MemoryCluster::new(ScheduleOptions::default());
        for id in 1..=4 {
            cluster.put_store(StoreInfo::new(id));
        }
        cluster
    }

    #[test]
    fn test_op_kind_flags() {
        let kind = OpKind::BALANCE | OpKind::REGION;
        assert!(kind.contains(OpKind::REGION));
        assert!(kind.contains(OpKind::BALANCE));
        assert!(!kind.contains(OpKind::LEADER));
        assert!(!kind.contains(OpKind::empty()));
        assert_eq!(kind.to_string(), "region,balance");
        assert_eq!(kind.flags().count(), 2);
    }

    #[test]
    fn test_move_follower_peer() {
        let cluster = cluster();
        let region = RegionInfo::new(1, vec![Peer::new(1, 1), Peer::new(2, 2), Peer::new(3, 3)], 20);

        let op = create_move_peer_operator(
            "balance-region",
            &cluster,
            &region,
            OpKind::BALANCE,
            StoreId(2),
            StoreId(4),
            PeerId(9),
        );

        assert_eq!(op.desc(), "balance-region");
        assert_eq!(op.region_id(), RegionId(1));
        assert_eq!(op.kind(), OpKind::BALANCE | OpKind::REGION);
        assert_eq!(
            op.steps(),
            &[
                OpStep::AddPeer {
                    to_store: StoreId(4),
                    peer_id: PeerId(9)
                },
                OpStep::RemovePeer {
                    from_store: StoreId(2)
                },
            ]
        );
        assert_eq!(op.source_store(), Some(StoreId(2)));
        assert_eq!(op.target_store(), Some(StoreId(4)));
    }

    #[test]
    fn test_move_leader_peer_transfers_leadership() {
        let cluster = cluster();
        let region = RegionInfo::new(1, vec![Peer::new(1, 1), Peer::new(2, 3), Peer::new(3, 2)], 20);

        let op = create_move_peer_operator(
            "balance-region",
            &cluster,
            &region,
            OpKind::BALANCE,
            StoreId(1),
            StoreId(4),
            PeerId(9),
        );

        assert!(op.kind().contains(OpKind::LEADER));
        assert_eq!(op.len(), 3);
        assert_eq!(
            op.steps()[1],
            OpStep::TransferLeader {
                from_store: StoreId(1),
                to_store: StoreId(2)
            }
        );
    }

    #[test]
    fn test_influence_accumulates() {
        let cluster = cluster();
        let region = RegionInfo::new(1, vec![Peer::new(1, 1), Peer::new(2, 2)], 20);
        let op = create_move_peer_operator(
            "balance-region",
            &cluster,
            &region,
            OpKind::BALANCE,
            StoreId(1),
            StoreId(3),
            PeerId(5),
        );

        let influence = OpInfluence::from_operators([&op, &op]);
        assert_eq!(influence.get_store_influence(StoreId(3)).region_size, 40);
        assert_eq!(influence.get_store_influence(StoreId(1)).region_size, -40);
        assert_eq!(influence.get_store_influence(StoreId(1)).leader_count, -2);
        assert_eq!(influence.get_store_influence(StoreId(2)).leader_count, 2);
        assert_eq!(influence.get_store_influence(StoreId(4)), StoreInfluence::default());
    }

    #[test]
    fn test_operator_display() {
        let op = Operator::new(
            "balance-region",
            RegionId(7),
            10,
            OpKind::REGION,
            vec![OpStep::RemovePeer {
                from_store: StoreId(2),
            }],
        );
        assert_eq!(
            op.to_string(),
            "balance-region (kind:region, region:7, size:10) [remove peer on store 2]"
        );
    }
}
