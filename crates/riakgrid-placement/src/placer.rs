//! Round-robin placement over the current offer set.

use thiserror::Error;
use tracing::{debug, warn};

use riakgrid_core::{CombinedAsker, Offer, OfferId, Resource, WorkerId};

/// One node awaiting placement, with its resource-carving function.
pub struct NodeRequest {
    pub node_uuid: String,
    pub asker: CombinedAsker,
}

/// A node bound to a slice of one offer.
pub struct Assignment {
    pub node_uuid: String,
    pub offer_id: OfferId,
    pub worker_id: WorkerId,
    pub hostname: String,
    pub executor_ask: Vec<Resource>,
    pub task_ask: Vec<Resource>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlacementError {
    /// Every remaining offer was exhausted with nodes still unplaced.
    /// The unplaced nodes stay eligible for the next offer round.
    #[error("not enough resources to schedule {unplaced} node(s)")]
    InsufficientResources { unplaced: usize },
}

struct PoolOffer {
    id: OfferId,
    worker_id: WorkerId,
    hostname: String,
    resources: Vec<Resource>,
}

/// Spread nodes across offers round-robin.
///
/// Nodes are visited in order; the offer cursor advances on every
/// placement and wraps, so consecutive nodes land on different workers
/// when the offer set allows it. An offer that fails an ask is dropped
/// from the pool for the rest of the round; it may have been feasible
/// earlier and partially consumed since. When the last offer fails an
/// ask the round aborts with `InsufficientResources`; assignments made
/// so far are still returned.
pub fn spread_across_offers(
    offers: &[Offer],
    requests: &[NodeRequest],
) -> (Vec<Assignment>, Result<(), PlacementError>) {
    let mut pool: Vec<PoolOffer> = offers
        .iter()
        .map(|o| PoolOffer {
            id: o.id.clone(),
            worker_id: o.worker_id.clone(),
            hostname: o.hostname.clone(),
            resources: o.resources.clone(),
        })
        .collect();

    let mut assignments = Vec::new();
    let mut offer_idx = 0;

    for (node_idx, request) in requests.iter().enumerate() {
        loop {
            if pool.is_empty() {
                return (
                    assignments,
                    Err(PlacementError::InsufficientResources {
                        unplaced: requests.len() - node_idx,
                    }),
                );
            }
            if offer_idx >= pool.len() {
                offer_idx = 0;
            }

            let offer = &mut pool[offer_idx];
            match (request.asker)(&offer.resources) {
                Some(carved) => {
                    debug!(
                        node = %request.node_uuid,
                        offer = %offer.id,
                        "node placed"
                    );
                    offer.resources = carved.remaining;
                    assignments.push(Assignment {
                        node_uuid: request.node_uuid.clone(),
                        offer_id: offer.id.clone(),
                        worker_id: offer.worker_id.clone(),
                        hostname: offer.hostname.clone(),
                        executor_ask: carved.executor_ask,
                        task_ask: carved.task_ask,
                    });
                    offer_idx += 1;
                    break;
                }
                None if pool.len() <= 1 => {
                    let unplaced = requests.len() - node_idx;
                    warn!(unplaced, "offers exhausted with nodes unplaced");
                    return (
                        assignments,
                        Err(PlacementError::InsufficientResources { unplaced }),
                    );
                }
                None => {
                    debug!(offer = %pool[offer_idx].id, "offer no longer feasible, dropping from round");
                    pool.remove(offer_idx);
                    if offer_idx >= pool.len() {
                        offer_idx = 0;
                    }
                }
            }
        }
    }

    (assignments, Ok(()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use riakgrid_core::{
        ask_for_cpu, ask_for_disk, ask_for_memory, ask_for_ports, combine_askers, ranges_to_array,
        scalar_sum,
    };

    fn offer(id: &str, cpus: f64, mem: f64, disk: f64, ports: (u64, u64)) -> Offer {
        Offer {
            id: id.to_string(),
            worker_id: format!("worker-{id}"),
            hostname: format!("host-{id}"),
            resources: vec![
                Resource::scalar("cpus", cpus),
                Resource::scalar("mem", mem),
                Resource::scalar("disk", disk),
                Resource::ranges("ports", vec![ports]),
            ],
        }
    }

    fn request(uuid: &str) -> NodeRequest {
        NodeRequest {
            node_uuid: uuid.to_string(),
            asker: combine_askers(
                vec![],
                vec![
                    ask_for_cpu(1.0),
                    ask_for_memory(512.0),
                    ask_for_disk(1024.0),
                    ask_for_ports(4),
                ],
            ),
        }
    }

    #[test]
    fn two_nodes_fit_one_offer() {
        let offers = vec![offer("a", 4.0, 2048.0, 4096.0, (31000, 31099))];
        let requests = vec![request("n0"), request("n1")];

        let (assignments, result) = spread_across_offers(&offers, &requests);
        result.unwrap();

        assert_eq!(assignments.len(), 2);
        assert!(assignments.iter().all(|a| a.offer_id == "a"));

        // Residual: cpus 2, mem 1024, disk 2048, 92 ports.
        let carved_cpus: f64 = assignments
            .iter()
            .map(|a| scalar_sum(&a.task_ask, "cpus"))
            .sum();
        assert_eq!(carved_cpus, 2.0);
        let carved_ports: usize = assignments
            .iter()
            .flat_map(|a| &a.task_ask)
            .filter(|r| r.name == "ports")
            .map(|r| ranges_to_array(r.as_ranges().unwrap()).len())
            .sum();
        assert_eq!(carved_ports, 8);
    }

    #[test]
    fn three_nodes_round_robin_two_offers() {
        let offers = vec![
            offer("a", 2.0, 1024.0, 2048.0, (31000, 31007)),
            offer("b", 2.0, 1024.0, 2048.0, (41000, 41007)),
        ];
        let requests = vec![request("n0"), request("n1"), request("n2")];

        let (assignments, result) = spread_across_offers(&offers, &requests);
        result.unwrap();

        let on = |uuid: &str| {
            assignments
                .iter()
                .find(|a| a.node_uuid == uuid)
                .unwrap()
                .offer_id
                .clone()
        };
        assert_eq!(on("n0"), "a");
        assert_eq!(on("n1"), "b");
        assert_eq!(on("n2"), "a");
    }

    #[test]
    fn insufficient_capacity_leaves_nodes_unplaced() {
        let offers = vec![offer("a", 2.0, 4096.0, 4096.0, (31000, 31099))];
        let requests = vec![NodeRequest {
            node_uuid: "n0".to_string(),
            asker: combine_askers(vec![], vec![ask_for_cpu(4.0)]),
        }];

        let (assignments, result) = spread_across_offers(&offers, &requests);
        assert!(assignments.is_empty());
        assert_eq!(
            result.unwrap_err(),
            PlacementError::InsufficientResources { unplaced: 1 }
        );
    }

    #[test]
    fn infeasible_offer_is_dropped_not_fatal() {
        // First offer can't fit anything; the round moves on to the second.
        let offers = vec![
            offer("tiny", 0.5, 64.0, 128.0, (31000, 31001)),
            offer("big", 4.0, 4096.0, 8192.0, (41000, 41099)),
        ];
        let requests = vec![request("n0"), request("n1")];

        let (assignments, result) = spread_across_offers(&offers, &requests);
        result.unwrap();
        assert_eq!(assignments.len(), 2);
        assert!(assignments.iter().all(|a| a.offer_id == "big"));
    }

    #[test]
    fn executor_resources_are_billed_separately() {
        let offers = vec![offer("a", 4.0, 2048.0, 4096.0, (31000, 31099))];
        let requests = vec![NodeRequest {
            node_uuid: "n0".to_string(),
            asker: combine_askers(
                vec![ask_for_cpu(0.1), ask_for_memory(32.0)],
                vec![ask_for_cpu(1.0), ask_for_memory(512.0)],
            ),
        }];

        let (assignments, result) = spread_across_offers(&offers, &requests);
        result.unwrap();
        assert_eq!(scalar_sum(&assignments[0].executor_ask, "cpus"), 0.1);
        assert_eq!(scalar_sum(&assignments[0].task_ask, "cpus"), 1.0);
    }

    #[test]
    fn no_offer_is_oversubscribed() {
        let offers = vec![
            offer("a", 2.0, 1024.0, 2048.0, (31000, 31007)),
            offer("b", 2.0, 1024.0, 2048.0, (41000, 41007)),
        ];
        let requests: Vec<NodeRequest> =
            (0..4).map(|i| request(&format!("n{i}"))).collect();

        let (assignments, result) = spread_across_offers(&offers, &requests);
        result.unwrap();

        for o in &offers {
            let carved: f64 = assignments
                .iter()
                .filter(|a| a.offer_id == o.id)
                .map(|a| scalar_sum(&a.task_ask, "cpus") + scalar_sum(&a.executor_ask, "cpus"))
                .sum();
            assert!(carved <= scalar_sum(&o.resources, "cpus"));
        }
    }

    #[test]
    fn empty_needs_is_a_no_op() {
        let offers = vec![offer("a", 4.0, 2048.0, 4096.0, (31000, 31099))];
        let (assignments, result) = spread_across_offers(&offers, &[]);
        result.unwrap();
        assert!(assignments.is_empty());
    }

    #[test]
    fn no_offers_with_pending_nodes_is_insufficient() {
        let (assignments, result) = spread_across_offers(&[], &[request("n0")]);
        assert!(assignments.is_empty());
        assert!(result.is_err());
    }
}
