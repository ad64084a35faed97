//! Resource-carving algebra.
//!
//! An asker is a pure function over an offer's resource vector: it either
//! carves its ask out and returns the diminished vector, or fails and
//! leaves the vector untouched. Askers compose by folding, which is how
//! placement carves several quantities out of a single offer. A combined
//! asker carves two ask lists at once, one billed to the executor and one
//! to the task, because the cluster manager accounts for them separately.

use rand::Rng;

use crate::resources::{array_to_ranges, ranges_to_array, Resource, ResourceValue};

/// Result of a successful carve: the diminished vector and the carved ask.
#[derive(Debug, Clone)]
pub struct CarvedAsk {
    pub remaining: Vec<Resource>,
    pub ask: Resource,
}

/// A single carve attempt. `None` means the offer could not accommodate
/// the ask; the caller keeps the original vector.
pub type ResourceAsker = Box<dyn Fn(&[Resource]) -> Option<CarvedAsk> + Send + Sync>;

/// Result of a combined carve across executor and task asks.
#[derive(Debug, Clone)]
pub struct CombinedAsk {
    pub remaining: Vec<Resource>,
    pub executor_ask: Vec<Resource>,
    pub task_ask: Vec<Resource>,
}

/// Carves executor and task resources from one offer in a single attempt.
pub type CombinedAsker = Box<dyn Fn(&[Resource]) -> Option<CombinedAsk> + Send + Sync>;

/// Ask for `amount` of the scalar resource `name`.
///
/// The first resource with a matching name and sufficient value is reduced
/// by `amount`; a zero-valued remainder is still emitted.
pub fn ask_for_scalar(name: &str, amount: f64) -> ResourceAsker {
    let name = name.to_string();
    Box::new(move |resources| {
        for (idx, resource) in resources.iter().enumerate() {
            let Some(value) = resource.as_scalar() else {
                continue;
            };
            if resource.name == name && amount <= value {
                let mut remaining = resources.to_vec();
                remaining[idx] = Resource::scalar(&name, value - amount);
                return Some(CarvedAsk {
                    remaining,
                    ask: Resource::scalar(&name, amount),
                });
            }
        }
        None
    })
}

pub fn ask_for_cpu(cpus: f64) -> ResourceAsker {
    ask_for_scalar("cpus", cpus)
}

pub fn ask_for_memory(mem: f64) -> ResourceAsker {
    ask_for_scalar("mem", mem)
}

pub fn ask_for_disk(disk: f64) -> ResourceAsker {
    ask_for_scalar("disk", disk)
}

/// Ask for `count` contiguous ports from the first "ports" resource.
///
/// The range set is expanded to a sorted port list and a run of `count`
/// ports is taken at a uniformly random start index, spreading port choice
/// across the pool to cut collisions with other frameworks on the same
/// worker. The leftover ports are re-canonicalized. Fails if that single
/// resource entry holds fewer than `count` ports.
pub fn ask_for_ports(count: usize) -> ResourceAsker {
    Box::new(move |resources| {
        // Only the first ports entry is considered; a short pool there is
        // a failure, not a reason to scan further.
        let (idx, resource) = resources
            .iter()
            .enumerate()
            .find(|(_, r)| r.name == "ports" && r.as_ranges().is_some())?;
        let ports = ranges_to_array(resource.as_ranges().unwrap_or_default());
        if ports.len() >= count {
            let start = rand::rng().random_range(0..=ports.len() - count);
            let taken: Vec<u64> = ports[start..start + count].to_vec();
            let mut left: Vec<u64> = ports[..start].to_vec();
            left.extend_from_slice(&ports[start + count..]);

            let mut remaining = resources.to_vec();
            remaining[idx] = Resource {
                name: "ports".to_string(),
                value: ResourceValue::Ranges(array_to_ranges(&left)),
            };
            return Some(CarvedAsk {
                remaining,
                ask: Resource {
                    name: "ports".to_string(),
                    value: ResourceValue::Ranges(array_to_ranges(&taken)),
                },
            });
        }
        None
    })
}

/// Fold a list of askers over a resource vector, short-circuiting on the
/// first failure. On success returns the diminished vector and the carved
/// asks in order.
pub fn apply_askers(
    resources: &[Resource],
    askers: &[ResourceAsker],
) -> Option<(Vec<Resource>, Vec<Resource>)> {
    let mut remaining = resources.to_vec();
    let mut asks = Vec::with_capacity(askers.len());
    for asker in askers {
        let carved = asker(&remaining)?;
        remaining = carved.remaining;
        asks.push(carved.ask);
    }
    Some((remaining, asks))
}

/// Build a combined asker from executor-side and task-side ask lists.
///
/// Both lists carve from the same vector; failure anywhere leaves the
/// offer untouched for the caller.
pub fn combine_askers(executor: Vec<ResourceAsker>, task: Vec<ResourceAsker>) -> CombinedAsker {
    Box::new(move |resources| {
        let (remaining, executor_ask) = apply_askers(resources, &executor)?;
        let (remaining, task_ask) = apply_askers(&remaining, &task)?;
        Some(CombinedAsk {
            remaining,
            executor_ask,
            task_ask,
        })
    })
}
