//! Seize / queue / release state machine
//!
//! An entity arriving at a Seize has its request list resolved (quantities
//! and member indices evaluated once), then:
//!
//! 1. **Plan**: pick a concrete resource for every item, counting demand of
//!    earlier items against the same resource. Any item that cannot be met
//!    fails the whole plan.
//! 2. **Commit**: allocate every planned grant, record holdings and save
//!    attributes, then forward the entity.
//! 3. **Queue**: otherwise the entity waits in the Seize's queue, holding
//!    nothing. A full bounded queue makes it balk or block.
//!
//! A Release gives units back and re-scans the queues of every Seize
//! subscribed to the touched resources. The first satisfiable waiting
//! entry in queue order is granted, then the scan restarts, until a full
//! pass grants nothing. Granted entities move on only after the scan ends
//! and the release windows are settled.
//!
//! Arrivals are not queue-aware. An entity whose own list fits the idle
//! units is granted at once, even while other entities wait on the same
//! resources, so a large waiting request can be overtaken by smaller ones
//! indefinitely. Seize priority only orders the queues visited by a rescan.

use crate::allocation::{AllocationRequest, AllocationType, Holding, SeizableItem, SeizableTarget, SelectionRule};
use crate::components::release::Release;
use crate::components::seize::{QueueFullAction, Seize};
use crate::components::ComponentId;
use crate::data::{DataManager, DefinitionId, Waiting};
use crate::error::{SimResult, SimulationError};
use crate::models::entity::EntityId;
use crate::models::event::SimEvent;
use crate::orchestrator::context::DispatchContext;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// A concrete grant chosen by [`plan`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    pub resource: DefinitionId,
    pub quantity: u32,
    pub save_attribute: Option<String>,
}

/// Round an evaluated quantity to whole units (negative and NaN give 0)
fn whole_units(value: f64) -> u32 {
    if value.is_nan() || value <= 0.0 {
        0
    } else {
        value.round().min(u32::MAX as f64) as u32
    }
}

/// Evaluate quantities and member indices for one entity
pub fn resolve(
    ctx: &mut DispatchContext<'_>,
    items: &[SeizableItem],
    entity: EntityId,
) -> SimResult<Vec<AllocationRequest>> {
    let mut requests = Vec::with_capacity(items.len());
    for item in items {
        let quantity = whole_units(ctx.evaluate(&item.quantity, Some(entity))?);
        let member = match (item.target, item.selection) {
            (SeizableTarget::Set(_), SelectionRule::SpecificMember) => {
                whole_units(ctx.evaluate(&item.member_index, Some(entity))?) as usize
            }
            _ => 0,
        };
        requests.push(AllocationRequest {
            target: item.target,
            quantity,
            selection: item.selection,
            member,
            save_attribute: item.save_attribute().map(str::to_string),
        });
    }
    Ok(requests)
}

/// Find a grant for every request, or `None` if any cannot be met now
pub fn plan(data: &DataManager, requests: &[AllocationRequest]) -> SimResult<Option<Vec<Grant>>> {
    let mut planned: BTreeMap<DefinitionId, u32> = BTreeMap::new();
    let mut grants = Vec::with_capacity(requests.len());

    for request in requests {
        let available = |id: DefinitionId| -> SimResult<u32> {
            let idle = data.resource(id)?.idle();
            Ok(idle.saturating_sub(planned.get(&id).copied().unwrap_or(0)))
        };

        let chosen = match request.target {
            SeizableTarget::Resource(id) => (available(id)? >= request.quantity).then_some(id),
            SeizableTarget::Set(set_id) => {
                let set = data.set(set_id)?;
                match request.selection {
                    SelectionRule::SpecificMember => {
                        let id = set.member(request.member).ok_or_else(|| {
                            SimulationError::DefinitionNotFound(format!(
                                "member {} of set '{}'",
                                request.member,
                                set.name()
                            ))
                        })?;
                        (available(id)? >= request.quantity).then_some(id)
                    }
                    SelectionRule::LargestRemainingCapacity => {
                        let mut best: Option<(DefinitionId, u32)> = None;
                        for &id in set.members() {
                            let idle = available(id)?;
                            if idle >= request.quantity && best.map_or(true, |(_, most)| idle > most) {
                                best = Some((id, idle));
                            }
                        }
                        best.map(|(id, _)| id)
                    }
                    SelectionRule::PreferredOrder => {
                        let mut first = None;
                        for &id in set.members() {
                            if available(id)? >= request.quantity {
                                first = Some(id);
                                break;
                            }
                        }
                        first
                    }
                }
            }
        };

        let Some(resource) = chosen else {
            return Ok(None);
        };
        *planned.entry(resource).or_insert(0) += request.quantity;
        grants.push(Grant {
            resource,
            quantity: request.quantity,
            save_attribute: request.save_attribute.clone(),
        });
    }
    Ok(Some(grants))
}

/// Allocate planned grants to `entity` on behalf of Seize `seize`
fn commit(
    ctx: &mut DispatchContext<'_>,
    seize: ComponentId,
    entity: EntityId,
    grants: Vec<Grant>,
    allocation: AllocationType,
) -> SimResult<()> {
    let now = ctx.now();
    let component = ctx.component_name(seize).to_string();
    for grant in grants {
        let resource = ctx.data.resource_mut(grant.resource)?;
        let transferred = resource.allocate(grant.quantity, allocation == AllocationType::Transfer, now);
        debug_assert!(resource.busy() <= resource.capacity(), "busy exceeds capacity");
        let resource_name = resource.name().to_string();

        if let Some(attribute) = &grant.save_attribute {
            ctx.entity_mut(entity)?
                .set_attribute(attribute.clone(), grant.resource.index() as f64);
        }
        ctx.run.holdings.grant(
            entity,
            Holding {
                resource: grant.resource,
                quantity: grant.quantity,
                save_attribute: grant.save_attribute,
            },
        );
        ctx.trace(SimEvent::Allocated {
            time: now,
            component: component.clone(),
            entity,
            resource: resource_name,
            quantity: grant.quantity,
            transferred,
        });
    }
    Ok(())
}

// ============================================================================
// Seize
// ============================================================================

/// Entity arrives at a Seize
pub fn seize(ctx: &mut DispatchContext<'_>, id: ComponentId, seize: &Seize, entity: EntityId) -> SimResult<()> {
    let requests = resolve(ctx, &seize.requests, entity)?;
    match plan(ctx.data, &requests)? {
        Some(grants) => {
            commit(ctx, id, entity, grants, seize.allocation_type)?;
            ctx.forward(id, entity)
        }
        None => enqueue(ctx, id, seize, entity, requests),
    }
}

fn enqueue(
    ctx: &mut DispatchContext<'_>,
    id: ComponentId,
    seize: &Seize,
    entity: EntityId,
    requests: Vec<AllocationRequest>,
) -> SimResult<()> {
    let queue_id = seize
        .queue
        .ok_or_else(|| SimulationError::DefinitionNotFound(format!("queue of '{}'", ctx.component_name(id))))?;
    let now = ctx.now();
    let (priority, rank) = {
        let order_attribute = ctx.data.queue(queue_id)?.order().attribute().map(str::to_string);
        let record = ctx.entity(entity)?;
        let rank = order_attribute
            .and_then(|attr| record.attribute(&attr))
            .unwrap_or(0.0);
        (record.priority(), rank)
    };
    let waiting = Waiting {
        entity,
        seize: id,
        requests,
        entered_at: now,
        priority,
        rank,
    };

    let component = ctx.component_name(id).to_string();
    let queue = ctx.data.queue_mut(queue_id)?;
    let queue_name = queue.name().to_string();
    match queue.insert(waiting, now) {
        Ok(position) => {
            ctx.trace(SimEvent::Queued {
                time: now,
                component,
                entity,
                queue: queue_name,
                position,
            });
            Ok(())
        }
        Err(waiting) => match seize.queue_full {
            QueueFullAction::Block => {
                queue.block(waiting);
                ctx.trace(SimEvent::Blocked {
                    time: now,
                    component,
                    entity,
                    queue: queue_name,
                });
                Ok(())
            }
            QueueFullAction::Balk => {
                debug!(component = %component, entity = %entity, "queue full, entity balks");
                ctx.trace(SimEvent::Balked {
                    time: now,
                    component,
                    entity,
                    queue: queue_name,
                });
                // The second connection, when present, takes balking entities
                if ctx.components.node(id)?.connections.get(1).is_some() {
                    ctx.forward_to(id, entity, 1)
                } else {
                    ctx.dispose(entity);
                    Ok(())
                }
            }
        },
    }
}

// ============================================================================
// Release
// ============================================================================

/// Entity arrives at a Release
pub fn release(ctx: &mut DispatchContext<'_>, id: ComponentId, release: &Release, entity: EntityId) -> SimResult<()> {
    let now = ctx.now();
    let component = ctx.component_name(id).to_string();
    let mut touched: Vec<DefinitionId> = Vec::new();

    for item in &release.requests {
        let save_attribute = item.save_attribute();
        let resource_id = match item.target {
            SeizableTarget::Resource(resource) => resource,
            SeizableTarget::Set(set) => {
                let attribute = save_attribute.unwrap_or("");
                let recorded = ctx.entity(entity)?.attribute(attribute).ok_or_else(|| {
                    SimulationError::DefinitionNotFound(format!(
                        "{entity} has no '{attribute}' recording a member of set '{}'",
                        ctx.data.name_of(set)
                    ))
                })?;
                DefinitionId::new(recorded as usize)
            }
        };

        let quantity = if release.release_held {
            ctx.run.holdings.held(entity, resource_id, save_attribute)
        } else {
            whole_units(ctx.evaluate(&item.quantity, Some(entity))?)
        };

        let mismatch = |held: u32, data: &DataManager| SimulationError::ReleaseMismatch {
            entity,
            resource: data.name_of(resource_id).to_string(),
            requested: quantity,
            held,
        };
        if let Err(held) = ctx.run.holdings.take(entity, resource_id, quantity, save_attribute) {
            return Err(mismatch(held, ctx.data));
        }
        let resource = ctx.data.resource_mut(resource_id)?;
        if !resource.release(quantity) {
            let busy = resource.busy();
            return Err(mismatch(busy, ctx.data));
        }
        let resource_name = resource.name().to_string();

        if let Some(attribute) = save_attribute {
            if !ctx.run.holdings.uses_attribute(entity, attribute) {
                ctx.entity_mut(entity)?.clear_attribute(attribute);
            }
        }
        ctx.trace(SimEvent::Released {
            time: now,
            component: component.clone(),
            entity,
            resource: resource_name,
            quantity,
        });
        if !touched.contains(&resource_id) {
            touched.push(resource_id);
        }
    }

    let granted = rescan(ctx, &touched)?;
    for resource in &touched {
        ctx.data.resource_mut(*resource)?.settle(now);
    }
    for (waiting_entity, seize) in granted {
        ctx.forward(seize, waiting_entity)?;
    }
    ctx.forward(id, entity)
}

/// Offer free capacity to the queues of Seizes subscribed to `resources`
///
/// Returns the granted `(entity, seize)` pairs in grant order; the caller
/// forwards them.
pub fn rescan(ctx: &mut DispatchContext<'_>, resources: &[DefinitionId]) -> SimResult<Vec<(EntityId, ComponentId)>> {
    // Subscribers of every touched resource, higher priority first
    let mut subscribers = Vec::new();
    for resource in resources {
        for subscriber in ctx.data.resource(*resource)?.subscribers() {
            if !subscribers.iter().any(|(s, _)| *s == subscriber.seize) {
                subscribers.push((subscriber.seize, subscriber.priority));
            }
        }
    }
    subscribers.sort_by(|a, b| b.1.cmp(&a.1));

    let components = ctx.components;
    let mut queues: Vec<(DefinitionId, AllocationType)> = Vec::new();
    for (seize_id, _) in &subscribers {
        let Some(seize) = components.seize(*seize_id) else {
            warn!(component = %seize_id, "subscriber is not a seize");
            continue;
        };
        if let Some(queue) = seize.queue {
            if !queues.iter().any(|(q, _)| *q == queue) {
                queues.push((queue, seize.allocation_type));
            }
        }
    }

    let mut granted = Vec::new();
    'scan: loop {
        for (queue_id, _) in &queues {
            let entries = ctx.data.queue(*queue_id)?.entries().to_vec();
            for (index, waiting) in entries.iter().enumerate() {
                let Some(grants) = plan(ctx.data, &waiting.requests)? else {
                    continue;
                };
                let now = ctx.now();
                let removed = ctx.data.queue_mut(*queue_id)?.remove(index, now);
                debug_assert_eq!(removed.as_ref().map(|w| w.entity), Some(waiting.entity));
                let allocation = components
                    .seize(waiting.seize)
                    .map(|s| s.allocation_type)
                    .unwrap_or_default();
                commit(ctx, waiting.seize, waiting.entity, grants, allocation)?;
                granted.push((waiting.entity, waiting.seize));
                continue 'scan;
            }
        }
        break;
    }
    Ok(granted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{DataDefinition, Resource, ResourceSet};

    fn request(target: SeizableTarget, quantity: u32, selection: SelectionRule) -> AllocationRequest {
        AllocationRequest {
            target,
            quantity,
            selection,
            member: 0,
            save_attribute: None,
        }
    }

    fn machines(idle: &[u32]) -> (DataManager, Vec<DefinitionId>, DefinitionId) {
        let mut data = DataManager::new();
        let mut ids = Vec::new();
        for (i, capacity) in idle.iter().enumerate() {
            let id = data
                .insert(DataDefinition::Resource(Resource::new(format!("M{i}"), *capacity)))
                .unwrap();
            ids.push(id);
        }
        let set = data
            .insert(DataDefinition::Set(ResourceSet::new("Machines", ids.clone())))
            .unwrap();
        (data, ids, set)
    }

    #[test]
    fn test_plan_is_all_or_nothing() {
        let (data, ids, _) = machines(&[1, 1]);
        let ok = plan(
            &data,
            &[
                request(SeizableTarget::Resource(ids[0]), 1, SelectionRule::SpecificMember),
                request(SeizableTarget::Resource(ids[1]), 1, SelectionRule::SpecificMember),
            ],
        )
        .unwrap();
        assert_eq!(ok.map(|g| g.len()), Some(2));

        // Second item asks for the unit the first one already planned
        let clash = plan(
            &data,
            &[
                request(SeizableTarget::Resource(ids[0]), 1, SelectionRule::SpecificMember),
                request(SeizableTarget::Resource(ids[0]), 1, SelectionRule::SpecificMember),
            ],
        )
        .unwrap();
        assert!(clash.is_none());
    }

    #[test]
    fn test_largest_remaining_capacity_ties_by_declaration() {
        let (data, ids, set) = machines(&[2, 3, 3]);
        let grants = plan(
            &data,
            &[request(SeizableTarget::Set(set), 1, SelectionRule::LargestRemainingCapacity)],
        )
        .unwrap()
        .unwrap();
        assert_eq!(grants[0].resource, ids[1]);
    }

    #[test]
    fn test_preferred_order_skips_short_members() {
        let (data, ids, set) = machines(&[1, 2, 4]);
        let grants = plan(&data, &[request(SeizableTarget::Set(set), 2, SelectionRule::PreferredOrder)])
            .unwrap()
            .unwrap();
        assert_eq!(grants[0].resource, ids[1]);
    }

    #[test]
    fn test_specific_member_out_of_range_is_an_error() {
        let (data, _, set) = machines(&[1]);
        let mut bad = request(SeizableTarget::Set(set), 1, SelectionRule::SpecificMember);
        bad.member = 5;
        assert!(matches!(
            plan(&data, &[bad]),
            Err(SimulationError::DefinitionNotFound(_))
        ));
    }

    #[test]
    fn test_whole_units() {
        assert_eq!(whole_units(2.4), 2);
        assert_eq!(whole_units(-1.0), 0);
        assert_eq!(whole_units(f64::NAN), 0);
    }
}
