use super::{Walker, auto_walk_length, paint, rasterize_line};
use crate::{
    algos::{
        StageKind, StageStatus, WorkBudget,
        dungeon_builder::{GenContext, Stage},
    },
    constants::MAX_MST_LOOP_EDGES,
    types::{Coord, RoomId},
};

use std::collections::{BTreeSet, HashMap};

use rand::seq::SliceRandom;
use tracing::{Level, event};

/// Spatial hash over waypoint indices. With a bucket side of `size`, every
/// waypoint within `size` of a point sits in that point's bucket or one of
/// the eight around it.
struct WaypointBuckets {
    size: u32,
    cells: HashMap<(u32, u32), Vec<usize>>,
}

impl WaypointBuckets {
    fn new(size: u32) -> Self {
        WaypointBuckets {
            size: size.max(1),
            cells: HashMap::new(),
        }
    }

    fn key(&self, coord: Coord) -> (u32, u32) {
        (coord.col / self.size, coord.row / self.size)
    }

    fn insert(&mut self, idx: usize, coord: Coord) {
        let key = self.key(coord);
        self.cells.entry(key).or_default().push(idx);
    }

    fn near(&self, coord: Coord) -> impl Iterator<Item = usize> + '_ {
        let (col, row) = self.key(coord);

        (row.saturating_sub(1)..=row.saturating_add(1))
            .flat_map(move |r| (col.saturating_sub(1)..=col.saturating_add(1)).map(move |c| (c, r)))
            .filter_map(move |key| self.cells.get(&key))
            .flat_map(|ids| ids.iter().copied())
    }
}

enum Phase {
    Sample {
        walker: Option<Walker>,
        spawned: u32,
        taken: u32,
    },
    // First come first kept, one sampled waypoint per pass
    Thin {
        sampled: Vec<Coord>,
        next: usize,
        buckets: WaypointBuckets,
    },
    // Prim over the thinned waypoints, resumed one vertex at a time
    Span {
        in_tree: Vec<bool>,
        best: Vec<(u32, usize)>,
        added: usize,
    },
    Loops {
        next: usize,
        buckets: WaypointBuckets,
        tree: BTreeSet<(usize, usize)>,
        candidates: Vec<(usize, usize)>,
    },
    Carve { next_edge: usize, room_id: RoomId },
}

/// Wandering walks drop waypoints, the waypoints get joined by a minimum
/// spanning tree plus a few short loop edges, and the edges are carved.
pub(super) struct WanderingMstCarver {
    phase: Phase,
    waypoints: Vec<Coord>,
    edges: Vec<(usize, usize)>,
}

/// Keeps `waypoint` unless a kept one equals it or lies closer than
/// `separation`. Returns the comparisons made.
fn keep_if_clear(
    kept: &mut Vec<Coord>,
    buckets: &mut WaypointBuckets,
    waypoint: Coord,
    separation: u32,
) -> u32 {
    let mut compared = 0;
    let crowded = buckets.near(waypoint).any(|idx| {
        compared += 1;
        let other = kept[idx];
        other == waypoint || other.distance(&waypoint) < separation
    });

    if !crowded {
        buckets.insert(kept.len(), waypoint);
        kept.push(waypoint);
    }

    compared
}

impl WanderingMstCarver {
    pub fn new() -> Self {
        WanderingMstCarver {
            phase: Phase::Sample {
                walker: None,
                spawned: 0,
                taken: 0,
            },
            waypoints: Vec::new(),
            edges: Vec::new(),
        }
    }

    fn start_span(&self) -> Phase {
        let count = self.waypoints.len();
        let mut in_tree = vec![false; count];
        let mut best = vec![(u32::MAX, 0); count];

        if count > 0 {
            in_tree[0] = true;
            for (idx, waypoint) in self.waypoints.iter().enumerate().skip(1) {
                best[idx] = (self.waypoints[0].distance(waypoint), 0);
            }
        }

        Phase::Span {
            in_tree,
            best,
            added: 1.min(count),
        }
    }

    fn start_loops(&self, max_length: u32) -> Phase {
        let mut buckets = WaypointBuckets::new(max_length);
        for (idx, waypoint) in self.waypoints.iter().enumerate() {
            buckets.insert(idx, *waypoint);
        }

        let tree = self
            .edges
            .iter()
            .map(|&(a, b)| (a.min(b), a.max(b)))
            .collect();

        Phase::Loops {
            next: 0,
            buckets,
            tree,
            candidates: Vec::new(),
        }
    }
}

impl Stage for WanderingMstCarver {
    fn kind(&self) -> StageKind {
        StageKind::Corridors
    }

    fn step(&mut self, ctx: &mut GenContext, budget: &mut WorkBudget) -> StageStatus {
        let corridors = ctx.config.corridors;

        loop {
            if budget.is_exhausted() {
                return StageStatus::Yield;
            }

            match &mut self.phase {
                Phase::Sample {
                    walker,
                    spawned,
                    taken,
                } => match walker {
                    Some(current) if current.steps_left > 0 => {
                        current.advance(&ctx.grid, corridors.wander, corridors.min_straight, &mut ctx.rng);
                        *taken += 1;

                        if *taken % corridors.waypoint_interval == 0 {
                            self.waypoints.push(current.position);
                        }
                        budget.spend(1);
                    }
                    _ if *spawned < corridors.walkers => {
                        let fresh = Walker::spawn(ctx.grid.play_area(), auto_walk_length(ctx), &mut ctx.rng);
                        self.waypoints.push(fresh.position);

                        *walker = Some(fresh);
                        *spawned += 1;
                        *taken = 0;
                        budget.spend(1);
                    }
                    _ => {
                        self.phase = Phase::Thin {
                            sampled: std::mem::take(&mut self.waypoints),
                            next: 0,
                            buckets: WaypointBuckets::new(corridors.waypoint_separation),
                        };
                    }
                },
                Phase::Thin {
                    sampled,
                    next,
                    buckets,
                } => {
                    let Some(&waypoint) = sampled.get(*next) else {
                        event!(
                            Level::DEBUG,
                            "Thinned {} waypoints down to {}",
                            sampled.len(),
                            self.waypoints.len()
                        );
                        self.phase = self.start_span();
                        continue;
                    };

                    *next += 1;
                    let compared =
                        keep_if_clear(&mut self.waypoints, buckets, waypoint, corridors.waypoint_separation);
                    budget.spend(compared + 1);
                }
                Phase::Span {
                    in_tree,
                    best,
                    added,
                } => {
                    if *added >= in_tree.len() {
                        self.phase = self.start_loops(corridors.loop_edge_max_length);
                        continue;
                    }

                    // One outer Prim iteration per pass, O(n) each
                    let Some(next) = (0..in_tree.len())
                        .filter(|&idx| !in_tree[idx])
                        .min_by_key(|&idx| (best[idx].0, idx))
                    else {
                        self.phase = self.start_loops(corridors.loop_edge_max_length);
                        continue;
                    };

                    in_tree[next] = true;
                    *added += 1;
                    self.edges.push((best[next].1, next));

                    for idx in 0..in_tree.len() {
                        if !in_tree[idx] {
                            let distance = self.waypoints[next].distance(&self.waypoints[idx]);
                            if distance < best[idx].0 {
                                best[idx] = (distance, next);
                            }
                        }
                    }

                    budget.spend(in_tree.len() as u32);
                }
                Phase::Loops {
                    next,
                    buckets,
                    tree,
                    candidates,
                } => {
                    if let Some(&waypoint) = self.waypoints.get(*next) {
                        let a = *next;
                        *next += 1;

                        let mut compared = 1;
                        for b in buckets.near(waypoint) {
                            compared += 1;
                            if b > a
                                && waypoint.distance(&self.waypoints[b]) <= corridors.loop_edge_max_length
                                && !tree.contains(&(a, b))
                            {
                                candidates.push((a, b));
                            }
                        }

                        budget.spend(compared);
                        continue;
                    }

                    let tree_edges = self.edges.len();
                    let wanted = ((self.waypoints.len() as f64 * corridors.loop_edge_fraction).ceil() as u32)
                        .min(corridors.max_loop_edges)
                        .min(MAX_MST_LOOP_EDGES) as usize;

                    // Bucket order depends on the hash layout, the shuffle must not
                    candidates.sort_unstable();
                    candidates.shuffle(&mut ctx.rng);
                    self.edges.extend(candidates.drain(..).take(wanted));

                    event!(
                        Level::DEBUG,
                        "Spanning tree has {} edges, added {} loop edges",
                        tree_edges,
                        self.edges.len() - tree_edges
                    );

                    let room_id = ctx.add_room(true);
                    if let Some(first) = self.waypoints.first() {
                        paint(ctx, *first, room_id);
                    }

                    self.phase = Phase::Carve {
                        next_edge: 0,
                        room_id,
                    };
                }
                Phase::Carve { next_edge, room_id } => {
                    let Some(&(from, to)) = self.edges.get(*next_edge) else {
                        return StageStatus::Complete;
                    };

                    let room_id = *room_id;
                    *next_edge += 1;

                    for coord in rasterize_line(self.waypoints[from], self.waypoints[to]) {
                        budget.spend(paint(ctx, coord, room_id));
                    }
                }
            }
        }
    }
}
