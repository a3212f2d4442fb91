//! Bitrate zones for the encoder.
//!
//! Frames that stay on screen longer deserve more bits, and commercial
//! breaks fewer. Rates are computed per block of frames and then merged
//! into a small number of zones.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::ops::Range;

use log::debug;

/// Frames per rate block.
const BLOCK_FRAMES: usize = 8;
const ZONES_PER_HOUR: f64 = 30.0;
const MIN_ZONE_CAP: usize = 8;
const MAX_ZONE_CAP: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BitrateZone {
    pub start_frame: usize,
    pub end_frame: usize,
    /// Multiplier on the base bitrate.
    pub bitrate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BitrateParams {
    /// Multiplier applied inside commercial zones.
    pub bitrate_cm: f64,
    /// How strongly frame duration scales the rate, 0 ignores it.
    pub time_factor: f64,
    /// Allowed merge error relative to the total bit mass.
    pub cost_limit: f64,
}

impl Default for BitrateParams {
    fn default() -> Self {
        Self {
            bitrate_cm: 0.5,
            time_factor: 0.5,
            cost_limit: 0.15,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Block {
    start: usize,
    end: usize,
    rate: f64,
}

impl Block {
    fn weight(&self) -> f64 {
        (self.end - self.start) as f64
    }
}

#[derive(Debug, Clone)]
struct Zone {
    first_block: usize,
    end_block: usize,
    weight: f64,
    mass: f64,
    cost: f64,
    prev: Option<usize>,
    next: Option<usize>,
    alive: bool,
    version: u32,
}

impl Zone {
    fn mean(&self) -> f64 {
        self.mass / self.weight
    }
}

/// Absolute deviation of `blocks` from their weighted mean.
fn deviation(blocks: &[Block], mean: f64) -> f64 {
    blocks.iter().map(|b| (b.rate - mean).abs() * b.weight()).sum()
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    cost: f64,
    left: usize,
    left_version: u32,
    right: usize,
    right_version: u32,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    // BinaryHeap pops the maximum: cheapest first, leftmost on ties.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.left.cmp(&self.left))
    }
}

fn rate_blocks(durations: &[f64], cm_zones: &[Range<usize>], params: &BitrateParams) -> Vec<Block> {
    (0..durations.len())
        .step_by(BLOCK_FRAMES)
        .map(|start| {
            let end = (start + BLOCK_FRAMES).min(durations.len());
            let avg = durations[start..end].iter().sum::<f64>() / (end - start) as f64;
            let mut rate = 1.0 + (avg - 1.0) * params.time_factor;
            let mid = (start + end) / 2;
            if cm_zones.iter().any(|z| z.contains(&mid)) {
                rate *= params.bitrate_cm;
            }
            Block { start, end, rate }
        })
        .collect()
}

/// Computes bitrate zones over a run of frames.
///
/// `durations` are per-frame display durations in periods of `fps`, and
/// `cm_zones` frame ranges of commercials.
pub fn make_bitrate_zones(
    durations: &[f64],
    cm_zones: &[Range<usize>],
    fps_num: u32,
    fps_den: u32,
    params: &BitrateParams,
) -> Vec<BitrateZone> {
    let blocks = rate_blocks(durations, cm_zones, params);
    if blocks.is_empty() {
        return Vec::new();
    }

    let fps = fps_num as f64 / fps_den.max(1) as f64;
    let hours = durations.len() as f64 / fps / 3600.0;
    let cap = ((hours * ZONES_PER_HOUR).ceil() as usize).clamp(MIN_ZONE_CAP, MAX_ZONE_CAP);

    let mut zones: Vec<Zone> = blocks
        .iter()
        .enumerate()
        .map(|(i, b)| Zone {
            first_block: i,
            end_block: i + 1,
            weight: b.weight(),
            mass: b.rate * b.weight(),
            cost: 0.0,
            prev: i.checked_sub(1),
            next: (i + 1 < blocks.len()).then_some(i + 1),
            alive: true,
            version: 0,
        })
        .collect();

    let candidate = |zones: &[Zone], left: usize, right: usize| {
        let (l, r) = (&zones[left], &zones[right]);
        let mean = (l.mass + r.mass) / (l.weight + r.weight);
        let merged = deviation(&blocks[l.first_block..r.end_block], mean);
        Candidate {
            cost: merged - l.cost - r.cost,
            left,
            left_version: l.version,
            right,
            right_version: r.version,
        }
    };

    let mut heap: BinaryHeap<Candidate> = (1..zones.len())
        .map(|i| candidate(&zones, i - 1, i))
        .collect();
    let total_mass: f64 = zones.iter().map(|z| z.mass).sum();
    let mut total_cost = 0.0;
    let mut live = zones.len();

    while let Some(c) = heap.pop() {
        let (l, r) = (&zones[c.left], &zones[c.right]);
        if !l.alive || !r.alive || l.version != c.left_version || r.version != c.right_version {
            continue;
        }
        if live <= cap && (total_cost + c.cost) / total_mass > params.cost_limit {
            break;
        }

        total_cost += c.cost;
        live -= 1;
        let right = zones[c.right].clone();
        let left = &mut zones[c.left];
        left.end_block = right.end_block;
        left.weight += right.weight;
        left.mass += right.mass;
        left.cost = deviation(&blocks[left.first_block..left.end_block], left.mean());
        left.next = right.next;
        left.version += 1;
        zones[c.right].alive = false;
        if let Some(next) = right.next {
            zones[next].prev = Some(c.left);
            heap.push(candidate(&zones, c.left, next));
        }
        if let Some(prev) = zones[c.left].prev {
            heap.push(candidate(&zones, prev, c.left));
        }
    }

    debug!(
        "{} blocks merged into {} bitrate zones, cost {:.3}",
        blocks.len(),
        live,
        total_cost / total_mass
    );
    zones
        .iter()
        .filter(|z| z.alive)
        .map(|z| BitrateZone {
            start_frame: blocks[z.first_block].start,
            end_frame: blocks[z.end_block - 1].end,
            bitrate: z.mean(),
        })
        .collect()
}
