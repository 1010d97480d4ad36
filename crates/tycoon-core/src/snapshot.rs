//! Entity-table snapshots for desync diagnosis.
//!
//! A snapshot stores the byte image of every live entity slot together with
//! the park parameters and the tick/seed it was taken at. Snapshots live in
//! a fixed-capacity ring; [`compare`] diffs two of them slot by slot and
//! field by field, ignoring render-only fields.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use tracing::debug;

use crate::context::SimulationContext;
use crate::entity::{EntityKind, FieldDescriptor};
use crate::fixed::Ticks;
use crate::park::{ParameterDiff, ParkParameters};
use crate::serialize::{DeserializeError, SerializeError};

/// Default ring capacity.
pub const DEFAULT_SNAPSHOT_CAPACITY: usize = 32;

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Byte image of one occupied entity slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySlotImage {
    pub index: u16,
    pub kind: EntityKind,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct GameStateSnapshot {
    pub tick: Ticks,
    pub seed: u64,
    linked: bool,
    entity_data: Vec<u8>,
    parameter_data: Vec<u8>,
}

impl GameStateSnapshot {
    /// True once a tick and seed have been attached.
    pub fn is_linked(&self) -> bool {
        self.linked
    }

    pub fn entity_data(&self) -> &[u8] {
        &self.entity_data
    }

    pub fn slots(&self) -> Result<Vec<EntitySlotImage>, DeserializeError> {
        if self.entity_data.is_empty() {
            return Ok(Vec::new());
        }
        bitcode::deserialize(&self.entity_data).map_err(|e| DeserializeError::Decode(e.to_string()))
    }

    pub fn parameters(&self) -> Result<ParkParameters, DeserializeError> {
        if self.parameter_data.is_empty() {
            return Ok(ParkParameters::default());
        }
        bitcode::deserialize(&self.parameter_data).map_err(|e| DeserializeError::Decode(e.to_string()))
    }
}

/// Serialize every live entity slot and the park parameters into `snapshot`.
pub fn capture(snapshot: &mut GameStateSnapshot, ctx: &SimulationContext) -> Result<(), SerializeError> {
    let slots: Vec<EntitySlotImage> = ctx
        .entities
        .iter()
        .map(|(id, entity)| EntitySlotImage {
            index: id.0,
            kind: entity.kind(),
            bytes: entity.image(),
        })
        .collect();
    snapshot.entity_data = bitcode::serialize(&slots).map_err(|e| SerializeError::Encode(e.to_string()))?;
    snapshot.parameter_data =
        bitcode::serialize(&ctx.park.parameters()).map_err(|e| SerializeError::Encode(e.to_string()))?;
    Ok(())
}

/// Attach the tick and RNG seed the snapshot represents.
pub fn link_snapshot(snapshot: &mut GameStateSnapshot, tick: Ticks, seed: u64) {
    snapshot.tick = tick;
    snapshot.seed = seed;
    snapshot.linked = true;
}

// ---------------------------------------------------------------------------
// SnapshotStore
// ---------------------------------------------------------------------------

/// A fixed-capacity ring of snapshots. The oldest is evicted when full.
#[derive(Debug)]
pub struct SnapshotStore {
    entries: Vec<Option<GameStateSnapshot>>,
    /// Write position (wraps around).
    head: usize,
    len: usize,
    /// Total snapshots ever created (including evicted).
    total_taken: u64,
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new(DEFAULT_SNAPSHOT_CAPACITY)
    }
}

impl SnapshotStore {
    /// A capacity of 0 is clamped to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: (0..capacity).map(|_| None).collect(),
            head: 0,
            len: 0,
            total_taken: 0,
        }
    }

    /// Allocate the newest slot, evicting the oldest when full.
    pub fn create_snapshot(&mut self) -> &mut GameStateSnapshot {
        let slot = self.head;
        self.head = (self.head + 1) % self.capacity();
        if self.len < self.capacity() {
            self.len += 1;
        }
        self.total_taken += 1;
        self.entries[slot] = Some(GameStateSnapshot::default());
        self.entries[slot].get_or_insert_with(GameStateSnapshot::default)
    }

    /// Create, capture and link a snapshot of `ctx` at its current tick.
    pub fn capture_current(&mut self, ctx: &SimulationContext) -> Result<&GameStateSnapshot, SerializeError> {
        let snapshot = self.create_snapshot();
        capture(snapshot, ctx)?;
        link_snapshot(snapshot, ctx.current_ticks, ctx.rng.state());
        debug!(tick = ctx.current_ticks, "snapshot captured");
        Ok(snapshot)
    }

    /// Newest linked snapshot taken at `tick`.
    pub fn get_linked_snapshot(&self, tick: Ticks) -> Option<&GameStateSnapshot> {
        (0..self.len)
            .rev()
            .filter_map(|i| self.get(i))
            .find(|s| s.linked && s.tick == tick)
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn total_taken(&self) -> u64 {
        self.total_taken
    }

    /// 0 = oldest, len-1 = newest.
    pub fn get(&self, index: usize) -> Option<&GameStateSnapshot> {
        if index >= self.len {
            return None;
        }
        let start = if self.len < self.capacity() { 0 } else { self.head };
        let actual_index = (start + index) % self.capacity();
        self.entries[actual_index].as_ref()
    }

    pub fn latest(&self) -> Option<&GameStateSnapshot> {
        if self.len == 0 {
            return None;
        }
        self.get(self.len - 1)
    }

    pub fn clear(&mut self) {
        for entry in &mut self.entries {
            *entry = None;
        }
        self.head = 0;
        self.len = 0;
    }
}

// ---------------------------------------------------------------------------
// Comparison
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareStatus {
    Added,
    Removed,
    Equal,
    Modified,
}

/// A differing field. Values are the little-endian field bytes widened to
/// i64, sign-extended for signed fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDiff {
    pub name: &'static str,
    pub offset: usize,
    pub width: usize,
    pub before: i64,
    pub after: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityComparison {
    pub index: u16,
    /// Kind in the comparison snapshot, or in the base when removed.
    pub kind: EntityKind,
    pub status: CompareStatus,
    pub fields: Vec<FieldDiff>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompareData {
    pub tick_base: Ticks,
    pub tick_cmp: Ticks,
    pub seed_base: u64,
    pub seed_cmp: u64,
    /// One entry per slot occupied in either snapshot, in index order.
    pub entities: Vec<EntityComparison>,
    pub parameters: Vec<ParameterDiff>,
}

impl CompareData {
    fn with_status(&self, status: CompareStatus) -> impl Iterator<Item = &EntityComparison> {
        self.entities.iter().filter(move |e| e.status == status)
    }

    pub fn added(&self) -> impl Iterator<Item = &EntityComparison> {
        self.with_status(CompareStatus::Added)
    }

    pub fn removed(&self) -> impl Iterator<Item = &EntityComparison> {
        self.with_status(CompareStatus::Removed)
    }

    pub fn modified(&self) -> impl Iterator<Item = &EntityComparison> {
        self.with_status(CompareStatus::Modified)
    }

    pub fn equal_count(&self) -> usize {
        self.with_status(CompareStatus::Equal).count()
    }

    pub fn is_identical(&self) -> bool {
        self.parameters.is_empty() && self.entities.iter().all(|e| e.status == CompareStatus::Equal)
    }

    /// Human-readable report: header, parameter changes, then one line per
    /// non-equal entity with its differing fields indented beneath.
    pub fn write_report<W: Write>(&self, mut w: W) -> io::Result<()> {
        writeln!(w, "Snapshot comparison")?;
        writeln!(w, "  base: tick {} seed {:016x}", self.tick_base, self.seed_base)?;
        writeln!(w, "  cmp:  tick {} seed {:016x}", self.tick_cmp, self.seed_cmp)?;

        if !self.parameters.is_empty() {
            writeln!(w, "Park parameters:")?;
            for p in &self.parameters {
                writeln!(w, "  {}: {} -> {}", p.name, p.before, p.after)?;
            }
        }

        writeln!(
            w,
            "Entities: {} added, {} removed, {} modified, {} equal",
            self.added().count(),
            self.removed().count(),
            self.modified().count(),
            self.equal_count()
        )?;
        for entry in self.entities.iter().filter(|e| e.status != CompareStatus::Equal) {
            let label = match entry.status {
                CompareStatus::Added => "ADDED",
                CompareStatus::Removed => "REMOVED",
                CompareStatus::Modified => "MODIFIED",
                CompareStatus::Equal => "EQUAL",
            };
            writeln!(w, "  [{label}] #{} {}", entry.index, entry.kind.name())?;
            for f in &entry.fields {
                writeln!(
                    w,
                    "    {} (offset {}, width {}): {} -> {}",
                    f.name, f.offset, f.width, f.before, f.after
                )?;
            }
        }
        Ok(())
    }
}

/// Write `data`'s report to `path`, creating parent directories.
pub fn log_compare_data_to_file(path: &Path, data: &CompareData) -> io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let file = fs::File::create(path)?;
    let mut w = BufWriter::new(file);
    data.write_report(&mut w)?;
    w.flush()
}

fn compare_fields(descriptors: &[FieldDescriptor], base: &[u8], cmp: &[u8]) -> Vec<FieldDiff> {
    descriptors
        .iter()
        .filter(|f| !f.render_only)
        .filter_map(|f| {
            let range = f.offset..f.offset + f.width;
            if base.get(range.clone()) == cmp.get(range) {
                return None;
            }
            Some(FieldDiff {
                name: f.name,
                offset: f.offset,
                width: f.width,
                before: f.read(base).unwrap_or(0),
                after: f.read(cmp).unwrap_or(0),
            })
        })
        .collect()
}

/// Classify every slot occupied in either snapshot.
pub fn compare(base: &GameStateSnapshot, cmp: &GameStateSnapshot) -> Result<CompareData, DeserializeError> {
    let base_slots = base.slots()?;
    let cmp_slots = cmp.slots()?;
    let base_by_index: BTreeMap<u16, &EntitySlotImage> = base_slots.iter().map(|s| (s.index, s)).collect();
    let cmp_by_index: BTreeMap<u16, &EntitySlotImage> = cmp_slots.iter().map(|s| (s.index, s)).collect();
    let indices: BTreeSet<u16> = base_by_index.keys().chain(cmp_by_index.keys()).copied().collect();

    let descriptors: Vec<Vec<FieldDescriptor>> = EntityKind::ALL.iter().map(|k| k.descriptors()).collect();

    let mut entities = Vec::with_capacity(indices.len());
    for index in indices {
        let entry = match (base_by_index.get(&index), cmp_by_index.get(&index)) {
            (None, Some(c)) => EntityComparison {
                index,
                kind: c.kind,
                status: CompareStatus::Added,
                fields: Vec::new(),
            },
            (Some(b), None) => EntityComparison {
                index,
                kind: b.kind,
                status: CompareStatus::Removed,
                fields: Vec::new(),
            },
            (Some(b), Some(c)) if b.kind != c.kind => EntityComparison {
                index,
                kind: c.kind,
                status: CompareStatus::Modified,
                fields: vec![FieldDiff {
                    name: "kind",
                    offset: 0,
                    width: 1,
                    before: b.kind as i64,
                    after: c.kind as i64,
                }],
            },
            (Some(b), Some(c)) => {
                let fields = compare_fields(&descriptors[c.kind as usize], &b.bytes, &c.bytes);
                let status = if fields.is_empty() {
                    CompareStatus::Equal
                } else {
                    CompareStatus::Modified
                };
                EntityComparison {
                    index,
                    kind: c.kind,
                    status,
                    fields,
                }
            }
            (None, None) => continue,
        };
        entities.push(entry);
    }

    Ok(CompareData {
        tick_base: base.tick,
        tick_cmp: cmp.tick,
        seed_base: base.seed,
        seed_cmp: cmp.seed,
        entities,
        parameters: base.parameters()?.diff(&cmp.parameters()?),
    })
}
