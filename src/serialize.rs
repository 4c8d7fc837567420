//! Store and snapshot persistence.
//!
//! rkyv archives written atomically (temp file, sync, rename) and read back
//! through a memory map with validation. Loading re-inserts every value
//! through the checked constructors, so a valid archive with out-of-range
//! content is still rejected.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use log::debug;
use memmap2::Mmap;
use rkyv::ser::serializers::AllocSerializer;
use rkyv::ser::Serializer;
use rkyv::{check_archived_root, Archive, Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::objective::CostSummary;
use crate::partition::PartitionSnapshot;
use crate::rect::{RectCost, Rectangle};
use crate::session::Snapshot;
use crate::store::WeightStore;

// ============================================================================
// SERIALIZABLE DATA TYPES
// ============================================================================

/// One nonzero cell
#[derive(Archive, Deserialize, Serialize)]
#[archive(check_bytes)]
pub struct CellData {
    pub tuple: Vec<usize>,
    pub weight: f64,
}

/// Serializable form of a weight store
#[derive(Archive, Deserialize, Serialize)]
#[archive(check_bytes)]
pub struct StoreData {
    pub dims: Vec<usize>,
    pub cells: Vec<CellData>,
}

/// A rectangle with its cached costs
#[derive(Archive, Deserialize, Serialize)]
#[archive(check_bytes)]
pub struct RectData {
    pub components: Vec<Vec<usize>>,
    pub weight: f64,
    pub info: f64,
    pub loss: f64,
    pub dkl: f64,
}

/// Serializable form of a session snapshot
#[derive(Archive, Deserialize, Serialize)]
#[archive(check_bytes)]
pub struct SnapshotData {
    pub dims: Vec<usize>,
    pub rects: Vec<RectData>,
    pub lambda: f64,
    pub rsize: usize,
    /// weight, info, loss, dkl, ldkl, penalty, cost
    pub aggregates: [f64; 7],
}

impl StoreData {
    pub fn from_store(store: &WeightStore) -> Self {
        let mut cells = Vec::with_capacity(store.edges());
        store.for_each_cell(|tuple, weight| {
            cells.push(CellData {
                tuple: tuple.to_vec(),
                weight,
            })
        });
        Self {
            dims: store.dims().to_vec(),
            cells,
        }
    }

    pub fn to_store(&self) -> Result<WeightStore> {
        let mut store = WeightStore::new(self.dims.clone())?;
        for cell in &self.cells {
            store.insert(&cell.tuple, cell.weight)?;
        }
        Ok(store)
    }
}

impl SnapshotData {
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let rects = snapshot
            .partition
            .rects
            .iter()
            .map(|rect| RectData {
                components: rect.components().to_vec(),
                weight: rect.cost.weight,
                info: rect.cost.info,
                loss: rect.cost.loss,
                dkl: rect.cost.dkl,
            })
            .collect();
        let s = &snapshot.summary;
        Self {
            dims: snapshot.partition.dims.clone(),
            rects,
            lambda: snapshot.lambda,
            rsize: s.rsize,
            aggregates: [s.weight, s.info, s.loss, s.dkl, s.ldkl, s.penalty, s.cost],
        }
    }

    pub fn to_snapshot(&self) -> Result<Snapshot> {
        let rects = self
            .rects
            .iter()
            .map(|data| {
                let mut rect = Rectangle::new(data.components.clone())?;
                rect.cost = RectCost {
                    weight: data.weight,
                    info: data.info,
                    loss: data.loss,
                    dkl: data.dkl,
                };
                Ok(rect)
            })
            .collect::<Result<Vec<_>>>()?;
        let [weight, info, loss, dkl, ldkl, penalty, cost] = self.aggregates;
        Ok(Snapshot {
            partition: PartitionSnapshot {
                dims: self.dims.clone(),
                rects,
            },
            summary: CostSummary {
                rsize: self.rsize,
                weight,
                info,
                loss,
                dkl,
                ldkl,
                penalty,
                cost,
            },
            lambda: self.lambda,
        })
    }
}

// ============================================================================
// SAVE / LOAD FUNCTIONS
// ============================================================================

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let temp_path = path.with_extension("tmp");
    {
        let mut file = File::create(&temp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&temp_path, path)?;
    Ok(())
}

fn map_file(path: &Path) -> Result<Mmap> {
    let file = File::open(path)?;
    let mmap = unsafe { Mmap::map(&file) }?;
    if mmap.is_empty() {
        return Err(Error::Serialization(format!("{} is empty", path.display())));
    }
    Ok(mmap)
}

/// Save a weight store to a file
pub fn save_store(store: &WeightStore, path: &Path) -> Result<()> {
    let data = StoreData::from_store(store);
    let mut serializer = AllocSerializer::<4096>::default();
    serializer
        .serialize_value(&data)
        .map_err(|e| Error::Serialization(format!("failed to serialize store: {e}")))?;
    let bytes = serializer.into_serializer().into_inner();
    write_atomic(path, &bytes)?;
    debug!("saved store ({} cells) to {}", data.cells.len(), path.display());
    Ok(())
}

/// Load a weight store saved by [`save_store`]
pub fn load_store(path: &Path) -> Result<WeightStore> {
    let mmap = map_file(path)?;
    let archived = check_archived_root::<StoreData>(&mmap)
        .map_err(|e| Error::Serialization(format!("failed to validate archive: {e}")))?;
    let data: StoreData = archived
        .deserialize(&mut rkyv::Infallible)
        .map_err(|_| Error::Serialization("failed to deserialize store".into()))?;
    data.to_store()
}

/// Save a session snapshot to a file
pub fn save_snapshot(snapshot: &Snapshot, path: &Path) -> Result<()> {
    let data = SnapshotData::from_snapshot(snapshot);
    let mut serializer = AllocSerializer::<4096>::default();
    serializer
        .serialize_value(&data)
        .map_err(|e| Error::Serialization(format!("failed to serialize snapshot: {e}")))?;
    let bytes = serializer.into_serializer().into_inner();
    write_atomic(path, &bytes)?;
    debug!("saved snapshot ({} rectangles) to {}", data.rects.len(), path.display());
    Ok(())
}

/// Load a snapshot saved by [`save_snapshot`]
pub fn load_snapshot(path: &Path) -> Result<Snapshot> {
    let mmap = map_file(path)?;
    let archived = check_archived_root::<SnapshotData>(&mmap)
        .map_err(|e| Error::Serialization(format!("failed to validate archive: {e}")))?;
    let data: SnapshotData = archived
        .deserialize(&mut rkyv::Infallible)
        .map_err(|_| Error::Serialization("failed to deserialize snapshot".into()))?;
    data.to_snapshot()
}
