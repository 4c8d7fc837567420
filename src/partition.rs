//! Partitions and their register index.
//!
//! A [`Partition`] owns its rectangles in a slab of slots addressed by
//! [`RectId`]. Deleted slots are recycled. Alongside the slab it keeps:
//!
//! - `members`: the sorted list of live handles
//! - `registers[d][i]`: the sorted list of live handles whose component on
//!   dimension `d` contains index value `i`
//! - `rsize`: the rectangle count
//!
//! Every mutation goes through [`Partition::apply_edit`] (or a full reset),
//! which updates all three together. [`Partition::reg_of_r`] re-derives the
//! registers from scratch and must always agree with the incremental ones.

use std::ops::Index as IndexOp;

use log::debug;

use crate::error::{Error, Result};
use crate::id::{Index, RectId};
use crate::rect::{self, Rectangle};
use crate::sorted;
use crate::store::WeightStore;

/// Owned copy of a partition's rectangles, with their cached costs
#[derive(Clone, Debug, PartialEq)]
pub struct PartitionSnapshot {
    pub dims: Vec<usize>,
    pub rects: Vec<Rectangle>,
}

impl PartitionSnapshot {
    pub fn len(&self) -> usize {
        self.rects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    /// True iff both hold the same boxes, in any order
    pub fn same_rectangles(&self, other: &PartitionSnapshot) -> bool {
        if self.dims != other.dims || self.rects.len() != other.rects.len() {
            return false;
        }
        let mut ours: Vec<&[Vec<Index>]> = self.rects.iter().map(Rectangle::components).collect();
        let mut theirs: Vec<&[Vec<Index>]> = other.rects.iter().map(Rectangle::components).collect();
        ours.sort_unstable();
        theirs.sort_unstable();
        ours == theirs
    }
}

#[derive(Clone, Debug)]
pub struct Partition {
    dims: Vec<usize>,
    slots: Vec<Option<Rectangle>>,
    free: Vec<usize>,
    members: Vec<RectId>,
    registers: Vec<Vec<Vec<RectId>>>,
    rsize: usize,
}

impl Partition {
    /// An empty partition over the grid `dims`
    pub fn new(dims: Vec<usize>) -> Result<Self> {
        if dims.is_empty() {
            return Err(Error::Dimension("a partition needs at least one dimension".into()));
        }
        if let Some(d) = dims.iter().position(|&n| n == 0) {
            return Err(Error::Dimension(format!("dimension {d} has an empty domain")));
        }
        if rect::cell_count(&dims).is_none() {
            return Err(Error::Dimension(format!("grid {dims:?} has too many cells")));
        }
        let registers = dims.iter().map(|&n| vec![Vec::new(); n]).collect();
        Ok(Self {
            dims,
            slots: Vec::new(),
            free: Vec::new(),
            members: Vec::new(),
            registers,
            rsize: 0,
        })
    }

    /// An empty partition over the grid of `store`
    pub fn for_store(store: &WeightStore) -> Result<Self> {
        Self::new(store.dims().to_vec())
    }

    /// A partition holding `rects`, with registers built
    pub fn from_rectangles(dims: Vec<usize>, rects: Vec<Rectangle>) -> Result<Self> {
        let mut partition = Self::new(dims)?;
        for rect in rects {
            partition.validate(&rect)?;
            partition.insert(rect);
        }
        Ok(partition)
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn arity(&self) -> usize {
        self.dims.len()
    }

    /// Cached rectangle count
    pub fn rsize(&self) -> usize {
        self.rsize
    }

    /// Number of live handles
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Sorted live handles
    pub fn ids(&self) -> &[RectId] {
        &self.members
    }

    pub fn get(&self, id: RectId) -> Option<&Rectangle> {
        self.slots.get(id.index()).and_then(Option::as_ref)
    }

    /// Live rectangles in handle order
    pub fn iter(&self) -> impl Iterator<Item = (RectId, &Rectangle)> + '_ {
        self.members
            .iter()
            .filter_map(|&id| self.get(id).map(|rect| (id, rect)))
    }

    /// Mutable access to every occupied slot, in handle order
    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = (RectId, &mut Rectangle)> + '_ {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(slot, rect)| rect.as_mut().map(|r| (RectId::from_usize(slot), r)))
    }

    /// Register line for index value `index` on dimension `dim`
    pub fn register(&self, dim: usize, index: Index) -> &[RectId] {
        &self.registers[dim][index]
    }

    /// All register lines, `[dim][index]`
    pub fn registers(&self) -> &[Vec<Vec<RectId>>] {
        &self.registers
    }

    // ========================================================================
    // MUTATION
    // ========================================================================

    fn validate(&self, rect: &Rectangle) -> Result<()> {
        if rect.arity() != self.dims.len() {
            return Err(Error::Dimension(format!(
                "rectangle of arity {} in a partition of arity {}",
                rect.arity(),
                self.dims.len()
            )));
        }
        for (d, component) in rect.components().iter().enumerate() {
            if component.last().is_some_and(|&i| i >= self.dims[d]) {
                return Err(Error::Dimension(format!(
                    "rectangle {rect} leaves the grid on dimension {d}"
                )));
            }
        }
        Ok(())
    }

    /// Store `rect` in a slot and index it
    fn insert(&mut self, rect: Rectangle) -> RectId {
        let id = match self.free.pop() {
            Some(slot) => RectId::from_usize(slot),
            None => {
                self.slots.push(None);
                RectId::from_usize(self.slots.len() - 1)
            }
        };
        for (d, component) in rect.components().iter().enumerate() {
            for &i in component {
                sorted::insert(&mut self.registers[d][i], id);
            }
        }
        self.slots[id.index()] = Some(rect);
        sorted::insert(&mut self.members, id);
        self.rsize += 1;
        id
    }

    /// Unindex and release the rectangle at `id`
    fn remove(&mut self, id: RectId) -> Option<Rectangle> {
        let rect = self.slots.get_mut(id.index())?.take()?;
        for (d, component) in rect.components().iter().enumerate() {
            for &i in component {
                sorted::remove(&mut self.registers[d][i], &id);
            }
        }
        sorted::remove(&mut self.members, &id);
        self.free.push(id.index());
        self.rsize -= 1;
        Some(rect)
    }

    /// Add a rectangle after checking it fits the grid
    pub fn add(&mut self, rect: Rectangle) -> Result<RectId> {
        self.validate(&rect)?;
        Ok(self.insert(rect))
    }

    /// Replace the rectangles `to_del` by `new_rects`, keeping members,
    /// registers and `rsize` in step. Returns the handles of the new
    /// rectangles, in order.
    pub fn apply_edit(&mut self, to_del: &[RectId], new_rects: Vec<Rectangle>) -> Vec<RectId> {
        for &id in to_del {
            let removed = self.remove(id);
            debug_assert!(removed.is_some(), "{id} is not in the partition");
        }
        new_rects.into_iter().map(|rect| self.insert(rect)).collect()
    }

    // ========================================================================
    // (RE)INITIALIZATION
    // ========================================================================

    /// Drop every rectangle and empty the registers
    pub fn clean_r(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.members.clear();
        self.rsize = 0;
        self.clean_registers();
    }

    /// Empty every register line, leaving the rectangles in place
    pub fn clean_registers(&mut self) {
        for lines in &mut self.registers {
            for line in lines.iter_mut() {
                line.clear();
            }
        }
    }

    /// Reset to a single rectangle covering the whole grid
    pub fn macro_partition(&mut self) {
        self.clean_r();
        self.insert(Rectangle::full(&self.dims));
        debug!("macro partition over {:?}", self.dims);
    }

    /// Reset to one singleton rectangle per nonzero cell of `store`
    pub fn micro_partition(&mut self, store: &WeightStore) -> Result<()> {
        if store.dims() != self.dims.as_slice() {
            return Err(Error::Dimension(format!(
                "store grid {:?} does not match partition grid {:?}",
                store.dims(),
                self.dims
            )));
        }
        self.clean_r();
        let mut cells = Vec::with_capacity(store.edges());
        store.for_each_cell(|tuple, _| cells.push(Rectangle::singleton(tuple)));
        for rect in cells {
            self.insert(rect);
        }
        debug!("micro partition: {} rectangles", self.rsize);
        Ok(())
    }

    /// Reset to one singleton rectangle per grid cell
    pub fn micro_grid(&mut self) {
        self.clean_r();
        let full = Rectangle::full(&self.dims);
        for cell in full.cells() {
            self.insert(Rectangle::singleton(&cell));
        }
        debug!("micro grid partition: {} rectangles", self.rsize);
    }

    /// Rebuild every register line from the live rectangles
    pub fn reg_of_r(&mut self) {
        self.clean_registers();
        for &id in &self.members {
            let Some(rect) = self.slots[id.index()].as_ref() else {
                continue;
            };
            for (d, component) in rect.components().iter().enumerate() {
                for &i in component {
                    // members are visited in increasing order, so lines stay sorted
                    self.registers[d][i].push(id);
                }
            }
        }
        debug!("rebuilt registers for {} rectangles", self.members.len());
    }

    /// The rectangle set derived from the registers of dimension 0
    pub fn rebuilt_members(&self) -> Vec<RectId> {
        self.registers[0]
            .iter()
            .fold(Vec::new(), |acc, line| sorted::union(&acc, line))
    }

    /// Reset the rectangle set to the union of the dimension-0 registers.
    ///
    /// Slots no register refers to are released.
    pub fn build_r(&mut self) {
        let rebuilt = self.rebuilt_members();
        for slot in 0..self.slots.len() {
            let id = RectId::from_usize(slot);
            if self.slots[slot].is_some() && rebuilt.binary_search(&id).is_err() {
                self.slots[slot] = None;
                self.free.push(slot);
            }
        }
        self.rsize = rebuilt.len();
        self.members = rebuilt;
        debug!("rebuilt partition from registers: {} rectangles", self.rsize);
    }

    /// Owned copy of the current rectangles
    pub fn copy_partition(&self) -> PartitionSnapshot {
        let rects = self
            .iter()
            .map(|(_, rect)| {
                let mut rect = rect.clone();
                rect.clear_check();
                rect
            })
            .collect();
        PartitionSnapshot {
            dims: self.dims.clone(),
            rects,
        }
    }

    /// Replace the current rectangles by a snapshot's, registers rebuilt
    pub fn restore(&mut self, snapshot: &PartitionSnapshot) -> Result<()> {
        if snapshot.dims != self.dims {
            return Err(Error::Dimension(format!(
                "snapshot grid {:?} does not match partition grid {:?}",
                snapshot.dims, self.dims
            )));
        }
        for rect in &snapshot.rects {
            self.validate(rect)?;
        }
        self.clean_r();
        for rect in &snapshot.rects {
            self.insert(rect.clone());
        }
        debug!("restored partition: {} rectangles", self.rsize);
        Ok(())
    }
}

impl IndexOp<RectId> for Partition {
    type Output = Rectangle;

    fn index(&self, id: RectId) -> &Rectangle {
        match self.get(id) {
            Some(rect) => rect,
            None => panic!("{id} is not in the partition"),
        }
    }
}
