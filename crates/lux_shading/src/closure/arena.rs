use glam::Vec3;
use lux_math::{spectrum, Spectrum};

use super::{ClosureRecord, ClosureType, ExtraData, CLOSURE_WEIGHT_CUTOFF};

/// Index of a primary closure record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClosureHandle(pub(crate) usize);

impl ClosureHandle {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Index of the first slot of an extra-data block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExtraHandle(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq)]
enum Slot {
    Free,
    Closure(ClosureRecord),
    Extra(ExtraData),
    /// Continuation of a multi-slot extra block.
    ExtraTail,
}

/// Fixed-capacity closure storage for one shading point.
///
/// Primary records fill the slot buffer from the front. Extra payloads are
/// carved from the back and grow toward the front, so both share one budget:
/// `len() + remaining() + extra_slots() == capacity()` at all times.
#[derive(Debug, Clone)]
pub struct ClosureArena {
    slots: Vec<Slot>,
    num_closure: usize,
    num_closure_left: usize,
}

impl ClosureArena {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![Slot::Free; capacity],
            num_closure: 0,
            num_closure_left: capacity,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of live primary records.
    #[inline]
    pub fn len(&self) -> usize {
        self.num_closure
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.num_closure == 0
    }

    /// Slots still available to either primary or extra allocations.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.num_closure_left
    }

    /// Slots consumed by extra payloads.
    #[inline]
    pub fn extra_slots(&self) -> usize {
        self.capacity() - self.num_closure - self.num_closure_left
    }

    /// Drop every record and reset the budget.
    pub fn clear(&mut self) {
        self.slots.fill(Slot::Free);
        self.num_closure = 0;
        self.num_closure_left = self.capacity();
    }

    /// Allocate a primary record with the given type and weight.
    ///
    /// Returns `None` once the budget is exhausted.
    pub fn alloc_closure(
        &mut self,
        ty: ClosureType,
        n: Vec3,
        weight: Spectrum,
    ) -> Option<ClosureHandle> {
        if self.num_closure_left == 0 {
            log::trace!("closure arena full, dropping {ty}");
            return None;
        }

        let index = self.num_closure;
        self.slots[index] = Slot::Closure(ClosureRecord::new(ty, n, weight));
        self.num_closure += 1;
        self.num_closure_left -= 1;
        Some(ClosureHandle(index))
    }

    /// Allocate a scattering closure.
    ///
    /// Negative weight components are clamped to zero and the sample weight
    /// is the absolute channel average. Negligible or non-finite weights
    /// allocate nothing.
    pub fn alloc_bsdf(
        &mut self,
        ty: ClosureType,
        n: Vec3,
        weight: Spectrum,
    ) -> Option<ClosureHandle> {
        let weight = spectrum::max_zero(weight);
        let sample_weight = spectrum::average(weight).abs();

        // Negated comparison also rejects NaN.
        if !(sample_weight >= CLOSURE_WEIGHT_CUTOFF) || !sample_weight.is_finite() {
            return None;
        }

        let handle = self.alloc_closure(ty, n, weight)?;
        if let Some(record) = self.closure_mut(handle) {
            record.sample_weight = sample_weight;
        }
        Some(handle)
    }

    /// Reserve extra storage for the most recently allocated closure.
    ///
    /// When the payload does not fit, the last primary record is rolled back
    /// so no half-initialized closure stays live.
    pub fn alloc_extra(&mut self, payload: ExtraData) -> Option<ExtraHandle> {
        let num_extra = payload.chunks();
        if num_extra > self.num_closure_left {
            if self.num_closure > 0 {
                self.num_closure -= 1;
                self.num_closure_left += 1;
                self.slots[self.num_closure] = Slot::Free;
                log::debug!(
                    "no room for {num_extra} extra slot(s), rolled back closure {}",
                    self.num_closure
                );
            }
            return None;
        }

        self.num_closure_left -= num_extra;
        let start = self.num_closure + self.num_closure_left;
        self.slots[start] = Slot::Extra(payload);
        for slot in &mut self.slots[start + 1..start + num_extra] {
            *slot = Slot::ExtraTail;
        }
        Some(ExtraHandle(start))
    }

    /// Allocate extra storage and link it to `owner`.
    pub fn attach_extra(&mut self, owner: ClosureHandle, payload: ExtraData) -> Option<ExtraHandle> {
        let handle = self.alloc_extra(payload)?;
        let record = self.closure_mut(owner)?;
        record.extra = Some(handle);
        Some(handle)
    }

    pub fn closure(&self, handle: ClosureHandle) -> Option<&ClosureRecord> {
        if handle.0 >= self.num_closure {
            return None;
        }
        match &self.slots[handle.0] {
            Slot::Closure(record) => Some(record),
            _ => None,
        }
    }

    pub fn closure_mut(&mut self, handle: ClosureHandle) -> Option<&mut ClosureRecord> {
        if handle.0 >= self.num_closure {
            return None;
        }
        match &mut self.slots[handle.0] {
            Slot::Closure(record) => Some(record),
            _ => None,
        }
    }

    pub fn extra(&self, handle: ExtraHandle) -> Option<&ExtraData> {
        match self.slots.get(handle.0) {
            Some(Slot::Extra(data)) => Some(data),
            _ => None,
        }
    }

    /// Live records in allocation order.
    pub fn closures(&self) -> impl Iterator<Item = (ClosureHandle, &ClosureRecord)> + '_ {
        self.slots[..self.num_closure]
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| match slot {
                Slot::Closure(record) => Some((ClosureHandle(i), record)),
                _ => None,
            })
    }

    pub fn closures_mut(&mut self) -> impl Iterator<Item = &mut ClosureRecord> + '_ {
        self.slots[..self.num_closure]
            .iter_mut()
            .filter_map(|slot| match slot {
                Slot::Closure(record) => Some(record),
                _ => None,
            })
    }

    /// Remove closures rejected by `keep`, compacting the survivors in order.
    ///
    /// Extra payloads stay where they are, so handles into them remain valid.
    pub fn retain(&mut self, mut keep: impl FnMut(&ClosureRecord) -> bool) {
        let mut write = 0;
        for read in 0..self.num_closure {
            let kept = match &self.slots[read] {
                Slot::Closure(record) => keep(record),
                _ => false,
            };
            if kept {
                self.slots.swap(write, read);
                write += 1;
            }
        }
        for slot in &mut self.slots[write..self.num_closure] {
            *slot = Slot::Free;
        }
        self.num_closure_left += self.num_closure - write;
        self.num_closure = write;
    }
}
