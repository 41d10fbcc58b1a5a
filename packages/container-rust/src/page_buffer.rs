//! Page buffer: one fetched window of row identifiers.
//!
//! Cursor moves and indexed access hit the buffer first and only fall
//! back to a query when the requested row is outside it. A buffer is
//! valid for exactly one scan direction; flipping direction or
//! invalidating the container discards it.

use entitygrid_core::ordering::ScanDirection;
use entitygrid_core::types::Id;

/// A contiguous run of row identifiers in scan order.
///
/// `first_index` is the scan-space index of `ids[0]`: for a forward
/// scan that equals the row's index in the ascending view, for a
/// backward scan it counts from the other end (see [`view_index`]).
#[derive(Debug, Clone)]
pub struct PageBuffer {
    scan: ScanDirection,
    first_index: usize,
    ids: Vec<Id>,
}

impl PageBuffer {
    #[must_use]
    pub fn new(scan: ScanDirection, first_index: usize, ids: Vec<Id>) -> Self {
        Self {
            scan,
            first_index,
            ids,
        }
    }

    #[must_use]
    pub fn scan(&self) -> ScanDirection {
        self.scan
    }

    #[must_use]
    pub fn first_index(&self) -> usize {
        self.first_index
    }

    #[must_use]
    pub fn ids(&self) -> &[Id] {
        &self.ids
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// The identifier at an absolute scan-space index, when buffered.
    #[must_use]
    pub fn get(&self, scan_index: usize) -> Option<&Id> {
        let offset = scan_index.checked_sub(self.first_index)?;
        self.ids.get(offset)
    }

    /// Zero-based position of an identifier within the buffer.
    #[must_use]
    pub fn position_of(&self, id: &Id) -> Option<usize> {
        self.ids.iter().position(|candidate| candidate == id)
    }

    /// Absolute scan-space index of an identifier, when buffered.
    #[must_use]
    pub fn scan_index_of(&self, id: &Id) -> Option<usize> {
        self.position_of(id).map(|pos| self.first_index + pos)
    }

    /// The identifier immediately after `id` in scan order.
    ///
    /// `None` when `id` is not buffered or sits at the buffer's end;
    /// the end of the buffer says nothing about the end of the view.
    #[must_use]
    pub fn successor_of(&self, id: &Id) -> Option<&Id> {
        let pos = self.position_of(id)?;
        self.ids.get(pos + 1)
    }
}

/// Converts a scan-space index into an index in the ascending view.
///
/// Forward scans already count in view order. Position `i` of a
/// backward scan over `total` rows is view row `total - 1 - i`.
/// `None` when the index falls outside the view.
#[must_use]
pub fn view_index(scan: ScanDirection, scan_index: usize, total: usize) -> Option<usize> {
    if scan_index >= total {
        return None;
    }
    Some(match scan {
        ScanDirection::Forward => scan_index,
        ScanDirection::Backward => total - 1 - scan_index,
    })
}
