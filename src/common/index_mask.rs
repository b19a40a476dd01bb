//! This module contains tools for working with indices as a mask of boolean values. Filters and
//! selections produce masks, and masks turn back into index lists or sub-slices.

use crate::{CloudError, Result};

#[derive(Clone, Debug, PartialEq)]
pub struct IndexMask {
    mask: Vec<bool>,
}

impl IndexMask {
    /// Create a new IndexMask with the specified length and initial value.
    ///
    /// # Arguments
    ///
    /// * `len`: the length of the mask
    /// * `value`: the initial value for each index in the mask
    ///
    /// returns: IndexMask
    pub fn new(len: usize, value: bool) -> Self {
        IndexMask {
            mask: vec![value; len],
        }
    }

    /// Create a mask of length `len` where only the listed indices are set. Fails with
    /// `IndexOutOfRange` if any index is not less than `len`. Duplicate indices are allowed.
    pub fn try_from_indices(len: usize, indices: &[usize]) -> Result<Self> {
        let mut mask = Self::new(len, false);
        for &i in indices {
            if i >= len {
                return Err(CloudError::IndexOutOfRange { index: i, len });
            }
            mask.mask[i] = true;
        }
        Ok(mask)
    }

    /// Get the index values stored in the mask as a vector of usize, in ascending order.
    pub fn to_indices(&self) -> Vec<usize> {
        self.mask
            .iter()
            .enumerate()
            .filter_map(|(i, &v)| if v { Some(i) } else { None })
            .collect()
    }

    /// Modify the mask so that all values are the opposite of their current value.
    pub fn flip(&mut self) {
        for value in &mut self.mask {
            *value = !*value;
        }
    }

    /// Set the value at the specified index
    pub fn set(&mut self, index: usize, value: bool) {
        if index < self.mask.len() {
            self.mask[index] = value;
        }
    }

    /// Get the value at the specified index.
    pub fn get(&self, index: usize) -> bool {
        self.mask[index]
    }

    /// Get the length of the mask.
    pub fn len(&self) -> usize {
        self.mask.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mask.is_empty()
    }

    /// The number of indices which are set.
    pub fn count(&self) -> usize {
        self.mask.iter().filter(|v| **v).count()
    }

    /// Clone the items whose index is set in the mask, preserving their order. The slice must
    /// have the same length as the mask.
    pub fn clone_indices_of<T: Clone>(&self, items: &[T]) -> Result<Vec<T>> {
        if items.len() != self.mask.len() {
            return Err(CloudError::InconsistentData {
                reason: format!(
                    "mask of length {} applied to {} items",
                    self.mask.len(),
                    items.len()
                ),
            });
        }

        Ok(items
            .iter()
            .zip(self.mask.iter())
            .filter_map(|(item, &keep)| if keep { Some(item.clone()) } else { None })
            .collect())
    }
}

impl From<Vec<bool>> for IndexMask {
    fn from(mask: Vec<bool>) -> Self {
        Self { mask }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flip_inverts_selection() {
        let mut mask = IndexMask::try_from_indices(5, &[1, 3]).unwrap();
        mask.flip();
        assert_eq!(mask.to_indices(), vec![0, 2, 4]);
        assert_eq!(mask.count(), 3);
    }

    #[test]
    fn out_of_range_index_fails() {
        let result = IndexMask::try_from_indices(3, &[0, 3]);
        assert_eq!(
            result,
            Err(CloudError::IndexOutOfRange { index: 3, len: 3 })
        );
    }

    #[test]
    fn clone_indices_keeps_order() {
        let mask = IndexMask::from(vec![true, false, true, true]);
        let items = mask.clone_indices_of(&["a", "b", "c", "d"]).unwrap();
        assert_eq!(items, vec!["a", "c", "d"]);
    }
}
