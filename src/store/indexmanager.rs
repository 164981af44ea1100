use crate::errors::ForestError;
use crate::types::Result;
use crate::util::{check_index, check_state};

/// A free-list over `[0, capacity)` maintained as a stack of disjoint
/// intervals. Releases adjacent to the top interval are absorbed in place, so
/// for the common in-order churn the list stays a handful of entries.
pub struct IndexManager {
    capacity: usize,
    in_use: usize,
    free_start: Vec<usize>,
    free_end: Vec<usize>,
}

/// Captured state of an [`IndexManager`]; interval order is preserved.
#[derive(Clone, Debug, PartialEq)]
pub struct IndexManagerState {
    pub capacity: usize,
    pub free_start: Vec<usize>,
    pub free_end: Vec<usize>,
}

impl IndexManager {
    pub fn new(capacity: usize) -> Self {
        IndexManager {
            capacity,
            in_use: 1,
            free_start: vec![0],
            free_end: vec![capacity - 1],
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_exhausted(&self) -> bool {
        self.in_use == 0
    }

    pub fn change_capacity(&mut self, new_capacity: usize) {
        if new_capacity > self.capacity {
            if self.free_start.len() == self.in_use {
                self.free_start.push(self.capacity);
                self.free_end.push(new_capacity - 1);
            } else {
                self.free_start[self.in_use] = self.capacity;
                self.free_end[self.in_use] = new_capacity - 1;
            }
            self.in_use += 1;
            self.capacity = new_capacity;
        }
    }

    pub fn take(&mut self) -> Result<usize> {
        if self.is_exhausted() {
            return Err(ForestError::Capacity {
                msg: "no free indices left",
            });
        }
        let answer = self.free_start[self.in_use - 1];
        if answer == self.free_end[self.in_use - 1] {
            self.in_use -= 1;
        } else {
            self.free_start[self.in_use - 1] = answer + 1;
        }
        Ok(answer)
    }

    pub fn release(&mut self, index: usize) -> Result<()> {
        check_index(index < self.capacity, "release outside capacity")?;
        if self.in_use != 0 {
            let start = self.free_start[self.in_use - 1];
            let end = self.free_end[self.in_use - 1];
            if start == index + 1 {
                self.free_start[self.in_use - 1] = index;
                return Ok(());
            } else if end + 1 == index {
                self.free_end[self.in_use - 1] = index;
                return Ok(());
            }
        }
        if self.in_use < self.free_start.len() {
            self.free_start[self.in_use] = index;
            self.free_end[self.in_use] = index;
        } else {
            self.free_start.push(index);
            self.free_end.push(index);
        }
        self.in_use += 1;
        Ok(())
    }

    pub fn used(&self) -> usize {
        let mut free = 0;
        for i in 0..self.in_use {
            free += self.free_end[i] - self.free_start[i] + 1;
        }
        self.capacity - free
    }

    pub fn to_state(&self) -> IndexManagerState {
        IndexManagerState {
            capacity: self.capacity,
            free_start: self.free_start[..self.in_use].to_vec(),
            free_end: self.free_end[..self.in_use].to_vec(),
        }
    }

    pub fn from_state(state: &IndexManagerState) -> Result<Self> {
        check_state(
            state.free_start.len() == state.free_end.len(),
            "mismatched interval lists",
        )?;
        for (&s, &e) in state.free_start.iter().zip(&state.free_end) {
            check_state(s <= e && e < state.capacity, "interval out of range")?;
        }
        Ok(IndexManager {
            capacity: state.capacity,
            in_use: state.free_start.len(),
            free_start: state.free_start.clone(),
            free_end: state.free_end.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_and_release_round_trip() {
        let mut manager = IndexManager::new(4);
        let a = manager.take().unwrap();
        let b = manager.take().unwrap();
        assert_ne!(a, b);
        assert_eq!(manager.used(), 2);
        manager.release(a).unwrap();
        assert_eq!(manager.used(), 1);
        manager.release(b).unwrap();
        assert_eq!(manager.used(), 0);
    }

    #[test]
    fn exhaustion_is_a_capacity_error() {
        let mut manager = IndexManager::new(2);
        manager.take().unwrap();
        manager.take().unwrap();
        assert!(matches!(
            manager.take(),
            Err(ForestError::Capacity { .. })
        ));
    }

    #[test]
    fn release_out_of_range_is_rejected() {
        let mut manager = IndexManager::new(2);
        assert!(matches!(
            manager.release(7),
            Err(ForestError::InvalidIndex { .. })
        ));
    }

    #[test]
    fn state_preserves_interval_order() {
        let mut manager = IndexManager::new(8);
        for _ in 0..5 {
            manager.take().unwrap();
        }
        manager.release(1).unwrap();
        manager.release(3).unwrap();
        let state = manager.to_state();
        let restored = IndexManager::from_state(&state).unwrap();
        assert_eq!(restored.to_state(), state);
    }
}
