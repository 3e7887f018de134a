use core::fmt;

/// Typed errors for fallible map operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapError {
    /// The allocator could not provide a table of the requested capacity.
    AllocationFailed {
        /// Capacity, in slots, of the table that could not be allocated.
        capacity: usize,
    },
    /// Doubling the table would overflow the addressable capacity.
    CapacityOverflow,
}

impl fmt::Display for MapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapError::AllocationFailed { capacity } => {
                write!(f, "failed to allocate a table of {} slots", capacity)
            }
            MapError::CapacityOverflow => {
                write!(f, "table capacity overflow")
            }
        }
    }
}

impl core::error::Error for MapError {}
