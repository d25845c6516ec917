// SPDX-License-Identifier: AGPL-3.0-only

//! Operand staging memories
//!
//! Two word-addressed memories, one per operand. Each has an independent
//! write pointer (host side) and read pointer (datapath side). Pointers only
//! move by writes, reads and explicit reset commands. Contents survive every
//! reset, so a weight tile can be replayed against a new activation set.

use qnpu_chip::regs;

/// Which staging memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    /// Weight rows (output-stationary) or weight rows bottom-first (weight-stationary)
    Weights,
    /// Activation columns or activation vectors
    Activations,
}

impl std::fmt::Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Weights => write!(f, "weights"),
            Self::Activations => write!(f, "activations"),
        }
    }
}

/// One staging memory with its pointer pair.
#[derive(Debug, Clone)]
pub struct StagingPort {
    words: Vec<u32>,
    write_ptr: usize,
    read_ptr: usize,
}

impl StagingPort {
    fn new(depth: usize) -> Self {
        Self {
            words: vec![0; depth],
            write_ptr: 0,
            read_ptr: 0,
        }
    }

    /// Store `word` at the write pointer. Returns `false` when the memory
    /// is full; the word is not stored and the pointer does not move.
    pub fn write(&mut self, word: u32) -> bool {
        if self.is_full() {
            return false;
        }
        self.words[self.write_ptr] = word;
        self.write_ptr += 1;
        true
    }

    /// Fetch the word at the read pointer and advance it, wrapping at the
    /// memory depth. Reading past the write pointer returns whatever the
    /// memory last held there.
    pub fn read(&mut self) -> u32 {
        let word = self.words.get(self.read_ptr).copied().unwrap_or(0);
        self.read_ptr = (self.read_ptr + 1) % self.words.len().max(1);
        word
    }

    /// No further word can be stored until the write pointer is reset.
    pub fn is_full(&self) -> bool {
        self.write_ptr >= self.words.len()
    }

    /// Words written since the last write-pointer reset.
    pub fn write_ptr(&self) -> usize {
        self.write_ptr
    }

    /// Words read since the last read-pointer reset (modulo depth).
    pub fn read_ptr(&self) -> usize {
        self.read_ptr
    }

    /// Memory depth in words.
    pub fn depth(&self) -> usize {
        self.words.len()
    }

    /// Rewind the write pointer.
    pub fn reset_write(&mut self) {
        self.write_ptr = 0;
    }

    /// Rewind the read pointer.
    pub fn reset_read(&mut self) {
        self.read_ptr = 0;
    }

    /// Packed pointer pair as exposed on `W_PTRS` / `A_PTRS`.
    pub fn pointer_word(&self) -> u32 {
        regs::pack_ptrs(self.write_ptr, self.read_ptr)
    }
}

/// Which staging pointers a command rewinds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PointerResets {
    /// Weight write pointer
    pub weight_write: bool,
    /// Weight read pointer
    pub weight_read: bool,
    /// Activation write pointer
    pub act_write: bool,
    /// Activation read pointer
    pub act_read: bool,
}

impl PointerResets {
    /// Every pointer.
    pub const ALL: Self = Self {
        weight_write: true,
        weight_read: true,
        act_write: true,
        act_read: true,
    };

    /// `true` if nothing is reset.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Both staging memories.
#[derive(Debug, Clone)]
pub struct StagingMemory {
    weights: StagingPort,
    activations: StagingPort,
}

impl StagingMemory {
    /// Create two memories of `depth` words.
    pub fn new(depth: usize) -> Self {
        Self {
            weights: StagingPort::new(depth),
            activations: StagingPort::new(depth),
        }
    }

    /// Shared view of one memory.
    pub fn port(&self, operand: Operand) -> &StagingPort {
        match operand {
            Operand::Weights => &self.weights,
            Operand::Activations => &self.activations,
        }
    }

    /// Mutable view of one memory.
    pub fn port_mut(&mut self, operand: Operand) -> &mut StagingPort {
        match operand {
            Operand::Weights => &mut self.weights,
            Operand::Activations => &mut self.activations,
        }
    }

    /// Apply a set of pointer resets.
    pub fn apply_resets(&mut self, resets: PointerResets) {
        if resets.weight_write {
            self.weights.reset_write();
        }
        if resets.weight_read {
            self.weights.reset_read();
        }
        if resets.act_write {
            self.activations.reset_write();
        }
        if resets.act_read {
            self.activations.reset_read();
        }
    }
}
