//! Stack reclamation.
//!
//! Runs when a push finds the stack full. Every stack scope reachable from the
//! registers or from a live frame moves to the heap, every frame becomes a
//! heap continuation owning its slice of the stack, and what is left above
//! the newest frame (arguments and temporaries of the call in progress) is
//! slid down to the stack base.

use std::mem;

use anyhow::Result;

use crate::val::Val;

use super::Vm;
use super::cont::{ContRef, FRAME_SLOTS};
use super::env::EnvRef;

pub(crate) struct Migration {
    /// Per stack slot: owned by a promoted scope and no longer needed.
    pub dead: Vec<bool>,
    /// Start of the region above the newest frame.
    pub top_start: usize,
}

impl Vm {
    /// Move all live stack structure to the heap, leaving the stack contents
    /// in place. Registers and frame slots are rewritten to the heap copies.
    pub(crate) fn migrate_stack(&mut self) -> Result<Migration> {
        let mut regions = Vec::new();

        let env = self.env.clone();
        self.env = EnvRef::from(self.heapify_env_chain(&env, &mut regions)?);

        let walk = self.walk_frames()?;
        for &ptr in &walk.frames {
            let saved = EnvRef::from_val(self.stack_index(ptr + 1)?).unwrap_or_default();
            let promoted = self.heapify_env_chain(&saved, &mut regions)?;
            self.stack[ptr + 1] = EnvRef::from(promoted).to_val();
        }

        let mut dead = vec![false; self.sp];
        for region in regions {
            let end = region.end.min(dead.len());
            if region.start < end {
                dead[region.start..end].fill(true);
            }
        }

        let top_start = match &self.cont {
            ContRef::Stack(ptr) => ptr + FRAME_SLOTS,
            _ => 0,
        };
        if matches!(self.cont, ContRef::Stack(_)) {
            self.cont = ContRef::from(self.heapify_frames(walk, &dead)?);
        }
        Ok(Migration { dead, top_start })
    }

    /// Migrate, then slide the live slots above the newest frame down to the
    /// stack base. Afterwards nothing on the stack is referenced by address.
    pub(crate) fn compact_stack(&mut self) -> Result<()> {
        let Migration { dead, top_start } = self.migrate_stack()?;
        let live: Vec<Val> = (top_start..self.sp)
            .filter(|&i| !dead[i])
            .map(|i| mem::take(&mut self.stack[i]))
            .collect();
        self.truncate_to(0);
        for val in live {
            self.push_unchecked(val);
        }
        Ok(())
    }

    /// Free stack space by promoting everything live to the heap and
    /// compacting the remainder. Observable state is unchanged.
    pub fn reclaim_stack(&mut self) -> Result<()> {
        let sp_before = self.sp;
        let envs_before = self.stats.envs_heapified;
        let frames_before = self.stats.frames_heapified;

        self.compact_stack()?;

        self.stats.stack_reclaims += 1;
        tracing::debug!(
            target: "arcvm::vm::stackgc",
            sp_before,
            sp_after = self.sp,
            envs = self.stats.envs_heapified - envs_before,
            frames = self.stats.frames_heapified - frames_before,
            "stack reclaimed"
        );
        Ok(())
    }
}
