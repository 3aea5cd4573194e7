//! Continuation frames.
//!
//! `CONT` pushes a three-slot frame `[return-ip, saved-env, prior]` and points
//! the continuation register at it. Promotion to the heap turns each frame
//! into a [`HeapCont`] that also keeps the live stack segment between its
//! predecessor and itself, so a restored continuation finds its temporaries
//! where it left them. A promoted frame's ip slot is overwritten with the heap
//! copy; walks that reach such a slot stop there.

use std::{fmt, rc::Rc};

use anyhow::Result;

use crate::val::Val;
use crate::vm::error::VmError;

use super::Vm;
use super::env::{EnvRef, HeapEnv};

pub(crate) const FRAME_SLOTS: usize = 3;

pub struct HeapCont {
    pub ip: usize,
    pub env: Option<Rc<HeapEnv>>,
    pub prior: Option<Rc<HeapCont>>,
    /// Stack contents to reinstate at the stack base on restore.
    pub segment: Vec<Val>,
    exit: bool,
}

impl HeapCont {
    pub fn new(ip: usize, env: Option<Rc<HeapEnv>>, prior: Option<Rc<HeapCont>>, segment: Vec<Val>) -> Self {
        Self {
            ip,
            env,
            prior,
            segment,
            exit: false,
        }
    }

    /// Continuation of a computation with no caller: restoring it halts.
    pub fn exit() -> Self {
        Self {
            ip: 0,
            env: None,
            prior: None,
            segment: Vec::new(),
            exit: true,
        }
    }

    #[inline]
    pub fn is_exit(&self) -> bool {
        self.exit
    }

    /// Number of frames in this chain, this one included.
    pub fn depth(&self) -> usize {
        let mut depth = 1;
        let mut cur = self.prior.as_ref();
        while let Some(k) = cur {
            depth += 1;
            cur = k.prior.as_ref();
        }
        depth
    }
}

/// Chains left behind by deep recursion are unlinked iteratively.
impl Drop for HeapCont {
    fn drop(&mut self) {
        let mut next = self.prior.take();
        while let Some(k) = next {
            match Rc::try_unwrap(k) {
                Ok(mut k) => next = k.prior.take(),
                Err(_) => break,
            }
        }
    }
}

impl fmt::Debug for HeapCont {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.exit {
            return f.write_str("HeapCont(exit)");
        }
        f.debug_struct("HeapCont")
            .field("ip", &self.ip)
            .field("env", &self.env.as_ref().map(|e| e.len()))
            .field("segment", &self.segment.len())
            .field("depth", &self.depth())
            .finish()
    }
}

/// Contents of the continuation register.
#[derive(Debug, Clone, Default)]
pub enum ContRef {
    #[default]
    Nil,
    /// Stack index of a frame.
    Stack(usize),
    Heap(Rc<HeapCont>),
}

impl ContRef {
    pub fn from_val(val: &Val) -> Option<Self> {
        match val {
            Val::Nil => Some(ContRef::Nil),
            Val::StackCont(ptr) => Some(ContRef::Stack(*ptr)),
            Val::Cont(k) => Some(ContRef::Heap(Rc::clone(k))),
            _ => None,
        }
    }

    pub fn to_val(&self) -> Val {
        match self {
            ContRef::Nil => Val::Nil,
            ContRef::Stack(ptr) => Val::StackCont(*ptr),
            ContRef::Heap(k) => Val::Cont(Rc::clone(k)),
        }
    }

    #[inline]
    pub fn is_nil(&self) -> bool {
        matches!(self, ContRef::Nil)
    }
}

impl From<Option<Rc<HeapCont>>> for ContRef {
    fn from(k: Option<Rc<HeapCont>>) -> Self {
        match k {
            Some(k) => ContRef::Heap(k),
            None => ContRef::Nil,
        }
    }
}

pub(crate) enum Frame {
    Stack { ip: usize, env: EnvRef, prior: ContRef },
    Heap(Rc<HeapCont>),
}

/// Stack frames reachable from the continuation register, newest first, and
/// what the walk stopped at.
pub(crate) struct FrameWalk {
    pub frames: Vec<usize>,
    pub base: Option<Rc<HeapCont>>,
    /// First stack index not owned by `base`.
    pub floor: usize,
}

impl Vm {
    pub(crate) fn frame(&self, ptr: usize) -> Result<Frame> {
        let ip_slot = self.stack_index(ptr)?;
        if let Val::Cont(k) = ip_slot {
            return Ok(Frame::Heap(Rc::clone(k)));
        }
        let ip = ip_slot
            .as_fixnum()
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| VmError::InvalidContinuation(format!("frame at {ptr} has no return address")))?;
        let env_slot = self.stack_index(ptr + 1)?;
        let env = EnvRef::from_val(env_slot)
            .ok_or_else(|| VmError::InvalidContinuation(format!("frame at {ptr} saved a {}", env_slot.type_name())))?;
        let prior_slot = self.stack_index(ptr + 2)?;
        let prior = ContRef::from_val(prior_slot)
            .ok_or_else(|| VmError::InvalidContinuation(format!("frame at {ptr} links to a {}", prior_slot.type_name())))?;
        Ok(Frame::Stack { ip, env, prior })
    }

    /// Push a frame returning to `ip + offset` and make it current.
    pub fn make_continuation(&mut self, offset: i64) -> Result<()> {
        let target = self.ip as i64 + offset;
        let return_ip = usize::try_from(target).map_err(|_| VmError::CodeOverrun {
            ip: self.ip,
            len: self.code.len(),
        })?;
        self.ensure_room(FRAME_SLOTS)?;
        let ptr = self.sp;
        let env = self.env.to_val();
        let prior = self.cont.to_val();
        self.push_unchecked(Val::Fixnum(return_ip as i64));
        self.push_unchecked(env);
        self.push_unchecked(prior);
        self.cont = ContRef::Stack(ptr);
        tracing::trace!(target: "arcvm::vm::cont", frame = ptr, return_ip, "continuation pushed");
        Ok(())
    }

    /// Return through the continuation register. An empty register halts.
    pub fn restore_continuation(&mut self) -> Result<()> {
        match self.cont.clone() {
            ContRef::Nil => {
                tracing::trace!(target: "arcvm::vm::cont", "continuation chain exhausted, halting");
                self.runnable = false;
                Ok(())
            }
            ContRef::Stack(ptr) => match self.frame(ptr)? {
                Frame::Heap(k) => self.restore_heap_continuation(k),
                Frame::Stack { ip, env, prior } => {
                    self.truncate_to(ptr);
                    self.ip = ip;
                    self.env = env;
                    self.cont = prior;
                    tracing::trace!(target: "arcvm::vm::cont", frame = ptr, ip, "stack continuation restored");
                    Ok(())
                }
            },
            ContRef::Heap(k) => self.restore_heap_continuation(k),
        }
    }

    fn restore_heap_continuation(&mut self, k: Rc<HeapCont>) -> Result<()> {
        if k.is_exit() {
            tracing::trace!(target: "arcvm::vm::cont", "exit continuation restored, halting");
            self.cont = ContRef::Nil;
            self.runnable = false;
            return Ok(());
        }
        if k.segment.len() > self.stack.len() {
            return Err(VmError::StackOverflow {
                capacity: self.stack.len(),
            }
            .into());
        }
        self.truncate_to(0);
        self.stack[..k.segment.len()].clone_from_slice(&k.segment);
        self.sp = k.segment.len();
        self.ip = k.ip;
        self.env = EnvRef::from(k.env.clone());
        self.cont = ContRef::from(k.prior.clone());
        tracing::trace!(
            target: "arcvm::vm::cont",
            ip = k.ip,
            segment = k.segment.len(),
            "heap continuation restored"
        );
        Ok(())
    }

    /// Promote the current continuation to the heap and return it as a
    /// first-class value. With no caller this is the exit continuation.
    pub fn capture_continuation(&mut self) -> Result<Val> {
        self.compact_stack()?;
        let k = match &self.cont {
            ContRef::Heap(k) => Rc::clone(k),
            ContRef::Nil => Rc::new(HeapCont::exit()),
            ContRef::Stack(ptr) => {
                return Err(VmError::InvalidContinuation(format!("frame at {ptr} survived promotion")).into());
            }
        };
        tracing::trace!(target: "arcvm::vm::cont", depth = k.depth(), "continuation captured");
        Ok(Val::Cont(k))
    }

    pub(crate) fn walk_frames(&self) -> Result<FrameWalk> {
        let mut frames = Vec::new();
        let mut cur = self.cont.clone();
        let (base, floor) = loop {
            match cur {
                ContRef::Nil => break (None, 0),
                ContRef::Heap(k) => break (Some(k), 0),
                ContRef::Stack(ptr) => match self.frame(ptr)? {
                    Frame::Heap(k) => break (Some(k), ptr + FRAME_SLOTS),
                    Frame::Stack { prior, .. } => {
                        frames.push(ptr);
                        cur = prior;
                    }
                },
            }
        };
        Ok(FrameWalk { frames, base, floor })
    }

    /// Promote the walked frames oldest first. Each heap frame keeps the
    /// stack between its predecessor and itself, minus slots marked in `dead`.
    pub(crate) fn heapify_frames(&mut self, walk: FrameWalk, dead: &[bool]) -> Result<Option<Rc<HeapCont>>> {
        let FrameWalk {
            frames,
            base: mut prior,
            mut floor,
        } = walk;
        let mut scratch = Vec::new();
        for ptr in frames.into_iter().rev() {
            let Frame::Stack { ip, env, .. } = self.frame(ptr)? else {
                return Err(VmError::InvalidContinuation(format!("frame at {ptr} promoted twice")).into());
            };
            let env = self.heapify_env_chain(&env, &mut scratch)?;
            let segment = (floor..ptr)
                .filter(|&i| !dead.get(i).copied().unwrap_or(false))
                .map(|i| self.stack[i].clone())
                .collect();
            let k = Rc::new(HeapCont::new(ip, env, prior.take(), segment));
            self.stack[ptr] = Val::Cont(Rc::clone(&k));
            self.stats.frames_heapified += 1;
            prior = Some(k);
            floor = ptr + FRAME_SLOTS;
        }
        Ok(prior)
    }
}
