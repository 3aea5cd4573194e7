mod cont;
mod env;
mod runtime;
mod stack;
mod stackgc;

use std::rc::Rc;

use anyhow::Result;

use crate::val::{Arity, Primitive, Symbol, Val};
use crate::vm::bytecode::Program;
use crate::vm::config::VmConfig;
use crate::vm::context::GlobalEnv;
use crate::vm::error::VmError;

pub use cont::{ContRef, HeapCont};
pub use env::{EnvRef, HeapEnv};

/// Counters maintained while running; cheap enough to keep always on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VmStats {
    pub instructions: u64,
    pub stack_reclaims: u64,
    pub envs_heapified: u64,
    pub frames_heapified: u64,
}

/// The virtual machine: one operand stack, one register file, one global table.
///
/// Registers are the stack pointer, instruction pointer, accumulator, the
/// current environment and continuation, and the argument count of the call
/// in progress. Each `Vm` owns its state outright; several machines may share
/// a [`Program`] since the code and literal tables are never mutated.
pub struct Vm {
    stack: Vec<Val>,
    sp: usize,
    ip: usize,
    acc: Val,
    env: EnvRef,
    cont: ContRef,
    argc: usize,
    runnable: bool,
    loaded: bool,
    code: Rc<[u8]>,
    literals: Rc<[Val]>,
    globals: GlobalEnv,
    config: VmConfig,
    stats: VmStats,
}

impl Vm {
    pub fn new() -> Self {
        Self::from_config(VmConfig::default())
    }

    pub fn with_stack_size(stack_size: usize) -> Self {
        Self::from_config(VmConfig {
            stack_size,
            ..VmConfig::default()
        })
    }

    pub fn with_config(config: VmConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_config(config))
    }

    fn from_config(config: VmConfig) -> Self {
        Self {
            stack: vec![Val::Nil; config.stack_size],
            sp: 0,
            ip: 0,
            acc: Val::Nil,
            env: EnvRef::Nil,
            cont: ContRef::Nil,
            argc: 0,
            runnable: true,
            loaded: false,
            code: Rc::from(Vec::new()),
            literals: Rc::from(Vec::new()),
            globals: GlobalEnv::new(),
            config,
            stats: VmStats::default(),
        }
    }

    /// Install a program and reset the register file (globals survive).
    ///
    /// Loading replaces whatever was running; a machine stopped by an error
    /// can be reloaded and run again.
    pub fn load(&mut self, code: impl Into<Rc<[u8]>>, entry: usize, literals: impl Into<Rc<[Val]>>) {
        self.code = code.into();
        self.literals = literals.into();
        self.truncate_to(0);
        self.ip = entry;
        self.acc = Val::Nil;
        self.env = EnvRef::Nil;
        self.cont = ContRef::Nil;
        self.argc = 0;
        self.runnable = true;
        self.loaded = true;
        tracing::debug!(
            target: "arcvm::vm::load",
            code_len = self.code.len(),
            literals = self.literals.len(),
            entry,
            "program loaded"
        );
    }

    pub fn load_program(&mut self, program: &Program) {
        self.load(Rc::clone(&program.code), program.entry, Rc::clone(&program.literals));
    }

    #[inline]
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn halt(&mut self) {
        self.runnable = false;
    }

    #[inline]
    pub fn runnable(&self) -> bool {
        self.runnable
    }

    #[inline]
    pub fn acc(&self) -> &Val {
        &self.acc
    }

    #[inline]
    pub fn set_acc(&mut self, val: Val) {
        self.acc = val;
    }

    #[inline]
    pub fn ip(&self) -> usize {
        self.ip
    }

    #[inline]
    pub fn set_ip(&mut self, ip: usize) {
        self.ip = ip;
    }

    #[inline]
    pub fn sp(&self) -> usize {
        self.sp
    }

    #[inline]
    pub fn stack_capacity(&self) -> usize {
        self.stack.len()
    }

    #[inline]
    pub fn argc(&self) -> usize {
        self.argc
    }

    #[inline]
    pub fn set_argc(&mut self, argc: usize) -> usize {
        self.argc = argc;
        argc
    }

    #[inline]
    pub fn env(&self) -> &EnvRef {
        &self.env
    }

    /// Replace the environment register. Only nil and environment references are accepted.
    pub fn set_env(&mut self, env: Val) -> Result<()> {
        self.env = EnvRef::from_val(&env).ok_or_else(|| VmError::type_error("set-env", "environment", &env))?;
        Ok(())
    }

    #[inline]
    pub fn cont(&self) -> &ContRef {
        &self.cont
    }

    /// Replace the continuation register. Anything but nil or a continuation
    /// is rejected with `InvalidContinuation`.
    pub fn set_cont(&mut self, cont: Val) -> Result<()> {
        self.cont = ContRef::from_val(&cont)
            .ok_or_else(|| VmError::InvalidContinuation(format!("{} in continuation register", cont.type_name())))?;
        Ok(())
    }

    #[inline]
    pub fn stats(&self) -> VmStats {
        self.stats
    }

    #[inline]
    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    pub fn literal(&self, index: i64) -> Result<Val> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.literals.get(i))
            .cloned()
            .ok_or_else(|| {
                VmError::LiteralIndexOutOfRange {
                    index,
                    len: self.literals.len(),
                }
                .into()
            })
    }

    #[inline]
    pub fn globals(&self) -> &GlobalEnv {
        &self.globals
    }

    /// Add or replace a global binding.
    pub fn bind(&mut self, sym: Symbol, value: Val) -> Val {
        self.globals.bind(sym, value)
    }

    pub fn intern(&self, name: &str) -> Symbol {
        self.globals.intern(name)
    }

    pub fn value_of(&self, sym: &Symbol) -> Result<Val> {
        self.globals.value_of(sym)
    }

    pub fn bind_primitive(&mut self, prim: Primitive) -> Val {
        let sym = self.intern(&prim.name);
        self.bind(sym, Val::Primitive(Rc::new(prim)))
    }

    /// Enforce `arity` against the argument count of the call in progress.
    pub fn argcheck(&self, arity: Arity) -> Result<()> {
        if arity.accepts(self.argc) {
            Ok(())
        } else {
            Err(VmError::ArityError {
                expected: arity,
                got: self.argc,
            }
            .into())
        }
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}
