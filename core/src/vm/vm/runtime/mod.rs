mod apply;
mod exec;
mod math;
mod opcode;
