// ctc — Component Task Compiler
//
// Library root. Compiles declarative container component specifications
// (inputs, outputs, containerized implementation template) into callable
// task factories that produce fully resolved task invocations.

pub mod factory;
pub mod loader;
pub mod resolve;
pub mod spec;
pub mod task;
pub mod typecheck;
pub mod typespec;
