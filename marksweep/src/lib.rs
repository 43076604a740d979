//! Allocation and garbage collection.
//!
//! A precise, non-moving, stop-the-world mark and sweep collector: small
//! objects are pool-allocated from page-backed free lists, big objects live
//! on a simple intrusive list. The runtime supplies two capabilities, an
//! `ObjectModel` that exposes each object's outbound references for precise
//! tracing and a `RootSource` that enumerates the root set, and owns a
//! single `Heap` value through which all allocation flows.

mod bigobject;
mod cellptr;
mod constants;
mod header;
mod heap;
mod memsource;
mod pool;
mod roots;
mod sizeclass;
#[cfg(test)]
mod testsupport;
mod trace;

pub use crate::cellptr::CellPtr;
pub use crate::constants::{MAX_SMALL_SIZE, PAGE_SIZE};
pub use crate::heap::{GcStats, Heap};
pub use crate::memsource::{MemorySource, SysSource};
pub use crate::roots::{RootSource, RootVisitor};
pub use crate::sizeclass::size_class;
pub use crate::trace::{
    ArrayView, BindingView, ClosureView, CompileInfoView, MethodNodeView, MethodTableView,
    ObjectModel, TaskView, TraceKind, Tracer, TypeView,
};
