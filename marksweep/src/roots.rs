use crate::cellptr::CellPtr;

/// Supplies the initial marking set: whatever the runtime considers
/// reachable without traversal. In practice that is the active tasks, the
/// interned modules, the builtin singletons and the interned type cache.
pub trait RootSource {
    /// Hand every root to the visitor. Must not allocate from the collected
    /// heap.
    fn enumerate_roots(&self, visitor: &mut dyn RootVisitor);
}

/// Callback handed to `RootSource::enumerate_roots`. The collector's tracer
/// implements this; it is the only sanctioned way into `Tracer::mark` from
/// root enumeration.
pub trait RootVisitor {
    /// A value root, traced through the object model.
    fn visit(&mut self, obj: CellPtr);

    /// A module root: the module cell and its binding records are marked
    /// directly, binding values and declared types are traced.
    fn visit_module(&mut self, module: CellPtr);
}
