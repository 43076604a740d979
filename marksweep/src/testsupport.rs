//! Shared fixtures for the in-crate tests: a memory source that counts what
//! the collector acquires and releases, a hand-built cell arena for tracer
//! tests, and a mock runtime implementing the two capability traits.

use std::ptr::NonNull;

use fnv::FnvHashMap;
use pagealloc::BlockError;

use crate::cellptr::CellPtr;
use crate::constants::WORD;
use crate::memsource::{MemorySource, SysSource};
use crate::roots::{RootSource, RootVisitor};
use crate::trace::{
    ArrayView, BindingView, ClosureView, CompileInfoView, MethodNodeView, MethodTableView,
    ObjectModel, TaskView, TraceKind, TypeView,
};

/// Forwards to the real OS source while recording traffic, so tests can
/// observe whole-page release and big-object frees.
pub(crate) struct CountingSource {
    inner: SysSource,
    pub(crate) pages_acquired: usize,
    pub(crate) pages_released: usize,
    pub(crate) big_acquired: usize,
    /// Addresses handed back, in release order.
    pub(crate) big_released: Vec<usize>,
}

impl CountingSource {
    pub(crate) fn new() -> CountingSource {
        CountingSource {
            inner: SysSource,
            pages_acquired: 0,
            pages_released: 0,
            big_acquired: 0,
            big_released: Vec::new(),
        }
    }
}

impl MemorySource for CountingSource {
    fn page(&mut self) -> Result<NonNull<u8>, BlockError> {
        let page = self.inner.page()?;
        self.pages_acquired += 1;
        Ok(page)
    }

    unsafe fn release_page(&mut self, page: NonNull<u8>) {
        self.pages_released += 1;
        self.inner.release_page(page);
    }

    fn big_block(&mut self, size: usize) -> Result<NonNull<u8>, BlockError> {
        let block = self.inner.big_block(size)?;
        self.big_acquired += 1;
        Ok(block)
    }

    unsafe fn release_big(&mut self, block: NonNull<u8>) {
        self.big_released.push(block.as_ptr() as usize);
        self.inner.release_big(block);
    }
}

/// Backing store for hand-built cells in tracer tests. Each cell is one
/// boxed allocation of a zeroed header word plus payload words, so header
/// operations behave exactly as they do on pool cells.
pub(crate) struct CellArena {
    cells: Vec<Box<[usize]>>,
}

impl CellArena {
    pub(crate) fn new() -> CellArena {
        CellArena { cells: Vec::new() }
    }

    pub(crate) fn cell(&mut self, payload_words: usize) -> CellPtr {
        let mut buffer = vec![0usize; 1 + payload_words].into_boxed_slice();
        let payload = unsafe { (buffer.as_mut_ptr() as *mut u8).add(WORD) };
        self.cells.push(buffer);
        CellPtr::from_raw(payload)
    }
}

/// Reference structure of one mock object, mirroring the tracer's view types.
pub(crate) enum Shape {
    Bits,
    Array {
        shape: Option<CellPtr>,
        buffer: Option<CellPtr>,
        elems: Vec<Option<CellPtr>>,
        elem_refs: bool,
    },
    Tuple(Vec<Option<CellPtr>>),
    CompileInfo(CompileInfoView),
    Closure(ClosureView),
    TypeName { primary: Option<CellPtr> },
    Type { kind: TraceKind, view: TypeView },
    MethodTable {
        defs: Option<CellPtr>,
        cache: Option<CellPtr>,
        unary: Vec<Option<CellPtr>>,
    },
    MethodNode(MethodNodeView),
    Task {
        view: TaskView,
        frame_roots: Vec<CellPtr>,
    },
    Instance(Vec<Option<CellPtr>>),
}

/// Mock runtime: an address-keyed table of object shapes, a module binding
/// table, and a root list. Objects with no registered shape are plain bits,
/// which is what bulk allocation tests want.
pub(crate) struct TestRuntime {
    shapes: FnvHashMap<usize, Shape>,
    modules: FnvHashMap<usize, Vec<BindingView>>,
    bits: Shape,
    pub(crate) roots: Vec<CellPtr>,
    pub(crate) module_roots: Vec<CellPtr>,
}

impl TestRuntime {
    pub(crate) fn new() -> TestRuntime {
        TestRuntime {
            shapes: FnvHashMap::default(),
            modules: FnvHashMap::default(),
            bits: Shape::Bits,
            roots: Vec::new(),
            module_roots: Vec::new(),
        }
    }

    pub(crate) fn register(&mut self, obj: CellPtr, shape: Shape) {
        self.shapes.insert(obj.addr(), shape);
    }

    pub(crate) fn register_module(&mut self, module: CellPtr, bindings: Vec<BindingView>) {
        self.modules.insert(module.addr(), bindings);
    }

    pub(crate) fn root(&mut self, obj: CellPtr) {
        self.roots.push(obj);
    }

    fn shape(&self, obj: CellPtr) -> &Shape {
        self.shapes.get(&obj.addr()).unwrap_or(&self.bits)
    }
}

impl ObjectModel for TestRuntime {
    fn classify(&self, obj: CellPtr) -> TraceKind {
        match self.shape(obj) {
            Shape::Bits => TraceKind::Bits,
            Shape::Array { .. } => TraceKind::Array,
            Shape::Tuple(_) => TraceKind::Tuple,
            Shape::CompileInfo(_) => TraceKind::CompileInfo,
            Shape::Closure(_) => TraceKind::Closure,
            Shape::TypeName { .. } => TraceKind::TypeName,
            Shape::Type { kind, .. } => *kind,
            Shape::MethodTable { .. } => TraceKind::MethodTable,
            // chain nodes are marked directly, never dispatched
            Shape::MethodNode(_) => TraceKind::Bits,
            Shape::Task { .. } => TraceKind::Task,
            Shape::Instance(_) => TraceKind::Instance,
        }
    }

    fn array_view(&self, obj: CellPtr) -> ArrayView {
        match self.shape(obj) {
            Shape::Array {
                shape,
                buffer,
                elems,
                elem_refs,
            } => ArrayView {
                shape: *shape,
                buffer: *buffer,
                len: elems.len(),
                elem_refs: *elem_refs,
            },
            _ => panic!("not an array"),
        }
    }

    fn array_elem(&self, obj: CellPtr, index: usize) -> Option<CellPtr> {
        match self.shape(obj) {
            Shape::Array { elems, .. } => elems[index],
            _ => panic!("not an array"),
        }
    }

    fn tuple_len(&self, obj: CellPtr) -> usize {
        match self.shape(obj) {
            Shape::Tuple(elems) => elems.len(),
            _ => panic!("not a tuple"),
        }
    }

    fn tuple_elem(&self, obj: CellPtr, index: usize) -> Option<CellPtr> {
        match self.shape(obj) {
            Shape::Tuple(elems) => elems[index],
            _ => panic!("not a tuple"),
        }
    }

    fn compile_info_view(&self, obj: CellPtr) -> CompileInfoView {
        match self.shape(obj) {
            Shape::CompileInfo(view) => *view,
            _ => panic!("not compile info"),
        }
    }

    fn closure_view(&self, obj: CellPtr) -> ClosureView {
        match self.shape(obj) {
            Shape::Closure(view) => *view,
            _ => panic!("not a closure"),
        }
    }

    fn primary_type(&self, obj: CellPtr) -> Option<CellPtr> {
        match self.shape(obj) {
            Shape::TypeName { primary } => *primary,
            _ => panic!("not a type name"),
        }
    }

    fn type_view(&self, obj: CellPtr) -> TypeView {
        match self.shape(obj) {
            Shape::Type { view, .. } => *view,
            _ => panic!("not a type descriptor"),
        }
    }

    fn method_table_view(&self, obj: CellPtr) -> MethodTableView {
        match self.shape(obj) {
            Shape::MethodTable { defs, cache, unary } => MethodTableView {
                defs: *defs,
                cache: *cache,
                unary_cache_len: unary.len(),
            },
            _ => panic!("not a method table"),
        }
    }

    fn method_node_view(&self, node: CellPtr) -> MethodNodeView {
        match self.shape(node) {
            Shape::MethodNode(view) => *view,
            _ => panic!("not a method node"),
        }
    }

    fn unary_cache_entry(&self, obj: CellPtr, index: usize) -> Option<CellPtr> {
        match self.shape(obj) {
            Shape::MethodTable { unary, .. } => unary[index],
            _ => panic!("not a method table"),
        }
    }

    fn task_view(&self, obj: CellPtr) -> TaskView {
        match self.shape(obj) {
            Shape::Task { view, .. } => *view,
            _ => panic!("not a task"),
        }
    }

    fn for_each_task_root(&self, task: CellPtr, visit: &mut dyn FnMut(CellPtr)) {
        match self.shape(task) {
            Shape::Task { frame_roots, .. } => {
                for root in frame_roots {
                    visit(*root);
                }
            }
            _ => panic!("not a task"),
        }
    }

    fn instance_field_count(&self, obj: CellPtr) -> usize {
        match self.shape(obj) {
            Shape::Instance(fields) => fields.len(),
            _ => panic!("not an instance"),
        }
    }

    fn instance_field(&self, obj: CellPtr, index: usize) -> Option<CellPtr> {
        match self.shape(obj) {
            Shape::Instance(fields) => fields[index],
            _ => panic!("not an instance"),
        }
    }

    fn for_each_binding(&self, module: CellPtr, visit: &mut dyn FnMut(BindingView)) {
        if let Some(bindings) = self.modules.get(&module.addr()) {
            for binding in bindings {
                visit(*binding);
            }
        }
    }
}

impl RootSource for TestRuntime {
    fn enumerate_roots(&self, visitor: &mut dyn RootVisitor) {
        for root in &self.roots {
            visitor.visit(*root);
        }
        for module in &self.module_roots {
            visitor.visit_module(*module);
        }
    }
}
