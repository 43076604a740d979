//! Precise, type-directed tracing.
//!
//! The collector does not know the runtime's object layouts. It consumes an
//! `ObjectModel` capability that classifies a live payload and exposes its
//! outbound references through per-variant views, and drives the transitive
//! closure itself with an explicit mark stack. The stack replaces a
//! recursive traversal so that long reference chains cannot overflow the
//! machine stack; the mark-bit test is idempotent, so a cell pushed twice is
//! traced once.
//!
//! None of the accessor methods may allocate from the collected heap. The
//! collector calls them mid-cycle, when the heap's free lists are stale.

use crate::cellptr::CellPtr;
use crate::header::{self, CellHeader};
use crate::roots::RootVisitor;

/// Trace dispatch selector: how the tracer should interpret one object.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TraceKind {
    /// No references in the payload.
    Bits,
    Array,
    Tuple,
    /// Function compile-time information.
    CompileInfo,
    Closure,
    TypeName,
    TagType,
    BitsType,
    StructType,
    MethodTable,
    Task,
    /// Generic struct instance; field count comes from the type descriptor.
    Instance,
}

/// An array's reference structure.
#[derive(Copy, Clone, Debug, Default)]
pub struct ArrayView {
    /// Shape descriptor.
    pub shape: Option<CellPtr>,
    /// The element buffer when it is not inlined in the cell. It is raw
    /// storage: its mark bit is set directly, it is never traced into.
    pub buffer: Option<CellPtr>,
    pub len: usize,
    /// Whether elements are references (the element type is not plain bits).
    pub elem_refs: bool,
}

#[derive(Copy, Clone, Debug, Default)]
pub struct CompileInfoView {
    pub ast: Option<CellPtr>,
    pub static_params: Option<CellPtr>,
    pub type_cache: Option<CellPtr>,
    pub embedded_roots: Option<CellPtr>,
    pub spec_types: Option<CellPtr>,
    pub unspecialized: Option<CellPtr>,
}

#[derive(Copy, Clone, Debug, Default)]
pub struct ClosureView {
    pub env: Option<CellPtr>,
    pub compile_info: Option<CellPtr>,
}

/// A type descriptor's reference structure. Tag types fill the first three
/// fields; bits types add the size descriptor; struct types add the field
/// lists, constructor factory and cached instance.
#[derive(Copy, Clone, Debug, Default)]
pub struct TypeView {
    pub name: Option<CellPtr>,
    pub supertype: Option<CellPtr>,
    pub parameters: Option<CellPtr>,
    pub size_descriptor: Option<CellPtr>,
    pub field_names: Option<CellPtr>,
    pub field_types: Option<CellPtr>,
    pub ctor_factory: Option<CellPtr>,
    pub instance: Option<CellPtr>,
}

#[derive(Copy, Clone, Debug, Default)]
pub struct MethodTableView {
    /// Head of the definition chain.
    pub defs: Option<CellPtr>,
    /// Head of the cache chain.
    pub cache: Option<CellPtr>,
    /// Occupied length of the one-argument cache.
    pub unary_cache_len: usize,
}

/// One node of a method chain. Nodes are heap cells; the tracer marks them
/// directly and walks `next` without re-dispatching.
#[derive(Copy, Clone, Debug, Default)]
pub struct MethodNodeView {
    pub sig: Option<CellPtr>,
    pub tvars: Option<CellPtr>,
    pub func: Option<CellPtr>,
    pub next: Option<CellPtr>,
}

#[derive(Copy, Clone, Debug, Default)]
pub struct TaskView {
    pub start: Option<CellPtr>,
    pub on_exit: Option<CellPtr>,
    pub result: Option<CellPtr>,
    pub exception_handler: Option<CellPtr>,
}

/// One occupied slot of a module's binding table.
#[derive(Copy, Clone, Debug)]
pub struct BindingView {
    /// The binding record itself, a heap cell marked directly.
    pub slot: CellPtr,
    pub value: Option<CellPtr>,
    pub declared_type: Option<CellPtr>,
}

/// Runtime-supplied reflection over heap objects.
///
/// A model only needs to implement the accessors for the kinds its
/// `classify` can report; the defaults are unreachable for kinds a runtime
/// never produces. Accessors are reads into existing heap memory and must
/// not allocate from the collected heap.
pub trait ObjectModel {
    fn classify(&self, obj: CellPtr) -> TraceKind;

    fn array_view(&self, _obj: CellPtr) -> ArrayView {
        unimplemented!("classify reported Array")
    }

    fn array_elem(&self, _obj: CellPtr, _index: usize) -> Option<CellPtr> {
        unimplemented!("classify reported Array")
    }

    fn tuple_len(&self, _obj: CellPtr) -> usize {
        unimplemented!("classify reported Tuple")
    }

    fn tuple_elem(&self, _obj: CellPtr, _index: usize) -> Option<CellPtr> {
        unimplemented!("classify reported Tuple")
    }

    fn compile_info_view(&self, _obj: CellPtr) -> CompileInfoView {
        unimplemented!("classify reported CompileInfo")
    }

    fn closure_view(&self, _obj: CellPtr) -> ClosureView {
        unimplemented!("classify reported Closure")
    }

    /// The primary type of a type name, when assigned.
    fn primary_type(&self, _obj: CellPtr) -> Option<CellPtr> {
        unimplemented!("classify reported TypeName")
    }

    fn type_view(&self, _obj: CellPtr) -> TypeView {
        unimplemented!("classify reported a type descriptor")
    }

    fn method_table_view(&self, _obj: CellPtr) -> MethodTableView {
        unimplemented!("classify reported MethodTable")
    }

    fn method_node_view(&self, _node: CellPtr) -> MethodNodeView {
        unimplemented!("classify reported MethodTable")
    }

    fn unary_cache_entry(&self, _obj: CellPtr, _index: usize) -> Option<CellPtr> {
        unimplemented!("classify reported MethodTable")
    }

    fn task_view(&self, _obj: CellPtr) -> TaskView {
        unimplemented!("classify reported Task")
    }

    /// Walk the task's saved frame chains, handing every stack-held
    /// reference to `visit`.
    fn for_each_task_root(&self, _task: CellPtr, _visit: &mut dyn FnMut(CellPtr)) {
        unimplemented!("classify reported Task")
    }

    /// Field count of a generic instance, from its type descriptor's
    /// field-name list.
    fn instance_field_count(&self, _obj: CellPtr) -> usize {
        unimplemented!("classify reported Instance")
    }

    fn instance_field(&self, _obj: CellPtr, _index: usize) -> Option<CellPtr> {
        unimplemented!("classify reported Instance")
    }

    /// Walk a module's binding table, handing each occupied slot to `visit`.
    fn for_each_binding(&self, _module: CellPtr, _visit: &mut dyn FnMut(BindingView)) {
        unimplemented!("a module was enumerated as a root")
    }
}

/// Drives the mark phase: a worklist of grey objects and the dispatch that
/// turns one grey object into marked-plus-children.
pub struct Tracer<'a, M: ObjectModel> {
    model: &'a M,
    stack: Vec<CellPtr>,
}

impl<'a, M: ObjectModel> Tracer<'a, M> {
    pub(crate) fn new(model: &'a M, stack: Vec<CellPtr>) -> Tracer<'a, M> {
        Tracer { model, stack }
    }

    /// Queue an object for marking. Already-marked objects are filtered
    /// when they come off the stack, so duplicate calls are harmless.
    pub fn mark(&mut self, obj: CellPtr) {
        self.stack.push(obj);
    }

    /// Mark a module: the module cell and each occupied binding record get
    /// their bits set directly; binding values and declared types are traced.
    pub fn mark_module(&mut self, module: CellPtr) {
        unsafe { header::mark_cell(module) };

        let model = self.model;
        let stack = &mut self.stack;
        model.for_each_binding(module, &mut |binding| {
            unsafe { header::mark_cell(binding.slot) };
            if let Some(value) = binding.value {
                stack.push(value);
            }
            if let Some(declared) = binding.declared_type {
                stack.push(declared);
            }
        });
    }

    /// Run the worklist to a fixpoint.
    pub(crate) fn drain(&mut self) {
        while let Some(obj) = self.stack.pop() {
            unsafe {
                let mut header = CellHeader::of_payload(obj);
                if header.as_ref().is_marked() {
                    continue;
                }
                header.as_mut().set_marked();
            }
            self.trace_children(obj);
        }
    }

    /// Recover the stack buffer so its capacity carries to the next cycle.
    pub(crate) fn into_stack(self) -> Vec<CellPtr> {
        self.stack
    }

    fn trace_children(&mut self, obj: CellPtr) {
        match self.model.classify(obj) {
            TraceKind::Bits => {}

            TraceKind::Array => {
                let view = self.model.array_view(obj);
                if let Some(shape) = view.shape {
                    self.mark(shape);
                }
                if let Some(buffer) = view.buffer {
                    // raw element storage: no structure to trace into
                    unsafe { header::mark_cell(buffer) };
                }
                if view.elem_refs {
                    for index in 0..view.len {
                        if let Some(elem) = self.model.array_elem(obj, index) {
                            self.mark(elem);
                        }
                    }
                }
            }

            TraceKind::Tuple => {
                for index in 0..self.model.tuple_len(obj) {
                    if let Some(elem) = self.model.tuple_elem(obj, index) {
                        self.mark(elem);
                    }
                }
            }

            TraceKind::CompileInfo => {
                let view = self.model.compile_info_view(obj);
                self.mark_optional(view.ast);
                self.mark_optional(view.static_params);
                self.mark_optional(view.type_cache);
                self.mark_optional(view.embedded_roots);
                self.mark_optional(view.spec_types);
                self.mark_optional(view.unspecialized);
            }

            TraceKind::Closure => {
                let view = self.model.closure_view(obj);
                self.mark_optional(view.env);
                self.mark_optional(view.compile_info);
            }

            TraceKind::TypeName => {
                self.mark_optional(self.model.primary_type(obj));
            }

            TraceKind::TagType | TraceKind::BitsType | TraceKind::StructType => {
                let view = self.model.type_view(obj);
                self.mark_optional(view.name);
                self.mark_optional(view.supertype);
                self.mark_optional(view.parameters);
                self.mark_optional(view.size_descriptor);
                self.mark_optional(view.field_names);
                self.mark_optional(view.field_types);
                self.mark_optional(view.ctor_factory);
                self.mark_optional(view.instance);
            }

            TraceKind::MethodTable => {
                let view = self.model.method_table_view(obj);
                if let Some(defs) = view.defs {
                    self.mark_method_chain(defs);
                }
                if let Some(cache) = view.cache {
                    self.mark_method_chain(cache);
                }
                for index in 0..view.unary_cache_len {
                    self.mark_optional(self.model.unary_cache_entry(obj, index));
                }
            }

            TraceKind::Task => {
                let view = self.model.task_view(obj);
                self.mark_optional(view.start);
                self.mark_optional(view.on_exit);
                self.mark_optional(view.result);
                self.mark_optional(view.exception_handler);

                let model = self.model;
                let stack = &mut self.stack;
                model.for_each_task_root(obj, &mut |root| stack.push(root));
            }

            TraceKind::Instance => {
                for index in 0..self.model.instance_field_count(obj) {
                    if let Some(field) = self.model.instance_field(obj, index) {
                        self.mark(field);
                    }
                }
            }
        }
    }

    fn mark_optional(&mut self, obj: Option<CellPtr>) {
        if let Some(obj) = obj {
            self.mark(obj);
        }
    }

    /// Walk a method chain, marking each node directly and tracing its
    /// signature, type variables and function. An already-marked node ends
    /// the walk; chains can share a tail.
    fn mark_method_chain(&mut self, first: CellPtr) {
        let mut current = Some(first);
        while let Some(node) = current {
            if unsafe { header::cell_is_marked(node) } {
                break;
            }
            unsafe { header::mark_cell(node) };

            let view = self.model.method_node_view(node);
            self.mark_optional(view.sig);
            self.mark_optional(view.tvars);
            self.mark_optional(view.func);
            current = view.next;
        }
    }
}

impl<'a, M: ObjectModel> RootVisitor for Tracer<'a, M> {
    fn visit(&mut self, obj: CellPtr) {
        self.mark(obj);
    }

    fn visit_module(&mut self, module: CellPtr) {
        self.mark_module(module);
    }
}
