//! Shared fixture for the integration suites: a synthetic captured process built entirely
//! against the public boundary traits, the way a real data target would implement them.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use heapscope::prelude::*;

/// Well-known method tables used by every synthetic target.
pub const FREE_MT: u64 = 0xF0;
pub const OBJECT_MT: u64 = 0xF1;
pub const STRING_MT: u64 = 0xF2;
pub const EXCEPTION_MT: u64 = 0xF3;

/// Read-only memory made of explicitly mapped regions.
pub struct SparseMemory {
    pointer_size: u32,
    regions: Vec<(u64, Vec<u8>)>,
}

impl DataReader for SparseMemory {
    fn pointer_size(&self) -> u32 {
        self.pointer_size
    }

    fn read_bytes(&self, addr: u64, buf: &mut [u8]) -> Result<usize> {
        for (start, data) in &self.regions {
            if addr >= *start && addr < *start + data.len() as u64 {
                let offset = (addr - *start) as usize;
                let available = (data.len() - offset).min(buf.len());
                buf[..available].copy_from_slice(&data[offset..offset + available]);
                return Ok(available);
            }
        }
        Err(Error::OutOfBounds)
    }

    fn version_info(&self, _base: u64) -> Option<VersionInfo> {
        None
    }
}

/// The mutable half of a scripted runtime; tests can rewrite it between snapshots.
#[derive(Default)]
pub struct Script {
    pub segments: Vec<HeapSegment>,
    pub alloc_contexts: Vec<(u64, u64)>,
    pub finalizer: FinalizerQueue,
    pub dependent: Vec<DependentHandle>,
    pub handles: Vec<HandleInfo>,
    pub threads: Vec<(ThreadInfo, Vec<StackRoot>)>,
}

/// Runtime boundary over a [`Script`].
pub struct ScriptedRuntime {
    reader: Arc<dyn DataReader>,
    gc: GcInfo,
    script: Arc<Mutex<Script>>,
}

impl Runtime for ScriptedRuntime {
    fn data_reader(&self) -> &Arc<dyn DataReader> {
        &self.reader
    }

    fn gc_info(&self) -> Result<GcInfo> {
        Ok(self.gc)
    }

    fn segments(&self) -> Result<Vec<HeapSegment>> {
        Ok(self.script.lock().unwrap().segments.clone())
    }

    fn allocation_contexts(&self) -> Vec<(u64, u64)> {
        self.script.lock().unwrap().alloc_contexts.clone()
    }

    fn finalizer_queue(&self) -> FinalizerQueue {
        self.script.lock().unwrap().finalizer.clone()
    }

    fn dependent_handles(&self) -> Vec<DependentHandle> {
        self.script.lock().unwrap().dependent.clone()
    }

    fn handles(&self) -> Vec<HandleInfo> {
        self.script.lock().unwrap().handles.clone()
    }

    fn threads(&self) -> Vec<ThreadInfo> {
        self.script
            .lock()
            .unwrap()
            .threads
            .iter()
            .map(|(thread, _)| *thread)
            .collect()
    }

    fn stack_roots(&self, thread: &ThreadInfo) -> Vec<StackRoot> {
        self.script
            .lock()
            .unwrap()
            .threads
            .iter()
            .find(|(t, _)| t.os_id == thread.os_id)
            .map(|(_, roots)| roots.clone())
            .unwrap_or_default()
    }
}

/// Factory over a fixed method-table registry.
pub struct TableFactory {
    types: HashMap<u64, HeapTypeRc>,
}

impl TypeFactory for TableFactory {
    fn get_or_create_type(&self, method_table: u64, _obj_hint: Option<u64>) -> Option<HeapTypeRc> {
        self.types.get(&method_table).cloned()
    }

    fn create_well_known_type(&self, method_table: u64, kind: WellKnownKind) -> HeapTypeRc {
        self.types.get(&method_table).cloned().unwrap_or_else(|| {
            panic!(
                "well-known {:?} (MT 0x{method_table:x}) missing from fixture",
                kind
            )
        })
    }
}

/// Constructs a plain fixed-size type.
pub fn plain_type(method_table: u64, static_size: u32) -> HeapTypeRc {
    Arc::new(HeapType {
        method_table,
        name: None,
        static_size,
        component_size: 0,
        contains_pointers: false,
        is_collectible: false,
        loader_allocator_handle: 0,
        gc_desc: GcDesc::empty(),
    })
}

/// Constructs a variable-length (array-like) type.
pub fn array_type(method_table: u64, static_size: u32, component_size: u32) -> HeapTypeRc {
    Arc::new(HeapType {
        method_table,
        name: None,
        static_size,
        component_size,
        contains_pointers: false,
        is_collectible: false,
        loader_allocator_handle: 0,
        gc_desc: GcDesc::empty(),
    })
}

/// Constructs a fixed-size type whose instances hold references in the given
/// `(offset, size)` slot runs.
pub fn ref_type(method_table: u64, static_size: u32, series: &[(u64, u64)]) -> HeapTypeRc {
    Arc::new(HeapType {
        method_table,
        name: None,
        static_size,
        component_size: 0,
        contains_pointers: true,
        is_collectible: false,
        loader_allocator_handle: 0,
        gc_desc: GcDesc::new(
            series
                .iter()
                .map(|&(offset, size)| GcSeries { offset, size })
                .collect(),
            None,
        ),
    })
}

/// Builder of a complete synthetic target.
pub struct HeapBuilder {
    pointer_size: u32,
    regions: Vec<(u64, Vec<u8>)>,
    script: Script,
    types: HashMap<u64, HeapTypeRc>,
    gc: GcInfo,
}

impl HeapBuilder {
    pub fn new() -> Self {
        let mut types = HashMap::new();
        types.insert(
            FREE_MT,
            Arc::new(HeapType {
                method_table: FREE_MT,
                name: Some("Free".to_string()),
                static_size: 24,
                component_size: 1,
                contains_pointers: false,
                is_collectible: false,
                loader_allocator_handle: 0,
                gc_desc: GcDesc::empty(),
            }),
        );
        types.insert(OBJECT_MT, plain_type(OBJECT_MT, 24));
        types.insert(
            STRING_MT,
            Arc::new(HeapType {
                method_table: STRING_MT,
                name: Some("System.String".to_string()),
                static_size: 22,
                component_size: 2,
                contains_pointers: false,
                is_collectible: false,
                loader_allocator_handle: 0,
                gc_desc: GcDesc::empty(),
            }),
        );
        types.insert(EXCEPTION_MT, plain_type(EXCEPTION_MT, 0x98));

        HeapBuilder {
            pointer_size: 8,
            regions: Vec::new(),
            script: Script::default(),
            types,
            gc: GcInfo {
                is_server: false,
                logical_heap_count: 1,
                can_walk_heap: true,
                common_method_tables: CommonMethodTables {
                    free: FREE_MT,
                    object: OBJECT_MT,
                    string: STRING_MT,
                    exception: EXCEPTION_MT,
                },
            },
        }
    }

    /// Maps a zero-filled region of target memory.
    pub fn map(mut self, start: u64, len: usize) -> Self {
        self.regions.push((start, vec![0u8; len]));
        self
    }

    pub fn write_u64(mut self, addr: u64, value: u64) -> Self {
        self.write(addr, &value.to_le_bytes());
        self
    }

    pub fn write_u32(mut self, addr: u64, value: u32) -> Self {
        self.write(addr, &value.to_le_bytes());
        self
    }

    fn write(&mut self, addr: u64, bytes: &[u8]) {
        for (start, data) in &mut self.regions {
            if addr >= *start && addr + bytes.len() as u64 <= *start + data.len() as u64 {
                let offset = (addr - *start) as usize;
                data[offset..offset + bytes.len()].copy_from_slice(bytes);
                return;
            }
        }
        panic!("write outside mapped memory: 0x{addr:x}");
    }

    /// Registers a type with the factory.
    pub fn ty(mut self, ty: HeapTypeRc) -> Self {
        self.types.insert(ty.method_table, ty);
        self
    }

    /// Adds a small-object segment.
    pub fn segment(mut self, start: u64, first_object: u64, end: u64) -> Self {
        self.script
            .segments
            .push(HeapSegment::new(start, first_object, end, SegmentFlags::empty()));
        self
    }

    /// Adds a large-object segment.
    pub fn large_segment(mut self, start: u64, first_object: u64, end: u64) -> Self {
        self.script.segments.push(HeapSegment::new(
            start,
            first_object,
            end,
            SegmentFlags::LARGE_OBJECT,
        ));
        self
    }

    /// Adds a pinned-object segment.
    pub fn pinned_segment(mut self, start: u64, first_object: u64, end: u64) -> Self {
        self.script.segments.push(HeapSegment::new(
            start,
            first_object,
            end,
            SegmentFlags::PINNED_OBJECT,
        ));
        self
    }

    /// Places an object: writes `method_table` at `addr`.
    pub fn object(self, addr: u64, method_table: u64) -> Self {
        self.write_u64(addr, method_table)
    }

    /// Places a variable-length object: method table plus stored element count.
    pub fn array(self, addr: u64, method_table: u64, count: u32) -> Self {
        let width = 8;
        self.write_u64(addr, method_table)
            .write_u32(addr + width, count)
    }

    pub fn alloc_context(mut self, pointer: u64, limit: u64) -> Self {
        self.script.alloc_contexts.push((pointer, limit));
        self
    }

    pub fn dependent(mut self, source: u64, target: u64) -> Self {
        self.script.dependent.push(DependentHandle { source, target });
        self
    }

    pub fn handle(mut self, address: u64, object: u64, kind: HandleKind) -> Self {
        self.script.handles.push(HandleInfo {
            address,
            object,
            kind,
        });
        self
    }

    pub fn finalizer_roots(mut self, start: u64, end: u64) -> Self {
        self.script.finalizer.roots.push(MemoryRange::new(start, end));
        self
    }

    pub fn finalizer_objects(mut self, start: u64, end: u64) -> Self {
        self.script
            .finalizer
            .objects
            .push(MemoryRange::new(start, end));
        self
    }

    pub fn thread(mut self, os_id: u32, roots: Vec<StackRoot>) -> Self {
        self.script.threads.push((
            ThreadInfo {
                os_id,
                thread: 0xCC00 + u64::from(os_id),
            },
            roots,
        ));
        self
    }

    /// Builds the heap.
    pub fn build(self) -> Heap {
        self.build_scripted().0
    }

    /// Builds the heap and hands back the script so a test can rewrite the runtime's
    /// answers between snapshots.
    pub fn build_scripted(self) -> (Heap, Arc<Mutex<Script>>) {
        let script = Arc::new(Mutex::new(self.script));
        let runtime = ScriptedRuntime {
            reader: Arc::new(SparseMemory {
                pointer_size: self.pointer_size,
                regions: self.regions,
            }),
            gc: self.gc,
            script: script.clone(),
        };
        let factory = TableFactory { types: self.types };

        let heap = Heap::new(Arc::new(runtime), Arc::new(factory)).expect("heap construction");
        (heap, script)
    }
}
