//! Shared functionality which is used in unit-tests across the crate: an in-memory data
//! reader, a scriptable runtime, a table-driven type factory, and builders for types and
//! minimal PE images.

use std::collections::HashMap;
use std::sync::Arc;

use crate::{
    heap::{Heap, HeapSegment},
    memory::{DataReader, VersionInfo},
    runtime::{
        CommonMethodTables, DependentHandle, FinalizerQueue, GcInfo, HandleInfo, Runtime,
        StackRoot, ThreadInfo,
    },
    types::{gcdesc::GcDesc, HeapType, HeapTypeRc, TypeFactory, WellKnownKind},
    Error::OutOfBounds,
    Result,
};

/// In-memory reader over a set of explicitly mapped regions; everything else is unreadable.
#[derive(Clone, Default)]
pub struct MockReader {
    pointer_size: u32,
    regions: Vec<(u64, Vec<u8>)>,
    versions: HashMap<u64, VersionInfo>,
}

impl MockReader {
    pub fn new(pointer_size: u32) -> Self {
        MockReader {
            pointer_size,
            regions: Vec::new(),
            versions: HashMap::new(),
        }
    }

    /// Maps a zero-filled region at `start`.
    pub fn region(&mut self, start: u64, len: usize) {
        self.regions.push((start, vec![0u8; len]));
    }

    /// Maps a region holding `data` at `start`.
    pub fn region_with(&mut self, start: u64, data: Vec<u8>) {
        self.regions.push((start, data));
    }

    pub fn write_bytes(&mut self, addr: u64, bytes: &[u8]) {
        for (start, data) in &mut self.regions {
            if addr >= *start && addr + bytes.len() as u64 <= *start + data.len() as u64 {
                let offset = (addr - *start) as usize;
                data[offset..offset + bytes.len()].copy_from_slice(bytes);
                return;
            }
        }
        panic!("write outside any mapped region: 0x{addr:x}");
    }

    pub fn write_u64(&mut self, addr: u64, value: u64) {
        self.write_bytes(addr, &value.to_le_bytes());
    }

    pub fn write_u32(&mut self, addr: u64, value: u32) {
        self.write_bytes(addr, &value.to_le_bytes());
    }

    pub fn set_version(&mut self, base: u64, version: VersionInfo) {
        self.versions.insert(base, version);
    }
}

impl DataReader for MockReader {
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
        Err(OutOfBounds)
    }

    fn version_info(&self, base: u64) -> Option<VersionInfo> {
        self.versions.get(&base).copied()
    }
}

/// Scriptable runtime: every answer is a plain public field.
#[derive(Clone)]
pub struct MockRuntime {
    pub reader: Arc<dyn DataReader>,
    pub gc: GcInfo,
    pub segments: Vec<HeapSegment>,
    pub alloc_contexts: Vec<(u64, u64)>,
    pub finalizer: FinalizerQueue,
    pub dependent: Vec<DependentHandle>,
    pub handles: Vec<HandleInfo>,
    pub threads: Vec<(ThreadInfo, Vec<StackRoot>)>,
}

impl MockRuntime {
    pub fn new(pointer_size: u32) -> Self {
        MockRuntime {
            reader: Arc::new(MockReader::new(pointer_size)),
            gc: GcInfo {
                is_server: false,
                logical_heap_count: 1,
                can_walk_heap: true,
                common_method_tables: CommonMethodTables::default(),
            },
            segments: Vec::new(),
            alloc_contexts: Vec::new(),
            finalizer: FinalizerQueue::default(),
            dependent: Vec::new(),
            handles: Vec::new(),
            threads: Vec::new(),
        }
    }
}

impl Runtime for MockRuntime {
    fn data_reader(&self) -> &Arc<dyn DataReader> {
        &self.reader
    }

    fn gc_info(&self) -> Result<GcInfo> {
        Ok(self.gc)
    }

    fn segments(&self) -> Result<Vec<HeapSegment>> {
        Ok(self.segments.clone())
    }

    fn allocation_contexts(&self) -> Vec<(u64, u64)> {
        self.alloc_contexts.clone()
    }

    fn finalizer_queue(&self) -> FinalizerQueue {
        self.finalizer.clone()
    }

    fn dependent_handles(&self) -> Vec<DependentHandle> {
        self.dependent.clone()
    }

    fn handles(&self) -> Vec<HandleInfo> {
        self.handles.clone()
    }

    fn threads(&self) -> Vec<ThreadInfo> {
        self.threads.iter().map(|(thread, _)| *thread).collect()
    }

    fn stack_roots(&self, thread: &ThreadInfo) -> Vec<StackRoot> {
        self.threads
            .iter()
            .find(|(t, _)| t.os_id == thread.os_id)
            .map(|(_, roots)| roots.clone())
            .unwrap_or_default()
    }
}

/// Table-driven type factory.
#[derive(Clone, Default)]
pub struct MockFactory {
    pub types: HashMap<u64, HeapTypeRc>,
}

impl MockFactory {
    pub fn new() -> Self {
        MockFactory::default()
    }
}

impl TypeFactory for MockFactory {
    fn get_or_create_type(&self, method_table: u64, _obj_hint: Option<u64>) -> Option<HeapTypeRc> {
        self.types.get(&method_table).cloned()
    }

    fn create_well_known_type(&self, method_table: u64, kind: WellKnownKind) -> HeapTypeRc {
        if let Some(ty) = self.types.get(&method_table) {
            return ty.clone();
        }

        let (static_size, component_size) = match kind {
            WellKnownKind::Free => (24, 1),
            WellKnownKind::String => (22, 2),
            WellKnownKind::Object | WellKnownKind::Exception => (24, 0),
        };

        Arc::new(
            typed(method_table)
                .name(kind.canonical_name())
                .static_size(static_size)
                .component_size(component_size)
                .build(),
        )
    }
}

/// Starts a [`HeapTypeBuilder`] for the given method table.
pub fn typed(method_table: u64) -> HeapTypeBuilder {
    HeapTypeBuilder {
        inner: HeapType {
            method_table,
            name: None,
            static_size: 24,
            component_size: 0,
            contains_pointers: false,
            is_collectible: false,
            loader_allocator_handle: 0,
            gc_desc: GcDesc::empty(),
        },
    }
}

pub struct HeapTypeBuilder {
    inner: HeapType,
}

impl HeapTypeBuilder {
    pub fn name(mut self, name: &str) -> Self {
        self.inner.name = Some(name.to_string());
        self
    }

    pub fn static_size(mut self, size: u32) -> Self {
        self.inner.static_size = size;
        self
    }

    pub fn component_size(mut self, size: u32) -> Self {
        self.inner.component_size = size;
        self
    }

    pub fn collectible(mut self, loader_allocator_handle: u64) -> Self {
        self.inner.is_collectible = true;
        self.inner.loader_allocator_handle = loader_allocator_handle;
        self
    }

    pub fn gc_desc(mut self, desc: GcDesc) -> Self {
        self.inner.contains_pointers = !desc.is_empty();
        self.inner.gc_desc = desc;
        self
    }

    pub fn build(self) -> HeapType {
        self.inner
    }
}

/// A complete synthetic target: reader, runtime, and factory wired together.
pub struct TargetFixture {
    pub reader: MockReader,
    pub runtime: MockRuntime,
    pub factory: MockFactory,
}

impl TargetFixture {
    pub const FREE_MT: u64 = 0x100;
    pub const OBJECT_MT: u64 = 0x200;
    pub const STRING_MT: u64 = 0x300;
    pub const EXCEPTION_MT: u64 = 0x400;

    pub fn new(pointer_size: u32) -> Self {
        let mut runtime = MockRuntime::new(pointer_size);
        runtime.gc.common_method_tables = CommonMethodTables {
            free: Self::FREE_MT,
            object: Self::OBJECT_MT,
            string: Self::STRING_MT,
            exception: Self::EXCEPTION_MT,
        };

        TargetFixture {
            reader: MockReader::new(pointer_size),
            runtime,
            factory: MockFactory::new(),
        }
    }

    /// Registers a type with the factory and returns the shared descriptor.
    pub fn register(&mut self, builder: HeapTypeBuilder) -> HeapTypeRc {
        let ty = Arc::new(builder.build());
        self.factory.types.insert(ty.method_table, ty.clone());
        ty
    }

    /// Builds a heap over the fixture's current state.
    pub fn heap(&self) -> Heap {
        let mut runtime = self.runtime.clone();
        runtime.reader = Arc::new(self.reader.clone());
        Heap::new(Arc::new(runtime), Arc::new(self.factory.clone()))
            .expect("fixture heap construction")
    }
}

/// Builds a minimal PE32+ image in memory: DOS header, COFF header, optional header with
/// 16 data directories, and one `.text` section. When `managed` is set, the CLR runtime
/// header directory points at a placeholder in the section.
pub fn build_pe_image(managed: bool) -> Vec<u8> {
    let mut image = vec![0u8; 0x400];

    // DOS header: magic and e_lfanew.
    image[0] = b'M';
    image[1] = b'Z';
    image[0x3C..0x40].copy_from_slice(&0x80u32.to_le_bytes());

    // PE signature.
    image[0x80..0x84].copy_from_slice(b"PE\0\0");

    // COFF header.
    let coff = 0x84;
    image[coff..coff + 2].copy_from_slice(&0x8664u16.to_le_bytes()); // machine: x86-64
    image[coff + 2..coff + 4].copy_from_slice(&1u16.to_le_bytes()); // one section
    image[coff + 4..coff + 8].copy_from_slice(&0x6650_0000u32.to_le_bytes()); // timestamp
    image[coff + 16..coff + 18].copy_from_slice(&0xF0u16.to_le_bytes()); // optional header size
    image[coff + 18..coff + 20].copy_from_slice(&0x2022u16.to_le_bytes()); // characteristics

    // Optional header, PE32+.
    let opt = coff + 20;
    image[opt..opt + 2].copy_from_slice(&0x20Bu16.to_le_bytes());
    image[opt + 16..opt + 20].copy_from_slice(&0x1000u32.to_le_bytes()); // entry point
    image[opt + 24..opt + 32].copy_from_slice(&0x1_8000_0000u64.to_le_bytes()); // image base
    image[opt + 32..opt + 36].copy_from_slice(&0x1000u32.to_le_bytes()); // section alignment
    image[opt + 36..opt + 40].copy_from_slice(&0x200u32.to_le_bytes()); // file alignment
    image[opt + 40..opt + 42].copy_from_slice(&6u16.to_le_bytes()); // os major version
    image[opt + 56..opt + 60].copy_from_slice(&0x2000u32.to_le_bytes()); // size of image
    image[opt + 60..opt + 64].copy_from_slice(&0x200u32.to_le_bytes()); // size of headers
    image[opt + 68..opt + 70].copy_from_slice(&3u16.to_le_bytes()); // subsystem: console
    image[opt + 108..opt + 112].copy_from_slice(&16u32.to_le_bytes()); // rva/size pairs

    // Data directories start at opt + 112; the CLR runtime header is entry 14.
    if managed {
        let clr = opt + 112 + 14 * 8;
        image[clr..clr + 4].copy_from_slice(&0x1000u32.to_le_bytes());
        image[clr + 4..clr + 8].copy_from_slice(&0x48u32.to_le_bytes());
    }

    // Section table: one .text section covering the image body.
    let sect = opt + 0xF0;
    image[sect..sect + 5].copy_from_slice(b".text");
    image[sect + 8..sect + 12].copy_from_slice(&0x1000u32.to_le_bytes()); // virtual size
    image[sect + 12..sect + 16].copy_from_slice(&0x1000u32.to_le_bytes()); // virtual address
    image[sect + 16..sect + 20].copy_from_slice(&0x200u32.to_le_bytes()); // raw size
    image[sect + 20..sect + 24].copy_from_slice(&0x200u32.to_le_bytes()); // raw pointer
    image[sect + 36..sect + 40].copy_from_slice(&0x6000_0020u32.to_le_bytes()); // characteristics

    image
}
