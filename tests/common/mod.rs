//! Shared fixtures for the integration tests: a recording backend, a
//! counting page tracker and a ready-made cache over flat guest memory.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tegra_texture_cache::engines::{
    FermiCopyConfig, MemoryLayout, RenderTargetConfig, TextureInfo,
};
use tegra_texture_cache::{
    CacheSettings, CopyParams, GpuVAddr, PageTracker, PixelFormat, SurfaceParams, TextureBackend, TextureCache, VAddr,
    VecGpuMemory, ViewParams,
};

/// Size of the mapped guest memory; addresses past it are unmapped.
pub const GUEST_MEMORY_SIZE: usize = 8 << 20;
pub const UNMAPPED_ADDR: GpuVAddr = 0x1000_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MockTexture {
    pub id: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MockView {
    pub texture: u32,
    pub params: ViewParams,
}

/// Everything the backend was asked to do.
#[derive(Debug, Default)]
pub struct Recorded {
    next_id: u32,
    /// Host-layout contents of every texture.
    pub contents: HashMap<u32, Vec<u8>>,
    pub creates: usize,
    pub views: usize,
    pub uploads: usize,
    pub downloads: usize,
    pub image_copies: Vec<(u32, u32, CopyParams)>,
    pub blits: Vec<(MockView, MockView)>,
    pub buffer_copies: Vec<(u32, u32)>,
}

#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    pub recorded: Arc<Mutex<Recorded>>,
}

impl TextureBackend for MockBackend {
    type Texture = MockTexture;
    type View = MockView;

    fn create_texture(&mut self, _gpu_addr: GpuVAddr, params: &SurfaceParams) -> MockTexture {
        let mut recorded = self.recorded.lock();
        let id = recorded.next_id;
        recorded.next_id += 1;
        recorded.creates += 1;
        recorded.contents.insert(id, vec![0; params.host_size_in_bytes()]);
        MockTexture { id }
    }

    fn create_view(&mut self, texture: &MockTexture, _params: &SurfaceParams, view: &ViewParams) -> MockView {
        self.recorded.lock().views += 1;
        MockView {
            texture: texture.id,
            params: *view,
        }
    }

    fn upload_texture(&mut self, texture: &MockTexture, _params: &SurfaceParams, data: &[u8]) {
        let mut recorded = self.recorded.lock();
        recorded.uploads += 1;
        recorded.contents.insert(texture.id, data.to_vec());
    }

    fn download_texture(&mut self, texture: &MockTexture, _params: &SurfaceParams, data: &mut [u8]) {
        let mut recorded = self.recorded.lock();
        recorded.downloads += 1;
        if let Some(contents) = recorded.contents.get(&texture.id) {
            let len = contents.len().min(data.len());
            data[..len].copy_from_slice(&contents[..len]);
        }
    }

    fn image_copy(&mut self, src: &MockTexture, dst: &MockTexture, copy: &CopyParams) {
        self.recorded.lock().image_copies.push((src.id, dst.id, *copy));
    }

    fn image_blit(&mut self, src: &MockView, dst: &MockView, _config: &FermiCopyConfig) {
        self.recorded.lock().blits.push((*src, *dst));
    }

    fn buffer_copy(&mut self, src: &MockTexture, _src_params: &SurfaceParams, dst: &MockTexture, _dst_params: &SurfaceParams) {
        self.recorded.lock().buffer_copies.push((src.id, dst.id));
    }
}

/// Net number of cached surfaces per CPU range start.
#[derive(Debug, Default)]
pub struct CountingTracker {
    pub cached: Mutex<HashMap<VAddr, i64>>,
}

impl CountingTracker {
    pub fn count(&self, cpu_addr: VAddr) -> i64 {
        self.cached.lock().get(&cpu_addr).copied().unwrap_or(0)
    }

    pub fn total(&self) -> i64 {
        self.cached.lock().values().sum()
    }
}

impl PageTracker for CountingTracker {
    fn update_pages_cached_count(&self, cpu_addr: VAddr, _size: u64, delta: i32) {
        *self.cached.lock().entry(cpu_addr).or_default() += i64::from(delta);
    }
}

pub struct Harness {
    pub cache: TextureCache<MockBackend>,
    pub memory: Arc<VecGpuMemory>,
    pub tracker: Arc<CountingTracker>,
    pub recorded: Arc<Mutex<Recorded>>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(CacheSettings::default())
    }

    pub fn with_settings(settings: CacheSettings) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let backend = MockBackend::default();
        let recorded = backend.recorded.clone();
        let memory = Arc::new(VecGpuMemory::new(0, GUEST_MEMORY_SIZE));
        let tracker = Arc::new(CountingTracker::default());
        let cache = TextureCache::new(backend, memory.clone(), tracker.clone(), settings);
        Self {
            cache,
            memory,
            tracker,
            recorded,
        }
    }

    pub fn creates(&self) -> usize {
        self.recorded.lock().creates
    }

    pub fn image_copies(&self) -> usize {
        self.recorded.lock().image_copies.len()
    }

    /// Replaces the host contents of `texture`, as a draw would.
    pub fn render_into(&self, texture: u32, bytes: Vec<u8>) {
        self.recorded.lock().contents.insert(texture, bytes);
    }

    pub fn contents(&self, texture: u32) -> Vec<u8> {
        self.recorded.lock().contents.get(&texture).cloned().unwrap_or_default()
    }
}

/// A single-level block linear 2D texture descriptor.
pub fn texture_2d(address: GpuVAddr, format: PixelFormat, width: u32, height: u32) -> TextureInfo {
    TextureInfo::new_2d(address, format, width, height, 4)
}

/// A block linear color target.
pub fn render_target(address: GpuVAddr, format: PixelFormat, width: u32, height: u32) -> RenderTargetConfig {
    RenderTargetConfig {
        address,
        width,
        height,
        format: Some(format),
        memory_layout: MemoryLayout::block_linear(4),
        layers: 1,
        ..Default::default()
    }
}
