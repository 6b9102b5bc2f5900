use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

use criterion::{Criterion, criterion_group, criterion_main};
use tegra_texture_cache::engines::{FermiCopyConfig, TextureInfo};
use tegra_texture_cache::{
    CacheSettings, CopyParams, GpuVAddr, NullPageTracker, PixelFormat, SurfaceParams, TextureBackend, TextureCache,
    VecGpuMemory, ViewParams,
};

/// Backend that only hands out ids.
#[derive(Default)]
struct NullBackend {
    next_id: u32,
}

impl TextureBackend for NullBackend {
    type Texture = u32;
    type View = (u32, ViewParams);

    fn create_texture(&mut self, _gpu_addr: GpuVAddr, _params: &SurfaceParams) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn create_view(&mut self, texture: &u32, _params: &SurfaceParams, view: &ViewParams) -> (u32, ViewParams) {
        (*texture, *view)
    }

    fn upload_texture(&mut self, _texture: &u32, _params: &SurfaceParams, _data: &[u8]) {}

    fn download_texture(&mut self, _texture: &u32, _params: &SurfaceParams, _data: &mut [u8]) {}

    fn image_copy(&mut self, _src: &u32, _dst: &u32, _copy: &CopyParams) {}

    fn image_blit(&mut self, _src: &Self::View, _dst: &Self::View, _config: &FermiCopyConfig) {}

    fn buffer_copy(&mut self, _src: &u32, _src_params: &SurfaceParams, _dst: &u32, _dst_params: &SurfaceParams) {}
}

fn criterion_config() -> Criterion {
    Criterion::default()
        .warm_up_time(Duration::from_millis(500))
        .measurement_time(Duration::from_secs(2))
        .sample_size(30)
}

fn new_cache() -> TextureCache<NullBackend> {
    TextureCache::new(
        NullBackend::default(),
        Arc::new(VecGpuMemory::new(0, 64 << 20)),
        Arc::new(NullPageTracker),
        CacheSettings::default(),
    )
}

fn bench_l1_hit(c: &mut Criterion) {
    let cache = new_cache();
    let info = TextureInfo::new_2d(0x10_0000, PixelFormat::Rgba8Unorm, 256, 256, 4);
    cache.get_texture_surface(&info);

    c.bench_function("texture_cache/l1_hit", |b| {
        b.iter(|| black_box(cache.get_texture_surface(black_box(&info))));
    });
}

fn bench_mip_view(c: &mut Criterion) {
    let cache = new_cache();
    let parent = TextureInfo::new_2d(0x10_0000, PixelFormat::Rgba8Unorm, 64, 64, 3).with_levels(2);
    cache.get_texture_surface(&parent);
    let mip = TextureInfo::new_2d(0x10_4000, PixelFormat::Rgba8Unorm, 32, 32, 2);

    c.bench_function("texture_cache/overlap_mip_view", |b| {
        b.iter(|| black_box(cache.get_texture_surface(black_box(&mip))));
    });
}

fn bench_invalidate_and_reuse(c: &mut Criterion) {
    let cache = new_cache();
    let textures: Vec<_> = (0..64u64)
        .map(|i| TextureInfo::new_2d(0x10_0000 + i * 0x4_0000, PixelFormat::Rgba8Unorm, 128, 128, 4))
        .collect();

    c.bench_function("texture_cache/invalidate_and_reuse_64", |b| {
        b.iter(|| {
            for info in &textures {
                black_box(cache.get_texture_surface(info));
            }
            cache.invalidate_region(0, 64 << 20);
        });
    });
}

criterion_group! {
    name = benches;
    config = criterion_config();
    targets = bench_l1_hit, bench_mip_view, bench_invalidate_and_reuse
}
criterion_main!(benches);
