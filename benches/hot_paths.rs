use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};

use astroview::projection::{ProjectionKind, SkyProjection};
use astroview::raster::{
    draw_screen_tile_to_main_canvas, RasterCanvas, RawBlock, RawTileCache, ScreenRect,
    BLOCK_SIZE,
};
use astroview::stretch::{zscale, ZscaleParams};
use astroview::view::PlotId;
use astroview::WorldPt;

fn bench_zscale(c: &mut Criterion) {
    let nx = 2048;
    let ny = 2048;
    // deterministic ramp with a sprinkling of hot pixels
    let data: Vec<f32> = (0..nx * ny)
        .map(|i| if i % 997 == 0 { 60000.0 } else { (i % 4096) as f32 })
        .collect();
    let params = ZscaleParams::default();
    c.bench_function("zscale_2048", |b| {
        b.iter(|| zscale(black_box(&data), nx, ny, None, &params));
    });
}

fn bench_aitoff_round_trip(c: &mut Criterion) {
    let proj = SkyProjection::new(
        ProjectionKind::Aitoff,
        WorldPt::j2000(266.4, -28.9),
        0.1,
        (1024.0, 512.0),
    );
    c.bench_function("aitoff_round_trip_grid", |b| {
        b.iter(|| {
            let mut acc = 0.0f64;
            for lon in (0..360).step_by(5) {
                for lat in (-85..=85).step_by(5) {
                    if let Some((x, y)) = proj.world_to_plane(lon as f64, lat as f64) {
                        if let Some((l, _)) = proj.plane_to_world(x, y) {
                            acc += l;
                        }
                    }
                }
            }
            black_box(acc)
        });
    });
}

fn bench_compositor(c: &mut Criterion) {
    let mut cache = RawTileCache::new();
    let id = PlotId(0);
    for by in 0..4u32 {
        for bx in 0..4u32 {
            let pixels = (0..BLOCK_SIZE * BLOCK_SIZE)
                .map(|i| (i % 1000) as f32)
                .collect();
            cache
                .put_block(
                    id,
                    astroview::Decimation::Full,
                    RawBlock { bx, by, width: BLOCK_SIZE, height: BLOCK_SIZE, pixels },
                )
                .unwrap();
        }
    }
    let plot = astroview::Plot {
        kind: astroview::PlotKind::Image,
        data_width: 1024,
        data_height: 1024,
        zoom_factor: 1.0,
        projection: None,
        rotation: astroview::Rotation::Unrotated,
        coord_sys: astroview::CoordSys::EquatorialJ2000,
        attributes: Default::default(),
    };
    c.bench_function("composite_1024", |b| {
        b.iter(|| {
            let mut canvas = RasterCanvas::new(1024, 1024);
            draw_screen_tile_to_main_canvas(
                &cache,
                id,
                &plot,
                ScreenRect { x: 0.0, y: 0.0, width: 1024.0, height: 1024.0 },
                &mut canvas,
                0,
                0,
                1024,
                1024,
                None,
            );
            black_box(canvas.get(512, 512))
        });
    });
}

criterion_group!(benches, bench_zscale, bench_aitoff_round_trip, bench_compositor);
criterion_main!(benches);
