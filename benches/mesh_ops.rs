//! Benchmarks for topology construction and the compression stages.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use lapmesh::algo::anchor::{seed_anchor, select_anchors_bfs, BfsAnchorOptions};
use lapmesh::algo::laplacian::{compute_laplacian_coordinates, quantize_laplacian};
use lapmesh::algo::metrics::{evaluate, MetricsOptions};
use lapmesh::algo::reconstruct::{reconstruct, ReconstructOptions, SolverKind};
use lapmesh::prelude::*;
use nalgebra::Point3;

fn grid_geometry(n: usize) -> (Vec<Point3<f64>>, Vec<[usize; 3]>) {
    let mut vertices = Vec::with_capacity((n + 1) * (n + 1));
    let mut faces = Vec::with_capacity(n * n * 2);

    for j in 0..=n {
        for i in 0..=n {
            let (x, y) = (i as f64, j as f64);
            vertices.push(Point3::new(x, y, 0.1 * (x * 0.3).sin() * (y * 0.2).cos()));
        }
    }

    for j in 0..n {
        for i in 0..n {
            let v00 = j * (n + 1) + i;
            let v10 = v00 + 1;
            let v01 = v00 + (n + 1);
            let v11 = v01 + 1;

            faces.push([v00, v10, v11]);
            faces.push([v00, v11, v01]);
        }
    }

    (vertices, faces)
}

/// Grid mesh with edges, neighbors and quantized Laplacian coordinates ready.
fn prepared_grid(n: usize) -> Mesh {
    let (vertices, faces) = grid_geometry(n);
    let mut mesh: Mesh = build_from_triangles(&vertices, &faces).unwrap();
    mesh.create_edges_from_triangles().unwrap();
    mesh.compute_all_neighbors();
    compute_laplacian_coordinates(&mut mesh).unwrap();
    quantize_laplacian(&mut mesh, 12).unwrap();
    mesh
}

fn bench_mesh_construction(c: &mut Criterion) {
    let (vertices, faces) = grid_geometry(30);

    c.bench_function("build_grid_30x30", |b| {
        b.iter(|| {
            let mut mesh: Mesh = build_from_triangles(&vertices, &faces).unwrap();
            mesh.create_edges_from_triangles().unwrap();
            mesh.compute_all_neighbors();
            mesh
        });
    });
}

/// Construction time per vertex should stay flat as the grid grows.
fn bench_load_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_and_edges");
    group.sample_size(10);
    for n in [49, 99, 149] {
        let (vertices, faces) = grid_geometry(n);
        group.throughput(Throughput::Elements(vertices.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(vertices.len()), &n, |b, _| {
            b.iter(|| {
                let mut mesh: Mesh = build_from_triangles(&vertices, &faces).unwrap();
                mesh.create_edges_from_triangles().unwrap();
                mesh
            });
        });
    }
    group.finish();
}

fn bench_laplacian(c: &mut Criterion) {
    let mut mesh = prepared_grid(50);

    c.bench_function("laplacian_and_quantize_50x50", |b| {
        b.iter(|| {
            compute_laplacian_coordinates(&mut mesh).unwrap();
            quantize_laplacian(&mut mesh, 12).unwrap()
        });
    });
}

fn bench_reconstruct(c: &mut Criterion) {
    let mut mesh = prepared_grid(40);
    let seed = seed_anchor(&mesh).unwrap();
    let anchors = select_anchors_bfs(&mesh, seed, 6, &BfsAnchorOptions::default())
        .unwrap()
        .anchors;

    let chol = ReconstructOptions::default().with_solver(SolverKind::SparseCholesky);
    c.bench_function("reconstruct_cholesky_40x40", |b| {
        b.iter(|| reconstruct(&mut mesh, &anchors, &chol).unwrap());
    });

    let cg = ReconstructOptions::default().with_solver(SolverKind::ConjugateGradient);
    c.bench_function("reconstruct_cg_40x40", |b| {
        b.iter(|| reconstruct(&mut mesh, &anchors, &cg).unwrap());
    });

    let mut small = prepared_grid(12);
    let qr = ReconstructOptions::default().with_solver(SolverKind::DenseQr);
    c.bench_function("reconstruct_qr_12x12", |b| {
        b.iter(|| reconstruct(&mut small, &[VertexId::new(0)], &qr).unwrap());
    });
}

fn bench_metrics(c: &mut Criterion) {
    let mut mesh = prepared_grid(60);
    let seed = seed_anchor(&mesh).unwrap();
    let anchors = select_anchors_bfs(&mesh, seed, 8, &BfsAnchorOptions::default())
        .unwrap()
        .anchors;
    reconstruct(&mut mesh, &anchors, &ReconstructOptions::default()).unwrap();

    c.bench_function("evaluate_parallel_60x60", |b| {
        b.iter(|| evaluate(&mesh, &MetricsOptions::default()).unwrap());
    });
    c.bench_function("evaluate_sequential_60x60", |b| {
        b.iter(|| evaluate(&mesh, &MetricsOptions::default().sequential()).unwrap());
    });
}

criterion_group!(
    benches,
    bench_mesh_construction,
    bench_load_scaling,
    bench_laplacian,
    bench_reconstruct,
    bench_metrics
);
criterion_main!(benches);
