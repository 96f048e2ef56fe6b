//! Integration tests for mddlme-simplification
//!
//! These tests run the partition, simplify and merge stages together and
//! check the properties the merged mesh must have.

mod common;

use common::*;
use mddlme_core::{Point3f, TriangleMesh};
use mddlme_simplification::*;
use std::collections::HashMap;

fn position_key(p: &Point3f) -> [u32; 3] {
    [p.x.to_bits(), p.y.to_bits(), p.z.to_bits()]
}

fn run(mesh: &TriangleMesh, ratio: f32, config: PipelineConfig) -> PipelineOutput {
    PartitionedSimplifier::with_config(config)
        .run(mesh, ratio)
        .unwrap()
}

#[test]
fn test_output_indices_valid() {
    for mesh in [subdivided_cube(8), wavy_grid(20)] {
        for ratio in [0.2, 0.5, 0.8] {
            let out = run(&mesh, ratio, PipelineConfig::default());
            assert!(out.mesh.face_count() > 0);
            assert_indices_valid(&out.mesh);
            assert!(out.mesh.validate().is_ok());
        }
    }
}

#[test]
fn test_border_vertices_keep_their_positions() {
    let mesh = wavy_grid(24);
    let partitioning = MeshPartitioner::new(&mesh, 8).unwrap().partition();
    assert!(partitioning.border_vertex_count() > 0);

    let simplifier = LmeSimplifier::new();
    for submesh in partitioning.submeshes() {
        let out = simplifier.simplify_submesh(&submesh, 0.3).unwrap();
        let survivors: HashMap<usize, Point3f> = out
            .source
            .iter()
            .zip(&out.vertices)
            .map(|(&src, p)| (src, *p))
            .collect();
        for local in (0..submesh.vertex_count()).filter(|&l| submesh.anchored[l]) {
            let p = survivors
                .get(&local)
                .unwrap_or_else(|| panic!("border vertex {} was removed", local));
            assert_eq!(*p, submesh.vertices[local]);
            assert_eq!(*p, mesh.vertices[submesh.index_map.to_global(local)]);
        }
    }
}

#[test]
fn test_partition_reduction_is_bounded() {
    let mesh = subdivided_cube(10);
    let out = run(&mesh, 0.4, PipelineConfig::default());
    assert!(!out.report.partitions.is_empty());
    for p in &out.report.partitions {
        assert!(p.output_vertices <= p.input_vertices);
        assert!(p.output_vertices >= p.border_vertices);
        if p.target_reached {
            let target = vertex_target(0.4, p.input_vertices);
            assert!(p.output_vertices <= target.max(p.border_vertices));
        }
    }
}

#[test]
fn test_no_seam_duplication() {
    let mesh = subdivided_cube(12);
    let partitioning = MeshPartitioner::new(&mesh, 8).unwrap().partition();
    let border_positions: Vec<[u32; 3]> = (0..mesh.vertex_count())
        .filter(|&v| partitioning.is_border(v))
        .map(|v| position_key(&mesh.vertices[v]))
        .collect();

    let out = run(&mesh, 0.5, PipelineConfig::default());
    let mut counts: HashMap<[u32; 3], usize> = HashMap::new();
    for p in &out.mesh.vertices {
        *counts.entry(position_key(p)).or_default() += 1;
    }
    for key in &border_positions {
        assert_eq!(counts.get(key), Some(&1));
    }
    assert_eq!(out.report.merge.border_vertices, border_positions.len());
    assert_eq!(out.report.merge.ambiguous_matches, 0);
    assert_eq!(out.report.merge.unmatched_border, 0);
}

#[test]
fn test_pipeline_is_deterministic() {
    let mesh = wavy_grid(30);
    let a = run(&mesh, 0.35, PipelineConfig::default());
    let b = run(&mesh, 0.35, PipelineConfig::default());
    assert_eq!(a.mesh, b.mesh);
}

#[test]
fn test_parallel_matches_sequential() {
    let mesh = subdivided_cube(10);
    let sequential = run(
        &mesh,
        0.5,
        PipelineConfig::default().with_parallel(ParallelConfig::sequential()),
    );
    let parallel = run(
        &mesh,
        0.5,
        PipelineConfig::default().with_parallel(ParallelConfig::default().with_threads(4)),
    );
    assert_eq!(sequential.mesh, parallel.mesh);
    assert_eq!(sequential.report.partitions, parallel.report.partitions);
}

#[test]
fn test_proximity_matching_agrees_with_identity() {
    let mesh = subdivided_cube(8);
    let by_identity = run(&mesh, 0.5, PipelineConfig::default());
    let by_position = run(
        &mesh,
        0.5,
        PipelineConfig::default().with_border_matching(BorderMatching::proximity()),
    );
    assert_eq!(by_identity.mesh, by_position.mesh);
    assert_eq!(by_position.report.merge.ambiguous_matches, 0);
}

#[test]
fn test_scenario_a_full_ratio_is_identity() {
    let cube = unit_cube();
    assert_eq!(cube.vertex_count(), 8);
    assert_eq!(cube.face_count(), 12);

    let out = run(&cube, 1.0, PipelineConfig::default().with_partitions(8));
    assert_eq!(out.mesh.vertex_count(), 8);
    assert_eq!(out.mesh.face_count(), 12);
    assert_eq!(triangle_set(&out.mesh), triangle_set(&cube));
}

#[test]
fn test_scenario_b_subdivided_cube_halved() {
    let mesh = subdivided_cube(16);
    assert_eq!(mesh.vertex_count(), 6 * 16 * 16 + 2);

    let out = run(&mesh, 0.5, PipelineConfig::default().with_partitions(8));
    assert_eq!(out.report.partitions.len(), 8);
    assert!(out.mesh.face_count() > 0);
    assert_indices_valid(&out.mesh);

    let ratio = out.mesh.vertex_count() as f32 / mesh.vertex_count() as f32;
    assert!(
        (0.3..=0.7).contains(&ratio),
        "expected roughly half the vertices, got {:.3}",
        ratio
    );
}

#[test]
fn test_scenario_c_single_partition_matches_whole_mesh() {
    let mesh = subdivided_cube(6);
    let partitioning = MeshPartitioner::new(&mesh, 1).unwrap().partition();
    assert_eq!(partitioning.len(), 1);
    assert_eq!(partitioning.border_vertex_count(), 0);

    let piped = simplify_mesh_with_partitioning(&mesh, 0.5, 1).unwrap();
    let whole = LmeSimplifier::new().simplify(&mesh, 0.5).unwrap();
    assert_eq!(piped, whole);
}

#[test]
fn test_flat_grid_collapses_without_leaving_plane() {
    let mesh = plane_grid(16);
    let out = run(&mesh, 0.3, PipelineConfig::default());
    assert!(out.mesh.vertex_count() < mesh.vertex_count());
    for p in &out.mesh.vertices {
        assert!(p.z.abs() < 1e-6);
        assert!((-1e-6..=1.0 + 1e-6).contains(&p.x));
        assert!((-1e-6..=1.0 + 1e-6).contains(&p.y));
    }
}

#[test]
fn test_trait_object_dispatch() {
    let mesh = wavy_grid(12);
    let simplifiers: Vec<Box<dyn MeshSimplifier>> = vec![
        Box::new(LmeSimplifier::new()),
        Box::new(PartitionedSimplifier::new()),
    ];
    for s in &simplifiers {
        let out = s.simplify(&mesh, 0.5).unwrap();
        assert!(out.vertex_count() < mesh.vertex_count());
        assert_indices_valid(&out);
    }
}
