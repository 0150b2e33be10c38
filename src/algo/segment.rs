//! Mesh segmentation for block-wise reconstruction.
//!
//! A mesh is cut into blocks by choosing well-spread seed vertices and growing
//! one region per seed with a breadth-first search that always advances the
//! smallest region. Inside each block, vertices are then split into packets
//! so that two vertices within two hops of each other rarely share a packet.

use std::collections::VecDeque;

use log::{debug, info, warn};

use crate::error::{MeshError, Result};
use crate::mesh::{Mesh, MeshIndex, VertexId};

const NONE: usize = usize::MAX;

/// Options for segmenting a mesh.
#[derive(Debug, Clone)]
pub struct SegmentOptions {
    /// Number of segments (default: 8).
    pub segments: usize,

    /// Target packet size within a segment (default: 120).
    pub packet_size: usize,
}

impl Default for SegmentOptions {
    fn default() -> Self {
        Self {
            segments: 8,
            packet_size: 120,
        }
    }
}

impl SegmentOptions {
    /// Set the number of segments.
    pub fn with_segments(mut self, segments: usize) -> Self {
        self.segments = segments;
        self
    }

    /// Set the packet size.
    pub fn with_packet_size(mut self, packet_size: usize) -> Self {
        self.packet_size = packet_size;
        self
    }
}

/// Pick `k` seeds by farthest-point sampling in Euclidean space.
///
/// The first seed is the vertex farthest from the centroid. Each following
/// seed maximizes the sum of distances to the seeds already chosen. Ties go
/// to the lowest id. `k` is clamped to the vertex count.
pub fn lookfor_seeds<I: MeshIndex>(mesh: &Mesh<I>, k: usize) -> Result<Vec<VertexId<I>>> {
    if k == 0 {
        return Err(MeshError::invalid_param("segments", k, "must be at least 1"));
    }
    if mesh.is_empty() {
        return Err(MeshError::EmptyMesh);
    }
    let k = if k > mesh.num_vertices() {
        warn!(
            "requested {} seeds but the mesh has {} vertices",
            k,
            mesh.num_vertices()
        );
        mesh.num_vertices()
    } else {
        k
    };

    let centroid = mesh.centroid();
    let mut chosen = vec![false; mesh.vertex_slots()];
    let mut seeds = Vec::with_capacity(k);
    // Running score per slot: distance to the centroid for the first pick,
    // then the sum of distances to chosen seeds.
    let mut score = vec![0.0f64; mesh.vertex_slots()];
    for (v, vertex) in mesh.vertices() {
        score[v.index()] = (vertex.position - centroid).norm();
    }

    for round in 0..k {
        let mut best: Option<(VertexId<I>, f64)> = None;
        for v in mesh.vertex_ids() {
            if chosen[v.index()] {
                continue;
            }
            let s = score[v.index()];
            match best {
                Some((_, b)) if s <= b => {}
                _ => best = Some((v, s)),
            }
        }
        let Some((seed, _)) = best else {
            break;
        };
        chosen[seed.index()] = true;
        seeds.push(seed);

        let p = *mesh.position(seed);
        if round == 0 {
            score.iter_mut().for_each(|s| *s = 0.0);
        }
        for (v, vertex) in mesh.vertices() {
            score[v.index()] += (vertex.position - p).norm();
        }
    }

    Ok(seeds)
}

/// A partition of the vertices into segments.
#[derive(Debug, Clone)]
pub struct Segmentation<I: MeshIndex = u32> {
    segment_of: Vec<usize>,
    segments: Vec<Vec<VertexId<I>>>,
    unreached: Vec<VertexId<I>>,
}

impl<I: MeshIndex> Segmentation<I> {
    /// Segment containing `v`, or `None` if no seed reached it.
    #[inline]
    pub fn segment_of(&self, v: VertexId<I>) -> Option<usize> {
        match self.segment_of.get(v.index()) {
            Some(&s) if s != NONE => Some(s),
            _ => None,
        }
    }

    /// Members of each segment, seed first, in discovery order.
    pub fn segments(&self) -> &[Vec<VertexId<I>>] {
        &self.segments
    }

    /// Number of segments.
    pub fn num_segments(&self) -> usize {
        self.segments.len()
    }

    /// Live vertices not connected to any seed.
    pub fn unreached(&self) -> &[VertexId<I>] {
        &self.unreached
    }

    /// Whether every live vertex belongs to a segment.
    pub fn is_complete(&self) -> bool {
        self.unreached.is_empty()
    }
}

/// Grow one segment per seed with a balanced multi-source BFS.
///
/// Each step pops one vertex from the queue of the currently smallest
/// segment (ties to the lowest segment index) and claims its unclaimed
/// neighbors. Vertices no seed can reach are reported in
/// [`Segmentation::unreached`]. Requires current neighbors.
pub fn segment_graph<I: MeshIndex>(
    mesh: &Mesh<I>,
    seeds: &[VertexId<I>],
) -> Result<Segmentation<I>> {
    mesh.require_neighbors()?;
    if seeds.is_empty() {
        return Err(MeshError::invalid_param("seeds", 0, "at least one seed is required"));
    }

    let mut segment_of = vec![NONE; mesh.vertex_slots()];
    let mut segments: Vec<Vec<VertexId<I>>> = Vec::with_capacity(seeds.len());
    let mut queues: Vec<VecDeque<VertexId<I>>> = Vec::with_capacity(seeds.len());

    for (s, &seed) in seeds.iter().enumerate() {
        if mesh.try_vertex(seed).is_none() {
            return Err(MeshError::MissingElement {
                kind: "vertex",
                index: seed.index(),
            });
        }
        if segment_of[seed.index()] != NONE {
            return Err(MeshError::invalid_param(
                "seeds",
                seed.index(),
                "seeds must be distinct",
            ));
        }
        segment_of[seed.index()] = s;
        segments.push(vec![seed]);
        queues.push(VecDeque::from([seed]));
    }

    loop {
        let next = queues
            .iter()
            .enumerate()
            .filter(|(_, q)| !q.is_empty())
            .min_by_key(|&(s, _)| (segments[s].len(), s))
            .map(|(s, _)| s);
        let Some(s) = next else {
            break;
        };
        let Some(v) = queues[s].pop_front() else {
            break;
        };
        for &n in mesh.neighbors(v) {
            if segment_of[n.index()] == NONE {
                segment_of[n.index()] = s;
                segments[s].push(n);
                queues[s].push_back(n);
            }
        }
    }

    let unreached: Vec<VertexId<I>> = mesh
        .vertex_ids()
        .filter(|v| segment_of[v.index()] == NONE)
        .collect();
    if !unreached.is_empty() {
        warn!("{} vertices are not connected to any seed", unreached.len());
    }
    debug!(
        "segment sizes: {:?}",
        segments.iter().map(Vec::len).collect::<Vec<_>>()
    );

    Ok(Segmentation {
        segment_of,
        segments,
        unreached,
    })
}

/// Choose seeds with [`lookfor_seeds`] and grow segments from them.
pub fn segment_mesh<I: MeshIndex>(
    mesh: &Mesh<I>,
    options: &SegmentOptions,
) -> Result<Segmentation<I>> {
    let seeds = lookfor_seeds(mesh, options.segments)?;
    let segmentation = segment_graph(mesh, &seeds)?;
    info!(
        "segmented {} vertices into {} segments",
        mesh.num_vertices(),
        segmentation.num_segments()
    );
    Ok(segmentation)
}

/// Packet assignment of every segmented vertex.
#[derive(Debug, Clone)]
pub struct Packets<I: MeshIndex = u32> {
    packet_of: Vec<usize>,
    counts: Vec<Vec<usize>>,
    _marker: std::marker::PhantomData<I>,
}

impl<I: MeshIndex> Packets<I> {
    /// Packet of `v` within its segment, or `None` if unassigned.
    #[inline]
    pub fn packet_of(&self, v: VertexId<I>) -> Option<usize> {
        match self.packet_of.get(v.index()) {
            Some(&p) if p != NONE => Some(p),
            _ => None,
        }
    }

    /// Number of vertices in each packet of `segment`.
    pub fn counts(&self, segment: usize) -> &[usize] {
        &self.counts[segment]
    }

    /// Number of packets in `segment`.
    pub fn num_packets(&self, segment: usize) -> usize {
        self.counts[segment].len()
    }
}

/// Split each segment into `ceil(size / packet_size)` packets.
///
/// Vertices are visited in segment order. Each takes the least-used packet
/// not already taken by a vertex within two hops inside the same segment,
/// or the least-used packet overall if all are blocked. Ties go to the
/// lowest packet index.
pub fn greedy_packet<I: MeshIndex>(
    mesh: &Mesh<I>,
    segmentation: &Segmentation<I>,
    packet_size: usize,
) -> Result<Packets<I>> {
    if packet_size == 0 {
        return Err(MeshError::invalid_param(
            "packet_size",
            packet_size,
            "must be at least 1",
        ));
    }
    mesh.require_neighbors()?;

    let mut packet_of = vec![NONE; mesh.vertex_slots()];
    let mut counts = Vec::with_capacity(segmentation.num_segments());
    let mut fallbacks = 0usize;

    for (s, members) in segmentation.segments().iter().enumerate() {
        let num_packets = members.len().div_ceil(packet_size).max(1);
        let mut used = vec![0usize; num_packets];
        let mut blocked = vec![false; num_packets];

        for &v in members {
            blocked.iter_mut().for_each(|b| *b = false);
            for &n in mesh.neighbors(v) {
                if segmentation.segment_of(n) != Some(s) {
                    continue;
                }
                if packet_of[n.index()] != NONE {
                    blocked[packet_of[n.index()]] = true;
                }
                for &m in mesh.neighbors(n) {
                    if m != v
                        && segmentation.segment_of(m) == Some(s)
                        && packet_of[m.index()] != NONE
                    {
                        blocked[packet_of[m.index()]] = true;
                    }
                }
            }

            let free = (0..num_packets)
                .filter(|&p| !blocked[p])
                .min_by_key(|&p| (used[p], p));
            let packet = match free {
                Some(p) => p,
                None => {
                    fallbacks += 1;
                    (0..num_packets).min_by_key(|&p| (used[p], p)).unwrap_or(0)
                }
            };
            packet_of[v.index()] = packet;
            used[packet] += 1;
        }
        counts.push(used);
    }

    if fallbacks > 0 {
        debug!("{} vertices share a packet with a two-hop neighbor", fallbacks);
    }

    Ok(Packets {
        packet_of,
        counts,
        _marker: std::marker::PhantomData,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{grid, two_components};

    #[test]
    fn test_first_seed_farthest_from_centroid() {
        let mesh = grid(5);
        let seeds = lookfor_seeds(&mesh, 3).unwrap();
        assert_eq!(seeds.len(), 3);

        let c = mesh.centroid();
        let far = mesh
            .vertices()
            .map(|(_, v)| (v.position - c).norm())
            .fold(0.0, f64::max);
        assert_eq!((mesh.position(seeds[0]) - c).norm(), far);

        let mut unique = seeds.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 3);
    }

    #[test]
    fn test_second_seed_maximizes_distance() {
        let mesh = grid(5);
        let seeds = lookfor_seeds(&mesh, 2).unwrap();
        let first = *mesh.position(seeds[0]);
        let best = mesh
            .vertices()
            .map(|(_, v)| (v.position - first).norm())
            .fold(0.0, f64::max);
        assert_eq!((mesh.position(seeds[1]) - first).norm(), best);
    }

    #[test]
    fn test_seed_count_clamped() {
        let mesh = grid(2);
        assert_eq!(lookfor_seeds(&mesh, 10).unwrap().len(), 4);
        assert!(lookfor_seeds(&mesh, 0).is_err());
    }

    #[test]
    fn test_segment_partition() {
        let mesh = grid(10);
        let seeds = lookfor_seeds(&mesh, 4).unwrap();
        let seg = segment_graph(&mesh, &seeds).unwrap();

        assert!(seg.is_complete());
        assert_eq!(seg.num_segments(), 4);
        let mut seen = vec![0; mesh.vertex_slots()];
        for (s, members) in seg.segments().iter().enumerate() {
            assert_eq!(members[0], seeds[s]);
            for &v in members {
                seen[v.index()] += 1;
                assert_eq!(seg.segment_of(v), Some(s));
            }
        }
        assert!(seen.iter().all(|&c| c == 1));
    }

    #[test]
    fn test_segments_are_connected() {
        let mesh = grid(9);
        let seeds = lookfor_seeds(&mesh, 3).unwrap();
        let seg = segment_graph(&mesh, &seeds).unwrap();

        for (s, members) in seg.segments().iter().enumerate() {
            // Every member after the seed was claimed from a member before it.
            for (i, &v) in members.iter().enumerate().skip(1) {
                assert!(mesh
                    .neighbors(v)
                    .iter()
                    .any(|n| members[..i].contains(n) && seg.segment_of(*n) == Some(s)));
            }
        }
    }

    #[test]
    fn test_unreached_reported() {
        let mesh = two_components();
        let seg = segment_graph(&mesh, &[VertexId::new(0)]).unwrap();
        assert!(!seg.is_complete());
        let unreached: Vec<usize> = seg.unreached().iter().map(|v| v.index()).collect();
        assert_eq!(unreached, vec![4, 5, 6, 7]);
        assert_eq!(seg.segment_of(VertexId::new(5)), None);
    }

    #[test]
    fn test_duplicate_seed_rejected() {
        let mesh = grid(3);
        let seeds = [VertexId::new(0), VertexId::new(0)];
        assert!(segment_graph(&mesh, &seeds).is_err());
    }

    #[test]
    fn test_packets_separate_two_ring() {
        let mesh = grid(12);
        let seg = segment_graph(&mesh, &[VertexId::new(0)]).unwrap();
        let packets = greedy_packet(&mesh, &seg, 5).unwrap();

        assert_eq!(packets.num_packets(0), 29);
        assert_eq!(packets.counts(0).iter().sum::<usize>(), 144);

        for v in mesh.vertex_ids() {
            let p = packets.packet_of(v).unwrap();
            for &n in mesh.neighbors(v) {
                assert_ne!(packets.packet_of(n), Some(p));
                for &m in mesh.neighbors(n) {
                    if m != v {
                        assert_ne!(packets.packet_of(m), Some(p));
                    }
                }
            }
        }
    }

    #[test]
    fn test_packet_counts_near_target() {
        let mesh = grid(12);
        let seg = segment_mesh(&mesh, &SegmentOptions::default().with_segments(2)).unwrap();
        let packets = greedy_packet(&mesh, &seg, 30).unwrap();

        for (s, members) in seg.segments().iter().enumerate() {
            assert_eq!(packets.num_packets(s), members.len().div_ceil(30));
            assert_eq!(packets.counts(s).iter().sum::<usize>(), members.len());
        }
    }

    #[test]
    fn test_packet_size_zero() {
        let mesh = grid(3);
        let seg = segment_graph(&mesh, &[VertexId::new(0)]).unwrap();
        assert!(greedy_packet(&mesh, &seg, 0).is_err());
    }
}
