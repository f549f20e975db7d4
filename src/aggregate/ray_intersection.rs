//! The single query entry point of the aggregate mesh: light ray vs scene.

use std::time::Instant;

use assert2::debug_assert;

use crate::geometry::{BARYCENTRIC_TOLERANCE, barycentric_weights};
use crate::material::LinearColor;
use crate::mesh::{MeshFlags, StaticLightingVertex};
use crate::ray::{CoherentRayCache, LightRay, LightRayHit, LightRayIntersection, TraceFlags};

use super::kdop::LineCheck;
use super::soa::SegmentFilter;
use super::{AggregateMesh, PayloadIdx};

/// A single intersection restart per translucent/masked/suppressed hit; this
/// caps pathological scenes full of stacked translucency.
const MAX_ITERATIVE_INTERSECTIONS: usize = 20;

/// Per-query options of `intersect_light_ray`.
#[derive(Copy, Clone, Debug, Default)]
pub struct TraceSettings {
    /// Walk to the true closest hit instead of returning on the first
    /// qualifying one. Required for correct masked/translucent handling: the
    /// boolean fast path treats masked materials as opaque (it still honors
    /// `STATIC_AND_OPAQUE_ONLY`).
    pub find_closest_intersection: bool,
    /// Accumulate transmission through translucent hits.
    /// Requires `find_closest_intersection`.
    pub calculate_transmission: bool,
    /// The ray computes direct shadowing: backfaces cull, and
    /// indirect-only shadow casters are skipped.
    pub direct_shadowing_ray: bool,
}

impl AggregateMesh {
    /// Checks a light ray for intersection with the scene.
    ///
    /// Returns the hit (closest or first qualifying, per `settings`) and the
    /// accumulated transmission. A `cache` makes coherent boolean batches
    /// cheaper and gathers trace statistics; it never changes results.
    pub fn intersect_light_ray(
        &self,
        ray: &LightRay,
        settings: TraceSettings,
        mut cache: Option<&mut CoherentRayCache>,
    ) -> LightRayIntersection {
        let started = Instant::now();
        let result = self.intersect_light_ray_inner(ray, settings, cache.as_deref_mut());
        if let Some(cache) = cache {
            let elapsed = started.elapsed();
            if settings.find_closest_intersection {
                cache.num_first_hit_rays_traced += 1;
                cache.first_hit_ray_time += elapsed;
            } else {
                cache.num_boolean_rays_traced += 1;
                cache.boolean_ray_time += elapsed;
            }
        }
        result
    }

    fn intersect_light_ray_inner(
        &self,
        ray: &LightRay,
        settings: TraceSettings,
        mut cache: Option<&mut CoherentRayCache>,
    ) -> LightRayIntersection {
        debug_assert!(self.is_prepared(), "intersect_light_ray before prepare_for_raytracing");
        // Transmission accumulation requires walking to the true closest hit
        debug_assert!(!settings.calculate_transmission || settings.find_closest_intersection);

        let filter = SegmentFilter {
            static_and_opaque_only: ray.trace_flags.contains(TraceFlags::STATIC_AND_OPAQUE_ONLY),
            two_sided_collision: !settings.direct_shadowing_ray,
            flip_sidedness: ray.trace_flags.contains(TraceFlags::FLIP_SIDEDNESS),
            instigator_primitive: ray.mesh.map_or(-1, |m| self.meshes[m].primitive_id),
            instigator_lod: ray.mesh.map_or(-1, |m| self.meshes[m].lod_index),
        };
        let exclude_mesh = if ray.trace_flags.contains(TraceFlags::SELF_SHADOW_DISABLE) {
            ray.mesh
        } else {
            None
        };
        let payload_owner =
            |payload: PayloadIdx| self.mesh_infos[self.payloads[payload].mesh_info].mesh;

        let mut transmission = LinearColor::WHITE;
        let mut closest: Option<LightRayHit> = None;
        let mut num_restarts = 0usize;

        loop {
            let mut clipped = ray.clone();
            if let Some(hit) = &closest {
                num_restarts += 1;
                // Restart just past the intersection point so the same
                // triangle isn't hit again.
                let continue_point = hit.vertex.world_position
                    + clipped.direction.normalize() * self.config.visibility_ray_offset_distance;
                clipped.clip_against_intersection_from_end(continue_point);

                let mesh = &self.meshes[hit.mesh];
                let element = mesh.element(hit.element_index);
                let shadowing_suppressed = (Some(hit.mesh) == ray.mesh
                    && (mesh.flags.contains(MeshFlags::SELF_SHADOW_DISABLE)
                        || ray.trace_flags.contains(TraceFlags::SELF_SHADOW_DISABLE)))
                    || (settings.direct_shadowing_ray && element.shadow_indirect_only)
                    || (Some(hit.mesh) != ray.mesh
                        && mesh.flags.contains(MeshFlags::SELF_SHADOW_ONLY));

                if shadowing_suppressed {
                    // The hit doesn't shadow this ray; just keep going
                } else if element.masked
                    || (settings.direct_shadowing_ray && element.cast_shadow_as_masked)
                {
                    if mesh.evaluate_masked_collision(
                        &hit.vertex.texture_coordinates[0],
                        hit.element_index,
                    ) {
                        // Hit an opaque part of a masked mesh, terminate
                        break;
                    }
                } else if settings.calculate_transmission {
                    // Order independent, so intersections don't have to be
                    // strictly front to back
                    transmission = transmission * element.transmission;
                }
                closest = None;
            }

            let mut check = LineCheck::new(
                clipped.start,
                clipped.end,
                filter.clone(),
                settings.find_closest_intersection,
                exclude_mesh,
                &payload_owner,
            );

            let mut hit_found = false;
            if !settings.find_closest_intersection {
                // Probe the node that settled the previous coherent ray
                // before a full root descent.
                if let Some(node) = cache.as_ref().and_then(|c| c.node) {
                    hit_found = self.tree.line_check_node(node, &mut check);
                }
            }
            if !hit_found {
                hit_found = self.tree.line_check(&mut check);
            }

            if hit_found {
                let payload = check
                    .result
                    .payload
                    .expect("a reported hit always carries its payload");
                let hit =
                    self.build_hit(&clipped, payload, check.result.time, &check.result.normal);
                if settings.find_closest_intersection {
                    clipped.clip_against_intersection_from_start(hit.vertex.world_position);
                    closest = Some(hit);
                } else {
                    if let Some(cache) = cache.as_deref_mut() {
                        cache.node = check.result.hit_node;
                    }
                    return LightRayIntersection {
                        hit: Some(hit),
                        transmission,
                    };
                }
            }

            // Keep tracing as long as the closest hit is one the ray is
            // allowed to pass through.
            let continue_tracing = match &closest {
                Some(hit) => {
                    let mesh = &self.meshes[hit.mesh];
                    let element = mesh.element(hit.element_index);
                    element.translucent
                        || element.masked
                        || (Some(hit.mesh) == ray.mesh
                            && (mesh.flags.contains(MeshFlags::SELF_SHADOW_DISABLE)
                                || ray.trace_flags.contains(TraceFlags::SELF_SHADOW_DISABLE)))
                        || (Some(hit.mesh) != ray.mesh
                            && mesh.flags.contains(MeshFlags::SELF_SHADOW_ONLY))
                        || (settings.direct_shadowing_ray && element.shadow_indirect_only)
                }
                None => false,
            };
            if !continue_tracing || num_restarts >= MAX_ITERATIVE_INTERSECTIONS {
                break;
            }
        }

        if num_restarts >= MAX_ITERATIVE_INTERSECTIONS {
            closest = None;
        }

        // A returned intersection is never translucent
        debug_assert!(closest.as_ref().is_none_or(|hit| {
            let element = self.meshes[hit.mesh].element(hit.element_index);
            !element.translucent
                || (settings.direct_shadowing_ray && element.cast_shadow_as_masked)
        }));

        LightRayIntersection {
            hit: closest,
            transmission,
        }
    }

    /// Builds the intersection record for a confirmed hit: position along the
    /// clipped segment, interpolated UVs, and the mesh-relative index of the
    /// nearest triangle vertex.
    fn build_hit(
        &self,
        clipped: &LightRay,
        payload_idx: PayloadIdx,
        time: f32,
        normal: &crate::geometry::WorldVector,
    ) -> LightRayHit {
        let payload = &self.payloads[payload_idx];
        let [g0, g1, g2] = payload.vertex_indices.map(|i| i as usize);
        let position = clipped.start + clipped.direction * time;

        let mut vertex = StaticLightingVertex {
            world_position: position,
            world_tangent_z: *normal,
            ..Default::default()
        };
        vertex.generate_vertex_tangents();

        let mut nearest = 0;
        match barycentric_weights(
            &self.vertices[g0],
            &self.vertices[g1],
            &self.vertices[g2],
            &position,
            BARYCENTRIC_TOLERANCE,
        ) {
            Some(weights) => {
                vertex.texture_coordinates[0] =
                    weights.interpolate_uv(&self.uvs[g0], &self.uvs[g1], &self.uvs[g2]);
                vertex.texture_coordinates[1] = weights.interpolate_uv(
                    &self.lightmap_uvs[g0],
                    &self.lightmap_uvs[g1],
                    &self.lightmap_uvs[g2],
                );
                nearest = weights.largest_index();
            }
            None => {
                // Numerically unlucky hit; keep zero UVs rather than garbage
            }
        }

        let mesh_info = &self.mesh_infos[payload.mesh_info];
        let absolute_vertex_index = payload.vertex_indices[nearest] as usize;
        let relative_vertex_index = absolute_vertex_index - mesh_info.base_index as usize;
        debug_assert!(relative_vertex_index < self.meshes[mesh_info.mesh].num_vertices());

        LightRayHit {
            vertex,
            mesh: mesh_info.mesh,
            mapping: payload.mapping,
            vertex_index: relative_vertex_index,
            element_index: payload.element_index,
        }
    }
}
