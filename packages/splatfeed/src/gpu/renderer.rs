//! Preview renderer: draws every visible point set in the scene graph as
//! camera-facing billboards.
//!
//! Splat scenes are drawn from their centers and colors only; this is a
//! preview, not a Gaussian rasterizer. Instance buffers are owned per entity
//! and dropped as soon as the entity leaves the graph.

use std::collections::{HashMap, HashSet};

use wgpu::util::DeviceExt;

use crate::camera::CameraRig;
use crate::gpu::pipeline::{self, GpuPointInstance};
use crate::scene_graph::{EntityId, PointCloud, SceneGraph, SplatSceneNode};

/// World-space edge length of a splat center billboard.
const SPLAT_POINT_SIZE: f32 = 0.012;

const DEFAULT_CLEAR: wgpu::Color = wgpu::Color {
    r: 0.02,
    g: 0.02,
    b: 0.03,
    a: 1.0,
};

/// Instances for a resident splat scene.
pub fn splat_instances(node: &SplatSceneNode) -> Vec<GpuPointInstance> {
    node.cloud
        .centers
        .iter()
        .enumerate()
        .map(|(i, center)| GpuPointInstance {
            position: center.to_array(),
            size: SPLAT_POINT_SIZE,
            color: node.cloud.color(i).unwrap_or([1.0, 1.0, 1.0, 1.0]),
        })
        .collect()
}

/// Instances for a point cloud; all points share its material.
pub fn point_instances(cloud: &PointCloud) -> Vec<GpuPointInstance> {
    let color = [cloud.color[0], cloud.color[1], cloud.color[2], cloud.opacity.clamp(0.0, 1.0)];
    cloud
        .positions
        .iter()
        .map(|p| GpuPointInstance {
            position: p.to_array(),
            size: cloud.size,
            color,
        })
        .collect()
}

struct InstanceBuffer {
    buffer: wgpu::Buffer,
    capacity: usize,
    count: usize,
}

pub struct PointRenderer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    size: wgpu::Extent3d,
    pipeline: wgpu::RenderPipeline,
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    quad_vertex_buffer: wgpu::Buffer,
    quad_index_buffer: wgpu::Buffer,
    instance_buffers: HashMap<EntityId, InstanceBuffer>,
    clear_color: wgpu::Color,
}

impl PointRenderer {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue, format: wgpu::TextureFormat, width: u32, height: u32) -> Self {
        // view_proj (mat4) + camera_right (vec4) + camera_up (vec4) = 24 floats
        let uniform_data: [f32; 24] = [0.0; 24];
        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Point Uniform Buffer"),
            contents: bytemuck::cast_slice(&uniform_data),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
            label: Some("point_bind_group_layout"),
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
            label: Some("point_bind_group"),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Point Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let pipeline = pipeline::create_point_pipeline(&device, &pipeline_layout, format);

        #[rustfmt::skip]
        let quad_vertices: [f32; 8] = [
            -0.5, -0.5,  // bottom-left
             0.5, -0.5,  // bottom-right
             0.5,  0.5,  // top-right
            -0.5,  0.5,  // top-left
        ];
        let quad_indices: [u16; 6] = [0, 1, 2, 0, 2, 3];

        let quad_vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Point Quad Vertex Buffer"),
            contents: bytemuck::cast_slice(&quad_vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let quad_index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Point Quad Index Buffer"),
            contents: bytemuck::cast_slice(&quad_indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        Self {
            device,
            queue,
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            pipeline,
            uniform_buffer,
            bind_group,
            quad_vertex_buffer,
            quad_index_buffer,
            instance_buffers: HashMap::new(),
            clear_color: DEFAULT_CLEAR,
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn set_clear_color(&mut self, color: wgpu::Color) {
        self.clear_color = color;
    }

    /// Entities currently holding a GPU instance buffer.
    pub fn buffered_entities(&self) -> usize {
        self.instance_buffers.len()
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.size.width = width.max(1);
        self.size.height = height.max(1);
    }

    pub fn render(&mut self, view: &wgpu::TextureView, scene: &SceneGraph, camera: &CameraRig) {
        let aspect = self.size.width as f32 / self.size.height as f32;
        self.queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::cast_slice(&camera.billboard_uniforms(aspect)));

        // Splat scenes first so the burst composites over them.
        let mut draws: Vec<(EntityId, Option<Vec<GpuPointInstance>>)> = Vec::new();
        for (id, node) in scene.splat_scenes().filter(|(_, n)| n.visible) {
            // Resident scenes never change after load; upload once.
            let instances = if self.instance_buffers.contains_key(&id) {
                None
            } else {
                Some(splat_instances(node))
            };
            draws.push((id, instances));
        }
        for (id, cloud) in scene.point_clouds().filter(|(_, c)| c.visible) {
            draws.push((id, Some(point_instances(cloud))));
        }

        let live: HashSet<EntityId> = draws.iter().map(|(id, _)| *id).collect();
        let before = self.instance_buffers.len();
        self.instance_buffers.retain(|id, _| live.contains(id));
        if self.instance_buffers.len() != before {
            log::debug!("Released {} instance buffer(s)", before - self.instance_buffers.len());
        }

        let mut order = Vec::with_capacity(draws.len());
        for (id, instances) in draws {
            if let Some(instances) = instances {
                self.upload(id, &instances);
            }
            order.push(id);
        }

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Point Render Encoder"),
        });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Point Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.clear_color),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            render_pass.set_pipeline(&self.pipeline);
            render_pass.set_bind_group(0, &self.bind_group, &[]);
            render_pass.set_vertex_buffer(0, self.quad_vertex_buffer.slice(..));
            render_pass.set_index_buffer(self.quad_index_buffer.slice(..), wgpu::IndexFormat::Uint16);

            for id in order {
                let Some(instances) = self.instance_buffers.get(&id) else {
                    continue;
                };
                render_pass.set_vertex_buffer(1, instances.buffer.slice(..));
                render_pass.draw_indexed(0..6, 0, 0..instances.count as u32);
            }
        }
        self.queue.submit(Some(encoder.finish()));
    }

    fn upload(&mut self, id: EntityId, instances: &[GpuPointInstance]) {
        if instances.is_empty() {
            self.instance_buffers.remove(&id);
            return;
        }

        let needs_alloc = self
            .instance_buffers
            .get(&id)
            .map_or(true, |existing| existing.capacity < instances.len());
        if needs_alloc {
            let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Point Instance Buffer"),
                size: std::mem::size_of_val(instances) as u64,
                usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            self.instance_buffers.insert(
                id,
                InstanceBuffer {
                    buffer,
                    capacity: instances.len(),
                    count: 0,
                },
            );
        }

        if let Some(target) = self.instance_buffers.get_mut(&id) {
            self.queue.write_buffer(&target.buffer, 0, bytemuck::cast_slice(instances));
            target.count = instances.len();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::splat_mesh::SplatCloud;
    use glam::Vec3;
    use std::rc::Rc;

    #[test]
    fn test_point_instances_carry_material() {
        let mut cloud = PointCloud::new(vec![Vec3::X, Vec3::Y], [0.5, 0.25, 1.0], 0.03, 1.0);
        cloud.opacity = 0.4;

        let instances = point_instances(&cloud);
        assert_eq!(instances.len(), 2);
        assert_eq!(instances[1].position, [0.0, 1.0, 0.0]);
        assert_eq!(instances[0].size, 0.03);
        assert_eq!(instances[0].color, [0.5, 0.25, 1.0, 0.4]);
    }

    #[test]
    fn test_splat_instances_default_to_white() {
        let node = SplatSceneNode {
            source: "a.splat".to_string(),
            cloud: Rc::new(SplatCloud::new(vec![Vec3::ZERO])),
            visible: true,
        };
        let instances = splat_instances(&node);
        assert_eq!(instances[0].color, [1.0, 1.0, 1.0, 1.0]);
        assert_eq!(instances[0].size, SPLAT_POINT_SIZE);
    }
}
